//! Destination store errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The destination table has not been created yet. Carries the DDL an
    /// operator must run; the store never executes DDL itself.
    #[error("table '{table}' does not exist in the destination; run the generated DDL first")]
    SchemaMissing { table: String, ddl: String },

    /// A table name failed validation before being interpolated into SQL.
    #[error("invalid table name: '{0}'")]
    InvalidName(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_missing_names_the_table() {
        let e = StoreError::SchemaMissing {
            table: "orders".to_string(),
            ddl: "CREATE TABLE ...".to_string(),
        };
        assert!(e.to_string().contains("'orders'"));
    }
}
