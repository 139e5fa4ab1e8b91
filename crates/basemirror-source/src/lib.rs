//! Basemirror Source - Airtable connector
//!
//! This crate wraps the Airtable REST API:
//! - base metadata (tables and field schemas)
//! - paginated record listing
//! - single-record fetch for the webhook path

pub mod airtable;
pub mod error;
pub mod types;

pub use airtable::{AirtableClient, PAGE_SIZE};
pub use error::SourceError;
pub use types::{AirtableField, AirtableRecord, AirtableTable};

use async_trait::async_trait;

/// Trait for record sources the sync engine can mirror.
///
/// The engine takes this seam instead of a concrete client so tests can
/// substitute in-memory fakes.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// List all tables in the base. An empty base yields an empty list.
    async fn list_tables(&self) -> Result<Vec<AirtableTable>, SourceError>;

    /// Fetch the field schema for one table.
    async fn table_schema(&self, table_id: &str) -> Result<Vec<AirtableField>, SourceError>;

    /// Fetch every record of a table, in server-returned order.
    async fn all_records(&self, table_id: &str) -> Result<Vec<AirtableRecord>, SourceError>;

    /// Fetch one record; `None` when the record does not exist.
    async fn record(
        &self,
        table_id: &str,
        record_id: &str,
    ) -> Result<Option<AirtableRecord>, SourceError>;
}
