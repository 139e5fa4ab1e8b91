//! Basemirror Store - Postgres destination
//!
//! This crate owns everything destination-side:
//! - identifier sanitization and reserved-column handling
//! - Airtable type → Postgres type mapping and value coercion
//! - DDL generation (generated, never executed — structural changes are
//!   operator-gated)
//! - the upsert engine and soft-delete path

pub mod ddl;
pub mod error;
pub mod mapping;
pub mod names;
pub mod store;

pub use ddl::{generate_table_sql, metadata_table_sql};
pub use error::StoreError;
pub use mapping::{coerce_value, column_type, sanitize_numeric, CellValue, ColumnType};
pub use names::{column_name, sanitize_name, RESERVED_COLUMNS, RESERVED_FIELD_PREFIX};
pub use store::{PgStore, RowRecord, TableMetadata, UPSERT_BATCH_SIZE};

use std::collections::HashSet;

use async_trait::async_trait;
use basemirror_source::{AirtableField, AirtableRecord};

/// Destination operations the sync engine depends on.
///
/// `PgStore` is the real implementation; tests substitute in-memory fakes.
/// Every method takes the table's display name and derives the sanitized
/// destination name itself, keeping the derivation in one place.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Whether the `_table_metadata` registry exists.
    async fn metadata_ready(&self) -> Result<bool, StoreError>;

    /// Verify the destination table exists and refresh its metadata row.
    /// Fails with [`StoreError::SchemaMissing`] (carrying the DDL) when the
    /// table is absent.
    async fn ensure_schema(
        &self,
        display_name: &str,
        fields: &[AirtableField],
        source_table_id: &str,
    ) -> Result<(), StoreError>;

    /// Count live (not soft-deleted) rows.
    async fn count_live(&self, display_name: &str) -> Result<u64, StoreError>;

    /// Source-record ids of all live rows.
    async fn live_ids(&self, display_name: &str) -> Result<HashSet<String>, StoreError>;

    /// Idempotent batched upsert keyed on the source-record id. A batch
    /// failure aborts the remaining batches; committed batches stay.
    async fn upsert_records(
        &self,
        display_name: &str,
        records: &[AirtableRecord],
        fields: &[AirtableField],
    ) -> Result<(), StoreError>;

    /// Flip the soft-delete flag for one row; unknown ids are a no-op.
    async fn mark_deleted(&self, display_name: &str, record_id: &str) -> Result<(), StoreError>;

    /// Refresh the table's last-synced timestamp.
    async fn touch_last_synced(&self, display_name: &str) -> Result<(), StoreError>;
}
