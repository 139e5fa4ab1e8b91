//! Basemirror Sync - orchestrator
//!
//! Walks every table of the source base sequentially: reconcile the
//! destination schema, fetch all records, classify added vs. updated against
//! the pre-upsert live set, upsert, count. One table's failure is recorded in
//! its result entry and never aborts sibling tables. There are no retries
//! within a run; retry is "run again".

pub mod summary;

pub use summary::{SyncSummary, TableSyncResult};

use thiserror::Error;
use tracing::{info, warn};

use basemirror_source::{AirtableTable, RecordSource, SourceError};
use basemirror_store::{StoreError, SyncStore};

/// Failures that abort a whole run (as opposed to per-table failures, which
/// are folded into the run summary).
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("metadata table does not exist; run the migration first")]
    MetadataMissing,

    #[error("no tables found in source base")]
    NoTables,

    #[error("record {0} not found in source")]
    RecordNotFound(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The sync engine over an injected source and destination.
///
/// Both collaborators are parameters so tests can substitute fakes; the real
/// wiring is `SyncEngine<AirtableClient, PgStore>`.
pub struct SyncEngine<S, D> {
    source: S,
    store: D,
}

impl<S: RecordSource, D: SyncStore> SyncEngine<S, D> {
    pub fn new(source: S, store: D) -> Self {
        Self { source, store }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn store(&self) -> &D {
        &self.store
    }

    /// Run a full sync of every table in the base.
    ///
    /// Tables are processed in listing order, one at a time; every remote
    /// call is awaited before the next begins, so results are deterministic
    /// for deterministic inputs.
    pub async fn run(&self) -> Result<SyncSummary, SyncError> {
        if !self.store.metadata_ready().await? {
            return Err(SyncError::MetadataMissing);
        }

        let tables = self.source.list_tables().await?;
        if tables.is_empty() {
            return Err(SyncError::NoTables);
        }
        info!("Syncing {} tables", tables.len());

        let mut results = Vec::with_capacity(tables.len());
        for table in &tables {
            let result = self.sync_table(table).await;
            match &result.error {
                Some(error) => warn!("Table '{}' failed: {}", table.name, error),
                None => info!(
                    "Table '{}' synced: {} fetched, {} added, {} updated",
                    table.name, result.records_fetched, result.records_added, result.records_updated
                ),
            }
            results.push(result);
        }

        Ok(SyncSummary::from_results(results))
    }

    /// Sync one table. Never fails outright — any error lands in the
    /// result's `error` field alongside whatever counts were gathered before
    /// the failure.
    async fn sync_table(&self, table: &AirtableTable) -> TableSyncResult {
        let mut result = TableSyncResult::new(&table.name);

        let fields = match self.source.table_schema(&table.id).await {
            Ok(fields) => fields,
            Err(error) => {
                result.error = Some(error.to_string());
                return result;
            }
        };

        // Reconcile before counting so a missing table surfaces as the
        // schema error carrying its DDL, not as an opaque count failure.
        if let Err(error) = self.store.ensure_schema(&table.name, &fields, &table.id).await {
            result.error = Some(error.to_string());
            return result;
        }

        result.records_before = match self.store.count_live(&table.name).await {
            Ok(count) => count,
            Err(error) => {
                result.error = Some(error.to_string());
                return result;
            }
        };

        let records = match self.source.all_records(&table.id).await {
            Ok(records) => records,
            Err(error) => {
                result.error = Some(error.to_string());
                return result;
            }
        };
        result.records_fetched = records.len() as u64;

        // Classification uses the live-id set captured before the upsert. A
        // record that was soft-deleted and reappears in the source counts as
        // added here even though a dead row exists; the source does not
        // disambiguate that case.
        let live = match self.store.live_ids(&table.name).await {
            Ok(ids) => ids,
            Err(error) => {
                result.error = Some(error.to_string());
                return result;
            }
        };
        for record in &records {
            if live.contains(&record.id) {
                result.records_updated += 1;
            } else {
                result.records_added += 1;
            }
        }

        if !records.is_empty() {
            if let Err(error) = self.store.upsert_records(&table.name, &records, &fields).await {
                result.error = Some(error.to_string());
                return result;
            }
        }
        result.records_synced = records.len() as u64;

        result.records_after = match self.store.count_live(&table.name).await {
            Ok(count) => count,
            Err(error) => {
                result.error = Some(error.to_string());
                return result;
            }
        };

        if let Err(error) = self.store.touch_last_synced(&table.name).await {
            result.error = Some(error.to_string());
            return result;
        }

        result
    }

    /// Single-record path for change notifications: reconcile the table, then
    /// fetch and upsert the one record.
    pub async fn sync_record(
        &self,
        table_id: &str,
        table_name: &str,
        record_id: &str,
    ) -> Result<(), SyncError> {
        let fields = self.source.table_schema(table_id).await?;
        self.store
            .ensure_schema(table_name, &fields, table_id)
            .await?;

        let record = self
            .source
            .record(table_id, record_id)
            .await?
            .ok_or_else(|| SyncError::RecordNotFound(record_id.to_string()))?;

        self.store
            .upsert_records(table_name, std::slice::from_ref(&record), &fields)
            .await?;
        info!("Synced record {} into '{}'", record_id, table_name);
        Ok(())
    }

    /// Deletion path: flip the soft-delete flag. No source calls are made and
    /// an unknown id is not an error.
    pub async fn delete_record(&self, table_name: &str, record_id: &str) -> Result<(), SyncError> {
        self.store.mark_deleted(table_name, record_id).await?;
        info!("Marked record {} deleted in '{}'", record_id, table_name);
        Ok(())
    }
}
