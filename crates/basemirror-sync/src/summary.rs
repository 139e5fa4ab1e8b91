//! Run summary types returned by the sync trigger.
//!
//! Serialized field names are camelCase to match the dashboard's wire format.

use serde::Serialize;

/// Outcome of syncing one table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSyncResult {
    pub table_name: String,
    pub records_fetched: u64,
    pub records_synced: u64,
    pub records_before: u64,
    pub records_after: u64,
    pub records_added: u64,
    pub records_updated: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TableSyncResult {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            records_fetched: 0,
            records_synced: 0,
            records_before: 0,
            records_after: 0,
            records_added: 0,
            records_updated: 0,
            error: None,
        }
    }

    pub fn ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregated outcome of a full sync run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub success: bool,
    pub total_tables: u64,
    pub completed_tables: u64,
    pub total_records_fetched: u64,
    pub total_records_synced: u64,
    pub total_records_added: u64,
    pub total_records_updated: u64,
    pub tables: Vec<TableSyncResult>,
}

impl SyncSummary {
    pub fn from_results(results: Vec<TableSyncResult>) -> Self {
        Self {
            success: true,
            total_tables: results.len() as u64,
            completed_tables: results.iter().filter(|r| r.ok()).count() as u64,
            total_records_fetched: results.iter().map(|r| r.records_fetched).sum(),
            total_records_synced: results.iter().map(|r| r.records_synced).sum(),
            total_records_added: results.iter().map(|r| r.records_added).sum(),
            total_records_updated: results.iter().map(|r| r.records_updated).sum(),
            tables: results,
        }
    }
}
