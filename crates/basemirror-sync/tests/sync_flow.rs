//! Orchestrator behavior against in-memory fakes.
//!
//! The engine takes its source and store as injected collaborators, so these
//! tests exercise the real per-table state machine — classification,
//! isolation, idempotence, soft deletes — without a database or network.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use basemirror_source::{
    AirtableField, AirtableRecord, AirtableTable, RecordSource, SourceError,
};
use basemirror_store::{generate_table_sql, sanitize_name, StoreError, SyncStore};
use basemirror_sync::{SyncEngine, SyncError};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeSource {
    tables: Vec<AirtableTable>,
    schemas: HashMap<String, Vec<AirtableField>>,
    records: HashMap<String, Vec<AirtableRecord>>,
}

#[async_trait]
impl RecordSource for FakeSource {
    async fn list_tables(&self) -> Result<Vec<AirtableTable>, SourceError> {
        Ok(self.tables.clone())
    }

    async fn table_schema(&self, table_id: &str) -> Result<Vec<AirtableField>, SourceError> {
        self.schemas
            .get(table_id)
            .cloned()
            .ok_or_else(|| SourceError::TableNotFound(table_id.to_string()))
    }

    async fn all_records(&self, table_id: &str) -> Result<Vec<AirtableRecord>, SourceError> {
        Ok(self.records.get(table_id).cloned().unwrap_or_default())
    }

    async fn record(
        &self,
        table_id: &str,
        record_id: &str,
    ) -> Result<Option<AirtableRecord>, SourceError> {
        Ok(self
            .records
            .get(table_id)
            .and_then(|records| records.iter().find(|r| r.id == record_id))
            .cloned())
    }
}

#[derive(Debug, Clone)]
struct FakeRow {
    payload: Value,
    deleted: bool,
}

#[derive(Default)]
struct FakeInner {
    metadata_ready: bool,
    existing_tables: HashSet<String>,
    rows: HashMap<String, BTreeMap<String, FakeRow>>,
    touched: HashMap<String, u32>,
    fail_upserts: HashSet<String>,
}

#[derive(Default)]
struct FakeStore {
    inner: Mutex<FakeInner>,
}

impl FakeStore {
    fn with_tables(tables: &[&str]) -> Self {
        let store = Self::default();
        {
            let mut inner = store.inner.lock().unwrap();
            inner.metadata_ready = true;
            for table in tables {
                inner.existing_tables.insert(sanitize_name(table));
            }
        }
        store
    }

    fn seed_row(&self, table: &str, record_id: &str, payload: Value) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .rows
            .entry(sanitize_name(table))
            .or_default()
            .insert(
                record_id.to_string(),
                FakeRow {
                    payload,
                    deleted: false,
                },
            );
    }

    fn fail_upserts_for(&self, table: &str) {
        self.inner
            .lock()
            .unwrap()
            .fail_upserts
            .insert(sanitize_name(table));
    }

    fn row(&self, table: &str, record_id: &str) -> Option<FakeRow> {
        self.inner
            .lock()
            .unwrap()
            .rows
            .get(&sanitize_name(table))
            .and_then(|rows| rows.get(record_id))
            .cloned()
    }

    fn live_set(&self, table: &str) -> HashSet<String> {
        self.inner
            .lock()
            .unwrap()
            .rows
            .get(&sanitize_name(table))
            .map(|rows| {
                rows.iter()
                    .filter(|(_, row)| !row.deleted)
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn touch_count(&self, table: &str) -> u32 {
        self.inner
            .lock()
            .unwrap()
            .touched
            .get(&sanitize_name(table))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl SyncStore for FakeStore {
    async fn metadata_ready(&self) -> Result<bool, StoreError> {
        Ok(self.inner.lock().unwrap().metadata_ready)
    }

    async fn ensure_schema(
        &self,
        display_name: &str,
        fields: &[AirtableField],
        source_table_id: &str,
    ) -> Result<(), StoreError> {
        let table = sanitize_name(display_name);
        if !self.inner.lock().unwrap().existing_tables.contains(&table) {
            let ddl = generate_table_sql(display_name, source_table_id, fields);
            return Err(StoreError::SchemaMissing { table, ddl });
        }
        Ok(())
    }

    async fn count_live(&self, display_name: &str) -> Result<u64, StoreError> {
        Ok(self.live_set(display_name).len() as u64)
    }

    async fn live_ids(&self, display_name: &str) -> Result<HashSet<String>, StoreError> {
        Ok(self.live_set(display_name))
    }

    async fn upsert_records(
        &self,
        display_name: &str,
        records: &[AirtableRecord],
        _fields: &[AirtableField],
    ) -> Result<(), StoreError> {
        let table = sanitize_name(display_name);
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_upserts.contains(&table) {
            return Err(StoreError::Database(sqlx::Error::Protocol(
                "forced upsert failure".to_string(),
            )));
        }
        let rows = inner.rows.entry(table).or_default();
        for record in records {
            rows.insert(
                record.id.clone(),
                FakeRow {
                    payload: Value::Object(record.fields.clone()),
                    deleted: false,
                },
            );
        }
        Ok(())
    }

    async fn mark_deleted(&self, display_name: &str, record_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(row) = inner
            .rows
            .get_mut(&sanitize_name(display_name))
            .and_then(|rows| rows.get_mut(record_id))
        {
            row.deleted = true;
        }
        Ok(())
    }

    async fn touch_last_synced(&self, display_name: &str) -> Result<(), StoreError> {
        *self
            .inner
            .lock()
            .unwrap()
            .touched
            .entry(sanitize_name(display_name))
            .or_insert(0) += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn table(id: &str, name: &str) -> AirtableTable {
    AirtableTable {
        id: id.to_string(),
        name: name.to_string(),
        description: None,
    }
}

fn field(name: &str, field_type: &str) -> AirtableField {
    serde_json::from_value(json!({
        "id": format!("fld_{name}"),
        "name": name,
        "type": field_type,
    }))
    .unwrap()
}

fn record(id: &str, fields: Value) -> AirtableRecord {
    serde_json::from_value(json!({
        "id": id,
        "fields": fields,
        "createdTime": "2024-01-01T00:00:00.000Z",
    }))
    .unwrap()
}

fn orders_source(records: Vec<AirtableRecord>) -> FakeSource {
    FakeSource {
        tables: vec![table("tblOrders", "Orders")],
        schemas: HashMap::from([(
            "tblOrders".to_string(),
            vec![field("Name", "singleLineText"), field("Amount", "currency")],
        )]),
        records: HashMap::from([("tblOrders".to_string(), records)]),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn classifies_added_vs_updated_against_pre_upsert_live_set() {
    // Destination has live {A, B}; the fetch returns {A, C}.
    let source = orders_source(vec![
        record("recA", json!({"Name": "a2"})),
        record("recC", json!({"Name": "c1"})),
    ]);
    let store = FakeStore::with_tables(&["Orders"]);
    store.seed_row("Orders", "recA", json!({"Name": "a1"}));
    store.seed_row("Orders", "recB", json!({"Name": "b1"}));

    let engine = SyncEngine::new(source, store);
    let summary = engine.run().await.unwrap();

    assert!(summary.success);
    let result = &summary.tables[0];
    assert_eq!(result.records_before, 2);
    assert_eq!(result.records_fetched, 2);
    assert_eq!(result.records_updated, 1); // A
    assert_eq!(result.records_added, 1); // C
    assert_eq!(result.records_synced, 2);
    // B was not in the fetch but stays live: upsert never deletes.
    assert_eq!(result.records_after, 3);
}

#[tokio::test]
async fn post_run_live_set_is_union_of_existing_and_fetched() {
    let source = orders_source(vec![
        record("recA", json!({"Name": "a2"})),
        record("recC", json!({"Name": "c1"})),
    ]);
    let store = FakeStore::with_tables(&["Orders"]);
    store.seed_row("Orders", "recA", json!({"Name": "a1"}));
    store.seed_row("Orders", "recB", json!({"Name": "b1"}));

    let engine = SyncEngine::new(source, store);
    engine.run().await.unwrap();

    let store = engine.store();
    let live = store.live_set("Orders");
    let expected: HashSet<String> = ["recA", "recB", "recC"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(live, expected);
    assert_eq!(store.touch_count("Orders"), 1);
}

#[tokio::test]
async fn one_failed_table_does_not_abort_its_siblings() {
    let source = FakeSource {
        tables: vec![
            table("tbl1", "First"),
            table("tbl2", "Second"),
            table("tbl3", "Third"),
        ],
        schemas: HashMap::from([
            ("tbl1".to_string(), vec![field("Name", "singleLineText")]),
            ("tbl2".to_string(), vec![field("Name", "singleLineText")]),
            ("tbl3".to_string(), vec![field("Name", "singleLineText")]),
        ]),
        records: HashMap::from([
            ("tbl1".to_string(), vec![record("rec1", json!({"Name": "x"}))]),
            ("tbl2".to_string(), vec![record("rec2", json!({"Name": "y"}))]),
            ("tbl3".to_string(), vec![record("rec3", json!({"Name": "z"}))]),
        ]),
    };
    // "Second" was never created in the destination.
    let store = FakeStore::with_tables(&["First", "Third"]);

    let engine = SyncEngine::new(source, store);
    let summary = engine.run().await.unwrap();

    assert_eq!(summary.total_tables, 3);
    assert_eq!(summary.completed_tables, 2);

    assert!(summary.tables[0].error.is_none());
    assert_eq!(summary.tables[0].records_fetched, 1);
    assert!(summary.tables[2].error.is_none());
    assert_eq!(summary.tables[2].records_fetched, 1);

    let failed = &summary.tables[1];
    let error = failed.error.as_deref().unwrap();
    assert!(error.contains("'second'"), "unexpected error: {error}");
    assert_eq!(failed.records_fetched, 0);
}

#[tokio::test]
async fn running_twice_with_identical_input_is_idempotent() {
    let records = vec![
        record("recA", json!({"Name": "a", "Amount": "$10"})),
        record("recB", json!({"Name": "b", "Amount": "$20"})),
    ];
    let source = orders_source(records);
    let store = FakeStore::with_tables(&["Orders"]);

    let engine = SyncEngine::new(source, store);

    let first = engine.run().await.unwrap();
    assert_eq!(first.tables[0].records_added, 2);
    assert_eq!(first.tables[0].records_after, 2);

    let payload_after_first = engine.store().row("Orders", "recA").unwrap().payload;

    let second = engine.run().await.unwrap();
    let result = &second.tables[0];
    // No net change in row count, everything classifies as updated.
    assert_eq!(result.records_before, 2);
    assert_eq!(result.records_after, 2);
    assert_eq!(result.records_added, 0);
    assert_eq!(result.records_updated, 2);

    let payload_after_second = engine.store().row("Orders", "recA").unwrap().payload;
    assert_eq!(payload_after_first, payload_after_second);
}

#[tokio::test]
async fn upsert_failure_keeps_partial_counts_and_continues() {
    let source = FakeSource {
        tables: vec![table("tbl1", "Broken"), table("tbl2", "Healthy")],
        schemas: HashMap::from([
            ("tbl1".to_string(), vec![field("Name", "singleLineText")]),
            ("tbl2".to_string(), vec![field("Name", "singleLineText")]),
        ]),
        records: HashMap::from([
            ("tbl1".to_string(), vec![record("rec1", json!({"Name": "x"}))]),
            ("tbl2".to_string(), vec![record("rec2", json!({"Name": "y"}))]),
        ]),
    };
    let store = FakeStore::with_tables(&["Broken", "Healthy"]);
    store.fail_upserts_for("Broken");

    let engine = SyncEngine::new(source, store);
    let summary = engine.run().await.unwrap();

    let failed = &summary.tables[0];
    assert!(failed.error.as_deref().unwrap().contains("forced upsert failure"));
    // Counts gathered before the failure are kept.
    assert_eq!(failed.records_fetched, 1);
    assert_eq!(failed.records_added, 1);
    assert_eq!(failed.records_synced, 0);

    assert!(summary.tables[1].error.is_none());
    assert_eq!(summary.completed_tables, 1);
}

#[tokio::test]
async fn empty_base_and_missing_metadata_fail_the_run() {
    let store = FakeStore::with_tables(&[]);
    let engine = SyncEngine::new(FakeSource::default(), store);
    assert!(matches!(engine.run().await, Err(SyncError::NoTables)));

    let store = FakeStore::default(); // metadata_ready = false
    let engine = SyncEngine::new(FakeSource::default(), store);
    assert!(matches!(engine.run().await, Err(SyncError::MetadataMissing)));
}

#[tokio::test]
async fn soft_delete_flips_flag_and_repeats_harmlessly() {
    let source = orders_source(vec![record("recA", json!({"Name": "keep me"}))]);
    let store = FakeStore::with_tables(&["Orders"]);

    let engine = SyncEngine::new(source, store);
    engine.run().await.unwrap();

    engine.delete_record("Orders", "recA").await.unwrap();
    let row = engine.store().row("Orders", "recA").unwrap();
    assert!(row.deleted);
    // Payload is untouched by deletion.
    assert_eq!(row.payload, json!({"Name": "keep me"}));
    assert!(engine.store().live_set("Orders").is_empty());

    // Deleting again (or deleting an unknown id) is a no-op, not an error.
    engine.delete_record("Orders", "recA").await.unwrap();
    engine.delete_record("Orders", "recNope").await.unwrap();
}

#[tokio::test]
async fn single_record_sync_upserts_one_row() {
    let source = orders_source(vec![record("recA", json!({"Name": "from webhook"}))]);
    let store = FakeStore::with_tables(&["Orders"]);

    let engine = SyncEngine::new(source, store);
    engine.sync_record("tblOrders", "Orders", "recA").await.unwrap();

    assert_eq!(
        engine.store().row("Orders", "recA").unwrap().payload,
        json!({"Name": "from webhook"})
    );

    let missing = engine.sync_record("tblOrders", "Orders", "recMissing").await;
    assert!(matches!(missing, Err(SyncError::RecordNotFound(_))));
}

#[tokio::test]
async fn single_record_sync_reconciles_schema_first() {
    let source = orders_source(vec![record("recA", json!({"Name": "x"}))]);
    let store = FakeStore::with_tables(&[]); // table never created

    let engine = SyncEngine::new(source, store);
    let result = engine.sync_record("tblOrders", "Orders", "recA").await;
    match result {
        Err(SyncError::Store(StoreError::SchemaMissing { table, ddl })) => {
            assert_eq!(table, "orders");
            assert!(ddl.contains("CREATE TABLE IF NOT EXISTS orders"));
        }
        other => panic!("expected schema-missing, got {other:?}"),
    }
}
