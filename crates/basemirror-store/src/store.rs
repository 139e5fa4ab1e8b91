//! Postgres-backed destination store.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::query_builder::Separated;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tracing::{debug, info};
use uuid::Uuid;

use basemirror_source::{AirtableField, AirtableRecord};

use crate::ddl::generate_table_sql;
use crate::error::StoreError;
use crate::mapping::{coerce_value, column_type, CellValue, ColumnType};
use crate::names::{column_name, sanitize_name};
use crate::SyncStore;

/// Rows per upsert statement, bounding statement size.
pub const UPSERT_BATCH_SIZE: usize = 100;

/// Destination store over a single long-lived Postgres pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

/// One `_table_metadata` row.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TableMetadata {
    pub table_name: String,
    pub display_name: String,
    pub airtable_table_id: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A mirrored row as served to browse endpoints. Field columns are omitted;
/// `raw_json` carries the full original field map.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RowRecord {
    pub id: Uuid,
    pub airtable_id: String,
    pub raw_json: Value,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PgStore {
    /// Connect a new pool. Called once at process start; the pool is reused
    /// for every call afterwards.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        info!("Connected to destination database");
        Ok(Self { pool })
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Catalog lookup for table existence. An explicit
    /// `information_schema` check rather than a probe query, so unrelated
    /// query errors are not mistaken for absence.
    async fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_name = $1)",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// List all mirrored-table metadata rows, ordered by display name.
    pub async fn list_metadata(&self) -> Result<Vec<TableMetadata>, StoreError> {
        let rows = sqlx::query_as(
            "SELECT table_name, display_name, airtable_table_id, last_synced_at, created_at \
             FROM _table_metadata ORDER BY display_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Fetch a page of live rows from a mirrored table, newest update first.
    ///
    /// `table` is the already-sanitized destination name (the metadata
    /// primary key); it is validated before interpolation.
    pub async fn fetch_rows(
        &self,
        table: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<RowRecord>, StoreError> {
        validate_table_name(table)?;
        let query = format!(
            "SELECT id, airtable_id, raw_json, created_at, updated_at \
             FROM \"{}\" WHERE deleted = false \
             ORDER BY updated_at DESC LIMIT $1 OFFSET $2",
            table
        );
        let rows = sqlx::query_as(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl SyncStore for PgStore {
    async fn metadata_ready(&self) -> Result<bool, StoreError> {
        self.table_exists("_table_metadata").await
    }

    async fn ensure_schema(
        &self,
        display_name: &str,
        fields: &[AirtableField],
        source_table_id: &str,
    ) -> Result<(), StoreError> {
        let table = sanitize_name(display_name);

        if !self.table_exists(&table).await? {
            let ddl = generate_table_sql(display_name, source_table_id, fields);
            return Err(StoreError::SchemaMissing { table, ddl });
        }

        sqlx::query(
            "INSERT INTO _table_metadata (table_name, display_name, airtable_table_id, last_synced_at) \
             VALUES ($1, $2, $3, now()) \
             ON CONFLICT (table_name) DO UPDATE SET \
               display_name = EXCLUDED.display_name, \
               airtable_table_id = EXCLUDED.airtable_table_id, \
               last_synced_at = EXCLUDED.last_synced_at",
        )
        .bind(&table)
        .bind(display_name)
        .bind(source_table_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count_live(&self, display_name: &str) -> Result<u64, StoreError> {
        let table = sanitize_name(display_name);
        let query = format!(
            "SELECT COUNT(*) AS cnt FROM \"{}\" WHERE deleted = false",
            table
        );
        let row: (i64,) = sqlx::query_as(&query).fetch_one(&self.pool).await?;
        Ok(row.0 as u64)
    }

    async fn live_ids(&self, display_name: &str) -> Result<HashSet<String>, StoreError> {
        let table = sanitize_name(display_name);
        let query = format!(
            "SELECT airtable_id FROM \"{}\" WHERE deleted = false",
            table
        );
        let rows: Vec<(String,)> = sqlx::query_as(&query).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn upsert_records(
        &self,
        display_name: &str,
        records: &[AirtableRecord],
        fields: &[AirtableField],
    ) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let table = sanitize_name(display_name);
        let columns = column_metas(fields);

        for chunk in records.chunks(UPSERT_BATCH_SIZE) {
            let rows: Vec<UpsertRow> = chunk
                .iter()
                .map(|record| build_row(record, &columns, Utc::now()))
                .collect();

            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO \"{}\" (airtable_id, raw_json, updated_at, deleted",
                table
            ));
            for column in &columns {
                builder.push(format!(", \"{}\"", column.name));
            }
            builder.push(") ");

            builder.push_values(rows, |mut b, row| {
                b.push_bind(row.airtable_id);
                b.push_bind(row.raw_json);
                b.push_bind(row.updated_at);
                b.push_bind(false);
                for (cell, column) in row.cells.into_iter().zip(&columns) {
                    push_bind_cell(&mut b, cell, column.column_type);
                }
            });

            builder.push(
                " ON CONFLICT (airtable_id) DO UPDATE SET \
                 raw_json = EXCLUDED.raw_json, \
                 updated_at = EXCLUDED.updated_at, \
                 deleted = EXCLUDED.deleted",
            );
            for column in &columns {
                builder.push(format!(", \"{0}\" = EXCLUDED.\"{0}\"", column.name));
            }

            builder.build().execute(&self.pool).await?;
            debug!("Upserted batch of {} rows into {}", chunk.len(), table);
        }

        Ok(())
    }

    async fn mark_deleted(&self, display_name: &str, record_id: &str) -> Result<(), StoreError> {
        let table = sanitize_name(display_name);
        let query = format!(
            "UPDATE \"{}\" SET deleted = true, updated_at = now() WHERE airtable_id = $1",
            table
        );
        // Zero rows affected is fine: marking an unknown id deleted is a no-op.
        sqlx::query(&query)
            .bind(record_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn touch_last_synced(&self, display_name: &str) -> Result<(), StoreError> {
        let table = sanitize_name(display_name);
        sqlx::query("UPDATE _table_metadata SET last_synced_at = now() WHERE table_name = $1")
            .bind(&table)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row building (pure)
// ---------------------------------------------------------------------------

/// Destination column derived from one source field.
struct ColumnMeta {
    name: String,
    column_type: ColumnType,
    field_name: String,
    field_type: String,
}

fn column_metas(fields: &[AirtableField]) -> Vec<ColumnMeta> {
    fields
        .iter()
        .map(|field| ColumnMeta {
            name: column_name(&field.name),
            column_type: column_type(&field.field_type),
            field_name: field.name.clone(),
            field_type: field.field_type.clone(),
        })
        .collect()
}

struct UpsertRow {
    airtable_id: String,
    raw_json: Value,
    updated_at: DateTime<Utc>,
    cells: Vec<CellValue>,
}

fn build_row(record: &AirtableRecord, columns: &[ColumnMeta], now: DateTime<Utc>) -> UpsertRow {
    let cells = columns
        .iter()
        .map(|col| coerce_value(record.fields.get(&col.field_name), &col.field_type))
        .collect();
    UpsertRow {
        airtable_id: record.id.clone(),
        raw_json: Value::Object(record.fields.clone()),
        updated_at: now,
        cells,
    }
}

/// Bind one coerced cell. NULLs are bound with the column's concrete type so
/// the parameter type matches the destination column.
fn push_bind_cell(
    b: &mut Separated<'_, '_, Postgres, &'static str>,
    cell: CellValue,
    column_type: ColumnType,
) {
    match cell {
        CellValue::Text(s) => {
            b.push_bind(s);
        }
        CellValue::Number(f) => {
            b.push_bind(f);
        }
        CellValue::Integer(i) => {
            b.push_bind(i);
        }
        CellValue::Bool(v) => {
            b.push_bind(v);
        }
        CellValue::Timestamp(t) => {
            b.push_bind(t);
        }
        CellValue::TextArray(items) => {
            b.push_bind(items);
        }
        CellValue::Null => match column_type {
            ColumnType::Text => {
                b.push_bind(Option::<String>::None);
            }
            ColumnType::Numeric => {
                b.push_bind(Option::<f64>::None);
            }
            ColumnType::Integer => {
                b.push_bind(Option::<i64>::None);
            }
            ColumnType::Boolean => {
                b.push_bind(Option::<bool>::None);
            }
            ColumnType::TimestampTz => {
                b.push_bind(Option::<DateTime<Utc>>::None);
            }
            ColumnType::TextArray => {
                b.push_bind(Option::<Vec<String>>::None);
            }
        },
    }
}

/// Reject table names that would be unsafe to interpolate. Sanitized names
/// always pass; this guards the browse path where the name arrives from a
/// request.
fn validate_table_name(table: &str) -> Result<(), StoreError> {
    if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StoreError::InvalidName(table.to_string()));
    }
    Ok(())
}
