//! DDL generation for destination tables.
//!
//! The reconciler never executes DDL; it hands the statements to an operator.
//! Structural changes to the destination are human-gated, data changes are
//! automatic.

use basemirror_source::AirtableField;

use crate::mapping::column_type;
use crate::names::{column_name, sanitize_name};

/// DDL for the `_table_metadata` registry, one row per mirrored table.
pub fn metadata_table_sql() -> String {
    "\
-- Create metadata table
CREATE TABLE IF NOT EXISTS _table_metadata (
  table_name text PRIMARY KEY,
  display_name text NOT NULL,
  airtable_table_id text,
  last_synced_at timestamptz,
  created_at timestamptz DEFAULT now()
);

-- Create index on metadata
CREATE INDEX IF NOT EXISTS idx_table_metadata_display_name ON _table_metadata(display_name);"
        .to_string()
}

/// Generate the full DDL for one mirrored table: reserved columns, one column
/// per source field, indexes on the conflict key and the soft-delete flag,
/// and the metadata registration upsert.
pub fn generate_table_sql(
    display_name: &str,
    source_table_id: &str,
    fields: &[AirtableField],
) -> String {
    let table = sanitize_name(display_name);

    let mut columns: Vec<String> = vec![
        "id uuid PRIMARY KEY DEFAULT gen_random_uuid()".to_string(),
        "airtable_id text UNIQUE NOT NULL".to_string(),
        "raw_json jsonb NOT NULL".to_string(),
        "created_at timestamptz DEFAULT now()".to_string(),
        "updated_at timestamptz DEFAULT now()".to_string(),
        "deleted boolean DEFAULT false".to_string(),
    ];

    for field in fields {
        let name = column_name(&field.name);
        let pg_type = column_type(&field.field_type).pg_name();
        columns.push(format!("{} {}", name, pg_type));
    }

    format!(
        "\
-- Create table: {display_name}
CREATE TABLE IF NOT EXISTS {table} (
  {columns}
);

-- Create indexes
CREATE INDEX IF NOT EXISTS idx_{table}_airtable_id ON {table}(airtable_id);
CREATE INDEX IF NOT EXISTS idx_{table}_deleted ON {table}(deleted);

-- Insert/update metadata
INSERT INTO _table_metadata (table_name, display_name, airtable_table_id, last_synced_at)
VALUES ('{table}', '{escaped_display}', '{source_table_id}', now())
ON CONFLICT (table_name)
DO UPDATE SET
  display_name = EXCLUDED.display_name,
  airtable_table_id = EXCLUDED.airtable_table_id,
  last_synced_at = EXCLUDED.last_synced_at;",
        columns = columns.join(",\n  "),
        escaped_display = display_name.replace('\'', "''"),
    )
}
