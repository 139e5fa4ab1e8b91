//! Destination identifier derivation.
//!
//! Table and column names are derived from Airtable display names by a fixed,
//! pure substitution. The same input must always produce the same identifier,
//! otherwise upserts fork into duplicate columns across runs.

/// Columns owned by the mirror itself; source fields may not shadow them.
pub const RESERVED_COLUMNS: [&str; 6] = [
    "id",
    "airtable_id",
    "raw_json",
    "created_at",
    "updated_at",
    "deleted",
];

/// Prefix applied to a sanitized field name that collides with a reserved
/// column.
pub const RESERVED_FIELD_PREFIX: &str = "airtable_field_";

/// Sanitize a table or field name into a safe SQL identifier: every
/// character outside `[A-Za-z0-9_]` becomes `_`, then ASCII-lowercased.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Derive the destination column name for a source field, resolving reserved
/// collisions by prefixing.
pub fn column_name(field_name: &str) -> String {
    let sanitized = sanitize_name(field_name);
    if RESERVED_COLUMNS.contains(&sanitized.as_str()) {
        format!("{}{}", RESERVED_FIELD_PREFIX, sanitized)
    } else {
        sanitized
    }
}
