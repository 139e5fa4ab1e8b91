//! Airtable field type → Postgres column type mapping and value coercion.
//!
//! Everything here is pure. Coercion is total: a malformed value degrades to
//! a typed default (numeric → 0, date → NULL) instead of failing the sync of
//! the whole table.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

/// Destination column types for mirrored fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Numeric,
    Integer,
    Boolean,
    TimestampTz,
    TextArray,
}

impl ColumnType {
    /// Postgres type name used in generated DDL.
    pub fn pg_name(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Numeric => "numeric",
            ColumnType::Integer => "integer",
            ColumnType::Boolean => "boolean",
            ColumnType::TimestampTz => "timestamp with time zone",
            ColumnType::TextArray => "text[]",
        }
    }
}

/// Map an Airtable field type tag to a destination column type.
///
/// Unrecognized tags fall back to `text` — the safe default for display and
/// resync, not an error.
pub fn column_type(field_type: &str) -> ColumnType {
    match field_type {
        "singleLineText" | "multilineText" | "email" | "url" | "phoneNumber" => ColumnType::Text,
        "number" | "percent" | "currency" | "duration" => ColumnType::Numeric,
        "singleSelect" => ColumnType::Text,
        "multipleSelects" | "multipleRecordLinks" | "multipleCollaborators" | "attachment" => {
            ColumnType::TextArray
        }
        "date" | "dateTime" | "createdTime" | "lastModifiedTime" => ColumnType::TimestampTz,
        "checkbox" => ColumnType::Boolean,
        "singleCollaborator" | "formula" | "rollup" | "lookup" | "button" => ColumnType::Text,
        "count" | "rating" => ColumnType::Integer,
        _ => ColumnType::Text,
    }
}

/// A coerced cell value, tagged with its destination representation.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Text(String),
    Number(f64),
    Integer(i64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    TextArray(Vec<String>),
}

/// Coerce a raw Airtable value to its destination representation, keyed by
/// the field's declared type. A field absent from the record (`None`) yields
/// `Null`.
pub fn coerce_value(raw: Option<&Value>, field_type: &str) -> CellValue {
    let value = match raw {
        None | Some(Value::Null) => return CellValue::Null,
        Some(v) => v,
    };

    match field_type {
        "attachment" => CellValue::TextArray(attachment_urls(value)),
        "multipleRecordLinks" | "multipleSelects" | "multipleCollaborators" => {
            CellValue::TextArray(string_items(value))
        }
        "date" | "dateTime" | "createdTime" | "lastModifiedTime" => match parse_instant(value) {
            Some(instant) => CellValue::Timestamp(instant),
            None => CellValue::Null,
        },
        "checkbox" => CellValue::Bool(truthy(value)),
        "number" | "percent" | "currency" | "duration" => {
            CellValue::Number(sanitize_numeric(value))
        }
        "count" | "rating" => CellValue::Integer(sanitize_numeric(value) as i64),
        _ => match value {
            Value::String(s) => CellValue::Text(s.clone()),
            other => CellValue::Text(other.to_string()),
        },
    }
}

/// Extract attachment URLs. Entries with neither a direct `url` nor a large
/// thumbnail URL are omitted.
fn attachment_urls(value: &Value) -> Vec<String> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|att| {
            att.get("url")
                .and_then(Value::as_str)
                .or_else(|| {
                    att.get("thumbnails")
                        .and_then(|t| t.get("large"))
                        .and_then(|l| l.get("url"))
                        .and_then(Value::as_str)
                })
                .map(str::to_string)
        })
        .collect()
}

/// Pass a multi-valued field through as strings; non-array input becomes an
/// empty list.
fn string_items(value: &Value) -> Vec<String> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .map(|item| match item {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect()
}

/// Parse an instant from an RFC 3339 string, a bare `YYYY-MM-DD` date, or an
/// epoch-milliseconds number.
fn parse_instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|ndt| Utc.from_utc_datetime(&ndt))
            }),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

/// JavaScript-style truthiness.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Coerce any value to a finite number. Strings are stripped of currency
/// symbols, separators, and other decoration before parsing; anything that
/// still fails to parse degrades to 0.0. Never NaN, never infinite.
pub fn sanitize_numeric(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            cleaned.parse::<f64>().ok()
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    parsed.filter(|f| f.is_finite()).unwrap_or(0.0)
}
