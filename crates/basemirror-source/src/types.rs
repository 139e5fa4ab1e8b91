//! Airtable API data shapes.

use serde::Deserialize;
use serde_json::{Map, Value};

/// A table as listed by the base metadata endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct AirtableTable {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A field declaration from a table's schema.
///
/// `options` is type-specific and opaque to the sync engine; it is carried
/// through untouched.
#[derive(Debug, Clone, Deserialize)]
pub struct AirtableField {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub options: Option<Value>,
}

/// One record of a table. `fields` is heterogeneous: scalars, arrays, or
/// nested objects depending on the field type.
#[derive(Debug, Clone, Deserialize)]
pub struct AirtableRecord {
    pub id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(rename = "createdTime")]
    pub created_time: String,
}
