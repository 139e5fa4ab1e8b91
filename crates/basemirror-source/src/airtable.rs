//! HTTP client for the Airtable REST API.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::SourceError;
use crate::types::{AirtableField, AirtableRecord, AirtableTable};
use crate::RecordSource;

const DEFAULT_API_BASE: &str = "https://api.airtable.com/v0";

/// Records are fetched in pages of this size; a shorter page (or a missing
/// cursor) signals exhaustion.
pub const PAGE_SIZE: usize = 100;

/// Client for one Airtable base.
///
/// Holds a single stateless `reqwest::Client`; create once at process start
/// and share for all calls.
#[derive(Debug, Clone)]
pub struct AirtableClient {
    http: reqwest::Client,
    api_base: String,
    base_id: String,
    token: String,
}

impl AirtableClient {
    pub fn new(token: impl Into<String>, base_id: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            base_id: base_id.into(),
            token: token.into(),
        }
    }

    /// Create a client from `AIRTABLE_PAT` and `AIRTABLE_BASE_ID`.
    /// `AIRTABLE_API_BASE` overrides the endpoint (useful against a stub).
    pub fn from_env() -> Result<Self, SourceError> {
        let token = std::env::var("AIRTABLE_PAT")
            .map_err(|_| SourceError::Config("AIRTABLE_PAT is not set".to_string()))?;
        let base_id = std::env::var("AIRTABLE_BASE_ID")
            .map_err(|_| SourceError::Config("AIRTABLE_BASE_ID is not set".to_string()))?;
        let mut client = Self::new(token, base_id);
        if let Ok(base) = std::env::var("AIRTABLE_API_BASE") {
            client = client.with_api_base(base);
        }
        Ok(client)
    }

    /// Override the API base URL (trailing slash stripped).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Fetch the base metadata listing (tables with their field schemas).
    async fn base_schema(&self) -> Result<Vec<TableSchema>, SourceError> {
        let url = format!("{}/meta/bases/{}/tables", self.api_base, self.base_id);
        let response = self.http.get(&url).bearer_auth(&self.token).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Connectivity(format!(
                "Airtable API error: {} - {}",
                status, body
            )));
        }

        let schema: BaseSchemaResponse = response.json().await?;
        Ok(schema.tables)
    }
}

#[async_trait]
impl RecordSource for AirtableClient {
    async fn list_tables(&self) -> Result<Vec<AirtableTable>, SourceError> {
        let tables = self
            .base_schema()
            .await?
            .into_iter()
            .map(|t| AirtableTable {
                id: t.id,
                name: t.name,
                description: t.description,
            })
            .collect::<Vec<_>>();
        debug!("Listed {} tables from base {}", tables.len(), self.base_id);
        Ok(tables)
    }

    async fn table_schema(&self, table_id: &str) -> Result<Vec<AirtableField>, SourceError> {
        let tables = self.base_schema().await?;
        tables
            .into_iter()
            .find(|t| t.id == table_id)
            .map(|t| t.fields)
            .ok_or_else(|| SourceError::TableNotFound(table_id.to_string()))
    }

    async fn all_records(&self, table_id: &str) -> Result<Vec<AirtableRecord>, SourceError> {
        let url = format!("{}/{}/{}", self.api_base, self.base_id, table_id);
        let page_size = PAGE_SIZE.to_string();

        let mut records: Vec<AirtableRecord> = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(&url)
                .bearer_auth(&self.token)
                .query(&[("pageSize", page_size.as_str())]);
            if let Some(cursor) = &offset {
                request = request.query(&[("offset", cursor.as_str())]);
            }

            let response = request.send().await?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(SourceError::Connectivity(format!(
                    "Airtable API error: {} - {}",
                    status, body
                )));
            }

            let page: RecordPage = response.json().await?;
            let page_len = page.records.len();
            records.extend(page.records);

            // A full page with a server-issued cursor means more to fetch.
            match page.offset {
                Some(cursor) if page_len == PAGE_SIZE => offset = Some(cursor),
                _ => break,
            }
        }

        debug!("Fetched {} records from table {}", records.len(), table_id);
        Ok(records)
    }

    async fn record(
        &self,
        table_id: &str,
        record_id: &str,
    ) -> Result<Option<AirtableRecord>, SourceError> {
        let url = format!(
            "{}/{}/{}/{}",
            self.api_base, self.base_id, table_id, record_id
        );
        let response = self.http.get(&url).bearer_auth(&self.token).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Connectivity(format!(
                "Airtable API error: {} - {}",
                status, body
            )));
        }

        let record: AirtableRecord = response.json().await?;
        Ok(Some(record))
    }
}

// ---------------------------------------------------------------------------
// Wire DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct BaseSchemaResponse {
    tables: Vec<TableSchema>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    fields: Vec<AirtableField>,
}

#[derive(Debug, Deserialize)]
struct RecordPage {
    records: Vec<AirtableRecord>,
    #[serde(default)]
    offset: Option<String>,
}
