//! Typed errors for the source connector crate.

use std::fmt;

/// Errors that can occur when talking to the Airtable API.
#[derive(Debug)]
pub enum SourceError {
    /// Credentials or other required configuration are absent.
    Config(String),
    /// The remote call failed (transport error or non-success status).
    Connectivity(String),
    /// The requested table does not exist in the base.
    TableNotFound(String),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Config(msg) => write!(f, "config error: {}", msg),
            SourceError::Connectivity(msg) => write!(f, "connectivity error: {}", msg),
            SourceError::TableNotFound(msg) => write!(f, "table not found: {}", msg),
        }
    }
}

impl std::error::Error for SourceError {}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        SourceError::Connectivity(e.to_string())
    }
}
