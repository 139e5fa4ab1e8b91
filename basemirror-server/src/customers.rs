//! Proxy for the leaderboard customer listing.
//!
//! Authenticates against the leaderboard API with form-encoded credentials,
//! then forwards the list request with the bearer token it got back. The
//! remote success/failure shape passes through; only transport errors are
//! normalized to a 500.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error};
use url::Url;

use crate::config::LeaderboardConfig;

pub struct CustomersState {
    pub client: Option<LeaderboardClient>,
}

/// Client for the leaderboard API.
#[derive(Debug)]
pub struct LeaderboardClient {
    http: reqwest::Client,
    base_url: String,
    email: String,
    password: String,
}

impl LeaderboardClient {
    pub fn new(
        base_url: &str,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> anyhow::Result<Self> {
        // Parsed only to validate; requests are built by concatenation since
        // the base path (`/api/v1`) must be preserved.
        Url::parse(base_url)?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            email: email.into(),
            password: password.into(),
        })
    }

    /// Build a client when the configuration is complete.
    pub fn from_config(config: &LeaderboardConfig) -> anyhow::Result<Option<Self>> {
        match (&config.base_url, &config.email, &config.password) {
            (Some(base_url), Some(email), Some(password)) => {
                Ok(Some(Self::new(base_url, email, password)?))
            }
            _ => Ok(None),
        }
    }

    /// Authenticate and extract the bearer token; `None` on any failure.
    async fn auth_token(&self) -> Option<String> {
        let url = format!("{}/auth/authenticate", self.base_url);
        let response = self
            .http
            .post(&url)
            .form(&[("email", self.email.as_str()), ("password", self.password.as_str())])
            .send()
            .await
            .map_err(|e| error!("Error authenticating with leaderboard API: {}", e))
            .ok()?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Leaderboard authentication failed: {} - {}", status, body);
            return None;
        }

        let AuthResponse { success, data } = response
            .json()
            .await
            .map_err(|e| error!("Malformed leaderboard auth response: {}", e))
            .ok()?;

        let token = data.and_then(|d| d.user).and_then(|u| u.auth_token);
        if !success || token.is_none() {
            error!("No auth token in leaderboard response");
            return None;
        }
        token
    }
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<AuthData>,
}

#[derive(Debug, Deserialize)]
struct AuthData {
    #[serde(default)]
    user: Option<AuthUser>,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    #[serde(default)]
    auth_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CustomerQuery {
    items: Option<String>,
    page: Option<String>,
    approved: Option<String>,
    role: Option<String>,
}

impl CustomerQuery {
    /// Apply the dashboard's defaults: first page of six approved customers.
    fn resolved(&self) -> Vec<(&'static str, String)> {
        vec![
            ("items", self.items.clone().unwrap_or_else(|| "6".to_string())),
            ("page", self.page.clone().unwrap_or_else(|| "1".to_string())),
            (
                "approved",
                self.approved.clone().unwrap_or_else(|| "true".to_string()),
            ),
            (
                "role",
                self.role.clone().unwrap_or_else(|| "Customer".to_string()),
            ),
        ]
    }
}

pub fn customers_router(state: Arc<CustomersState>) -> Router {
    Router::new()
        .route("/api/customers", get(list_customers))
        .with_state(state)
}

/// GET /api/customers — authenticate, then pass the listing through.
async fn list_customers(
    State(state): State<Arc<CustomersState>>,
    Query(params): Query<CustomerQuery>,
) -> Response {
    let Some(client) = &state.client else {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Leaderboard API not configured",
        );
    };

    let Some(token) = client.auth_token().await else {
        return error_response(
            StatusCode::UNAUTHORIZED,
            "Failed to authenticate with leaderboard API",
        );
    };

    let query = params.resolved();
    let url = format!("{}/customers", client.base_url);
    debug!("Fetching customers from {}", url);
    let response = match client
        .http
        .get(&url)
        .bearer_auth(&token)
        .query(&query)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            error!("Error fetching customers: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }
    };

    let remote_status = response.status();
    if !remote_status.is_success() {
        let details = response.text().await.unwrap_or_default();
        let status = StatusCode::from_u16(remote_status.as_u16())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        return (
            status,
            Json(json!({
                "error": format!("Failed to fetch customers: {}", remote_status),
                "details": details,
            })),
        )
            .into_response();
    }

    let data: Value = match response.json().await {
        Ok(data) => data,
        Err(e) => {
            error!("Malformed customers response: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }
    };

    if data.get("success").and_then(Value::as_bool) == Some(false) {
        let message = data
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Failed to fetch customers");
        return error_response(StatusCode::BAD_REQUEST, message);
    }

    (StatusCode::OK, Json(data)).into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"error": message}))).into_response()
}
