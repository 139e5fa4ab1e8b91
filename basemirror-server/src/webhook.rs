//! Webhook ingest for Airtable change notifications.
//!
//! Expected payload:
//! `{"event": "create"|"update"|"delete", "tableId": "...", "tableName": "...",
//!   "recordId": "...", "secret": "..."}`
//!
//! Every validation failure — bad secret, missing fields, unknown event —
//! rejects the request before any Airtable or Postgres call is made.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use basemirror_source::RecordSource;
use basemirror_store::{StoreError, SyncStore};
use basemirror_sync::{SyncEngine, SyncError};

use crate::metrics::{EventLabel, ServerMetrics};

pub struct WebhookState<S, D> {
    pub engine: Arc<SyncEngine<S, D>>,
    pub secret: Option<String>,
    pub metrics: ServerMetrics,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub table_id: Option<String>,
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub record_id: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
}

/// Build the webhook router. Generic over the engine's collaborators so tests
/// can count calls on fakes.
pub fn webhook_router<S, D>(state: Arc<WebhookState<S, D>>) -> Router
where
    S: RecordSource + 'static,
    D: SyncStore + 'static,
{
    Router::new()
        .route(
            "/api/webhook",
            post(handle_webhook::<S, D>).get(webhook_health),
        )
        .with_state(state)
}

/// GET /api/webhook — liveness probe for the automation side.
async fn webhook_health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok", "message": "Webhook endpoint is active"}))
}

/// POST /api/webhook — apply one external change notification.
async fn handle_webhook<S, D>(
    State(state): State<Arc<WebhookState<S, D>>>,
    Json(payload): Json<WebhookPayload>,
) -> Response
where
    S: RecordSource + 'static,
    D: SyncStore + 'static,
{
    let Some(configured_secret) = state.secret.as_deref() else {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Webhook secret not configured",
        );
    };
    if payload.secret.as_deref() != Some(configured_secret) {
        return error_response(StatusCode::UNAUTHORIZED, "Invalid webhook secret");
    }

    let (Some(event), Some(table_id), Some(table_name)) =
        (&payload.event, &payload.table_id, &payload.table_name)
    else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Missing required fields: event, tableId, tableName",
        );
    };

    let is_delete = match event.as_str() {
        "create" | "update" => false,
        "delete" => true,
        other => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("Unknown event type: {other}"),
            );
        }
    };

    let Some(record_id) = payload.record_id.as_deref() else {
        return error_response(
            StatusCode::BAD_REQUEST,
            &format!("recordId required for {event} events"),
        );
    };

    info!("Webhook received: {} for table {} ({})", event, table_name, table_id);
    state
        .metrics
        .webhook_events
        .get_or_create(&EventLabel(event.clone()))
        .inc();

    if !is_delete {
        match state.engine.sync_record(table_id, table_name, record_id).await {
            Ok(()) => (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "message": format!("Record {event}d successfully"),
                    "recordId": record_id,
                })),
            )
                .into_response(),
            Err(SyncError::RecordNotFound(_)) => {
                error_response(StatusCode::NOT_FOUND, "Record not found in Airtable")
            }
            Err(SyncError::Store(StoreError::SchemaMissing { table, .. })) => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Table '{table}' does not exist. Please create it first."),
            ),
            Err(error) => {
                error_response(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string())
            }
        }
    } else {
        match state.engine.delete_record(table_name, record_id).await {
            Ok(()) => (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "message": "Record marked as deleted",
                    "recordId": record_id,
                })),
            )
                .into_response(),
            Err(error) => {
                error_response(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string())
            }
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"error": message}))).into_response()
}
