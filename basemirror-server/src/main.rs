//! Basemirror Server - REST API for the Airtable → Postgres mirror

mod config;
mod customers;
mod metrics;
mod webhook;

use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use basemirror_source::{AirtableClient, SourceError};
use basemirror_store::{PgStore, RowRecord, StoreError, SyncStore, TableMetadata};
use basemirror_sync::{SyncEngine, SyncError};

use config::ServerConfig;
use customers::{CustomersState, LeaderboardClient};
use metrics::{OutcomeLabel, ServerMetrics};
use webhook::WebhookState;

/// Application state shared across handlers.
struct AppState {
    engine: Arc<SyncEngine<AirtableClient, PgStore>>,
    store: PgStore,
    metrics: ServerMetrics,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Set up logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ServerConfig::from_env()?;

    let source = AirtableClient::from_env().context("Airtable credentials not configured")?;
    let store = PgStore::connect(&config.database_url)
        .await
        .context("Failed to connect to destination database")?;

    let metrics = ServerMetrics::new();
    let engine = Arc::new(SyncEngine::new(source, store.clone()));

    let state = Arc::new(AppState {
        engine: Arc::clone(&engine),
        store,
        metrics: metrics.clone(),
    });

    let webhook_state = Arc::new(WebhookState {
        engine,
        secret: config.webhook_secret.clone(),
        metrics: metrics.clone(),
    });
    if config.webhook_secret.is_none() {
        warn!("WEBHOOK_SECRET not set; webhook requests will be rejected");
    }

    let leaderboard_client = LeaderboardClient::from_config(&config.leaderboard)?;
    if leaderboard_client.is_none() {
        warn!("Leaderboard API not configured; /api/customers will report an error");
    }
    let customers_state = Arc::new(CustomersState {
        client: leaderboard_client,
    });

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/api/sync", post(trigger_sync))
        .route("/api/tables", get(list_tables))
        .route("/api/tables/:table/records", get(table_records))
        .route("/metrics", get(serve_metrics))
        .with_state(state)
        .merge(webhook::webhook_router(webhook_state))
        .merge(customers::customers_router(customers_state))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    info!("Starting basemirror server on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

// === Sync trigger ===

/// POST /api/sync — run a full sync of the base.
///
/// Total failures still answer 200 with `success:false` in the body; non-200
/// is reserved for an unreachable dependency.
async fn trigger_sync(State(state): State<Arc<AppState>>) -> Response {
    info!("Sync triggered");

    match state.engine.run().await {
        Ok(summary) => {
            state
                .metrics
                .sync_runs
                .get_or_create(&OutcomeLabel("success".to_string()))
                .inc();
            state.metrics.records_synced.inc_by(summary.total_records_synced);
            info!(
                "Sync completed: {}/{} tables, {} records synced",
                summary.completed_tables, summary.total_tables, summary.total_records_synced
            );
            (StatusCode::OK, Json(summary)).into_response()
        }
        Err(error) => {
            state
                .metrics
                .sync_runs
                .get_or_create(&OutcomeLabel("failure".to_string()))
                .inc();
            warn!("Sync failed: {}", error);
            let status = match &error {
                SyncError::Source(SourceError::Connectivity(_))
                | SyncError::Store(StoreError::Database(_)) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::OK,
            };
            (
                status,
                Json(json!({"success": false, "error": error.to_string()})),
            )
                .into_response()
        }
    }
}

// === Table browse endpoints ===

#[derive(Serialize)]
struct TableListEntry {
    #[serde(flatten)]
    metadata: TableMetadata,
    record_count: u64,
}

/// GET /api/tables — mirrored tables with their live row counts.
async fn list_tables(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TableListEntry>>, (StatusCode, String)> {
    let metadata = state
        .store
        .list_metadata()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let mut entries = Vec::with_capacity(metadata.len());
    for table in metadata {
        let record_count = match state.store.count_live(&table.table_name).await {
            Ok(count) => count,
            Err(e) => {
                warn!("Error counting records for {}: {}", table.table_name, e);
                0
            }
        };
        entries.push(TableListEntry {
            metadata: table,
            record_count,
        });
    }

    Ok(Json(entries))
}

#[derive(Deserialize)]
struct RecordsParams {
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Serialize)]
struct TableRecordsResponse {
    table_name: String,
    display_name: String,
    total_records: u64,
    records: Vec<RowRecord>,
}

/// GET /api/tables/:table/records — page of live rows, newest update first.
async fn table_records(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
    Query(params): Query<RecordsParams>,
) -> Result<Json<TableRecordsResponse>, (StatusCode, String)> {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    let offset = params.offset.unwrap_or(0).max(0);

    let metadata = state
        .store
        .list_metadata()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let Some(meta) = metadata.into_iter().find(|m| m.table_name == table) else {
        return Err((StatusCode::NOT_FOUND, format!("Table '{table}' not found")));
    };

    let records = state
        .store
        .fetch_rows(&table, limit, offset)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let total_records = state
        .store
        .count_live(&table)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(TableRecordsResponse {
        table_name: meta.table_name,
        display_name: meta.display_name,
        total_records,
        records,
    }))
}

// === Metrics ===

async fn serve_metrics(State(state): State<Arc<AppState>>) -> String {
    state.metrics.encode()
}
