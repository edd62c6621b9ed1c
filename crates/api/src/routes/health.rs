use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the database is reachable.
    pub db_healthy: bool,
    /// Whether the sync binary can be executed.
    pub sync_tool_available: bool,
    /// First line of the sync binary's `--version`, if it responds.
    pub sync_tool_version: Option<String>,
}

/// GET /health -- returns service, database, and sync-tool health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_healthy = synchub_db::health_check(&state.pool).await.is_ok();
    let sync_tool_version = state.runner.version().await;
    let sync_tool_available = sync_tool_version.is_some();

    let status = if db_healthy { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
        sync_tool_available,
        sync_tool_version,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
