//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use crate::services::scheduler::LastPass;
use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", "degraded" (credentials invalid) or "error" (ledger unreadable)
    pub status: String,
    pub module: String,
    pub version: String,
    pub build: String,
    pub uptime_seconds: u64,
    pub credentials_valid: bool,
    pub pass_in_progress: bool,
    /// Handled items in the ledger; None when the ledger could not be read
    pub ledger_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_pass: Option<LastPass>,
    /// Last error message if any (for diagnostics)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let scheduler = state.scheduler.status().await;
    let ledger_count = match state.ledger.handled_count().await {
        Ok(count) => Some(count),
        Err(e) => {
            warn!(error = %e, "Health check could not read the ledger");
            None
        }
    };

    let status = if ledger_count.is_none() {
        "error"
    } else if !scheduler.credentials_valid {
        "degraded"
    } else {
        "ok"
    };

    Json(HealthResponse {
        status: status.to_string(),
        module: "bkmk-ingest".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build: env!("GIT_HASH").to_string(),
        uptime_seconds,
        credentials_valid: scheduler.credentials_valid,
        pass_in_progress: scheduler.pass_in_progress,
        ledger_count,
        last_pass: scheduler.last_pass,
        last_error: scheduler.last_error,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
