//! Ledger statistics endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::db::stats::DIGEST_WINDOW_DAYS;
use crate::db::{LedgerStats, WeeklyStats};
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub all_time: LedgerStats,
    pub weekly: WeeklyStats,
}

/// GET /stats
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    let all_time = state.ledger.stats().await?;
    let weekly = state
        .ledger
        .weekly_stats(Utc::now() - chrono::Duration::days(DIGEST_WINDOW_DAYS))
        .await?;

    Ok(Json(StatsResponse { all_time, weekly }))
}

pub fn stats_routes() -> Router<AppState> {
    Router::new().route("/stats", get(get_stats))
}
