//! bkmk-ingest library interface
//!
//! Exposes the pipeline for the binary and for integration testing.

pub mod api;
pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod types;
pub mod utils;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult, ErrorKind, IngestError, IngestResult};

use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Utc};
use tower_http::trace::TraceLayer;

use crate::db::Ledger;
use crate::services::Scheduler;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub ledger: Ledger,
    pub scheduler: Arc<Scheduler>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(ledger: Ledger, scheduler: Arc<Scheduler>) -> Self {
        Self {
            ledger,
            scheduler,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::stats_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
