//! HTTP API handlers for bkmk-ingest

pub mod health;
pub mod stats;

pub use health::health_routes;
pub use stats::stats_routes;
