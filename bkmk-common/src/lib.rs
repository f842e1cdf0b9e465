//! # bkmk Common Library
//!
//! Shared code for the bkmk services including:
//! - Error type and result alias
//! - Bootstrap configuration (TOML) and root folder resolution
//! - SQLite initialization and declarative schema sync
//! - Pipeline event types and EventBus

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
