//! Utility modules for bkmk-ingest

pub mod db_retry;
pub mod timeout;

pub use db_retry::retry_on_lock;
pub use timeout::with_timeout;
