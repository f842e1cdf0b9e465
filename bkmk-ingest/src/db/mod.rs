//! Ledger persistence
//!
//! `processed_items` is the only table the pipeline owns. Timestamps are stored as
//! fixed-width RFC 3339 strings (millisecond precision, `Z` suffix) so string
//! comparison orders them chronologically.

pub mod ledger;
pub mod stats;

use chrono::{DateTime, SecondsFormat, Utc};

pub use ledger::Ledger;
pub use stats::{
    Highlight, LedgerStats, TagCount, WeeklyStats, DIGEST_WINDOW_DAYS, HIGHLIGHT_LIMIT,
    HIGHLIGHT_MIN_SCORE,
};

/// Canonical ledger timestamp format
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
