//! Ledger record types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{AnalysisResult, Item, TriageDecision};

/// Persisted lifecycle state
///
/// UNSEEN has no row and therefore no variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Processing,
    Completed,
    Failed,
}

impl ItemState {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemState::Processing => "processing",
            ItemState::Completed => "completed",
            ItemState::Failed => "failed",
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(ItemState::Processing),
            "completed" => Ok(ItemState::Completed),
            "failed" => Ok(ItemState::Failed),
            other => Err(format!("unknown item state: {}", other)),
        }
    }
}

/// One row of `processed_items`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerRecord {
    pub item_id: String,
    /// None for legacy rows written before lifecycle tracking
    pub status: Option<ItemState>,
    pub processed_at: String,
    pub category: Option<String>,
    pub destination_ref: Option<String>,
    pub payload: String,
}

impl LedgerRecord {
    /// Legacy rows count as completed
    pub fn is_handled(&self) -> bool {
        matches!(self.status, None | Some(ItemState::Completed))
    }

    /// Decode the payload; None when empty or malformed
    pub fn decoded_payload(&self) -> Option<RecordPayload> {
        serde_json::from_str(&self.payload).ok()
    }
}

/// JSON payload stored with a committed record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPayload {
    pub item: Item,
    pub triage: TriageDecision,
    pub analysis: Option<AnalysisResult>,
    pub skipped: bool,
}
