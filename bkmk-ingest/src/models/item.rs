//! Source items (bookmarked posts)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, IngestResult};

/// Post author
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    /// Handle without the leading `@`
    pub handle: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    AnimatedGif,
}

/// Embedded media reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub url: String,
    #[serde(default)]
    pub alt_text: Option<String>,
}

/// One unit of work; immutable once fetched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Stable identifier, unique within the source
    pub id: String,
    #[serde(default)]
    pub text: String,
    pub author: Author,
    pub created_at: DateTime<Utc>,
    /// Expanded link URLs embedded in the text
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub media: Vec<MediaRef>,
    /// Part of a conversation the author continued
    #[serde(default)]
    pub is_thread: bool,
}

impl Item {
    /// Reject data that cannot be processed meaningfully
    pub fn validate(&self) -> IngestResult<()> {
        if self.id.trim().is_empty() {
            return Err(IngestError::Parse("item has an empty identifier".to_string()));
        }
        if self.text.trim().is_empty() && self.media.is_empty() {
            return Err(IngestError::Parse(format!(
                "item {} has neither text nor media",
                self.id
            )));
        }
        Ok(())
    }

    /// Public permalink of the post
    pub fn permalink(&self) -> String {
        format!("https://x.com/{}/status/{}", self.author.handle, self.id)
    }
}
