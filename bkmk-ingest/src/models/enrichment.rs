//! Context gathered by the enrichment router

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleContent {
    pub url: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptContent {
    pub url: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDescription {
    pub url: String,
    pub description: String,
}

/// Best-effort results for one item; failed fetches are simply absent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichedContext {
    pub articles: Vec<ArticleContent>,
    pub transcripts: Vec<TranscriptContent>,
    pub image_descriptions: Vec<ImageDescription>,
    pub thread_text: Option<String>,
}

impl EnrichedContext {
    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
            && self.transcripts.is_empty()
            && self.image_descriptions.is_empty()
            && self.thread_text.is_none()
    }
}
