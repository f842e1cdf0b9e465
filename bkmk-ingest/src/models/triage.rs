//! Triage decision: what extra context to fetch before analysis

use serde::{Deserialize, Serialize};

/// Estimated value of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueTier {
    High,
    Medium,
    Low,
    Skip,
}

/// Ordering priority; `High` sorts first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRequest {
    pub url: String,
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptRequest {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRequest {
    pub url: String,
    /// Hint such as "chart", "code screenshot", "slide"
    #[serde(default)]
    pub expected_content: Option<String>,
}

/// Produced once per item per pass; folded into the ledger payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageDecision {
    #[serde(default)]
    pub articles: Vec<ArticleRequest>,
    #[serde(default)]
    pub transcripts: Vec<TranscriptRequest>,
    #[serde(default)]
    pub images: Vec<ImageRequest>,
    #[serde(default)]
    pub expand_thread: bool,
    /// Coarse classification (e.g. "tutorial", "announcement", "opinion")
    #[serde(default = "default_content_type")]
    pub content_type: String,
    pub value_tier: ValueTier,
    #[serde(default)]
    pub skip_reason: Option<String>,
}

fn default_content_type() -> String {
    "other".to_string()
}

impl TriageDecision {
    pub fn is_skip(&self) -> bool {
        self.value_tier == ValueTier::Skip
    }

    /// Decision that fetches nothing extra
    pub fn analyze_only(value_tier: ValueTier) -> Self {
        Self {
            articles: Vec::new(),
            transcripts: Vec::new(),
            images: Vec::new(),
            expand_thread: false,
            content_type: default_content_type(),
            value_tier,
            skip_reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_decision_parses() {
        let decision: TriageDecision =
            serde_json::from_str(r#"{"value_tier":"skip","skip_reason":"meme"}"#).unwrap();
        assert!(decision.is_skip());
        assert_eq!(decision.content_type, "other");
        assert!(decision.articles.is_empty());
    }

    #[test]
    fn test_priority_order() {
        let mut priorities = vec![Priority::Low, Priority::High, Priority::Medium];
        priorities.sort();
        assert_eq!(priorities, vec![Priority::High, Priority::Medium, Priority::Low]);
    }

    #[test]
    fn test_article_priority_defaults_to_medium() {
        let request: ArticleRequest =
            serde_json::from_str(r#"{"url":"https://blog.example/post"}"#).unwrap();
        assert_eq!(request.priority, Priority::Medium);
    }
}
