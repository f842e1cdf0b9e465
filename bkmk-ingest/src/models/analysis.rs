//! Structured analysis of a single item

use serde::{Deserialize, Deserializer, Serialize};

use super::enrichment::EnrichedContext;

pub const MIN_RELEVANCE_SCORE: u8 = 1;
pub const MAX_RELEVANCE_SCORE: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Article,
    Video,
    Repo,
    Paper,
    Tool,
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedLink {
    pub url: String,
    #[serde(default)]
    pub kind: LinkKind,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub action: String,
    #[serde(default)]
    pub priority: super::triage::Priority,
}

/// Final structured analysis, mirrored to the destination store
///
/// Model output is loosely typed; every field has a default so a partially
/// filled response still yields a usable result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary_short: String,
    #[serde(default)]
    pub summary_long: String,
    /// Why this matters to the reader
    #[serde(default)]
    pub relevance: String,
    #[serde(default = "default_score", deserialize_with = "deserialize_score")]
    pub relevance_score: u8,
    /// Ranked, most important first
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub quotes: Vec<String>,
    #[serde(default)]
    pub links: Vec<ExtractedLink>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub action_items: Vec<ActionItem>,
    #[serde(default)]
    pub has_article: bool,
    #[serde(default)]
    pub has_video: bool,
    #[serde(default)]
    pub has_thread: bool,
}

fn default_category() -> String {
    "other".to_string()
}

fn default_score() -> u8 {
    MIN_RELEVANCE_SCORE
}

/// Accept integers, floats or numeric strings; clamp into 1..=10
fn deserialize_score<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let raw = match &value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(clamp_score(raw.unwrap_or(f64::from(MIN_RELEVANCE_SCORE))))
}

pub fn clamp_score(raw: f64) -> u8 {
    if raw.is_nan() {
        return MIN_RELEVANCE_SCORE;
    }
    raw.round()
        .clamp(f64::from(MIN_RELEVANCE_SCORE), f64::from(MAX_RELEVANCE_SCORE)) as u8
}

impl AnalysisResult {
    /// Tidy model output: lowercase trimmed tags without duplicates, non-empty category
    pub fn normalize(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.tags = self
            .tags
            .iter()
            .map(|t| t.trim().trim_start_matches('#').to_lowercase())
            .filter(|t| !t.is_empty() && seen.insert(t.clone()))
            .collect();

        self.category = self.category.trim().to_lowercase();
        if self.category.is_empty() {
            self.category = default_category();
        }
        self.relevance_score = self
            .relevance_score
            .clamp(MIN_RELEVANCE_SCORE, MAX_RELEVANCE_SCORE);
    }

    /// Raise flags for content the router actually fetched
    ///
    /// Only ever sets flags; a failed fetch leaves the model's own claim in place.
    pub fn apply_enrichment_evidence(&mut self, context: &EnrichedContext) {
        self.has_article |= !context.articles.is_empty();
        self.has_video |= !context.transcripts.is_empty();
        self.has_thread |= context.thread_text.is_some();
    }
}
