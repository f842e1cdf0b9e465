//! Ledger aggregates for the digest and the `/stats` endpoint

use std::collections::{BTreeMap, HashMap};

use bkmk_common::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;

use super::{format_timestamp, Ledger};
use crate::models::{AnalysisResult, Item};

/// Minimum relevance score for a weekly highlight
pub const HIGHLIGHT_MIN_SCORE: u8 = 8;
pub const HIGHLIGHT_LIMIT: usize = 10;
pub const TOP_TAG_LIMIT: usize = 10;
/// Length of the digest window
pub const DIGEST_WINDOW_DAYS: i64 = 7;

const UNCATEGORIZED: &str = "uncategorized";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerStats {
    pub total: u64,
    pub by_category: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Highlight {
    pub item_id: String,
    pub title: String,
    pub summary_short: String,
    pub category: String,
    pub relevance_score: u8,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyStats {
    pub since: DateTime<Utc>,
    pub total: u64,
    pub by_category: BTreeMap<String, u64>,
    pub top_tags: Vec<TagCount>,
    pub highlights: Vec<Highlight>,
}

/// Lenient view of a stored payload; each part decodes independently
#[derive(Deserialize)]
struct PayloadView {
    #[serde(default)]
    item: Option<serde_json::Value>,
    #[serde(default)]
    analysis: Option<serde_json::Value>,
}

impl Ledger {
    /// All-time totals over every row
    pub async fn stats(&self) -> Result<LedgerStats> {
        let rows = sqlx::query(
            "SELECT category, COUNT(*) AS n FROM processed_items GROUP BY category",
        )
        .fetch_all(self.pool())
        .await?;

        let mut by_category = BTreeMap::new();
        let mut total = 0u64;
        for row in rows {
            let category: Option<String> = row.get("category");
            let n: i64 = row.get("n");
            total += n as u64;
            *by_category
                .entry(category.unwrap_or_else(|| UNCATEGORIZED.to_string()))
                .or_insert(0) += n as u64;
        }

        Ok(LedgerStats { total, by_category })
    }

    /// Aggregates over handled rows with `processed_at >= since`
    ///
    /// Rows whose payload is missing or malformed still count toward totals and
    /// categories; they just contribute no tags or highlights.
    pub async fn weekly_stats(&self, since: DateTime<Utc>) -> Result<WeeklyStats> {
        let rows = sqlx::query(
            r#"
            SELECT item_id, category, payload
            FROM processed_items
            WHERE processed_at >= ?
              AND (status IS NULL OR status = 'completed')
            ORDER BY processed_at ASC, item_id ASC
            "#,
        )
        .bind(format_timestamp(since))
        .fetch_all(self.pool())
        .await?;

        let mut total = 0u64;
        let mut by_category: BTreeMap<String, u64> = BTreeMap::new();
        let mut tag_counts: HashMap<String, u64> = HashMap::new();
        let mut highlights = Vec::new();

        for row in rows {
            let item_id: String = row.get("item_id");
            let category: Option<String> = row.get("category");
            let payload: Option<String> = row.get("payload");

            total += 1;
            let category = category.unwrap_or_else(|| UNCATEGORIZED.to_string());
            *by_category.entry(category.clone()).or_insert(0) += 1;

            let Some(view) = payload
                .as_deref()
                .and_then(|p| serde_json::from_str::<PayloadView>(p).ok())
            else {
                continue;
            };
            let Some(analysis) = view
                .analysis
                .and_then(|a| serde_json::from_value::<AnalysisResult>(a).ok())
            else {
                continue;
            };

            for tag in &analysis.tags {
                *tag_counts.entry(tag.clone()).or_insert(0) += 1;
            }

            if analysis.relevance_score >= HIGHLIGHT_MIN_SCORE && highlights.len() < HIGHLIGHT_LIMIT
            {
                let url = view
                    .item
                    .and_then(|i| serde_json::from_value::<Item>(i).ok())
                    .map(|i| i.permalink());
                highlights.push(Highlight {
                    item_id,
                    title: analysis.title,
                    summary_short: analysis.summary_short,
                    category,
                    relevance_score: analysis.relevance_score,
                    url,
                });
            }
        }

        Ok(WeeklyStats {
            since,
            total,
            by_category,
            top_tags: top_tags(tag_counts, TOP_TAG_LIMIT),
            highlights,
        })
    }
}

/// Most frequent first; ties alphabetical
fn top_tags(counts: HashMap<String, u64>, limit: usize) -> Vec<TagCount> {
    let mut tags: Vec<TagCount> = counts
        .into_iter()
        .map(|(tag, count)| TagCount { tag, count })
        .collect();
    tags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
    tags.truncate(limit);
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_tags_ordering() {
        let counts = HashMap::from([
            ("rust".to_string(), 3),
            ("ai".to_string(), 3),
            ("tokio".to_string(), 1),
            ("sqlite".to_string(), 2),
        ]);
        let tags = top_tags(counts, 3);
        let names: Vec<&str> = tags.iter().map(|t| t.tag.as_str()).collect();
        assert_eq!(names, vec!["ai", "rust", "sqlite"]);
    }
}
