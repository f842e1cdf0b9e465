//! Weekly digest

use std::fmt::Write;

use bkmk_common::events::{EventBus, PipelineEvent};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::db::stats::DIGEST_WINDOW_DAYS;
use crate::db::{Ledger, WeeklyStats};
use crate::error::IngestResult;
use crate::services::notifier::Notifier;

/// Render weekly aggregates as a plain-text message
pub fn format_digest(stats: &WeeklyStats) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "📚 Weekly digest (since {})",
        stats.since.format("%Y-%m-%d")
    );
    let _ = writeln!(out, "Items processed: {}", stats.total);

    if stats.total == 0 {
        out.push_str("Nothing new this week.");
        return out;
    }

    if !stats.by_category.is_empty() {
        out.push_str("\nBy category:\n");
        let mut categories: Vec<(&String, &u64)> = stats.by_category.iter().collect();
        categories.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (category, count) in categories {
            let _ = writeln!(out, "• {}: {}", category, count);
        }
    }

    if !stats.top_tags.is_empty() {
        let tags: Vec<String> = stats
            .top_tags
            .iter()
            .map(|t| format!("#{} ({})", t.tag, t.count))
            .collect();
        let _ = writeln!(out, "\nTop tags: {}", tags.join(", "));
    }

    if !stats.highlights.is_empty() {
        out.push_str("\nHighlights:\n");
        for highlight in &stats.highlights {
            let title = if highlight.title.is_empty() {
                highlight.item_id.as_str()
            } else {
                highlight.title.as_str()
            };
            let _ = writeln!(out, "⭐ {}/10 {}", highlight.relevance_score, title);
            if !highlight.summary_short.is_empty() {
                let _ = writeln!(out, "   {}", highlight.summary_short);
            }
            if let Some(url) = &highlight.url {
                let _ = writeln!(out, "   {}", url);
            }
        }
    }

    out.trim_end().to_string()
}

/// Compute the trailing seven-day window ending at `now` and send it
pub async fn send_weekly_digest(
    ledger: &Ledger,
    notifier: &Notifier,
    events: &EventBus,
    now: DateTime<Utc>,
) -> IngestResult<WeeklyStats> {
    let since = now - chrono::Duration::days(DIGEST_WINDOW_DAYS);
    let stats = ledger.weekly_stats(since).await?;

    let messages = notifier.send(&format_digest(&stats)).await;
    info!(
        items = stats.total,
        highlights = stats.highlights.len(),
        messages,
        "Weekly digest sent"
    );

    events.emit_lossy(PipelineEvent::DigestSent {
        items_in_window: stats.total,
        messages,
        timestamp: Utc::now(),
    });

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Highlight, TagCount};
    use std::collections::BTreeMap;

    #[test]
    fn test_empty_week() {
        let stats = WeeklyStats {
            since: Utc::now(),
            total: 0,
            by_category: BTreeMap::new(),
            top_tags: vec![],
            highlights: vec![],
        };
        let text = format_digest(&stats);
        assert!(text.contains("Items processed: 0"));
        assert!(text.contains("Nothing new"));
    }

    #[test]
    fn test_digest_sections() {
        let stats = WeeklyStats {
            since: Utc::now(),
            total: 3,
            by_category: BTreeMap::from([("ai".to_string(), 1), ("rust".to_string(), 2)]),
            top_tags: vec![TagCount {
                tag: "tokio".to_string(),
                count: 2,
            }],
            highlights: vec![Highlight {
                item_id: "42".to_string(),
                title: "Async cancellation".to_string(),
                summary_short: "How tokio drops futures".to_string(),
                category: "rust".to_string(),
                relevance_score: 9,
                url: Some("https://x.com/ferris/status/42".to_string()),
            }],
        };

        let text = format_digest(&stats);
        let rust_pos = text.find("• rust: 2").unwrap();
        let ai_pos = text.find("• ai: 1").unwrap();
        assert!(rust_pos < ai_pos);
        assert!(text.contains("#tokio (2)"));
        assert!(text.contains("⭐ 9/10 Async cancellation"));
        assert!(text.contains("https://x.com/ferris/status/42"));
    }
}
