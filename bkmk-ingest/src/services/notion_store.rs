//! Notion database as the destination store
//!
//! Expected database properties: `Name` (title), `Item ID` (rich text),
//! `Category` (select), `Score` (number), `Tags` (multi-select), `URL` (url).
//! Requests are limited to 3 per second, Notion's published average.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{IngestError, IngestResult};
use crate::models::{AnalysisResult, Item};
use crate::types::DestinationStore;

const NOTION_API: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";
/// Notion rejects rich-text objects longer than this
const MAX_TEXT_CHARS: usize = 2000;

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<PageRef>,
}

#[derive(Debug, Deserialize)]
struct PageRef {
    id: String,
}

pub struct NotionStore {
    client: Client,
    api_base: String,
    token: String,
    database_id: String,
    rate_limiter: DefaultDirectRateLimiter,
}

impl NotionStore {
    pub fn new(token: &str, database_id: &str, timeout: Duration) -> IngestResult<Self> {
        Self::with_api_base(NOTION_API, token, database_id, timeout)
    }

    pub fn with_api_base(
        api_base: &str,
        token: &str,
        database_id: &str,
        timeout: Duration,
    ) -> IngestResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| IngestError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let per_second = NonZeroU32::new(3).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            database_id: database_id.to_string(),
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    async fn post(&self, path: &str, body: &Value) -> IngestResult<String> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .post(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| IngestError::DestinationWrite(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| IngestError::DestinationWrite(e.to_string()))?;
        if !status.is_success() {
            // Notion's 401 concerns the mirror, not the bookmark source
            return Err(IngestError::DestinationWrite(format!(
                "notion returned {}: {}",
                status,
                clip(&text, 200)
            )));
        }
        Ok(text)
    }
}

fn clip(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn rich_text(content: &str) -> Value {
    json!([{ "type": "text", "text": { "content": clip(content, MAX_TEXT_CHARS) } }])
}

fn paragraph(content: &str) -> Value {
    json!({
        "object": "block",
        "type": "paragraph",
        "paragraph": { "rich_text": rich_text(content) },
    })
}

fn bullet(content: &str) -> Value {
    json!({
        "object": "block",
        "type": "bulleted_list_item",
        "bulleted_list_item": { "rich_text": rich_text(content) },
    })
}

fn heading(content: &str) -> Value {
    json!({
        "object": "block",
        "type": "heading_3",
        "heading_3": { "rich_text": rich_text(content) },
    })
}

/// Request body for creating the page of one item
fn page_body(database_id: &str, item: &Item, analysis: &AnalysisResult) -> Value {
    let title = if analysis.title.trim().is_empty() {
        clip(&item.text, 100).to_string()
    } else {
        analysis.title.clone()
    };
    // Notion select options may not contain commas
    let tags: Vec<Value> = analysis
        .tags
        .iter()
        .map(|t| json!({ "name": t.replace(',', " ") }))
        .collect();

    let mut children = Vec::new();
    if !analysis.summary_long.is_empty() {
        children.push(paragraph(&analysis.summary_long));
    }
    if !analysis.relevance.is_empty() {
        children.push(heading("Why it matters"));
        children.push(paragraph(&analysis.relevance));
    }
    if !analysis.insights.is_empty() {
        children.push(heading("Insights"));
        children.extend(analysis.insights.iter().map(|i| bullet(i)));
    }
    if !analysis.quotes.is_empty() {
        children.push(heading("Quotes"));
        children.extend(analysis.quotes.iter().map(|q| bullet(q)));
    }
    if !analysis.links.is_empty() {
        children.push(heading("Links"));
        children.extend(analysis.links.iter().map(|l| {
            bullet(&format!("{} {}", l.url, l.description).trim().to_string())
        }));
    }
    if !analysis.action_items.is_empty() {
        children.push(heading("Actions"));
        children.extend(analysis.action_items.iter().map(|a| bullet(&a.action)));
    }

    json!({
        "parent": { "database_id": database_id },
        "properties": {
            "Name": { "title": rich_text(&title) },
            "Item ID": { "rich_text": rich_text(&item.id) },
            "Category": { "select": { "name": analysis.category.replace(',', " ") } },
            "Score": { "number": analysis.relevance_score },
            "Tags": { "multi_select": tags },
            "URL": { "url": item.permalink() },
        },
        "children": children,
    })
}

#[async_trait]
impl DestinationStore for NotionStore {
    async fn find_by_item_id(&self, item_id: &str) -> IngestResult<Option<String>> {
        let body = json!({
            "filter": { "property": "Item ID", "rich_text": { "equals": item_id } },
            "page_size": 1,
        });
        let text = self
            .post(&format!("/databases/{}/query", self.database_id), &body)
            .await?;
        let parsed: QueryResponse = serde_json::from_str(&text)
            .map_err(|e| IngestError::DestinationWrite(format!("notion query response: {}", e)))?;
        Ok(parsed.results.into_iter().next().map(|p| p.id))
    }

    async fn create(&self, item: &Item, analysis: &AnalysisResult) -> IngestResult<String> {
        let body = page_body(&self.database_id, item, analysis);
        let text = self.post("/pages", &body).await?;
        let page: PageRef = serde_json::from_str(&text)
            .map_err(|e| IngestError::DestinationWrite(format!("notion create response: {}", e)))?;
        debug!(item_id = %item.id, page_id = %page.id, "Notion page created");
        Ok(page.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_body_properties() {
        let item: Item = serde_json::from_value(json!({
            "id": "99",
            "text": "A long post about async Rust",
            "author": {"handle": "ferris"},
            "created_at": "2026-02-01T10:00:00Z"
        }))
        .unwrap();
        let analysis: AnalysisResult = serde_json::from_value(json!({
            "category": "rust",
            "title": "",
            "relevance_score": 9,
            "tags": ["async", "a,b"],
            "insights": ["cancel safety matters"]
        }))
        .unwrap();

        let body = page_body("db1", &item, &analysis);
        assert_eq!(body["parent"]["database_id"], "db1");
        assert_eq!(
            body["properties"]["Name"]["title"][0]["text"]["content"],
            "A long post about async Rust"
        );
        assert_eq!(body["properties"]["Score"]["number"], 9);
        assert_eq!(body["properties"]["Tags"]["multi_select"][1]["name"], "a b");
        assert_eq!(body["properties"]["URL"]["url"], "https://x.com/ferris/status/99");
        assert_eq!(body["children"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_rich_text_is_clipped() {
        let long = "x".repeat(MAX_TEXT_CHARS + 50);
        let value = rich_text(&long);
        assert_eq!(
            value[0]["text"]["content"].as_str().unwrap().len(),
            MAX_TEXT_CHARS
        );
    }
}
