//! Model adapter for an OpenAI-compatible chat-completions endpoint
//!
//! One client serves triage, analysis and image description. Triage and analysis
//! request `response_format: json_object` and decode the reply into the model types.

use std::fmt::Write;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{IngestError, IngestResult};
use crate::models::{AnalysisResult, EnrichedContext, Item, TriageDecision};
use crate::types::{AnalysisProvider, ImageDescriber, TriageProvider};

const MAX_ARTICLE_CHARS: usize = 12_000;
const MAX_TRANSCRIPT_CHARS: usize = 20_000;
const MAX_THREAD_CHARS: usize = 8_000;

const TRIAGE_PROMPT: &str = "You triage saved social-media posts. Decide which extra context is worth fetching \
before a full analysis. Reply with a JSON object: {\"articles\": [{\"url\", \"priority\": \"high|medium|low\"}], \
\"transcripts\": [{\"url\"}], \"images\": [{\"url\", \"expected_content\"}], \"expand_thread\": bool, \
\"content_type\": string, \"value_tier\": \"high|medium|low|skip\", \"skip_reason\": string|null}. \
Use value_tier \"skip\" for posts with no lasting value.";

const ANALYSIS_PROMPT: &str = "You analyze saved social-media posts together with any fetched context. \
Reply with a JSON object: {\"category\", \"title\", \"summary_short\", \"summary_long\", \"relevance\", \
\"relevance_score\": 1-10, \"insights\": [string], \"quotes\": [string], \
\"links\": [{\"url\", \"kind\": \"article|video|repo|paper|tool|other\", \"description\"}], \
\"tags\": [string], \"action_items\": [{\"action\", \"priority\": \"high|medium|low\"}]}.";

const IMAGE_PROMPT: &str = "Describe this image for someone who cannot see it. Transcribe any text, code or \
chart values exactly. Be concise.";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct LlmClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    triage_model: String,
    interests: Option<String>,
}

impl LlmClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: &str,
        triage_model: &str,
        interests: Option<String>,
        timeout: Duration,
    ) -> IngestResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| IngestError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            triage_model: triage_model.to_string(),
            interests,
        })
    }

    async fn complete(&self, model: &str, messages: Value, json_mode: bool) -> IngestResult<String> {
        let mut body = json!({
            "model": model,
            "messages": messages,
        });
        if json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::from_peer_status("model", status, &body));
        }

        let parsed: ChatResponse = serde_json::from_str(&response.text().await?)?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| IngestError::Parse("model returned no content".to_string()))
    }

    async fn complete_json<T: DeserializeOwned>(
        &self,
        model: &str,
        system: &str,
        user: String,
    ) -> IngestResult<T> {
        let messages = json!([
            { "role": "system", "content": system },
            { "role": "user", "content": user },
        ]);
        let content = self.complete(model, messages, true).await?;
        debug!(model, chars = content.len(), "Model reply");
        Ok(serde_json::from_str(strip_code_fence(&content))?)
    }
}

/// Some models wrap JSON in a markdown fence even in JSON mode
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn clip(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn render_item(item: &Item) -> String {
    let mut out = String::new();
    let author = match &item.author.name {
        Some(name) => format!("{} (@{})", name, item.author.handle),
        None => format!("@{}", item.author.handle),
    };
    let _ = writeln!(out, "Author: {}", author);
    let _ = writeln!(out, "Posted: {}", item.created_at.to_rfc3339());
    let _ = writeln!(out, "URL: {}", item.permalink());
    if item.is_thread {
        out.push_str("Part of a thread\n");
    }
    let _ = writeln!(out, "\n{}", item.text);
    if !item.links.is_empty() {
        out.push_str("\nLinks:\n");
        for link in &item.links {
            let _ = writeln!(out, "- {}", link);
        }
    }
    if !item.media.is_empty() {
        out.push_str("\nMedia:\n");
        for media in &item.media {
            let _ = writeln!(
                out,
                "- {:?} {}{}",
                media.kind,
                media.url,
                media
                    .alt_text
                    .as_deref()
                    .map(|alt| format!(" (alt: {})", alt))
                    .unwrap_or_default()
            );
        }
    }
    out
}

fn render_context(context: &EnrichedContext) -> String {
    let mut out = String::new();
    for article in &context.articles {
        let _ = writeln!(
            out,
            "\n--- Article {} ---\n{}",
            article.url,
            clip(&article.content, MAX_ARTICLE_CHARS)
        );
    }
    for transcript in &context.transcripts {
        let _ = writeln!(
            out,
            "\n--- Transcript {} ---\n{}",
            transcript.url,
            clip(&transcript.text, MAX_TRANSCRIPT_CHARS)
        );
    }
    for image in &context.image_descriptions {
        let _ = writeln!(out, "\n--- Image {} ---\n{}", image.url, image.description);
    }
    if let Some(thread) = &context.thread_text {
        let _ = writeln!(out, "\n--- Thread ---\n{}", clip(thread, MAX_THREAD_CHARS));
    }
    out
}

#[async_trait]
impl TriageProvider for LlmClient {
    async fn triage(&self, item: &Item) -> IngestResult<TriageDecision> {
        self.complete_json(&self.triage_model, TRIAGE_PROMPT, render_item(item))
            .await
    }
}

#[async_trait]
impl AnalysisProvider for LlmClient {
    async fn analyze(
        &self,
        item: &Item,
        triage: &TriageDecision,
        context: &EnrichedContext,
    ) -> IngestResult<AnalysisResult> {
        let mut user = render_item(item);
        let _ = writeln!(user, "\nContent type: {}", triage.content_type);
        if let Some(interests) = &self.interests {
            let _ = writeln!(user, "Reader interests: {}", interests);
        }
        user.push_str(&render_context(context));

        self.complete_json(&self.model, ANALYSIS_PROMPT, user).await
    }
}

#[async_trait]
impl ImageDescriber for LlmClient {
    async fn describe(&self, url: &str, expected_content: Option<&str>) -> IngestResult<String> {
        let prompt = match expected_content {
            Some(hint) => format!("{} Expected content: {}.", IMAGE_PROMPT, hint),
            None => IMAGE_PROMPT.to_string(),
        };
        let messages = json!([{
            "role": "user",
            "content": [
                { "type": "text", "text": prompt },
                { "type": "image_url", "image_url": { "url": url } },
            ],
        }]);
        self.complete(&self.model, messages, false).await
    }
}
