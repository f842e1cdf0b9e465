//! Notifier gateway
//!
//! Outbound alerts pass through a single `Notifier`: messages longer than the
//! channel cap are split on line boundaries, and consecutive sends are spaced by a
//! shared `governor` limiter. Delivery is best-effort; a failed send is logged and
//! never propagated to the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tracing::{info, warn};

use crate::error::{IngestError, IngestResult};
use crate::types::MessageTransport;

pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 4000;

/// Rate-limited, chunking front for a `MessageTransport`
#[derive(Clone)]
pub struct Notifier {
    transport: Arc<dyn MessageTransport>,
    /// None when spacing is disabled
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
    max_message_len: usize,
}

impl Notifier {
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        min_interval: Duration,
        max_message_len: usize,
    ) -> Self {
        let limiter = Quota::with_period(min_interval).map(|quota| Arc::new(RateLimiter::direct(quota)));

        Self {
            transport,
            limiter,
            max_message_len: max_message_len.max(1),
        }
    }

    /// Notifier that only logs, with default spacing and cap
    pub fn log_only() -> Self {
        Self::new(
            Arc::new(LogTransport),
            DEFAULT_MIN_INTERVAL,
            DEFAULT_MAX_MESSAGE_LEN,
        )
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Send `text`, chunked; returns the number of chunks delivered
    pub async fn send(&self, text: &str) -> usize {
        let chunks = split_message(text, self.max_message_len);
        let total = chunks.len();
        let mut delivered = 0;

        for (index, chunk) in chunks.iter().enumerate() {
            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
            }

            match self.transport.send(chunk).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    transport = self.transport.name(),
                    chunk = index + 1,
                    total,
                    error = %e,
                    "Notification send failed"
                ),
            }
        }

        delivered
    }

    pub async fn notify_item_error(&self, item_id: &str, error: &IngestError) {
        let kind = error.kind();
        let text = format!(
            "⚠️ Item {} failed\nkind: {}\nretryable: {}\n{}",
            item_id,
            kind,
            kind.is_retryable(),
            error
        );
        self.send(&text).await;
    }

    pub async fn notify_credentials_expired(&self, detail: &str) {
        let text = format!(
            "🔑 Source credentials are no longer valid. Processing is paused until they are refreshed.\n{}",
            detail
        );
        self.send(&text).await;
    }

    pub async fn notify_credentials_restored(&self, identity: Option<&str>) {
        let text = match identity {
            Some(identity) => format!("✅ Source credentials restored ({}). Processing resumes.", identity),
            None => "✅ Source credentials restored. Processing resumes.".to_string(),
        };
        self.send(&text).await;
    }

    pub async fn notify_pass_failed(&self, error: &IngestError) {
        let text = format!("❌ Batch pass aborted ({})\n{}", error.kind(), error);
        self.send(&text).await;
    }
}

/// Split on line boundaries into chunks of at most `max_len` characters
///
/// A single line longer than `max_len` is hard-split on character boundaries.
/// Whitespace-only input yields no chunks.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let mut chunks = Vec::new();
    let mut current: Option<(String, usize)> = None;

    for line in text.split('\n') {
        let line_len = line.chars().count();

        if line_len > max_len {
            if let Some((chunk, _)) = current.take() {
                chunks.push(chunk);
            }
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max_len) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        current = match current.take() {
            Some((mut chunk, len)) if len + 1 + line_len <= max_len => {
                chunk.push('\n');
                chunk.push_str(line);
                Some((chunk, len + 1 + line_len))
            }
            Some((chunk, _)) => {
                chunks.push(chunk);
                Some((line.to_string(), line_len))
            }
            None => Some((line.to_string(), line_len)),
        };
    }

    if let Some((chunk, _)) = current {
        chunks.push(chunk);
    }

    chunks.retain(|c| !c.trim().is_empty());
    chunks
}

/// Transport used when no alert channel is configured
pub struct LogTransport;

#[async_trait]
impl MessageTransport for LogTransport {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, text: &str) -> IngestResult<()> {
        info!(target: "bkmk::notify", "{}", text);
        Ok(())
    }
}
