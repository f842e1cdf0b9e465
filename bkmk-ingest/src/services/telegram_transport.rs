//! Telegram Bot API transport (`sendMessage`)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::error::{IngestError, IngestResult};
use crate::types::MessageTransport;

const TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramTransport {
    client: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramTransport {
    pub fn new(bot_token: &str, chat_id: &str, timeout: Duration) -> IngestResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IngestError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: TELEGRAM_API.to_string(),
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
        })
    }
}

#[async_trait]
impl MessageTransport for TelegramTransport {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, text: &str) -> IngestResult<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let response = self
            .client
            .post(url)
            .json(&json!({
                "chat_id": self.chat_id,
                "text": text,
                "disable_web_page_preview": true,
            }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(IngestError::from_peer_status("telegram", status, &body));
        }

        match serde_json::from_str::<TelegramResponse>(&body) {
            Ok(parsed) if parsed.ok => Ok(()),
            Ok(parsed) => Err(IngestError::Unknown(format!(
                "telegram rejected message: {}",
                parsed.description.unwrap_or_default()
            ))),
            Err(e) => Err(IngestError::Parse(format!("telegram response: {}", e))),
        }
    }
}
