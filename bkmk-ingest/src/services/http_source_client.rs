//! Bookmark source over a bearer-token JSON bridge
//!
//! Endpoints:
//! - `GET {base}/bookmarks?limit=N` → `{"items": [Item, ...]}`
//! - `GET {base}/threads/{id}` → `{"items": [Item, ...]}`
//! - `GET {base}/me` → `{"handle": "..."}`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{IngestError, IngestResult};
use crate::models::Item;
use crate::types::{CredentialStatus, SourceClient};

#[derive(Debug, Deserialize)]
struct ItemsResponse {
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    #[serde(default)]
    handle: Option<String>,
}

pub struct HttpSourceClient {
    client: Client,
    base_url: String,
    bearer_token: String,
}

impl HttpSourceClient {
    pub fn new(base_url: &str, bearer_token: &str, timeout: Duration) -> IngestResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| IngestError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer_token: bearer_token.to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> IngestResult<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "Source request");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::from_status("source", status, &body));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Decode items one by one; malformed entries are dropped
fn decode_items(raw: Vec<serde_json::Value>) -> Vec<Item> {
    raw.into_iter()
        .filter_map(|value| match serde_json::from_value::<Item>(value) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(error = %e, "Dropping malformed source item");
                None
            }
        })
        .collect()
}

#[async_trait]
impl SourceClient for HttpSourceClient {
    async fn fetch_batch(&self, limit: usize) -> IngestResult<Vec<Item>> {
        let response: ItemsResponse = self.get_json(&format!("/bookmarks?limit={}", limit)).await?;
        let mut items = decode_items(response.items);
        items.truncate(limit);
        Ok(items)
    }

    async fn fetch_thread(&self, item_id: &str) -> IngestResult<Vec<Item>> {
        let response: ItemsResponse = self.get_json(&format!("/threads/{}", item_id)).await?;
        Ok(decode_items(response.items))
    }

    async fn check_credentials(&self) -> IngestResult<CredentialStatus> {
        match self.get_json::<MeResponse>("/me").await {
            Ok(me) => Ok(CredentialStatus {
                valid: true,
                identity: me.handle,
            }),
            Err(IngestError::CredentialsExpired(_)) => Ok(CredentialStatus {
                valid: false,
                identity: None,
            }),
            Err(e) => Err(e),
        }
    }
}
