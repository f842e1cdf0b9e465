//! Article text through a reader proxy (`GET {base}/{url}` returns readable text)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::{IngestError, IngestResult};
use crate::types::ArticleFetcher;

pub struct ReaderArticleFetcher {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl ReaderArticleFetcher {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> IngestResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| IngestError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn reader_url(&self, url: &str) -> String {
        format!("{}/{}", self.base_url, url)
    }
}

#[async_trait]
impl ArticleFetcher for ReaderArticleFetcher {
    async fn fetch_article(&self, url: &str) -> IngestResult<String> {
        debug!(url, "Fetching article");

        let mut request = self
            .client
            .get(self.reader_url(url))
            .header(reqwest::header::ACCEPT, "text/plain");
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::from_peer_status("reader", status, &body));
        }

        Ok(response.text().await?)
    }
}
