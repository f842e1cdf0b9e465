//! Enrichment router
//!
//! Fans a triage decision out to the enrichment providers. The four groups
//! (articles, transcripts, images, thread) run concurrently, and requests within a
//! group run concurrently too. Every fetch is best-effort: a failure is logged and
//! the result is simply missing from the `EnrichedContext`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use reqwest::Url;
use tracing::{debug, warn};

use crate::models::{
    ArticleContent, ArticleRequest, EnrichedContext, ImageDescription, ImageRequest, Item,
    TranscriptContent, TranscriptRequest, TriageDecision,
};
use crate::types::{ArticleFetcher, ImageDescriber, SourceClient, TranscriptFetcher};
use crate::utils::with_timeout;

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_ARTICLE_LIMIT: usize = 3;

/// Hosts whose pages a reader proxy cannot turn into article text
const UNSCRAPABLE_HOSTS: &[&str] = &[
    "twitter.com",
    "x.com",
    "t.co",
    "twimg.com",
    "youtube.com",
    "youtu.be",
    "instagram.com",
    "tiktok.com",
    "facebook.com",
    "linkedin.com",
    "vimeo.com",
    "twitch.tv",
    "spotify.com",
];

const BINARY_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "svg", "mp4", "mov", "webm", "mp3", "wav", "zip",
    "gz", "tar", "dmg", "exe",
];

/// True for http(s) URLs worth sending to the article fetcher
pub fn is_scrapable_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }
    let Some(host) = parsed.host_str() else {
        return false;
    };

    let host = host.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let blocked = UNSCRAPABLE_HOSTS
        .iter()
        .any(|h| host == *h || host.ends_with(&format!(".{}", h)));
    if blocked {
        return false;
    }

    let path = parsed.path().to_ascii_lowercase();
    match path.rsplit_once('.') {
        Some((_, ext)) if !ext.contains('/') => !BINARY_EXTENSIONS.contains(&ext),
        _ => true,
    }
}

/// Article requests in priority order, filtered, deduplicated and capped
fn select_articles(requests: &[ArticleRequest], limit: usize) -> Vec<ArticleRequest> {
    let mut sorted: Vec<ArticleRequest> = requests.to_vec();
    sorted.sort_by_key(|r| r.priority);

    let mut seen = HashSet::new();
    sorted
        .into_iter()
        .filter(|r| is_scrapable_url(&r.url))
        .filter(|r| seen.insert(r.url.clone()))
        .take(limit)
        .collect()
}

fn dedup_by_url<T: Clone>(requests: &[T], url: impl Fn(&T) -> &str) -> Vec<T> {
    let mut seen = HashSet::new();
    requests
        .iter()
        .filter(|r| seen.insert(url(*r).to_string()))
        .cloned()
        .collect()
}

/// Best-effort context gathering for one item
#[derive(Clone)]
pub struct EnrichmentRouter {
    articles: Option<Arc<dyn ArticleFetcher>>,
    transcripts: Option<Arc<dyn TranscriptFetcher>>,
    images: Option<Arc<dyn ImageDescriber>>,
    threads: Option<Arc<dyn SourceClient>>,
    call_timeout: Duration,
    article_limit: usize,
}

impl Default for EnrichmentRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl EnrichmentRouter {
    /// Router with no providers; every group yields nothing until one is attached
    pub fn new() -> Self {
        Self {
            articles: None,
            transcripts: None,
            images: None,
            threads: None,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            article_limit: DEFAULT_ARTICLE_LIMIT,
        }
    }

    pub fn with_article_fetcher(mut self, fetcher: Arc<dyn ArticleFetcher>) -> Self {
        self.articles = Some(fetcher);
        self
    }

    pub fn with_transcript_fetcher(mut self, fetcher: Arc<dyn TranscriptFetcher>) -> Self {
        self.transcripts = Some(fetcher);
        self
    }

    pub fn with_image_describer(mut self, describer: Arc<dyn ImageDescriber>) -> Self {
        self.images = Some(describer);
        self
    }

    pub fn with_thread_source(mut self, source: Arc<dyn SourceClient>) -> Self {
        self.threads = Some(source);
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn with_article_limit(mut self, article_limit: usize) -> Self {
        self.article_limit = article_limit;
        self
    }

    /// Run every requested fetch and collect whatever succeeded
    pub async fn gather(&self, item: &Item, decision: &TriageDecision) -> EnrichedContext {
        let expand_thread = decision.expand_thread || item.is_thread;

        let (articles, transcripts, image_descriptions, thread_text) = tokio::join!(
            self.gather_articles(item, &decision.articles),
            self.gather_transcripts(item, &decision.transcripts),
            self.gather_images(item, &decision.images),
            self.gather_thread(item, expand_thread),
        );

        let context = EnrichedContext {
            articles,
            transcripts,
            image_descriptions,
            thread_text,
        };

        debug!(
            item_id = %item.id,
            articles = context.articles.len(),
            transcripts = context.transcripts.len(),
            images = context.image_descriptions.len(),
            thread = context.thread_text.is_some(),
            "Enrichment complete"
        );

        context
    }

    async fn gather_articles(&self, item: &Item, requests: &[ArticleRequest]) -> Vec<ArticleContent> {
        let Some(fetcher) = &self.articles else {
            return Vec::new();
        };

        let selected = select_articles(requests, self.article_limit);
        let fetches = selected.into_iter().map(|request| {
            let fetcher = Arc::clone(fetcher);
            async move {
                let result = with_timeout(
                    self.call_timeout,
                    "article fetch",
                    fetcher.fetch_article(&request.url),
                )
                .await;
                match result {
                    Ok(content) if !content.trim().is_empty() => Some(ArticleContent {
                        url: request.url,
                        content,
                    }),
                    Ok(_) => {
                        debug!(item_id = %item.id, url = %request.url, "Article had no content");
                        None
                    }
                    Err(e) => {
                        warn!(item_id = %item.id, url = %request.url, error = %e, kind = %e.kind(), "Article fetch failed");
                        None
                    }
                }
            }
        });

        join_all(fetches).await.into_iter().flatten().collect()
    }

    async fn gather_transcripts(
        &self,
        item: &Item,
        requests: &[TranscriptRequest],
    ) -> Vec<TranscriptContent> {
        let Some(fetcher) = &self.transcripts else {
            return Vec::new();
        };

        let fetches = dedup_by_url(requests, |r| r.url.as_str()).into_iter().map(|request| {
            let fetcher = Arc::clone(fetcher);
            async move {
                match with_timeout(
                    self.call_timeout,
                    "transcript fetch",
                    fetcher.fetch_transcript(&request.url),
                )
                .await
                {
                    Ok(text) => Some(TranscriptContent {
                        url: request.url,
                        text,
                    }),
                    Err(e) => {
                        warn!(item_id = %item.id, url = %request.url, error = %e, kind = %e.kind(), "Transcript fetch failed");
                        None
                    }
                }
            }
        });

        join_all(fetches).await.into_iter().flatten().collect()
    }

    async fn gather_images(&self, item: &Item, requests: &[ImageRequest]) -> Vec<ImageDescription> {
        let Some(describer) = &self.images else {
            return Vec::new();
        };

        let fetches = dedup_by_url(requests, |r| r.url.as_str()).into_iter().map(|request| {
            let describer = Arc::clone(describer);
            async move {
                match with_timeout(
                    self.call_timeout,
                    "image description",
                    describer.describe(&request.url, request.expected_content.as_deref()),
                )
                .await
                {
                    Ok(description) => Some(ImageDescription {
                        url: request.url,
                        description,
                    }),
                    Err(e) => {
                        warn!(item_id = %item.id, url = %request.url, error = %e, kind = %e.kind(), "Image description failed");
                        None
                    }
                }
            }
        });

        join_all(fetches).await.into_iter().flatten().collect()
    }

    async fn gather_thread(&self, item: &Item, expand: bool) -> Option<String> {
        if !expand {
            return None;
        }
        let source = self.threads.as_ref()?;

        match with_timeout(self.call_timeout, "thread fetch", source.fetch_thread(&item.id)).await {
            Ok(mut posts) if !posts.is_empty() => {
                posts.sort_by_key(|p| p.created_at);
                let text = posts
                    .iter()
                    .map(|p| p.text.trim())
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n\n");
                (!text.is_empty()).then_some(text)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(item_id = %item.id, error = %e, kind = %e.kind(), "Thread expansion failed");
                None
            }
        }
    }
}
