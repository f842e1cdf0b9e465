//! Scripted provider fakes and a ready-wired orchestrator

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bkmk_common::events::EventBus;
use bkmk_ingest::db::Ledger;
use bkmk_ingest::error::{ErrorKind, IngestError, IngestResult};
use bkmk_ingest::models::{
    AnalysisResult, Author, EnrichedContext, Item, TriageDecision, ValueTier,
};
use bkmk_ingest::services::{EnrichmentRouter, Notifier};
use bkmk_ingest::types::{
    AnalysisProvider, ArticleFetcher, CredentialStatus, DestinationStore, ImageDescriber,
    MessageTransport, SourceClient, TranscriptFetcher, TriageProvider,
};
use bkmk_ingest::workflow::{OrchestratorConfig, PipelineOrchestrator, Providers};
use chrono::{Duration as ChronoDuration, Utc};
use tempfile::TempDir;

use super::db_utils::create_test_ledger;

pub fn error_of(kind: ErrorKind) -> IngestError {
    let detail = format!("scripted {}", kind);
    match kind {
        ErrorKind::CredentialsExpired => IngestError::CredentialsExpired(detail),
        ErrorKind::RateLimited => IngestError::RateLimited(detail),
        ErrorKind::Network => IngestError::Network(detail),
        ErrorKind::DestinationWriteFailed => IngestError::DestinationWrite(detail),
        ErrorKind::Parse => IngestError::Parse(detail),
        ErrorKind::Storage => IngestError::Ledger(bkmk_common::Error::Internal(detail)),
        ErrorKind::Unknown => IngestError::Unknown(detail),
    }
}

pub fn item(id: &str) -> Item {
    item_at(id, 0)
}

/// Item created `minutes_ago` minutes before now
pub fn item_at(id: &str, minutes_ago: i64) -> Item {
    Item {
        id: id.to_string(),
        text: format!("post {}", id),
        author: Author {
            handle: "ferris".to_string(),
            name: Some("Ferris".to_string()),
        },
        created_at: Utc::now() - ChronoDuration::minutes(minutes_ago),
        links: vec![],
        media: vec![],
        is_thread: false,
    }
}

/// Sleep for the scripted delay, or forever when `hang` is set
async fn stall(delay: Option<Duration>, hang: bool) {
    if hang {
        std::future::pending::<()>().await;
    }
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

pub fn analysis_with(category: &str, score: u8, tags: &[&str]) -> AnalysisResult {
    let mut analysis: AnalysisResult = serde_json::from_str("{}").unwrap();
    analysis.category = category.to_string();
    analysis.title = format!("{} insight", category);
    analysis.relevance_score = score;
    analysis.tags = tags.iter().map(|t| t.to_string()).collect();
    analysis
}

// ============================================================================
// Source
// ============================================================================

#[derive(Default)]
pub struct FakeSource {
    pub batch: Mutex<Vec<Item>>,
    pub threads: Mutex<HashMap<String, Vec<Item>>>,
    pub thread_delay: Mutex<Option<Duration>>,
    pub thread_error: Mutex<Option<ErrorKind>>,
    pub thread_calls: AtomicUsize,
    pub fetch_error: Mutex<Option<ErrorKind>>,
    /// Inverted so the default is valid credentials
    pub credentials_invalid: AtomicBool,
    pub fetch_calls: AtomicUsize,
    pub check_calls: AtomicUsize,
    pub last_limit: AtomicUsize,
}

impl FakeSource {
    pub fn set_batch(&self, items: Vec<Item>) {
        *self.batch.lock().unwrap() = items;
    }

    pub fn set_credentials_valid(&self, valid: bool) {
        self.credentials_invalid.store(!valid, Ordering::SeqCst);
    }

    pub fn set_thread(&self, item_id: &str, posts: Vec<Item>) {
        self.threads
            .lock()
            .unwrap()
            .insert(item_id.to_string(), posts);
    }
}

#[async_trait]
impl SourceClient for FakeSource {
    async fn fetch_batch(&self, limit: usize) -> IngestResult<Vec<Item>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.last_limit.store(limit, Ordering::SeqCst);
        if let Some(kind) = *self.fetch_error.lock().unwrap() {
            return Err(error_of(kind));
        }
        let batch = self.batch.lock().unwrap();
        Ok(batch.iter().take(limit).cloned().collect())
    }

    async fn fetch_thread(&self, item_id: &str) -> IngestResult<Vec<Item>> {
        self.thread_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.thread_delay.lock().unwrap();
        stall(delay, false).await;
        if let Some(kind) = *self.thread_error.lock().unwrap() {
            return Err(error_of(kind));
        }
        Ok(self
            .threads
            .lock()
            .unwrap()
            .get(item_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn check_credentials(&self) -> IngestResult<CredentialStatus> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        Ok(CredentialStatus {
            valid: !self.credentials_invalid.load(Ordering::SeqCst),
            identity: Some("ferris".to_string()),
        })
    }
}

// ============================================================================
// Model
// ============================================================================

#[derive(Default)]
pub struct ScriptedTriage {
    pub decisions: Mutex<HashMap<String, TriageDecision>>,
    pub failures: Mutex<HashMap<String, ErrorKind>>,
    pub delay: Mutex<Option<Duration>>,
    /// Items whose triage call never returns
    pub hanging: Mutex<Vec<String>>,
    pub calls: AtomicUsize,
}

impl ScriptedTriage {
    pub fn hang(&self, item_id: &str) {
        self.hanging.lock().unwrap().push(item_id.to_string());
    }

    pub fn decide(&self, item_id: &str, decision: TriageDecision) {
        self.decisions
            .lock()
            .unwrap()
            .insert(item_id.to_string(), decision);
    }

    pub fn fail(&self, item_id: &str, kind: ErrorKind) {
        self.failures.lock().unwrap().insert(item_id.to_string(), kind);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TriageProvider for ScriptedTriage {
    async fn triage(&self, item: &Item) -> IngestResult<TriageDecision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        let hang = self.hanging.lock().unwrap().contains(&item.id);
        stall(delay, hang).await;
        if let Some(kind) = self.failures.lock().unwrap().get(&item.id) {
            return Err(error_of(*kind));
        }
        Ok(self
            .decisions
            .lock()
            .unwrap()
            .get(&item.id)
            .cloned()
            .unwrap_or_else(|| TriageDecision::analyze_only(ValueTier::Medium)))
    }
}

pub struct ScriptedAnalysis {
    pub results: Mutex<HashMap<String, AnalysisResult>>,
    pub default: AnalysisResult,
    pub contexts: Mutex<Vec<EnrichedContext>>,
    pub calls: AtomicUsize,
}

impl Default for ScriptedAnalysis {
    fn default() -> Self {
        Self {
            results: Mutex::new(HashMap::new()),
            default: analysis_with("rust", 6, &["rust"]),
            contexts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }
}

impl ScriptedAnalysis {
    pub fn set(&self, item_id: &str, analysis: AnalysisResult) {
        self.results
            .lock()
            .unwrap()
            .insert(item_id.to_string(), analysis);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_context(&self) -> Option<EnrichedContext> {
        self.contexts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl AnalysisProvider for ScriptedAnalysis {
    async fn analyze(
        &self,
        item: &Item,
        _triage: &TriageDecision,
        context: &EnrichedContext,
    ) -> IngestResult<AnalysisResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().unwrap().push(context.clone());
        Ok(self
            .results
            .lock()
            .unwrap()
            .get(&item.id)
            .cloned()
            .unwrap_or_else(|| self.default.clone()))
    }
}

// ============================================================================
// Enrichment
// ============================================================================

#[derive(Default)]
pub struct FakeArticles {
    pub failing: Mutex<Vec<String>>,
    pub hanging: Mutex<Vec<String>>,
    pub delay: Mutex<Option<Duration>>,
    pub calls: AtomicUsize,
}

impl FakeArticles {
    pub fn fail_url(&self, url: &str) {
        self.failing.lock().unwrap().push(url.to_string());
    }
}

#[async_trait]
impl ArticleFetcher for FakeArticles {
    async fn fetch_article(&self, url: &str) -> IngestResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        let hang = self.hanging.lock().unwrap().iter().any(|u| u == url);
        stall(delay, hang).await;
        if self.failing.lock().unwrap().iter().any(|u| u == url) {
            return Err(IngestError::Network(format!("{} unreachable", url)));
        }
        Ok(format!("content of {}", url))
    }
}

#[derive(Default)]
pub struct FakeTranscripts {
    pub failing: Mutex<Vec<String>>,
    pub delay: Mutex<Option<Duration>>,
    pub calls: AtomicUsize,
}

impl FakeTranscripts {
    pub fn fail_url(&self, url: &str) {
        self.failing.lock().unwrap().push(url.to_string());
    }
}

#[async_trait]
impl TranscriptFetcher for FakeTranscripts {
    async fn fetch_transcript(&self, url: &str) -> IngestResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        stall(delay, false).await;
        if self.failing.lock().unwrap().iter().any(|u| u == url) {
            return Err(IngestError::Unknown(format!("no captions for {}", url)));
        }
        Ok(format!("transcript of {}", url))
    }
}

#[derive(Default)]
pub struct FakeImages {
    pub failing: Mutex<Vec<String>>,
    pub delay: Mutex<Option<Duration>>,
    /// `expected_content` hints in call order
    pub hints: Mutex<Vec<Option<String>>>,
    pub calls: AtomicUsize,
}

impl FakeImages {
    pub fn fail_url(&self, url: &str) {
        self.failing.lock().unwrap().push(url.to_string());
    }
}

#[async_trait]
impl ImageDescriber for FakeImages {
    async fn describe(&self, url: &str, expected_content: Option<&str>) -> IngestResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.hints
            .lock()
            .unwrap()
            .push(expected_content.map(str::to_string));
        let delay = *self.delay.lock().unwrap();
        stall(delay, false).await;
        if self.failing.lock().unwrap().iter().any(|u| u == url) {
            return Err(IngestError::RateLimited(format!("vision quota for {}", url)));
        }
        Ok(format!("description of {}", url))
    }
}

// ============================================================================
// Sinks
// ============================================================================

#[derive(Default)]
pub struct FakeDestination {
    pub existing: Mutex<HashMap<String, String>>,
    pub fail_find: AtomicBool,
    pub fail_create: AtomicBool,
    pub find_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
}

#[async_trait]
impl DestinationStore for FakeDestination {
    async fn find_by_item_id(&self, item_id: &str) -> IngestResult<Option<String>> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_find.load(Ordering::SeqCst) {
            return Err(IngestError::DestinationWrite("query failed".to_string()));
        }
        Ok(self.existing.lock().unwrap().get(item_id).cloned())
    }

    async fn create(&self, item: &Item, _analysis: &AnalysisResult) -> IngestResult<String> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(IngestError::DestinationWrite("500 from store".to_string()));
        }
        let reference = format!("page-{}", item.id);
        self.existing
            .lock()
            .unwrap()
            .insert(item.id.clone(), reference.clone());
        Ok(reference)
    }
}

#[derive(Default)]
pub struct RecordingTransport {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingTransport {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.contains(needle))
            .count()
    }
}

#[async_trait]
impl MessageTransport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, text: &str) -> IngestResult<()> {
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub temp_dir: TempDir,
    pub ledger: Ledger,
    pub source: Arc<FakeSource>,
    pub triage: Arc<ScriptedTriage>,
    pub analysis: Arc<ScriptedAnalysis>,
    pub articles: Arc<FakeArticles>,
    pub transcripts: Arc<FakeTranscripts>,
    pub images: Arc<FakeImages>,
    pub destination: Arc<FakeDestination>,
    pub transport: Arc<RecordingTransport>,
    pub events: EventBus,
    pub orchestrator: Arc<PipelineOrchestrator>,
}

/// Knobs for `harness_with`
pub struct HarnessOptions {
    pub inter_item_delay: Duration,
    pub call_timeout: Duration,
    /// Replaces the scripted triage provider (the fake is still built and exposed)
    pub triage: Option<Arc<dyn TriageProvider>>,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            inter_item_delay: Duration::ZERO,
            call_timeout: Duration::from_secs(5),
            triage: None,
        }
    }
}

/// Orchestrator over fakes with no inter-item delay and no notifier spacing
pub async fn harness() -> Harness {
    harness_with(HarnessOptions::default()).await
}

/// Router over every enrichment fake, bounded by `call_timeout`
pub fn router_over(
    articles: Arc<FakeArticles>,
    transcripts: Arc<FakeTranscripts>,
    images: Arc<FakeImages>,
    source: Arc<FakeSource>,
    call_timeout: Duration,
) -> EnrichmentRouter {
    EnrichmentRouter::new()
        .with_article_fetcher(articles)
        .with_transcript_fetcher(transcripts)
        .with_image_describer(images)
        .with_thread_source(source)
        .with_call_timeout(call_timeout)
}

pub async fn harness_with(options: HarnessOptions) -> Harness {
    let (temp_dir, ledger) = create_test_ledger().await;

    let source = Arc::new(FakeSource::default());
    let triage = Arc::new(ScriptedTriage::default());
    let analysis = Arc::new(ScriptedAnalysis::default());
    let articles = Arc::new(FakeArticles::default());
    let transcripts = Arc::new(FakeTranscripts::default());
    let images = Arc::new(FakeImages::default());
    let destination = Arc::new(FakeDestination::default());
    let transport = Arc::new(RecordingTransport::default());
    let events = EventBus::new(64);

    let router = router_over(
        articles.clone(),
        transcripts.clone(),
        images.clone(),
        source.clone(),
        options.call_timeout,
    );

    let triage_provider: Arc<dyn TriageProvider> = match options.triage {
        Some(provider) => provider,
        None => triage.clone() as Arc<dyn TriageProvider>,
    };
    let providers = Providers {
        source: source.clone(),
        triage: triage_provider,
        analysis: analysis.clone(),
        destination: Some(destination.clone()),
    };

    let orchestrator = Arc::new(PipelineOrchestrator::new(
        ledger.clone(),
        providers,
        router,
        Notifier::new(transport.clone(), Duration::ZERO, 4000),
        events.clone(),
        OrchestratorConfig {
            inter_item_delay: options.inter_item_delay,
            call_timeout: options.call_timeout,
        },
    ));

    Harness {
        temp_dir,
        ledger,
        source,
        triage,
        analysis,
        articles,
        transcripts,
        images,
        destination,
        transport,
        events,
        orchestrator,
    }
}
