//! Provider trait definitions for bkmk-ingest
//!
//! Every external collaborator sits behind one of these traits so the pipeline can
//! run against real HTTP adapters in production and scripted fakes in tests:
//! - **Source:** `SourceClient`
//! - **Model:** `TriageProvider`, `AnalysisProvider`, `ImageDescriber`
//! - **Enrichment:** `ArticleFetcher`, `TranscriptFetcher`
//! - **Sinks:** `DestinationStore`, `MessageTransport`
//!
//! All methods return `IngestError`, whose `kind()` drives retry and alert policy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IngestResult;
use crate::models::{AnalysisResult, EnrichedContext, Item, TriageDecision};

// ============================================================================
// Source
// ============================================================================

/// Result of a credential probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialStatus {
    pub valid: bool,
    /// Account the credentials belong to, when known
    pub identity: Option<String>,
}

/// Upstream bookmark source
///
/// Any method may fail with `CredentialsExpired`; the orchestrator pauses claiming
/// instead of retrying the item.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Most recent bookmarks, newest first, at most `limit`
    async fn fetch_batch(&self, limit: usize) -> IngestResult<Vec<Item>>;

    /// Items of the conversation the given item belongs to
    async fn fetch_thread(&self, item_id: &str) -> IngestResult<Vec<Item>>;

    async fn check_credentials(&self) -> IngestResult<CredentialStatus>;
}

// ============================================================================
// Model
// ============================================================================

/// Decides what extra context an item needs
///
/// # Example
/// ```rust,ignore
/// struct AlwaysSkip;
///
/// #[async_trait::async_trait]
/// impl TriageProvider for AlwaysSkip {
///     async fn triage(&self, _item: &Item) -> IngestResult<TriageDecision> {
///         Ok(TriageDecision::analyze_only(ValueTier::Skip))
///     }
/// }
/// ```
#[async_trait]
pub trait TriageProvider: Send + Sync {
    async fn triage(&self, item: &Item) -> IngestResult<TriageDecision>;
}

#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn analyze(
        &self,
        item: &Item,
        triage: &TriageDecision,
        context: &EnrichedContext,
    ) -> IngestResult<AnalysisResult>;
}

#[async_trait]
pub trait ImageDescriber: Send + Sync {
    /// Describe an image; `expected_content` is a triage hint
    async fn describe(&self, url: &str, expected_content: Option<&str>) -> IngestResult<String>;
}

// ============================================================================
// Enrichment
// ============================================================================

#[async_trait]
pub trait ArticleFetcher: Send + Sync {
    /// Readable text of the page at `url`
    async fn fetch_article(&self, url: &str) -> IngestResult<String>;
}

#[async_trait]
pub trait TranscriptFetcher: Send + Sync {
    async fn fetch_transcript(&self, url: &str) -> IngestResult<String>;
}

// ============================================================================
// Sinks
// ============================================================================

/// Human-facing mirror of completed items
///
/// Writes are idempotent only through `find_by_item_id`; callers check before
/// creating.
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Reference of an existing record for `item_id`
    async fn find_by_item_id(&self, item_id: &str) -> IngestResult<Option<String>>;

    /// Create a record and return its reference
    async fn create(&self, item: &Item, analysis: &AnalysisResult) -> IngestResult<String>;
}

/// Raw alert channel; chunking and spacing live in `Notifier`
#[async_trait]
pub trait MessageTransport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, text: &str) -> IngestResult<()>;
}
