//! Pipeline orchestrator
//!
//! Drives each item of a batch through the ledger state machine:
//!
//! ```text
//! validate → is_handled? → try_claim → triage ─┬─ skip ──────────────→ commit COMPLETED
//!                                               └─ enrich → analyze → destination → commit COMPLETED
//!                                any error in triage/enrich/analyze → release FAILED + alert
//! ```
//!
//! # Error Handling
//! - Per-item error isolation: one failing item never stops the batch
//! - Expired credentials stop claiming for the rest of the pass and alert once
//! - Ledger (storage) errors abort the pass and propagate to the scheduler
//! - Destination failures are logged; the item still completes

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bkmk_common::events::{EventBus, PipelineEvent};
use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{ErrorKind, IngestError, IngestResult};
use crate::db::Ledger;
use crate::models::{AnalysisResult, Item, ItemState, RecordPayload};
use crate::services::enrichment_router::EnrichmentRouter;
use crate::services::notifier::Notifier;
use crate::types::{AnalysisProvider, DestinationStore, SourceClient, TriageProvider};
use crate::utils::with_timeout;

/// Category recorded for items triaged as not worth analyzing
pub const SKIPPED_CATEGORY: &str = "other";

/// External collaborators used by the orchestrator
#[derive(Clone)]
pub struct Providers {
    pub source: Arc<dyn SourceClient>,
    pub triage: Arc<dyn TriageProvider>,
    pub analysis: Arc<dyn AnalysisProvider>,
    /// None when no mirror is configured
    pub destination: Option<Arc<dyn DestinationStore>>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Pause after every item that was actually processed
    pub inter_item_delay: Duration,
    /// Bound on every external call
    pub call_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            inter_item_delay: Duration::from_millis(2000),
            call_timeout: Duration::from_secs(60),
        }
    }
}

/// What happened to one item
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Completed {
        category: String,
        destination_ref: Option<String>,
    },
    /// Triage said skip; recorded as completed
    Skipped,
    AlreadyHandled,
    /// Another claim holds the item
    NotClaimed,
    /// Malformed upstream data; never claimed
    Invalid,
    Failed {
        kind: ErrorKind,
    },
}

impl ItemOutcome {
    /// True when the item was claimed and went through the pipeline
    pub fn was_processed(&self) -> bool {
        matches!(
            self,
            ItemOutcome::Completed { .. } | ItemOutcome::Skipped | ItemOutcome::Failed { .. }
        )
    }
}

/// Counters for one pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PassSummary {
    pub fetched: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub already_handled: usize,
    pub not_claimed: usize,
    pub invalid: usize,
    pub aborted_on_credentials: bool,
    pub cancelled: bool,
}

impl PassSummary {
    fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Completed { .. } => self.completed += 1,
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::AlreadyHandled => self.already_handled += 1,
            ItemOutcome::NotClaimed => self.not_claimed += 1,
            ItemOutcome::Invalid => self.invalid += 1,
            ItemOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Per-item state machine over the ledger
pub struct PipelineOrchestrator {
    ledger: Ledger,
    providers: Providers,
    router: EnrichmentRouter,
    notifier: Notifier,
    events: EventBus,
    config: OrchestratorConfig,
    credentials_valid: AtomicBool,
}

impl PipelineOrchestrator {
    pub fn new(
        ledger: Ledger,
        providers: Providers,
        router: EnrichmentRouter,
        notifier: Notifier,
        events: EventBus,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            ledger,
            providers,
            router,
            notifier,
            events,
            config,
            credentials_valid: AtomicBool::new(true),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn credentials_valid(&self) -> bool {
        self.credentials_valid.load(Ordering::SeqCst)
    }

    /// Probe the source credentials and update the flag
    ///
    /// A probe that fails for any reason other than rejected credentials leaves
    /// the flag unchanged.
    pub async fn check_credentials(&self) -> bool {
        let probe = with_timeout(
            self.config.call_timeout,
            "credential check",
            self.providers.source.check_credentials(),
        )
        .await;

        match probe {
            Ok(status) if status.valid => {
                self.set_credentials_valid(true, status.identity.as_deref(), "")
                    .await;
            }
            Ok(status) => {
                self.set_credentials_valid(
                    false,
                    status.identity.as_deref(),
                    "credential check reported invalid credentials",
                )
                .await;
            }
            Err(IngestError::CredentialsExpired(detail)) => {
                self.set_credentials_valid(false, None, &detail).await;
            }
            Err(e) => {
                warn!(error = %e, kind = %e.kind(), "Credential check failed, keeping previous state");
            }
        }

        self.credentials_valid()
    }

    /// Record the credential state; alerts and emits only on a transition
    async fn set_credentials_valid(&self, valid: bool, identity: Option<&str>, detail: &str) {
        let previous = self.credentials_valid.swap(valid, Ordering::SeqCst);
        if previous == valid {
            return;
        }

        if valid {
            info!(identity = ?identity, "Source credentials restored");
            self.notifier.notify_credentials_restored(identity).await;
        } else {
            error!(detail, "Source credentials expired; pausing processing");
            self.notifier.notify_credentials_expired(detail).await;
        }

        self.events.emit_lossy(PipelineEvent::CredentialsChanged {
            valid,
            identity: identity.map(str::to_string),
            timestamp: Utc::now(),
        });
    }

    /// Fetch up to `limit` items from the source and process them
    ///
    /// Source failures other than expired credentials are returned to the caller.
    pub async fn run_pass(
        &self,
        limit: usize,
        cancel: &CancellationToken,
    ) -> IngestResult<PassSummary> {
        let fetched = with_timeout(
            self.config.call_timeout,
            "source fetch",
            self.providers.source.fetch_batch(limit),
        )
        .await;

        let items = match fetched {
            Ok(items) => items,
            Err(IngestError::CredentialsExpired(detail)) => {
                self.set_credentials_valid(false, None, &detail).await;
                return Ok(PassSummary {
                    aborted_on_credentials: true,
                    ..PassSummary::default()
                });
            }
            Err(e) => return Err(e),
        };

        self.process_batch(items, cancel).await
    }

    /// Process items sequentially; cancellation is honored between items
    pub async fn process_batch(
        &self,
        items: Vec<Item>,
        cancel: &CancellationToken,
    ) -> IngestResult<PassSummary> {
        let pass_id = Uuid::new_v4();
        let started = Instant::now();
        let mut summary = PassSummary {
            fetched: items.len(),
            ..PassSummary::default()
        };

        info!(%pass_id, batch_size = items.len(), "Pass started");
        self.events.emit_lossy(PipelineEvent::PassStarted {
            pass_id,
            batch_size: items.len(),
            timestamp: Utc::now(),
        });

        let total = items.len();
        for (index, item) in items.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(%pass_id, remaining = total - index, "Pass cancelled");
                summary.cancelled = true;
                break;
            }
            if !self.credentials_valid() {
                warn!(%pass_id, remaining = total - index, "Credentials invalid, stopping pass");
                summary.aborted_on_credentials = true;
                break;
            }

            let outcome = self.process_item(item, pass_id).await?;
            summary.record(&outcome);

            if outcome.was_processed() && index + 1 < total && !self.config.inter_item_delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.inter_item_delay) => {}
                    _ = cancel.cancelled() => {}
                }
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            %pass_id,
            fetched = summary.fetched,
            completed = summary.completed,
            skipped = summary.skipped,
            failed = summary.failed,
            already_handled = summary.already_handled,
            duration_ms,
            "Pass completed"
        );
        self.events.emit_lossy(PipelineEvent::PassCompleted {
            pass_id,
            fetched: summary.fetched,
            completed: summary.completed + summary.skipped,
            failed: summary.failed,
            duration_ms,
            timestamp: Utc::now(),
        });

        Ok(summary)
    }

    /// Run one item through the state machine
    ///
    /// Returns `Err` only for ledger failures.
    pub async fn process_item(&self, item: &Item, pass_id: Uuid) -> IngestResult<ItemOutcome> {
        if let Err(e) = item.validate() {
            warn!(item_id = %item.id, error = %e, "Skipping malformed item");
            return Ok(ItemOutcome::Invalid);
        }

        if self.ledger.is_handled(&item.id).await? {
            debug!(item_id = %item.id, "Already handled");
            return Ok(ItemOutcome::AlreadyHandled);
        }

        if !self.ledger.try_claim(&item.id).await? {
            debug!(item_id = %item.id, "Claim held elsewhere");
            return Ok(ItemOutcome::NotClaimed);
        }

        match self.process_claimed(item, pass_id).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.kind() == ErrorKind::Storage => {
                error!(item_id = %item.id, error = %e, "Ledger failure, aborting pass");
                if let Err(release_err) = self.ledger.release(&item.id, ItemState::Failed).await {
                    error!(item_id = %item.id, error = %release_err, "Failed to release claim");
                }
                Err(e)
            }
            Err(e) => {
                let kind = e.kind();
                warn!(item_id = %item.id, error = %e, %kind, retryable = kind.is_retryable(), "Item failed");

                self.ledger.release(&item.id, ItemState::Failed).await?;

                self.events.emit_lossy(PipelineEvent::ItemFailed {
                    pass_id,
                    item_id: item.id.clone(),
                    kind: kind.to_string(),
                    retryable: kind.is_retryable(),
                    message: e.to_string(),
                    timestamp: Utc::now(),
                });

                self.notifier.notify_item_error(&item.id, &e).await;
                if let IngestError::CredentialsExpired(detail) = &e {
                    self.set_credentials_valid(false, None, detail).await;
                }

                Ok(ItemOutcome::Failed { kind })
            }
        }
    }

    async fn process_claimed(&self, item: &Item, pass_id: Uuid) -> IngestResult<ItemOutcome> {
        let triage = with_timeout(
            self.config.call_timeout,
            "triage",
            self.providers.triage.triage(item),
        )
        .await?;

        if triage.is_skip() {
            debug!(item_id = %item.id, reason = ?triage.skip_reason, "Triage skip");
            let payload = RecordPayload {
                item: item.clone(),
                triage,
                analysis: None,
                skipped: true,
            };
            self.ledger
                .commit(&item.id, ItemState::Completed, Some(SKIPPED_CATEGORY), None, &payload)
                .await?;
            self.emit_completed(pass_id, &item.id, SKIPPED_CATEGORY, None, true);
            return Ok(ItemOutcome::Skipped);
        }

        let context = self.router.gather(item, &triage).await;

        let mut analysis = with_timeout(
            self.config.call_timeout,
            "analysis",
            self.providers.analysis.analyze(item, &triage, &context),
        )
        .await?;
        analysis.normalize();
        analysis.apply_enrichment_evidence(&context);

        let destination_ref = self.write_destination(item, &analysis).await;
        let category = analysis.category.clone();

        let payload = RecordPayload {
            item: item.clone(),
            triage,
            analysis: Some(analysis),
            skipped: false,
        };
        self.ledger
            .commit(
                &item.id,
                ItemState::Completed,
                Some(&category),
                destination_ref.as_deref(),
                &payload,
            )
            .await?;

        info!(item_id = %item.id, %category, destination_ref = ?destination_ref, "Item completed");
        self.emit_completed(pass_id, &item.id, &category, destination_ref.clone(), false);

        Ok(ItemOutcome::Completed {
            category,
            destination_ref,
        })
    }

    /// Mirror to the destination store; `None` on any failure
    ///
    /// An existing record for the item is reused instead of creating a duplicate.
    async fn write_destination(&self, item: &Item, analysis: &AnalysisResult) -> Option<String> {
        let destination = self.providers.destination.as_ref()?;

        let existing = with_timeout(
            self.config.call_timeout,
            "destination lookup",
            destination.find_by_item_id(&item.id),
        )
        .await;
        match existing {
            Ok(Some(reference)) => {
                debug!(item_id = %item.id, %reference, "Destination record already exists");
                return Some(reference);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(
                    item_id = %item.id,
                    error = %e,
                    kind = %ErrorKind::DestinationWriteFailed,
                    "Destination lookup failed, not creating to avoid duplicates"
                );
                return None;
            }
        }

        match with_timeout(
            self.config.call_timeout,
            "destination write",
            destination.create(item, analysis),
        )
        .await
        {
            Ok(reference) => Some(reference),
            Err(e) => {
                warn!(
                    item_id = %item.id,
                    error = %e,
                    kind = %ErrorKind::DestinationWriteFailed,
                    "Destination write failed"
                );
                None
            }
        }
    }

    fn emit_completed(
        &self,
        pass_id: Uuid,
        item_id: &str,
        category: &str,
        destination_ref: Option<String>,
        skipped: bool,
    ) {
        self.events.emit_lossy(PipelineEvent::ItemCompleted {
            pass_id,
            item_id: item_id.to_string(),
            category: category.to_string(),
            destination_ref,
            skipped,
            timestamp: Utc::now(),
        });
    }
}
