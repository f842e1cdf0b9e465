//! Batch and digest scheduler
//!
//! A short-interval ticker runs one orchestrator pass per tick; a tick that arrives
//! while a pass is still running is dropped. The weekly digest runs on its own
//! cron trigger. Both keep running while credentials are invalid; passes simply
//! do not start until a re-check succeeds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::db::WeeklyStats;
use crate::error::{ErrorKind, IngestError, IngestResult};
use crate::services::digest::send_weekly_digest;
use crate::workflow::{PassSummary, PipelineOrchestrator};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub poll_interval: Duration,
    /// Six-field cron expression (with seconds)
    pub digest_schedule: String,
    pub batch_size: usize,
    pub first_run_batch_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            digest_schedule: "0 0 9 * * Sun".to_string(),
            batch_size: 20,
            first_run_batch_size: 100,
        }
    }
}

/// Result of one tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Ran(PassSummary),
    /// A pass was already running; tick dropped
    Overlapped,
    CredentialsInvalid,
    Cancelled,
    Failed(ErrorKind),
}

#[derive(Debug, Clone, Serialize)]
pub struct LastPass {
    pub finished_at: DateTime<Utc>,
    pub summary: PassSummary,
}

/// Snapshot for the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub pass_in_progress: bool,
    pub credentials_valid: bool,
    pub first_pass_done: bool,
    pub last_error: Option<String>,
    pub last_pass: Option<LastPass>,
}

/// Resets the in-progress flag when the pass ends, however it ends
struct PassGuard<'a>(&'a AtomicBool);

impl<'a> PassGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| PassGuard(flag))
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Scheduler {
    orchestrator: Arc<PipelineOrchestrator>,
    config: SchedulerConfig,
    pass_in_progress: AtomicBool,
    first_pass_done: AtomicBool,
    last_error: RwLock<Option<String>>,
    last_pass: RwLock<Option<LastPass>>,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        orchestrator: Arc<PipelineOrchestrator>,
        config: SchedulerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            orchestrator,
            config,
            pass_in_progress: AtomicBool::new(false),
            first_pass_done: AtomicBool::new(false),
            last_error: RwLock::new(None),
            last_pass: RwLock::new(None),
            cancel,
        }
    }

    pub fn orchestrator(&self) -> &Arc<PipelineOrchestrator> {
        &self.orchestrator
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_pass_in_progress(&self) -> bool {
        self.pass_in_progress.load(Ordering::SeqCst)
    }

    /// Recover abandoned claims and probe credentials once
    ///
    /// Returns whether credentials are valid; when they are not, the first tick
    /// only re-checks them.
    pub async fn startup(&self) -> IngestResult<bool> {
        self.orchestrator.ledger().recover_abandoned_claims().await?;

        let valid = self.orchestrator.check_credentials().await;
        if valid {
            info!("Source credentials valid");
        } else {
            warn!("Source credentials invalid at startup; first pass deferred");
        }
        Ok(valid)
    }

    /// Run one pass unless one is already running
    pub async fn tick(&self) -> TickOutcome {
        if self.cancel.is_cancelled() {
            return TickOutcome::Cancelled;
        }

        let Some(_guard) = PassGuard::try_acquire(&self.pass_in_progress) else {
            debug!("Previous pass still running, dropping tick");
            return TickOutcome::Overlapped;
        };

        if !self.orchestrator.credentials_valid() && !self.orchestrator.check_credentials().await
        {
            debug!("Credentials still invalid, skipping pass");
            return TickOutcome::CredentialsInvalid;
        }

        let limit = if self.first_pass_done.load(Ordering::SeqCst) {
            self.config.batch_size
        } else {
            self.config.first_run_batch_size
        };

        match self.orchestrator.run_pass(limit, &self.cancel).await {
            Ok(summary) => {
                if !summary.aborted_on_credentials {
                    self.first_pass_done.store(true, Ordering::SeqCst);
                }
                *self.last_pass.write().await = Some(LastPass {
                    finished_at: Utc::now(),
                    summary: summary.clone(),
                });
                TickOutcome::Ran(summary)
            }
            Err(e) => {
                self.record_error(&e).await;
                if e.kind() == ErrorKind::Storage {
                    self.orchestrator.notifier().notify_pass_failed(&e).await;
                }
                TickOutcome::Failed(e.kind())
            }
        }
    }

    /// Send the weekly digest now
    pub async fn run_digest(&self) -> Option<WeeklyStats> {
        let orchestrator = &self.orchestrator;
        match send_weekly_digest(
            orchestrator.ledger(),
            orchestrator.notifier(),
            orchestrator.events(),
            Utc::now(),
        )
        .await
        {
            Ok(stats) => Some(stats),
            Err(e) => {
                self.record_error(&e).await;
                None
            }
        }
    }

    async fn record_error(&self, error: &IngestError) {
        error!(error = %error, kind = %error.kind(), "Scheduled job failed");
        *self.last_error.write().await = Some(error.to_string());
    }

    pub async fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            pass_in_progress: self.is_pass_in_progress(),
            credentials_valid: self.orchestrator.credentials_valid(),
            first_pass_done: self.first_pass_done.load(Ordering::SeqCst),
            last_error: self.last_error.read().await.clone(),
            last_pass: self.last_pass.read().await.clone(),
        }
    }

    /// Arm both triggers and run until the cancellation token fires
    ///
    /// On shutdown the running pass finishes its current item before this returns.
    pub async fn run(self: Arc<Self>) -> IngestResult<()> {
        let mut digest_scheduler = JobScheduler::new()
            .await
            .map_err(|e| IngestError::Config(format!("creating digest scheduler: {}", e)))?;

        let digest_owner = Arc::clone(&self);
        let job = Job::new_async(self.config.digest_schedule.as_str(), move |_uuid, _l| {
            let scheduler = Arc::clone(&digest_owner);
            Box::pin(async move {
                info!("Digest trigger fired");
                scheduler.run_digest().await;
            })
        })
        .map_err(|e| {
            IngestError::Config(format!(
                "invalid digest schedule '{}': {}",
                self.config.digest_schedule, e
            ))
        })?;

        digest_scheduler
            .add(job)
            .await
            .map_err(|e| IngestError::Config(format!("adding digest job: {}", e)))?;
        digest_scheduler
            .start()
            .await
            .map_err(|e| IngestError::Config(format!("starting digest scheduler: {}", e)))?;

        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            digest_schedule = %self.config.digest_schedule,
            "Scheduler started"
        );

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut passes: JoinSet<TickOutcome> = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => {
                    let scheduler = Arc::clone(&self);
                    passes.spawn(async move { scheduler.tick().await });
                }
                Some(joined) = passes.join_next(), if !passes.is_empty() => {
                    match joined {
                        Ok(outcome) => debug!(?outcome, "Tick finished"),
                        Err(e) => error!(error = %e, "Pass task panicked"),
                    }
                }
            }
        }

        info!("Shutdown requested, waiting for the running pass");
        if let Err(e) = digest_scheduler.shutdown().await {
            warn!(error = %e, "Digest scheduler shutdown failed");
        }
        while let Some(joined) = passes.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Pass task panicked during shutdown");
            }
        }
        info!("Scheduler stopped");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_guard_is_exclusive_and_resets() {
        let flag = AtomicBool::new(false);
        {
            let _guard = PassGuard::try_acquire(&flag).unwrap();
            assert!(flag.load(Ordering::SeqCst));
            assert!(PassGuard::try_acquire(&flag).is_none());
        }
        assert!(!flag.load(Ordering::SeqCst));
        assert!(PassGuard::try_acquire(&flag).is_some());
    }

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.first_run_batch_size, 100);
    }
}
