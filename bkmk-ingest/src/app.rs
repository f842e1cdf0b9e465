//! Service assembly
//!
//! Wires the shipped adapters from `IngestConfig` into an orchestrator and
//! scheduler.

use std::sync::Arc;

use bkmk_common::events::EventBus;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::IngestConfig;
use crate::db::Ledger;
use crate::error::{IngestError, IngestResult};
use crate::services::{
    CommandTranscriptFetcher, EnrichmentRouter, HttpSourceClient, LlmClient, LogTransport,
    Notifier, NotionStore, ReaderArticleFetcher, Scheduler, TelegramTransport,
};
use crate::types::{DestinationStore, MessageTransport, SourceClient};
use crate::workflow::{PipelineOrchestrator, Providers};

/// Buffered pipeline events per subscriber
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Ledger with the configured lease and lock-wait bounds
pub fn build_ledger(pool: SqlitePool, config: &IngestConfig) -> Ledger {
    Ledger::new(pool)
        .with_stale_claim_after(config.stale_claim_after)
        .with_max_lock_wait_ms(config.max_lock_wait_ms)
}

/// Telegram when configured, otherwise the log
pub fn build_notifier(config: &IngestConfig) -> IngestResult<Notifier> {
    let transport: Arc<dyn MessageTransport> = match &config.notifier.telegram {
        Some(telegram) => Arc::new(TelegramTransport::new(
            &telegram.bot_token,
            &telegram.chat_id,
            config.orchestrator.call_timeout,
        )?),
        None => Arc::new(LogTransport),
    };
    info!(transport = transport.name(), "Notifier configured");

    Ok(Notifier::new(
        transport,
        config.notifier.min_interval,
        config.notifier.max_message_len,
    ))
}

/// Build the scheduler and everything beneath it
pub fn build_scheduler(
    pool: SqlitePool,
    config: &IngestConfig,
    events: EventBus,
    cancel: CancellationToken,
) -> IngestResult<Arc<Scheduler>> {
    let call_timeout = config.orchestrator.call_timeout;

    let source_settings = config.source.as_ref().ok_or_else(|| {
        IngestError::Config(
            "source.base_url is not configured; set it in the TOML config".to_string(),
        )
    })?;
    let source: Arc<dyn SourceClient> = Arc::new(HttpSourceClient::new(
        &source_settings.base_url,
        &source_settings.bearer_token,
        call_timeout,
    )?);

    let llm = Arc::new(LlmClient::new(
        &config.llm.base_url,
        config.llm.api_key.clone(),
        &config.llm.model,
        &config.llm.triage_model,
        config.llm.interests.clone(),
        call_timeout,
    )?);

    let destination: Option<Arc<dyn DestinationStore>> = match &config.destination {
        Some(notion) => Some(Arc::new(NotionStore::new(
            &notion.token,
            &notion.database_id,
            call_timeout,
        )?)),
        None => {
            info!("No destination store configured; items are recorded in the ledger only");
            None
        }
    };

    let router = EnrichmentRouter::new()
        .with_article_fetcher(Arc::new(ReaderArticleFetcher::new(
            &config.reader.base_url,
            config.reader.api_key.clone(),
            call_timeout,
        )?))
        .with_transcript_fetcher(Arc::new(CommandTranscriptFetcher::new(
            config.transcript.command.clone(),
            config.transcript.args.clone(),
        )))
        .with_image_describer(llm.clone())
        .with_thread_source(source.clone())
        .with_call_timeout(call_timeout)
        .with_article_limit(config.article_limit);

    let providers = Providers {
        source,
        triage: llm.clone(),
        analysis: llm,
        destination,
    };

    let orchestrator = Arc::new(PipelineOrchestrator::new(
        build_ledger(pool, config),
        providers,
        router,
        build_notifier(config)?,
        events,
        config.orchestrator.clone(),
    ));

    Ok(Arc::new(Scheduler::new(
        orchestrator,
        config.scheduler.clone(),
        cancel,
    )))
}
