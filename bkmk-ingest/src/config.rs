//! Configuration resolution for bkmk-ingest
//!
//! The bootstrap `TomlConfig` (from bkmk-common) is turned into the runtime
//! `IngestConfig` here. Secrets resolve with ENV → TOML priority; a warning is
//! logged when both carry a value.

use std::time::Duration;

use bkmk_common::config::TomlConfig;
use tracing::{info, warn};

use crate::error::{IngestError, IngestResult};
use crate::services::scheduler::SchedulerConfig;
use crate::workflow::OrchestratorConfig;

pub const ENV_SOURCE_TOKEN: &str = "BKMK_SOURCE_TOKEN";
pub const ENV_LLM_API_KEY: &str = "BKMK_LLM_API_KEY";
pub const ENV_READER_API_KEY: &str = "BKMK_READER_API_KEY";
pub const ENV_TELEGRAM_BOT_TOKEN: &str = "BKMK_TELEGRAM_BOT_TOKEN";
pub const ENV_TELEGRAM_CHAT_ID: &str = "BKMK_TELEGRAM_CHAT_ID";
pub const ENV_NOTION_TOKEN: &str = "BKMK_NOTION_TOKEN";

/// Validate a secret (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Resolve a secret from the environment, then TOML
pub fn resolve_secret(name: &str, env_var: &str, toml_value: Option<&str>) -> Option<String> {
    let env_value = std::env::var(env_var).ok().filter(|v| is_valid_key(v));
    let toml_value = toml_value.filter(|v| is_valid_key(v));

    if env_value.is_some() && toml_value.is_some() {
        warn!(
            "{} found in multiple sources: environment, TOML. Using environment (highest priority).",
            name
        );
    }

    if let Some(value) = env_value {
        info!("{} loaded from environment variable {}", name, env_var);
        return Some(value);
    }

    toml_value.map(|value| {
        info!("{} loaded from TOML config", name);
        value.to_string()
    })
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub base_url: String,
    pub bearer_token: String,
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub triage_model: String,
    pub interests: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReaderSettings {
    pub base_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TranscriptSettings {
    pub command: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NotionSettings {
    pub token: String,
    pub database_id: String,
}

#[derive(Debug, Clone)]
pub struct TelegramSettings {
    pub bot_token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone)]
pub struct NotifierSettings {
    pub min_interval: Duration,
    pub max_message_len: usize,
    /// None routes alerts to the log
    pub telegram: Option<TelegramSettings>,
}

/// Fully resolved runtime configuration
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub bind_address: String,
    pub port: u16,
    pub scheduler: SchedulerConfig,
    pub orchestrator: OrchestratorConfig,
    pub stale_claim_after: Duration,
    pub max_lock_wait_ms: u64,
    pub article_limit: usize,
    pub notifier: NotifierSettings,
    pub source: Option<SourceSettings>,
    pub llm: LlmSettings,
    pub reader: ReaderSettings,
    pub transcript: TranscriptSettings,
    pub destination: Option<NotionSettings>,
}

impl IngestConfig {
    pub fn from_toml(toml: &TomlConfig) -> IngestResult<Self> {
        let scheduler = &toml.scheduler;
        let pipeline = &toml.pipeline;

        if scheduler.poll_interval_secs == 0 {
            return Err(IngestError::Config(
                "scheduler.poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if scheduler.batch_size == 0 || scheduler.first_run_batch_size == 0 {
            return Err(IngestError::Config(
                "scheduler batch sizes must be greater than zero".to_string(),
            ));
        }
        if pipeline.call_timeout_secs == 0 {
            return Err(IngestError::Config(
                "pipeline.call_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if toml.notifier.max_message_len == 0 {
            return Err(IngestError::Config(
                "notifier.max_message_len must be greater than zero".to_string(),
            ));
        }

        let source = match (
            toml.source.base_url.as_deref().filter(|u| is_valid_key(u)),
            resolve_secret(
                "Source bearer token",
                ENV_SOURCE_TOKEN,
                toml.source.bearer_token.as_deref(),
            ),
        ) {
            (Some(base_url), Some(bearer_token)) => Some(SourceSettings {
                base_url: base_url.trim_end_matches('/').to_string(),
                bearer_token,
            }),
            (Some(_), None) => {
                return Err(IngestError::Config(format!(
                    "source.base_url is set but no bearer token was found. Set {} or source.bearer_token",
                    ENV_SOURCE_TOKEN
                )))
            }
            (None, _) => None,
        };

        let telegram = match (
            resolve_secret(
                "Telegram bot token",
                ENV_TELEGRAM_BOT_TOKEN,
                toml.notifier.telegram_bot_token.as_deref(),
            ),
            resolve_secret(
                "Telegram chat id",
                ENV_TELEGRAM_CHAT_ID,
                toml.notifier.telegram_chat_id.as_deref(),
            ),
        ) {
            (Some(bot_token), Some(chat_id)) => Some(TelegramSettings { bot_token, chat_id }),
            (Some(_), None) | (None, Some(_)) => {
                warn!("Telegram alerts need both a bot token and a chat id; alerts go to the log");
                None
            }
            (None, None) => None,
        };

        let destination = match (
            resolve_secret(
                "Notion token",
                ENV_NOTION_TOKEN,
                toml.destination.notion_token.as_deref(),
            ),
            toml.destination
                .notion_database_id
                .as_deref()
                .filter(|id| is_valid_key(id)),
        ) {
            (Some(token), Some(database_id)) => Some(NotionSettings {
                token,
                database_id: database_id.to_string(),
            }),
            (Some(_), None) => {
                warn!("Notion token set without destination.notion_database_id; mirroring disabled");
                None
            }
            (None, _) => None,
        };

        let llm = &toml.llm;

        Ok(Self {
            bind_address: toml.http.bind_address.clone(),
            port: toml.http.port,
            scheduler: SchedulerConfig {
                poll_interval: Duration::from_secs(scheduler.poll_interval_secs),
                digest_schedule: scheduler.digest_schedule.clone(),
                batch_size: scheduler.batch_size,
                first_run_batch_size: scheduler.first_run_batch_size,
            },
            orchestrator: OrchestratorConfig {
                inter_item_delay: Duration::from_millis(pipeline.inter_item_delay_ms),
                call_timeout: Duration::from_secs(pipeline.call_timeout_secs),
            },
            stale_claim_after: Duration::from_secs(pipeline.stale_claim_secs),
            max_lock_wait_ms: pipeline.max_lock_wait_ms,
            article_limit: pipeline.article_limit,
            notifier: NotifierSettings {
                min_interval: Duration::from_millis(toml.notifier.min_interval_ms),
                max_message_len: toml.notifier.max_message_len,
                telegram,
            },
            source,
            llm: LlmSettings {
                base_url: llm.base_url.trim_end_matches('/').to_string(),
                api_key: resolve_secret("LLM API key", ENV_LLM_API_KEY, llm.api_key.as_deref()),
                model: llm.model.clone(),
                triage_model: llm.triage_model.clone().unwrap_or_else(|| llm.model.clone()),
                interests: llm.interests.clone(),
            },
            reader: ReaderSettings {
                base_url: toml.reader.base_url.trim_end_matches('/').to_string(),
                api_key: resolve_secret(
                    "Reader API key",
                    ENV_READER_API_KEY,
                    toml.reader.api_key.as_deref(),
                ),
            },
            transcript: TranscriptSettings {
                command: toml.transcript.command.clone(),
                args: toml.transcript.args.clone(),
            },
            destination,
        })
    }
}
