//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration lives in a single TOML file. Runtime values that are
//! secrets (tokens, API keys) may additionally come from the environment; that
//! resolution happens in the service crate.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the SQLite database file inside the root folder
pub const DATABASE_FILE_NAME: &str = "bkmk.db";

/// Bootstrap configuration loaded from TOML file
///
/// Every section is optional; missing values fall back to built-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the ledger database
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub notifier: NotifierConfig,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub reader: ReaderConfig,

    #[serde(default)]
    pub transcript: TranscriptConfig,

    #[serde(default)]
    pub destination: DestinationConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Health/stats HTTP server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

/// Poll and digest triggers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between poll passes
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Six-field cron expression (sec min hour dom mon dow) for the weekly digest
    #[serde(default = "default_digest_schedule")]
    pub digest_schedule: String,

    /// Items requested from the source per pass
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Items requested on the first pass after startup (backlog drain)
    #[serde(default = "default_first_run_batch_size")]
    pub first_run_batch_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            digest_schedule: default_digest_schedule(),
            batch_size: default_batch_size(),
            first_run_batch_size: default_first_run_batch_size(),
        }
    }
}

/// Per-item processing knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pause between consecutive items of a pass
    #[serde(default = "default_inter_item_delay_ms")]
    pub inter_item_delay_ms: u64,

    /// Upper bound for any single external call
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Age after which a `processing` claim is considered abandoned
    #[serde(default = "default_stale_claim_secs")]
    pub stale_claim_secs: u64,

    /// Total time ledger writes keep retrying on `database is locked`
    #[serde(default = "default_max_lock_wait_ms")]
    pub max_lock_wait_ms: u64,

    /// Maximum article fetches per item
    #[serde(default = "default_article_limit")]
    pub article_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inter_item_delay_ms: default_inter_item_delay_ms(),
            call_timeout_secs: default_call_timeout_secs(),
            stale_claim_secs: default_stale_claim_secs(),
            max_lock_wait_ms: default_max_lock_wait_ms(),
            article_limit: default_article_limit(),
        }
    }
}

/// Alerting channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub telegram_bot_token: Option<String>,
    #[serde(default)]
    pub telegram_chat_id: Option<String>,
    /// Minimum spacing between two consecutive messages
    #[serde(default = "default_notifier_min_interval_ms")]
    pub min_interval_ms: u64,
    /// Hard cap on characters per message
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token: None,
            telegram_chat_id: None,
            min_interval_ms: default_notifier_min_interval_ms(),
            max_message_len: default_max_message_len(),
        }
    }
}

/// Bookmark source bridge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub bearer_token: Option<String>,
}

/// Chat-completions endpoint used for triage, analysis and image description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Cheaper model for triage; falls back to `model`
    #[serde(default)]
    pub triage_model: Option<String>,
    /// Free-form description of the reader's interests for relevance scoring
    #[serde(default)]
    pub interests: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: None,
            model: default_llm_model(),
            triage_model: None,
            interests: None,
        }
    }
}

/// Article reader proxy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderConfig {
    #[serde(default = "default_reader_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            base_url: default_reader_base_url(),
            api_key: None,
        }
    }
}

/// External transcript extraction tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptConfig {
    /// Executable; the video URL is appended as the last argument
    #[serde(default = "default_transcript_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            command: default_transcript_command(),
            args: Vec::new(),
        }
    }
}

/// Human-facing destination store (Notion database)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DestinationConfig {
    #[serde(default)]
    pub notion_token: Option<String>,
    #[serde(default)]
    pub notion_database_id: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5731
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_digest_schedule() -> String {
    "0 0 9 * * Sun".to_string()
}

fn default_batch_size() -> usize {
    20
}

fn default_first_run_batch_size() -> usize {
    100
}

fn default_inter_item_delay_ms() -> u64 {
    2000
}

fn default_call_timeout_secs() -> u64 {
    60
}

fn default_stale_claim_secs() -> u64 {
    30 * 60
}

fn default_max_lock_wait_ms() -> u64 {
    5000
}

fn default_article_limit() -> usize {
    3
}

fn default_notifier_min_interval_ms() -> u64 {
    1000
}

fn default_max_message_len() -> usize {
    4000
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_reader_base_url() -> String {
    "https://r.jina.ai".to_string()
}

fn default_transcript_command() -> String {
    "bkmk-transcript".to_string()
}

/// Load bootstrap configuration
///
/// An explicit path must exist. Without one, the platform default
/// (`<config_dir>/bkmk/bkmk.toml`) is used when present, otherwise built-in defaults.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            path.to_path_buf()
        }
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => {
                debug!("No config file found, using built-in defaults");
                return Ok(TomlConfig::default());
            }
        },
    };

    let content = std::fs::read_to_string(&path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Platform default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("bkmk").join("bkmk.toml"))
}

/// Root folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent default
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml: &TomlConfig,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("bkmk"))
        .unwrap_or_else(|| PathBuf::from("./bkmk_data"))
}

/// Create the root folder if missing and return the database path inside it
pub fn prepare_root_folder(root: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(root).map_err(|e| {
        Error::Config(format!(
            "Failed to create root folder {}: {}",
            root.display(),
            e
        ))
    })?;
    Ok(root.join(DATABASE_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert_eq!(config.scheduler.poll_interval_secs, 60);
        assert_eq!(config.scheduler.first_run_batch_size, 100);
        assert_eq!(config.notifier.max_message_len, 4000);
        assert_eq!(config.logging.level, "info");
        assert!(config.source.base_url.is_none());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            [scheduler]
            poll_interval_secs = 15

            [pipeline]
            article_limit = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.scheduler.poll_interval_secs, 15);
        assert_eq!(config.scheduler.batch_size, 20);
        assert_eq!(config.pipeline.article_limit, 5);
        assert_eq!(config.pipeline.inter_item_delay_ms, 2000);
    }

    #[test]
    fn test_explicit_missing_config_is_error() {
        let temp = TempDir::new().unwrap();
        let result = load_toml_config(Some(&temp.path().join("missing.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_explicit_config_loaded() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bkmk.toml");
        std::fs::write(&path, "root_folder = \"/srv/bkmk\"\n[http]\nport = 9000\n").unwrap();

        let config = load_toml_config(Some(&path)).unwrap();
        assert_eq!(config.root_folder, Some(PathBuf::from("/srv/bkmk")));
        assert_eq!(config.http.port, 9000);
    }

    #[test]
    #[serial]
    fn test_root_folder_priority() {
        let toml = TomlConfig {
            root_folder: Some(PathBuf::from("/from/toml")),
            ..Default::default()
        };

        std::env::set_var("BKMK_TEST_ROOT", "/from/env");
        assert_eq!(
            resolve_root_folder(Some(Path::new("/from/cli")), "BKMK_TEST_ROOT", &toml),
            PathBuf::from("/from/cli")
        );
        assert_eq!(
            resolve_root_folder(None, "BKMK_TEST_ROOT", &toml),
            PathBuf::from("/from/env")
        );

        std::env::remove_var("BKMK_TEST_ROOT");
        assert_eq!(
            resolve_root_folder(None, "BKMK_TEST_ROOT", &toml),
            PathBuf::from("/from/toml")
        );
    }

    #[test]
    fn test_prepare_root_folder_creates_directory() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("nested").join("root");
        let db_path = prepare_root_folder(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(db_path, root.join(DATABASE_FILE_NAME));
    }
}
