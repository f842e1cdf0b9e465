//! Services for bkmk-ingest
//!
//! Pipeline services (enrichment, notifier, digest, scheduler) and the shipped
//! provider adapters.

pub mod digest;
pub mod enrichment_router;
pub mod http_source_client;
pub mod llm_client;
pub mod notifier;
pub mod notion_store;
pub mod reader_client;
pub mod scheduler;
pub mod telegram_transport;
pub mod transcript_client;

pub use enrichment_router::{is_scrapable_url, EnrichmentRouter};
pub use http_source_client::HttpSourceClient;
pub use llm_client::LlmClient;
pub use notifier::{split_message, LogTransport, Notifier};
pub use notion_store::NotionStore;
pub use reader_client::ReaderArticleFetcher;
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerStatus, TickOutcome};
pub use telegram_transport::TelegramTransport;
pub use transcript_client::CommandTranscriptFetcher;
