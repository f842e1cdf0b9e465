//! Data model for the ingest pipeline

pub mod analysis;
pub mod enrichment;
pub mod item;
pub mod ledger;
pub mod triage;

pub use analysis::{ActionItem, AnalysisResult, ExtractedLink, LinkKind};
pub use enrichment::{ArticleContent, EnrichedContext, ImageDescription, TranscriptContent};
pub use item::{Author, Item, MediaKind, MediaRef};
pub use ledger::{ItemState, LedgerRecord, RecordPayload};
pub use triage::{
    ArticleRequest, ImageRequest, Priority, TranscriptRequest, TriageDecision, ValueTier,
};
