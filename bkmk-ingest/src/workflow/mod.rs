//! Batch processing workflow

pub mod orchestrator;

pub use orchestrator::{
    ItemOutcome, OrchestratorConfig, PassSummary, PipelineOrchestrator, Providers,
};
