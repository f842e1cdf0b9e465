//! Test Helper Utilities
//!
//! Shared utilities for testing bkmk-ingest

#![allow(dead_code, unused_imports)]

pub mod db_utils;
pub mod fakes;

pub use db_utils::{create_test_ledger, set_processed_at};
pub use fakes::{
    analysis_with, error_of, harness, harness_with, item, item_at, router_over, FakeArticles,
    FakeDestination, FakeImages, FakeSource, FakeTranscripts, Harness, HarnessOptions,
    RecordingTransport, ScriptedAnalysis, ScriptedTriage,
};
