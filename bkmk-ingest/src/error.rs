//! Error types for bkmk-ingest
//!
//! `IngestError` is the pipeline taxonomy: every provider call returns it, and the
//! orchestrator decides per `ErrorKind` whether an item is retried, skipped or
//! whether the whole pass pauses. `ApiError` is the HTTP-facing error.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Classification driving retry and alerting policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Source credentials rejected; pause until they recover
    CredentialsExpired,
    RateLimited,
    Network,
    /// Mirror write failed; recovered locally, never fails the item
    DestinationWriteFailed,
    /// Malformed upstream data for a single item
    Parse,
    /// Ledger storage failure; fatal to the current pass
    Storage,
    Unknown,
}

impl ErrorKind {
    /// Whether the next pass is expected to succeed without intervention
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::RateLimited | ErrorKind::Network)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::CredentialsExpired => "credentials_expired",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Network => "network",
            ErrorKind::DestinationWriteFailed => "destination_write_failed",
            ErrorKind::Parse => "parse",
            ErrorKind::Storage => "storage",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline error
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Credentials expired: {0}")]
    CredentialsExpired(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Destination write failed: {0}")]
    DestinationWrite(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] bkmk_common::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Unknown(String),
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::CredentialsExpired(_) => ErrorKind::CredentialsExpired,
            IngestError::RateLimited(_) => ErrorKind::RateLimited,
            IngestError::Network(_) => ErrorKind::Network,
            IngestError::DestinationWrite(_) => ErrorKind::DestinationWriteFailed,
            IngestError::Parse(_) => ErrorKind::Parse,
            IngestError::Ledger(_) => ErrorKind::Storage,
            IngestError::Config(_) | IngestError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Map a non-success HTTP status from an upstream API
    pub fn from_status(service: &str, status: reqwest::StatusCode, body: &str) -> Self {
        let detail = format!("{} returned {}: {}", service, status, truncate(body, 200));
        match status.as_u16() {
            401 | 403 => IngestError::CredentialsExpired(detail),
            429 => IngestError::RateLimited(detail),
            408 | 500..=599 => IngestError::Network(detail),
            _ => IngestError::Unknown(detail),
        }
    }

    /// Map a non-success status from any service other than the bookmark source
    ///
    /// Only the source's 401/403 pauses the pipeline. A rejected model, reader or
    /// alert key fails the single call as `Unknown`.
    pub fn from_peer_status(service: &str, status: reqwest::StatusCode, body: &str) -> Self {
        match Self::from_status(service, status, body) {
            IngestError::CredentialsExpired(detail) => IngestError::Unknown(detail),
            other => other,
        }
    }
}

impl From<reqwest::Error> for IngestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            IngestError::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            IngestError::from_status("upstream", status, &err.to_string())
        } else {
            IngestError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        IngestError::Parse(err.to_string())
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Result type for pipeline operations
pub type IngestResult<T> = Result<T, IngestError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Ledger or other bkmk-common failure (500)
    #[error("Common error: {0}")]
    Common(#[from] bkmk_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
