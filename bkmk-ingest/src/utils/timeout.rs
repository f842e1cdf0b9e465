//! Bounded external calls

use std::future::Future;
use std::time::Duration;

use crate::error::{IngestError, IngestResult};

/// Run `future` with a deadline; an elapsed deadline is a `Network` error
pub async fn with_timeout<T, F>(duration: Duration, label: &str, future: F) -> IngestResult<T>
where
    F: Future<Output = IngestResult<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(IngestError::Network(format!(
            "{} timed out after {}s",
            label,
            duration.as_secs_f32()
        ))),
    }
}
