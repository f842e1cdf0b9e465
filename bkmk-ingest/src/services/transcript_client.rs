//! Video transcripts via an external command
//!
//! The configured tool is invoked as `<command> <args...> <url>` and must print
//! the transcript on stdout. The child is killed if the call times out.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{IngestError, IngestResult};
use crate::types::TranscriptFetcher;

pub struct CommandTranscriptFetcher {
    command: String,
    args: Vec<String>,
}

impl CommandTranscriptFetcher {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

#[async_trait]
impl TranscriptFetcher for CommandTranscriptFetcher {
    async fn fetch_transcript(&self, url: &str) -> IngestResult<String> {
        debug!(command = %self.command, url, "Running transcript tool");

        let output = Command::new(&self.command)
            .args(&self.args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                IngestError::Unknown(format!("Failed to run {}: {}", self.command, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(IngestError::Unknown(format!(
                "{} exited with {:?}: {}",
                self.command,
                output.status.code(),
                stderr.trim()
            )));
        }

        let transcript = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if transcript.is_empty() {
            return Err(IngestError::Parse(format!("{} produced no transcript", self.command)));
        }
        Ok(transcript)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_stdout_is_transcript() {
        let fetcher = CommandTranscriptFetcher::new("echo", vec!["transcript for".to_string()]);
        let text = fetcher.fetch_transcript("https://video.example/1").await.unwrap();
        assert_eq!(text, "transcript for https://video.example/1");
    }

    #[tokio::test]
    async fn test_missing_command_fails() {
        let fetcher = CommandTranscriptFetcher::new("bkmk-no-such-tool", vec![]);
        let err = fetcher.fetch_transcript("https://video.example/1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails() {
        let fetcher = CommandTranscriptFetcher::new("false", vec![]);
        assert!(fetcher.fetch_transcript("https://video.example/1").await.is_err());
    }
}
