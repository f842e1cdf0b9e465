//! Event types for the bkmk pipeline
//!
//! The orchestrator and scheduler publish `PipelineEvent`s on an `EventBus`; the
//! HTTP layer and tests subscribe. Emission is lossy: nobody listening is fine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Pipeline event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// A batch pass started
    PassStarted {
        pass_id: Uuid,
        batch_size: usize,
        timestamp: DateTime<Utc>,
    },

    /// Item reached COMPLETED (including triage skips)
    ItemCompleted {
        pass_id: Uuid,
        item_id: String,
        category: String,
        /// Destination reference, None when the mirror write failed
        destination_ref: Option<String>,
        skipped: bool,
        timestamp: DateTime<Utc>,
    },

    /// Item released as FAILED
    ItemFailed {
        pass_id: Uuid,
        item_id: String,
        /// Error kind label (e.g. "network", "rate_limited")
        kind: String,
        retryable: bool,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A batch pass finished (normally or aborted on expired credentials)
    PassCompleted {
        pass_id: Uuid,
        fetched: usize,
        completed: usize,
        failed: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Source credentials changed validity
    CredentialsChanged {
        valid: bool,
        identity: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Weekly digest delivered
    DigestSent {
        items_in_window: u64,
        messages: usize,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    /// Event type name, matching the serde tag
    pub fn event_type(&self) -> &'static str {
        match self {
            PipelineEvent::PassStarted { .. } => "PassStarted",
            PipelineEvent::ItemCompleted { .. } => "ItemCompleted",
            PipelineEvent::ItemFailed { .. } => "ItemFailed",
            PipelineEvent::PassCompleted { .. } => "PassCompleted",
            PipelineEvent::CredentialsChanged { .. } => "CredentialsChanged",
            PipelineEvent::DigestSent { .. } => "DigestSent",
        }
    }
}

/// Broadcast bus for pipeline events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus
    ///
    /// `capacity` events are buffered per subscriber before the oldest are dropped.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit_lossy(PipelineEvent::CredentialsChanged {
            valid: false,
            identity: None,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "CredentialsChanged");
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit_lossy(PipelineEvent::DigestSent {
            items_in_window: 3,
            messages: 1,
            timestamp: Utc::now(),
        });
        assert_eq!(bus.capacity(), 4);
    }

    #[test]
    fn test_serialized_tag_matches_event_type() {
        let event = PipelineEvent::ItemFailed {
            pass_id: Uuid::new_v4(),
            item_id: "T1".to_string(),
            kind: "network".to_string(),
            retryable: true,
            message: "timeout".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
        assert_eq!(json["item_id"], "T1");
    }
}
