//! Pipeline events — the append-only log sink consumed by front ends.
//!
//! Stages publish events as they start, finish, or fail. Front ends subscribe
//! and print [`PipelineEvent::line`]. Publishing never blocks: the bus is a
//! bounded broadcast channel and slow subscribers simply lag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::stage::Stage;

/// All pipeline events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    StageStarted {
        stage: Stage,
        chapter: Option<u32>,
        timestamp: DateTime<Utc>,
    },

    StageCompleted {
        stage: Stage,
        chapter: Option<u32>,
        output_chars: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    StageFailed {
        stage: Stage,
        chapter: Option<u32>,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// An artifact was written to disk.
    ArtifactSaved {
        artifact: String,
        timestamp: DateTime<Utc>,
    },

    /// The knowledge store changed.
    KnowledgeUpdated {
        operation: String, // "insert", "remove", "clear"
        inserted: usize,
        skipped: usize,
        timestamp: DateTime<Utc>,
    },

    /// Free-form progress note.
    Notice {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    pub fn notice(message: impl Into<String>) -> Self {
        Self::Notice {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// One human-readable log line.
    pub fn line(&self) -> String {
        fn scope(stage: &Stage, chapter: &Option<u32>) -> String {
            match chapter {
                Some(n) => format!("{stage} (chapter {n})"),
                None => stage.to_string(),
            }
        }

        match self {
            Self::StageStarted { stage, chapter, .. } => {
                format!("Starting {}...", scope(stage, chapter))
            }
            Self::StageCompleted {
                stage,
                chapter,
                output_chars,
                duration_ms,
                ..
            } => format!(
                "Finished {}: {output_chars} chars in {:.1}s",
                scope(stage, chapter),
                *duration_ms as f64 / 1000.0
            ),
            Self::StageFailed {
                stage,
                chapter,
                error_message,
                ..
            } => format!("Failed {}: {error_message}", scope(stage, chapter)),
            Self::ArtifactSaved { artifact, .. } => format!("Saved {artifact}"),
            Self::KnowledgeUpdated {
                operation,
                inserted,
                skipped,
                ..
            } => {
                if *skipped > 0 {
                    format!("Knowledge store {operation}: {inserted} chunks, {skipped} skipped")
                } else {
                    format!("Knowledge store {operation}: {inserted} chunks")
                }
            }
            Self::Notice { message, .. } => message.clone(),
        }
    }
}

/// A broadcast-based event bus for pipeline events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<PipelineEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: PipelineEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Publish a free-form line.
    pub fn notice(&self, message: impl Into<String>) {
        self.publish(PipelineEvent::notice(message));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<PipelineEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(PipelineEvent::StageStarted {
            stage: Stage::Draft,
            chapter: Some(3),
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            PipelineEvent::StageStarted { stage, chapter, .. } => {
                assert_eq!(*stage, Stage::Draft);
                assert_eq!(*chapter, Some(3));
            }
            _ => panic!("Expected StageStarted event"),
        }
        assert_eq!(event.line(), "Starting draft (chapter 3)...");
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.notice("nobody is listening");
    }

    #[test]
    fn publish_never_blocks_when_full() {
        let bus = EventBus::new(2);
        let _rx = bus.subscribe();
        for i in 0..10 {
            bus.notice(format!("line {i}"));
        }
    }

    #[test]
    fn knowledge_line_mentions_skips() {
        let line = PipelineEvent::KnowledgeUpdated {
            operation: "insert".into(),
            inserted: 4,
            skipped: 1,
            timestamp: Utc::now(),
        }
        .line();
        assert!(line.contains("4 chunks"));
        assert!(line.contains("1 skipped"));
    }
}
