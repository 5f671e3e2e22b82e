use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Phases a document moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingPhase {
    Queued,
    Extracting,
    Validating,
    Analyzing,
    Persisting,
    Completed,
    Failed,
}

/// Events emitted by the pipeline during processing.
/// Extracted text is omitted from broadcast events (can be large).
pub enum ProgressEvent {
    Phase {
        phase: ProcessingPhase,
        message: String,
    },
    Completed {
        confidence: u8,
    },
    Failed {
        error: String,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// One serialized progress update on the broadcast channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentProgressEvent {
    pub document_id: String,
    pub phase: ProcessingPhase,
    pub message: String,
    pub timestamp: String,
}

/// Bridges pipeline events onto a tokio broadcast channel so UI or API
/// subscribers can follow a document live. Lagging receivers drop events.
pub struct BroadcastProgress {
    document_id: String,
    sender: Arc<broadcast::Sender<DocumentProgressEvent>>,
}

impl BroadcastProgress {
    pub fn new(document_id: &str, sender: Arc<broadcast::Sender<DocumentProgressEvent>>) -> Self {
        Self {
            document_id: document_id.to_string(),
            sender,
        }
    }

    fn send(&self, phase: ProcessingPhase, message: String) {
        // A send error only means nobody is listening.
        let _ = self.sender.send(DocumentProgressEvent {
            document_id: self.document_id.clone(),
            phase,
            message,
            timestamp: Utc::now().to_rfc3339(),
        });
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Phase { phase, message } => self.send(phase, message),
            ProgressEvent::Completed { confidence } => self.send(
                ProcessingPhase::Completed,
                format!("Processing complete (confidence {confidence})"),
            ),
            ProgressEvent::Failed { error } => self.send(ProcessingPhase::Failed, error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_progress_delivers_events() {
        let (tx, mut rx) = broadcast::channel(8);
        let progress = BroadcastProgress::new("d1", Arc::new(tx));

        progress.report(ProgressEvent::Phase {
            phase: ProcessingPhase::Extracting,
            message: "Extracting content".to_string(),
        });
        progress.report(ProgressEvent::Completed { confidence: 92 });

        let first = rx.try_recv().unwrap();
        assert_eq!(first.document_id, "d1");
        assert_eq!(first.phase, ProcessingPhase::Extracting);

        let second = rx.try_recv().unwrap();
        assert_eq!(second.phase, ProcessingPhase::Completed);
        assert!(second.message.contains("92"));
    }

    #[test]
    fn test_send_without_subscribers_does_not_panic() {
        let (tx, _) = broadcast::channel(1);
        let progress = BroadcastProgress::new("d1", Arc::new(tx));
        progress.report(ProgressEvent::Failed {
            error: "boom".to_string(),
        });
    }
}
