//! The document data model and its processing state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix attached to `extracted_text` when a document fails terminally, so
/// consumers can distinguish "processed, no text" from "failed, see message".
pub const ERROR_MARKER: &str = "[ERROR]";

/// Processing lifecycle of a document. Transitions are monotonic: a
/// `Processed` document never reverts, a `Failed` one may restart from
/// `Pending` for a fresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Processed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "PENDING",
            ProcessingStatus::Processing => "PROCESSING",
            ProcessingStatus::Processed => "PROCESSED",
            ProcessingStatus::Failed => "FAILED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDING" => Some(ProcessingStatus::Pending),
            "PROCESSING" => Some(ProcessingStatus::Processing),
            "PROCESSED" => Some(ProcessingStatus::Processed),
            "FAILED" => Some(ProcessingStatus::Failed),
            _ => None,
        }
    }

    /// Whether a transition to `next` is allowed by the state machine.
    pub fn can_transition(&self, next: ProcessingStatus) -> bool {
        use ProcessingStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Failed, Pending)
                | (Failed, Processing)
                | (Processing, Processed)
                | (Processing, Failed)
                | (Processing, Pending) // supervisory sweep reset
        )
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single normalized timeline entry. Immutable once written to a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub date: String,
    pub event: String,
}

/// A case document and its derived, searchable content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub case_id: String,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub storage_path: String,
    pub status: ProcessingStatus,
    pub extracted_text: Option<String>,
    pub summary: Option<String>,
    pub timeline: Vec<TimelineEvent>,
    pub translation_en: Option<String>,
    pub translation_ar: Option<String>,
    /// Optimistic version, bumped on every writer mutation.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(
        id: impl Into<String>,
        case_id: impl Into<String>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        size_bytes: u64,
        storage_path: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            case_id: case_id.into(),
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            size_bytes,
            storage_path: storage_path.into(),
            status: ProcessingStatus::Pending,
            extracted_text: None,
            summary: None,
            timeline: Vec::new(),
            translation_en: None,
            translation_ar: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The final content a completed pipeline run persists in one shot.
#[derive(Debug, Clone, Default)]
pub struct DocumentOutcome {
    pub extracted_text: String,
    pub summary: Option<String>,
    pub timeline: Vec<TimelineEvent>,
    pub translation_en: Option<String>,
    pub translation_ar: Option<String>,
    /// Human-readable title derived from the content; rewrites `file_name`
    /// when present.
    pub title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            ProcessingStatus::Pending,
            ProcessingStatus::Processing,
            ProcessingStatus::Processed,
            ProcessingStatus::Failed,
        ] {
            assert_eq!(ProcessingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ProcessingStatus::parse("DONE"), None);
    }

    #[test]
    fn test_transitions_are_monotonic() {
        use ProcessingStatus::*;
        assert!(Pending.can_transition(Processing));
        assert!(Processing.can_transition(Processed));
        assert!(Processing.can_transition(Failed));
        assert!(Failed.can_transition(Pending));

        // A processed document never reverts.
        assert!(!Processed.can_transition(Pending));
        assert!(!Processed.can_transition(Processing));
        assert!(!Processed.can_transition(Failed));
        // No skipping the processing state.
        assert!(!Pending.can_transition(Processed));
    }

    #[test]
    fn test_sweep_reset_is_allowed() {
        assert!(ProcessingStatus::Processing.can_transition(ProcessingStatus::Pending));
    }

    #[test]
    fn test_timeline_event_serializes_as_plain_object() {
        let event = TimelineEvent {
            date: "2024-08-13".to_string(),
            event: "Hearing scheduled".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"date":"2024-08-13","event":"Hearing scheduled"}"#);
    }

    #[test]
    fn test_new_document_starts_pending() {
        let doc = Document::new("d1", "c1", "scan.pdf", "application/pdf", 10, "/tmp/scan.pdf");
        assert_eq!(doc.status, ProcessingStatus::Pending);
        assert_eq!(doc.version, 0);
        assert!(doc.extracted_text.is_none());
        assert!(doc.timeline.is_empty());
    }
}
