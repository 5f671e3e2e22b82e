use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::QueueConfig;

/// The three queues, each with its own worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    DocumentProcessing,
    UserRequest,
    AiAnalysis,
}

impl JobType {
    pub const ALL: [JobType; 3] = [
        JobType::DocumentProcessing,
        JobType::UserRequest,
        JobType::AiAnalysis,
    ];

    pub fn queue_name(&self) -> &'static str {
        match self {
            JobType::DocumentProcessing => "document-processing",
            JobType::UserRequest => "user-request",
            JobType::AiAnalysis => "ai-analysis",
        }
    }

    pub fn worker_count(&self, config: &QueueConfig) -> usize {
        match self {
            JobType::DocumentProcessing => config.document_processing_workers,
            JobType::UserRequest => config.user_request_workers,
            JobType::AiAnalysis => config.ai_analysis_workers,
        }
    }
}

/// Scheduling state of a job. `Delayed` means a retry is waiting out its
/// backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Queued,
    Active,
    Delayed,
    Completed,
    Failed,
    Removed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "QUEUED",
            JobState::Active => "ACTIVE",
            JobState::Delayed => "DELAYED",
            JobState::Completed => "COMPLETED",
            JobState::Failed => "FAILED",
            JobState::Removed => "REMOVED",
        }
    }

    /// States that hold a document's idempotency reservation.
    pub fn is_pending_work(&self) -> bool {
        matches!(self, JobState::Queued | JobState::Active | JobState::Delayed)
    }
}

/// Scheduling hint within a queue. High-priority jobs run before normal
/// ones; there is no ordering guarantee beyond that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobPriority {
    #[default]
    Normal,
    High,
}

impl JobPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPriority::Normal => "NORMAL",
            JobPriority::High => "HIGH",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub job_type: JobType,
    /// Set for jobs tied to one document; enforces one pending job per
    /// document.
    pub document_id: Option<String>,
    pub payload: serde_json::Value,
    pub priority: JobPriority,
    pub state: JobState,
    pub attempts: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        job_type: JobType,
        document_id: Option<String>,
        payload: serde_json::Value,
        priority: JobPriority,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job_type,
            document_id,
            payload,
            priority,
            state: JobState::Queued,
            attempts: 0,
            error: None,
            created_at: Utc::now(),
        }
    }
}

/// Payload carried by document-processing jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentJobPayload {
    pub document_id: String,
    pub case_id: String,
    pub storage_path: String,
    pub mime_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_names_are_distinct() {
        let names: std::collections::HashSet<_> =
            JobType::ALL.iter().map(|t| t.queue_name()).collect();
        assert_eq!(names.len(), JobType::ALL.len());
    }

    #[test]
    fn test_worker_counts_follow_config() {
        let config = QueueConfig {
            document_processing_workers: 2,
            user_request_workers: 5,
            ai_analysis_workers: 3,
            stale_lease_secs: 600,
        };
        assert_eq!(JobType::DocumentProcessing.worker_count(&config), 2);
        assert_eq!(JobType::UserRequest.worker_count(&config), 5);
        assert_eq!(JobType::AiAnalysis.worker_count(&config), 3);
    }

    #[test]
    fn test_pending_states_hold_reservation() {
        assert!(JobState::Queued.is_pending_work());
        assert!(JobState::Active.is_pending_work());
        assert!(JobState::Delayed.is_pending_work());
        assert!(!JobState::Completed.is_pending_work());
        assert!(!JobState::Failed.is_pending_work());
        assert!(!JobState::Removed.is_pending_work());
    }

    #[test]
    fn test_new_job_starts_queued() {
        let job = Job::new(
            JobType::DocumentProcessing,
            Some("d1".to_string()),
            serde_json::json!({"document_id": "d1"}),
            JobPriority::Normal,
        );
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.attempts, 0);
        assert!(job.error.is_none());
        assert_eq!(job.priority, JobPriority::Normal);
    }
}
