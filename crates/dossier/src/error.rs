use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DossierError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Processing error: {0}")]
    Process(#[from] ProcessError),

    #[error("Provider error: {0}")]
    Provider(#[from] crate::ai::provider::ProviderError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required AI credentials: set {variable}")]
    MissingCredentials { variable: &'static str },

    #[error("Invalid value for {variable}: '{value}' ({reason})")]
    InvalidValue {
        variable: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Unsupported MIME type: {0}")]
    UnsupportedMime(String),

    #[error("Unknown document: {0}")]
    UnknownDocument(String),

    #[error("Failed to read document '{path}': {source}")]
    ReadDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not detect a text encoding for '{path}'")]
    EncodingDetection { path: PathBuf },

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("AI processing failed after {attempts} attempts: {last_error}")]
    AiProcessing { attempts: u32, last_error: String },

    #[error("AI provider returned insufficient content ({length} chars)")]
    InsufficientContent { length: usize },

    #[error("Failed to process office document: {0}")]
    OfficeProcessing(String),

    #[error("Failed to process image: {0}")]
    ImageProcessing(String),

    #[error("Video processing failed: {0}")]
    VideoProcessing(String),
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue is unavailable: {0}")]
    Unavailable(String),

    #[error("A job for document '{document_id}' is already queued or running")]
    DuplicateJob { document_id: String },

    #[error("Unknown job '{job_id}' in queue '{queue}'")]
    UnknownJob { queue: String, job_id: String },

    #[error("Job '{job_id}' is {state} and cannot be {operation}")]
    InvalidState {
        job_id: String,
        state: String,
        operation: &'static str,
    },

    #[error("Job failed: {0}")]
    JobFailed(String),
}

pub type Result<T> = std::result::Result<T, DossierError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_context() {
        let err = ProcessError::UnsupportedMime("application/x-unknown".to_string());
        assert!(err.to_string().contains("application/x-unknown"));

        let err = QueueError::DuplicateJob {
            document_id: "doc-1".to_string(),
        };
        assert!(err.to_string().contains("doc-1"));
    }

    #[test]
    fn test_process_error_converts_to_top_level() {
        let err: DossierError = ProcessError::OcrFailed("engine init".to_string()).into();
        assert!(matches!(err, DossierError::Process(_)));
    }

    #[test]
    fn test_config_error_names_variable() {
        let err = ConfigError::MissingCredentials {
            variable: "DOSSIER_AI_API_KEY",
        };
        assert!(err.to_string().contains("DOSSIER_AI_API_KEY"));
    }
}
