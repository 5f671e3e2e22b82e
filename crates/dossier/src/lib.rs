pub mod ai;
pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod ocr;
pub mod pipeline;
pub mod processor;
pub mod queue;
pub mod service;
pub mod telemetry;
pub mod timeline;

pub use ai::{BackoffPolicy, ContentChain, GenerativeProvider, MessagesClient, MultimodalProcessor};
pub use config::{Config, LanguageConfig, QueueConfig};
pub use db::Database;
pub use document::{Document, DocumentOutcome, ProcessingStatus};
pub use error::{DossierError, ProcessError, QueueError, Result};
pub use pipeline::{DocumentPipeline, DocumentProgressEvent, ProcessingPhase, ProgressReporter};
pub use queue::{HealthReport, Job, JobPriority, JobQueue, JobState, JobType};
pub use service::DossierService;
pub use telemetry::init_tracing;
