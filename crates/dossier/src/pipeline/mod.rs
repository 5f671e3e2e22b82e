//! The document processing pipeline: claim, extract, analyze, persist.

pub mod context;
pub mod progress;
pub mod runner;

pub use context::PipelineContext;
pub use progress::{
    BroadcastProgress, DocumentProgressEvent, NoopProgress, ProcessingPhase, ProgressEvent,
    ProgressReporter,
};
pub use runner::DocumentPipeline;
