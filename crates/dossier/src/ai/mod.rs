//! Generative AI subsystem: provider access, multimodal extraction, and the
//! post-extraction enrichment chain.

pub mod backoff;
pub mod chain;
pub mod multimodal;
pub mod provider;

pub use backoff::BackoffPolicy;
pub use chain::{ChainOutput, ContentChain, DetectedLanguage};
pub use multimodal::{AiTask, MultimodalProcessor, NOMINAL_AI_CONFIDENCE};
pub use provider::{GenerativeProvider, MediaPayload, MessagesClient, ProviderError};
