//! Multimodal content extraction through the generative provider: audio
//! transcription, visual analysis of images, and whole-document extraction
//! for formats the local extractors cannot handle.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::ai::backoff::BackoffPolicy;
use crate::ai::provider::{GenerativeProvider, MediaPayload};
use crate::config::AiConfig;
use crate::error::ProcessError;
use crate::processor::{ExtractionMethod, ExtractionResult};

/// Confidence assigned to a successful provider extraction. The provider does
/// not report per-character certainty, so a single nominal value is used.
pub const NOMINAL_AI_CONFIDENCE: u8 = 85;

const TRANSCRIPTION_PROMPT: &str = "Transcribe all spoken content in this \
audio recording verbatim. Preserve the original language. If multiple \
speakers are present, label them Speaker 1, Speaker 2, and so on. Return \
only the transcript.";

const VISUAL_ANALYSIS_PROMPT: &str = "Extract all visible text from this \
image exactly as written, preserving the original language. Then describe \
the scene, any people, objects, and anything of documentary relevance. \
Return the extracted text first, followed by the description.";

const DOCUMENT_EXTRACTION_PROMPT: &str = "Extract the complete text content \
of this document, preserving structure, headings, and the original language. \
Include tables as plain text rows. Return only the extracted content.";

const PRECHECK_PROMPT: &str = "Does this image contain readable text such as \
a document, sign, or label? Answer with exactly one word: yes or no.";

const CLARIFY_PROMPT_PREFIX: &str = "The following content was extracted \
from a document but may be garbled or mixed with OCR noise. Reconstruct the \
most likely intended text, preserving the original language. Return only \
the cleaned text.\n\n";

/// What the provider is asked to do with an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiTask {
    Transcription,
    VisualAnalysis,
    DocumentExtraction,
}

impl AiTask {
    fn prompt(&self) -> &'static str {
        match self {
            AiTask::Transcription => TRANSCRIPTION_PROMPT,
            AiTask::VisualAnalysis => VISUAL_ANALYSIS_PROMPT,
            AiTask::DocumentExtraction => DOCUMENT_EXTRACTION_PROMPT,
        }
    }

    fn method(&self) -> ExtractionMethod {
        match self {
            AiTask::Transcription => ExtractionMethod::AudioTranscription,
            AiTask::VisualAnalysis => ExtractionMethod::VisualOcr,
            AiTask::DocumentExtraction => ExtractionMethod::DocumentAnalysis,
        }
    }
}

pub struct MultimodalProcessor {
    provider: Arc<dyn GenerativeProvider>,
    backoff: BackoffPolicy,
    min_response_chars: usize,
}

impl MultimodalProcessor {
    pub fn new(provider: Arc<dyn GenerativeProvider>, config: &AiConfig) -> Self {
        Self {
            provider,
            backoff: BackoffPolicy::new(config.max_attempts, config.backoff_base_secs),
            min_response_chars: config.min_response_chars,
        }
    }

    pub fn provider(&self) -> Arc<dyn GenerativeProvider> {
        Arc::clone(&self.provider)
    }

    pub fn backoff(&self) -> BackoffPolicy {
        self.backoff
    }

    /// Runs `task` against a file on disk.
    pub async fn process_file(
        &self,
        path: &Path,
        media_type: &str,
        task: AiTask,
    ) -> Result<ExtractionResult, ProcessError> {
        let data = std::fs::read(path).map_err(|source| ProcessError::ReadDocument {
            path: path.to_path_buf(),
            source,
        })?;
        self.process_bytes(data, media_type, task).await
    }

    /// Runs `task` against in-memory bytes, e.g. an image lifted out of an
    /// office container.
    pub async fn process_bytes(
        &self,
        data: Vec<u8>,
        media_type: &str,
        task: AiTask,
    ) -> Result<ExtractionResult, ProcessError> {
        let started = Instant::now();
        let media = MediaPayload::new(media_type, data);
        let text = self.generate_with_retry(task.prompt(), Some(&media)).await?;
        Ok(ExtractionResult::new(
            text,
            NOMINAL_AI_CONFIDENCE,
            started.elapsed().as_millis() as u64,
            task.method(),
        ))
    }

    /// Cheap yes/no probe: does this image carry readable text worth an OCR
    /// pass? Errs on the side of yes so a provider hiccup never skips OCR.
    pub async fn has_extractable_text(&self, data: &[u8], media_type: &str) -> bool {
        let media = MediaPayload::new(media_type, data.to_vec());
        match self.provider.generate(PRECHECK_PROMPT, Some(&media)).await {
            Ok(answer) => !answer.trim().to_lowercase().starts_with("no"),
            Err(err) => {
                debug!("text pre-check failed, assuming text is present: {err}");
                true
            }
        }
    }

    /// Asks the provider to reconstruct garbled extraction output.
    pub async fn clarify(&self, text: &str) -> Result<String, ProcessError> {
        let prompt = format!("{CLARIFY_PROMPT_PREFIX}{text}");
        self.generate_with_retry(&prompt, None).await
    }

    /// Retry loop shared by every provider call: up to `max_attempts`
    /// attempts with `base^attempt` seconds between them. Responses shorter
    /// than the configured minimum are treated as failures and retried.
    async fn generate_with_retry(
        &self,
        prompt: &str,
        media: Option<&MediaPayload>,
    ) -> Result<String, ProcessError> {
        let mut last_error = String::new();
        for attempt in 1..=self.backoff.max_attempts {
            match self.provider.generate(prompt, media).await {
                Ok(text) => {
                    let trimmed = text.trim();
                    if trimmed.chars().count() >= self.min_response_chars {
                        return Ok(trimmed.to_string());
                    }
                    last_error =
                        format!("response too short ({} chars)", trimmed.chars().count());
                }
                Err(err) => {
                    last_error = err.to_string();
                }
            }
            if !self.backoff.is_exhausted(attempt) {
                let delay = self.backoff.delay(attempt);
                warn!(
                    attempt,
                    delay_secs = delay.as_secs_f64(),
                    "AI call failed, retrying: {last_error}"
                );
                tokio::time::sleep(delay).await;
            }
        }
        Err(ProcessError::AiProcessing {
            attempts: self.backoff.max_attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::ProviderError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedProvider {
        calls: AtomicU32,
        fail_first: u32,
        response: String,
    }

    impl ScriptedProvider {
        fn new(fail_first: u32, response: &str) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_first,
                response: response.to_string(),
            }
        }
    }

    #[async_trait]
    impl GenerativeProvider for ScriptedProvider {
        async fn generate(
            &self,
            _prompt: &str,
            _media: Option<&MediaPayload>,
        ) -> Result<String, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(ProviderError::Api {
                    status: 529,
                    message: "overloaded".to_string(),
                })
            } else {
                Ok(self.response.clone())
            }
        }
    }

    fn processor(provider: ScriptedProvider) -> (Arc<ScriptedProvider>, MultimodalProcessor) {
        let provider = Arc::new(provider);
        let mut config = crate::config::AiConfig::for_tests();
        config.backoff_base_secs = 0.0;
        let processor = MultimodalProcessor::new(provider.clone(), &config);
        (provider, processor)
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let (provider, processor) = processor(ScriptedProvider::new(2, "extracted content"));
        let result = processor
            .process_bytes(vec![0u8; 8], "image/png", AiTask::VisualAnalysis)
            .await
            .unwrap();
        assert_eq!(result.text, "extracted content");
        assert_eq!(result.confidence, NOMINAL_AI_CONFIDENCE);
        assert_eq!(result.method, ExtractionMethod::VisualOcr);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_attempts_and_reports_last_error() {
        let (provider, processor) = processor(ScriptedProvider::new(10, "never"));
        let err = processor
            .process_bytes(vec![0u8; 8], "audio/mpeg", AiTask::Transcription)
            .await
            .unwrap_err();
        match err {
            ProcessError::AiProcessing {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("529"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_short_response_is_retried() {
        let (provider, processor) = processor(ScriptedProvider::new(0, "ok"));
        let err = processor
            .process_bytes(vec![0u8; 8], "application/pdf", AiTask::DocumentExtraction)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::AiProcessing { .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_precheck_defaults_to_true_on_error() {
        let (_, processor) = processor(ScriptedProvider::new(10, "never"));
        assert!(processor.has_extractable_text(&[0u8; 4], "image/png").await);
    }

    #[tokio::test]
    async fn test_precheck_negative_answer() {
        let (_, processor) = processor(ScriptedProvider::new(0, "No."));
        assert!(!processor.has_extractable_text(&[0u8; 4], "image/png").await);
    }
}
