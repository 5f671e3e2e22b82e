use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info_span, warn, Instrument};

use crate::ai::{ContentChain, GenerativeProvider, MultimodalProcessor};
use crate::config::{Config, LanguageConfig};
use crate::db::{document_repo, Database};
use crate::document::{Document, DocumentOutcome};
use crate::error::{DossierError, ProcessError, QueueError};
use crate::ocr::engine::OcrEngine;
use crate::ocr::video::{VideoSampler, VIDEO_UNAVAILABLE_MARKER};
use crate::ocr::OcrScheduler;
use crate::processor::router::ExtractionRouter;

use super::context::PipelineContext;
use super::progress::{ProcessingPhase, ProgressEvent, ProgressReporter};

pub struct DocumentPipeline {
    db: Database,
    router: Arc<ExtractionRouter>,
    chain: Arc<ContentChain>,
    languages: LanguageConfig,
}

impl DocumentPipeline {
    /// Production constructor — builds all sub-components from config.
    pub async fn from_config(
        config: &Config,
        db: Database,
        provider: Arc<dyn GenerativeProvider>,
    ) -> Self {
        let scheduler = Arc::new(OcrScheduler::new(
            OcrEngine::new(&config.ocr.languages, config.ocr.max_dimension),
            config.ocr.workers,
        ));
        let video = VideoSampler::detect(config.video.clone(), Arc::clone(&scheduler)).await;
        let ai = Arc::new(MultimodalProcessor::new(Arc::clone(&provider), &config.ai));
        let chain = Arc::new(ContentChain::new(
            provider,
            ai.backoff(),
            config.languages.clone(),
        ));
        let router = Arc::new(ExtractionRouter::new(scheduler, video, ai));

        Self {
            db,
            router,
            chain,
            languages: config.languages.clone(),
        }
    }

    /// Test constructor — inject specific sub-components.
    #[cfg(test)]
    pub fn new(
        db: Database,
        router: Arc<ExtractionRouter>,
        chain: Arc<ContentChain>,
        languages: LanguageConfig,
    ) -> Self {
        Self {
            db,
            router,
            chain,
            languages,
        }
    }

    pub fn router(&self) -> &ExtractionRouter {
        &self.router
    }

    pub fn chain(&self) -> Arc<ContentChain> {
        Arc::clone(&self.chain)
    }

    /// Runs the full pipeline for one document: claim, extract, analyze,
    /// persist. Any step failure before persistence marks the document
    /// FAILED; a lost claim (swept lease) aborts without overwriting.
    pub async fn run(
        &self,
        document_id: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<Document, DossierError> {
        let span = info_span!("pipeline", document_id = %document_id);
        self.run_inner(document_id, progress).instrument(span).await
    }

    async fn run_inner(
        &self,
        document_id: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<Document, DossierError> {
        let document = document_repo::find_by_id(&self.db, document_id)?
            .ok_or_else(|| ProcessError::UnknownDocument(document_id.to_string()))?;

        if !document_repo::mark_processing(&self.db, document_id)? {
            return Err(QueueError::InvalidState {
                job_id: document_id.to_string(),
                state: document.status.to_string(),
                operation: "processed",
            }
            .into());
        }

        let mut ctx = PipelineContext::new(document);

        // Step 1: Extract content
        progress.report(ProgressEvent::Phase {
            phase: ProcessingPhase::Extracting,
            message: "Extracting document content...".to_string(),
        });
        let extraction = match self
            .router
            .extract(
                Path::new(&ctx.document.storage_path),
                &ctx.document.mime_type,
            )
            .await
        {
            Ok(extraction) => extraction,
            Err(e) => return self.abort(document_id, e, progress),
        };
        let text = extraction.text.trim().to_string();
        let confidence = extraction.confidence;
        ctx.extraction = Some(extraction);

        // Step 2: Validate
        progress.report(ProgressEvent::Phase {
            phase: ProcessingPhase::Validating,
            message: "Validating extracted content...".to_string(),
        });
        if text.is_empty() {
            return self.abort(
                document_id,
                ProcessError::InsufficientContent { length: 0 },
                progress,
            );
        }

        // A tools-unavailable video completes with just the marker text;
        // there is nothing for the analysis chain to work with.
        let outcome = if text.starts_with(VIDEO_UNAVAILABLE_MARKER) {
            debug!("video tooling unavailable, persisting marker without analysis");
            DocumentOutcome {
                extracted_text: text,
                ..Default::default()
            }
        } else {
            // Step 3: Analyze. The raw text lands first so a failure in the
            // enrichment calls cannot lose a successful extraction.
            if !document_repo::store_extracted_text(&self.db, document_id, &text)? {
                warn!("claim lost before analysis, document is no longer PROCESSING");
                return Err(QueueError::InvalidState {
                    job_id: document_id.to_string(),
                    state: "unknown".to_string(),
                    operation: "analyzed",
                }
                .into());
            }
            progress.report(ProgressEvent::Phase {
                phase: ProcessingPhase::Analyzing,
                message: "Running content analysis...".to_string(),
            });
            let chain = self.chain.run(&text).await;
            if chain.summary.is_none() {
                ctx.warnings.push("summary unavailable".to_string());
            }
            let (translation_en, translation_ar) =
                assign_translations(&self.languages, &chain);
            let outcome = DocumentOutcome {
                extracted_text: text,
                summary: chain.summary.clone(),
                timeline: chain.timeline.clone(),
                translation_en,
                translation_ar,
                title: chain.title.clone(),
            };
            ctx.chain = Some(chain);
            outcome
        };

        // Step 4: Persist
        progress.report(ProgressEvent::Phase {
            phase: ProcessingPhase::Persisting,
            message: "Saving results...".to_string(),
        });
        match document_repo::complete(&self.db, document_id, &outcome) {
            Ok(true) => {}
            Ok(false) => {
                // The lease was swept or the row changed under us; whatever
                // state it is in now wins.
                warn!("completion refused, document is no longer PROCESSING");
                return Err(QueueError::InvalidState {
                    job_id: document_id.to_string(),
                    state: "unknown".to_string(),
                    operation: "completed",
                }
                .into());
            }
            Err(e) => {
                // A row stuck in PROCESSING misleads callers; force FAILED
                // even though extraction itself succeeded.
                warn!("persisting results failed: {e}");
                let message = format!("Result persistence failed: {e}");
                if let Err(fail_err) = document_repo::fail(&self.db, document_id, &message) {
                    warn!("could not mark document failed: {fail_err}");
                }
                progress.report(ProgressEvent::Failed { error: message });
                return Err(e.into());
            }
        }

        progress.report(ProgressEvent::Completed { confidence });

        let updated = document_repo::find_by_id(&self.db, document_id)?
            .ok_or_else(|| ProcessError::UnknownDocument(document_id.to_string()))?;
        Ok(updated)
    }

    fn abort(
        &self,
        document_id: &str,
        error: ProcessError,
        progress: &dyn ProgressReporter,
    ) -> Result<Document, DossierError> {
        let message = error.to_string();
        warn!("pipeline failed: {message}");
        if !document_repo::fail(&self.db, document_id, &message)? {
            warn!("failure not recorded, document is no longer PROCESSING");
        }
        progress.report(ProgressEvent::Failed {
            error: message,
        });
        Err(error.into())
    }
}

/// Maps the chain's primary/secondary outputs onto the en/ar columns
/// according to the configured language pair.
pub(crate) fn assign_translations(
    languages: &LanguageConfig,
    chain: &crate::ai::ChainOutput,
) -> (Option<String>, Option<String>) {
    let mut translation_en = None;
    let mut translation_ar = None;
    for (code, value) in [
        (languages.primary.as_str(), &chain.translation_primary),
        (languages.secondary.as_str(), &chain.translation_secondary),
    ] {
        match code {
            "en" => translation_en = value.clone(),
            "ar" => translation_ar = value.clone(),
            other => debug!("no storage column for language '{other}', dropping"),
        }
    }
    (translation_en, translation_ar)
}
