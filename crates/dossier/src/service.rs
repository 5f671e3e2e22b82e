//! The service facade: one handle that owns the database, the pipeline, and
//! the queues, with an explicit open/close lifecycle. Every dependency is
//! built in `open` and handed down; nothing reaches for globals.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::info;

use crate::ai::{BackoffPolicy, ContentChain, GenerativeProvider, MessagesClient};
use crate::config::{Config, LanguageConfig};
use crate::db::{document_repo, Database};
use crate::document::{Document, DocumentOutcome};
use crate::error::{DossierError, ProcessError, QueueError, Result};
use crate::pipeline::runner::assign_translations;
use crate::pipeline::{BroadcastProgress, DocumentPipeline, DocumentProgressEvent};
use crate::queue::{
    DocumentJobPayload, HealthReport, Job, JobHandler, JobPriority, JobQueue, JobType,
    QueueHandlers,
};

const PROGRESS_CHANNEL_CAPACITY: usize = 256;

pub struct DossierService {
    db: Database,
    queue: JobQueue,
    progress: Arc<broadcast::Sender<DocumentProgressEvent>>,
}

impl DossierService {
    /// Opens the service against the configured database and the live
    /// provider endpoint.
    pub async fn open(config: Config) -> Result<Self> {
        let db = Database::open(&config.database_path)?;
        let provider: Arc<dyn GenerativeProvider> = Arc::new(MessagesClient::new(&config.ai)?);
        Self::open_with_provider(config, db, provider).await
    }

    /// Opens the service with an injected database and provider. This is the
    /// seam integration tests use to swap in mocks.
    pub async fn open_with_provider(
        config: Config,
        db: Database,
        provider: Arc<dyn GenerativeProvider>,
    ) -> Result<Self> {
        let (progress_tx, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        let progress = Arc::new(progress_tx);

        let pipeline = Arc::new(DocumentPipeline::from_config(&config, db.clone(), provider).await);

        let processing_handler = Arc::new(ProcessingHandler {
            pipeline: Arc::clone(&pipeline),
            progress: Arc::clone(&progress),
        });
        let analysis_handler = Arc::new(AnalysisHandler {
            db: db.clone(),
            chain: pipeline.chain(),
            languages: config.languages.clone(),
        });

        let backoff = BackoffPolicy::new(config.ai.max_attempts, config.ai.backoff_base_secs);
        let queue = JobQueue::open(
            db.clone(),
            &config.queues,
            backoff,
            QueueHandlers {
                document_processing: processing_handler.clone(),
                user_request: processing_handler,
                ai_analysis: analysis_handler,
            },
        );

        info!("dossier service opened");
        Ok(Self {
            db,
            queue,
            progress,
        })
    }

    /// Registers a new document and queues it for processing. Returns the
    /// job id.
    pub fn ingest(&self, document: Document) -> Result<String> {
        document_repo::insert(&self.db, &document)?;
        self.enqueue(JobType::DocumentProcessing, &document, JobPriority::Normal)
    }

    /// Queues a fresh processing run for an existing document, e.g. after a
    /// failure. Runs on the user-request pool ahead of background work.
    pub fn reprocess(&self, document_id: &str) -> Result<String> {
        let document = self.require_document(document_id)?;
        self.enqueue(JobType::UserRequest, &document, JobPriority::High)
    }

    /// Queues a re-run of the analysis chain over already extracted text.
    pub fn reanalyze(&self, document_id: &str) -> Result<String> {
        let document = self.require_document(document_id)?;
        self.enqueue(JobType::AiAnalysis, &document, JobPriority::Normal)
    }

    fn require_document(&self, document_id: &str) -> Result<Document> {
        document_repo::find_by_id(&self.db, document_id)?
            .ok_or_else(|| ProcessError::UnknownDocument(document_id.to_string()).into())
    }

    fn enqueue(
        &self,
        job_type: JobType,
        document: &Document,
        priority: JobPriority,
    ) -> Result<String> {
        let payload = DocumentJobPayload {
            document_id: document.id.clone(),
            case_id: document.case_id.clone(),
            storage_path: document.storage_path.clone(),
            mime_type: document.mime_type.clone(),
        };
        let payload =
            serde_json::to_value(&payload).map_err(|e| QueueError::JobFailed(e.to_string()))?;
        let job_id =
            self.queue
                .submit(job_type, Some(document.id.clone()), payload, priority)?;
        Ok(job_id)
    }

    pub fn document(&self, document_id: &str) -> Result<Option<Document>> {
        Ok(document_repo::find_by_id(&self.db, document_id)?)
    }

    pub fn documents_for_case(&self, case_id: &str) -> Result<Vec<Document>> {
        Ok(document_repo::list_by_case(&self.db, case_id)?)
    }

    pub fn job_status(&self, job_id: &str) -> Option<Job> {
        self.queue.status(job_id)
    }

    pub fn retry_job(&self, job_id: &str) -> Result<()> {
        Ok(self.queue.retry(job_id)?)
    }

    pub fn remove_job(&self, job_id: &str) -> Result<()> {
        Ok(self.queue.remove(job_id)?)
    }

    /// Live progress feed for all documents.
    pub fn subscribe_progress(&self) -> broadcast::Receiver<DocumentProgressEvent> {
        self.progress.subscribe()
    }

    pub fn health(&self) -> HealthReport {
        self.queue.health_check()
    }

    pub fn supported_types(&self) -> crate::processor::SupportedMimeTypes {
        crate::processor::supported_mime_types()
    }

    /// Drains the queues and releases every resource.
    pub async fn close(self) {
        self.queue.close().await;
        info!("dossier service closed");
    }
}

/// Runs the full pipeline for document-processing and user-request jobs.
struct ProcessingHandler {
    pipeline: Arc<DocumentPipeline>,
    progress: Arc<broadcast::Sender<DocumentProgressEvent>>,
}

#[async_trait]
impl JobHandler for ProcessingHandler {
    async fn handle(&self, job: &Job) -> std::result::Result<(), DossierError> {
        let document_id = job
            .document_id
            .as_deref()
            .ok_or_else(|| QueueError::JobFailed("job has no document".to_string()))?;
        let reporter = BroadcastProgress::new(document_id, Arc::clone(&self.progress));
        self.pipeline.run(document_id, &reporter).await?;
        Ok(())
    }
}

/// Re-runs the analysis chain over a processed document's extracted text.
struct AnalysisHandler {
    db: Database,
    chain: Arc<ContentChain>,
    languages: LanguageConfig,
}

#[async_trait]
impl JobHandler for AnalysisHandler {
    async fn handle(&self, job: &Job) -> std::result::Result<(), DossierError> {
        let document_id = job
            .document_id
            .as_deref()
            .ok_or_else(|| QueueError::JobFailed("job has no document".to_string()))?;
        let document = document_repo::find_by_id(&self.db, document_id)?
            .ok_or_else(|| ProcessError::UnknownDocument(document_id.to_string()))?;

        let text = document
            .extracted_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ProcessError::InsufficientContent { length: 0 })?;

        let chain = self.chain.run(text).await;
        let (translation_en, translation_ar) = assign_translations(&self.languages, &chain);
        let outcome = DocumentOutcome {
            extracted_text: text.to_string(),
            summary: chain.summary,
            timeline: chain.timeline,
            translation_en,
            translation_ar,
            title: chain.title,
        };

        if !document_repo::update_enrichment(&self.db, document_id, &outcome)? {
            return Err(QueueError::InvalidState {
                job_id: document_id.to_string(),
                state: document.status.to_string(),
                operation: "re-analyzed",
            }
            .into());
        }
        Ok(())
    }
}
