//! Shared fixtures for the service-level tests: a scripted provider and
//! polling helpers that wait for asynchronous queue work to land.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use dossier::ai::{GenerativeProvider, MediaPayload, ProviderError};
use dossier::queue::JobState;
use dossier::{Config, Database, Document, DossierService, ProcessingStatus};

/// Answers every chain prompt with a fixed, recognizable response so tests
/// can assert on the persisted outcome without a live endpoint.
pub struct CannedProvider {
    pub calls: AtomicUsize,
}

impl CannedProvider {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerativeProvider for CannedProvider {
    async fn generate(
        &self,
        prompt: &str,
        _media: Option<&MediaPayload>,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let answer = if prompt.contains("ISO 639-1") {
            "en"
        } else if prompt.contains("JSON array") {
            r#"[{"date": "03/15/2024", "event": "Motion to dismiss filed"}]"#
        } else if prompt.contains("title") {
            "Motion to Dismiss"
        } else if prompt.contains("Summarize") {
            "The defendant moved to dismiss the complaint on March 15, 2024."
        } else if prompt.contains("Translate") {
            "ملخص مترجم للوثيقة"
        } else if prompt.contains("Correct spelling") {
            "The defendant filed a motion to dismiss the complaint."
        } else {
            "canned analysis output"
        };
        Ok(answer.to_string())
    }
}

pub fn test_config(tmp: &TempDir) -> Config {
    Config::for_tests(tmp.path().join("dossier.db"))
}

pub async fn open_service(config: Config, provider: Arc<dyn GenerativeProvider>) -> DossierService {
    let db = Database::open(&config.database_path).expect("open database");
    DossierService::open_with_provider(config, db, provider)
        .await
        .expect("open service")
}

/// Writes a fixture file and returns a document record pointing at it.
pub fn text_document(tmp: &TempDir, id: &str, contents: &str) -> Document {
    let path = write_fixture(tmp, &format!("{id}.txt"), contents);
    Document::new(
        id,
        "case-7",
        format!("{id}.txt"),
        "text/plain",
        contents.len() as u64,
        path.to_string_lossy(),
    )
}

pub fn write_fixture(tmp: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = tmp.path().join(name);
    std::fs::write(&path, contents).expect("write fixture");
    path
}

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const POLL_DEADLINE: Duration = Duration::from_secs(10);

pub async fn wait_for_status(
    service: &DossierService,
    document_id: &str,
    status: ProcessingStatus,
) -> Document {
    let deadline = tokio::time::Instant::now() + POLL_DEADLINE;
    loop {
        let document = service
            .document(document_id)
            .expect("query document")
            .expect("document exists");
        if document.status == status {
            return document;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "document {document_id} stuck in {:?} while waiting for {status:?}",
                document.status
            );
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

pub async fn wait_for_job(service: &DossierService, job_id: &str, state: JobState) {
    let deadline = tokio::time::Instant::now() + POLL_DEADLINE;
    loop {
        let job = service.job_status(job_id).expect("job exists");
        if job.state == state {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "job {job_id} stuck in {:?} while waiting for {state:?}",
                job.state
            );
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
