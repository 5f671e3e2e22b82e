//! In-memory job queues with durable job rows.
//!
//! Scheduling state (who runs next, retry delays, idempotency reservations)
//! lives in memory; every state change is mirrored into the `jobs` table so
//! history and health counts survive restarts. Each queue has its own pool
//! of supervised tokio workers.

pub mod job;
mod pool;

pub use job::{DocumentJobPayload, Job, JobPriority, JobState, JobType};

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::ai::BackoffPolicy;
use crate::config::QueueConfig;
use crate::db::job_repo::{self, JobRecord, QueueCounts};
use crate::db::{document_repo, Database};
use crate::error::{DossierError, QueueError};

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<(), DossierError>;
}

/// One handler per queue.
pub struct QueueHandlers {
    pub document_processing: Arc<dyn JobHandler>,
    pub user_request: Arc<dyn JobHandler>,
    pub ai_analysis: Arc<dyn JobHandler>,
}

impl QueueHandlers {
    fn for_type(&self, job_type: JobType) -> Arc<dyn JobHandler> {
        match job_type {
            JobType::DocumentProcessing => Arc::clone(&self.document_processing),
            JobType::UserRequest => Arc::clone(&self.user_request),
            JobType::AiAnalysis => Arc::clone(&self.ai_analysis),
        }
    }
}

/// Two-level ready list: high-priority jobs drain before normal ones, FIFO
/// within each level.
#[derive(Default)]
struct ReadyQueue {
    high: VecDeque<String>,
    normal: VecDeque<String>,
}

impl ReadyQueue {
    fn push(&mut self, priority: JobPriority, id: String) {
        match priority {
            JobPriority::High => self.high.push_back(id),
            JobPriority::Normal => self.normal.push_back(id),
        }
    }

    fn pop(&mut self) -> Option<String> {
        self.high.pop_front().or_else(|| self.normal.pop_front())
    }

    fn remove(&mut self, id: &str) {
        self.high.retain(|queued| queued != id);
        self.normal.retain(|queued| queued != id);
    }
}

/// Shared queue state. Lock order when more than one is needed: `ready`,
/// then `jobs`, then `reserved_documents`; most paths take them one at a
/// time.
pub(crate) struct QueueCore {
    db: Database,
    backoff: BackoffPolicy,
    jobs: Mutex<HashMap<String, Job>>,
    ready: Mutex<HashMap<JobType, ReadyQueue>>,
    reserved_documents: Mutex<HashSet<String>>,
    notify: Notify,
    closed: AtomicBool,
}

// Poisoning only happens after a panic that is already being reported;
// recovering the inner data keeps the remaining workers serviceable.
fn relock<T>(result: Result<T, PoisonError<T>>) -> T {
    result.unwrap_or_else(PoisonError::into_inner)
}

impl QueueCore {
    fn new(db: Database, backoff: BackoffPolicy) -> Self {
        let ready = JobType::ALL
            .iter()
            .map(|t| (*t, ReadyQueue::default()))
            .collect::<HashMap<_, _>>();
        Self {
            db,
            backoff,
            jobs: Mutex::new(HashMap::new()),
            ready: Mutex::new(ready),
            reserved_documents: Mutex::new(HashSet::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    pub(crate) async fn idle_wait(&self) {
        self.notify.notified().await;
    }

    fn persist(&self, job: &Job) {
        if let Err(e) = job_repo::update_state(
            &self.db,
            &job.id,
            job.state.as_str(),
            job.attempts,
            job.error.as_deref(),
        ) {
            warn!(job_id = %job.id, "failed to persist job state: {e}");
        }
    }

    fn release_reservation(&self, job: &Job) {
        if let Some(document_id) = &job.document_id {
            relock(self.reserved_documents.lock()).remove(document_id);
        }
    }

    /// Pops the next ready job of this type and marks it active.
    pub(crate) fn claim_next(&self, job_type: JobType) -> Option<Job> {
        let id = {
            let mut ready = relock(self.ready.lock());
            ready.get_mut(&job_type)?.pop()?
        };
        let snapshot = {
            let mut jobs = relock(self.jobs.lock());
            let job = jobs.get_mut(&id)?;
            job.state = JobState::Active;
            job.attempts += 1;
            job.clone()
        };
        self.persist(&snapshot);
        Some(snapshot)
    }

    pub(crate) fn complete_job(&self, id: &str) {
        let snapshot = {
            let mut jobs = relock(self.jobs.lock());
            let Some(job) = jobs.get_mut(id) else {
                return;
            };
            job.state = JobState::Completed;
            job.error = None;
            job.clone()
        };
        self.release_reservation(&snapshot);
        self.persist(&snapshot);
    }

    /// Schedules a retry with backoff, or fails the job when attempts are
    /// exhausted.
    pub(crate) async fn fail_or_retry(self: &Arc<Self>, job: Job, error: String) {
        if self.backoff.is_exhausted(job.attempts) {
            let snapshot = {
                let mut jobs = relock(self.jobs.lock());
                let Some(stored) = jobs.get_mut(&job.id) else {
                    return;
                };
                stored.state = JobState::Failed;
                stored.error = Some(error);
                stored.clone()
            };
            self.release_reservation(&snapshot);
            self.persist(&snapshot);
            warn!(job_id = %snapshot.id, attempts = snapshot.attempts, "job failed terminally");
            return;
        }

        let snapshot = {
            let mut jobs = relock(self.jobs.lock());
            let Some(stored) = jobs.get_mut(&job.id) else {
                return;
            };
            stored.state = JobState::Delayed;
            stored.error = Some(error);
            stored.clone()
        };
        self.persist(&snapshot);

        let delay = self.backoff.delay(job.attempts);
        let core = Arc::clone(self);
        let job_id = job.id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !core.is_closed() {
                core.requeue(&job_id);
            }
        });
    }

    fn requeue(&self, id: &str) {
        let snapshot = {
            let mut jobs = relock(self.jobs.lock());
            let Some(job) = jobs.get_mut(id) else {
                return;
            };
            job.state = JobState::Queued;
            job.clone()
        };
        relock(self.ready.lock())
            .entry(snapshot.job_type)
            .or_default()
            .push(snapshot.priority, snapshot.id.clone());
        self.persist(&snapshot);
        self.notify.notify_one();
    }
}

/// Health snapshot for all queues.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub queues: Vec<QueueHealth>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueHealth {
    pub name: &'static str,
    pub counts: QueueCounts,
}

pub struct JobQueue {
    core: Arc<QueueCore>,
    workers: Vec<JoinHandle<()>>,
    sweeper: Option<JoinHandle<()>>,
}

impl JobQueue {
    /// Starts the worker pools and the stale-lease sweeper.
    pub fn open(
        db: Database,
        config: &QueueConfig,
        backoff: BackoffPolicy,
        handlers: QueueHandlers,
    ) -> Self {
        let core = Arc::new(QueueCore::new(db, backoff));

        let mut workers = Vec::new();
        for job_type in JobType::ALL {
            let handler = handlers.for_type(job_type);
            for worker_id in 0..job_type.worker_count(config) {
                workers.push(pool::spawn_worker(
                    Arc::clone(&core),
                    job_type,
                    worker_id,
                    Arc::clone(&handler),
                ));
            }
        }

        let sweeper = Some(spawn_sweeper(Arc::clone(&core), config.stale_lease_secs));

        info!(
            workers = workers.len(),
            "job queues started ({} queues)",
            JobType::ALL.len()
        );

        Self {
            core,
            workers,
            sweeper,
        }
    }

    /// Enqueues a job. At most one pending job may exist per document.
    pub fn submit(
        &self,
        job_type: JobType,
        document_id: Option<String>,
        payload: serde_json::Value,
        priority: JobPriority,
    ) -> Result<String, QueueError> {
        if self.core.is_closed() {
            return Err(QueueError::Unavailable("queue is closed".to_string()));
        }

        if let Some(document_id) = &document_id {
            let mut reserved = relock(self.core.reserved_documents.lock());
            if !reserved.insert(document_id.clone()) {
                return Err(QueueError::DuplicateJob {
                    document_id: document_id.clone(),
                });
            }
        }

        let job = Job::new(job_type, document_id, payload, priority);

        let now = job.created_at.to_rfc3339();
        let record = JobRecord {
            id: job.id.clone(),
            queue: job_type.queue_name().to_string(),
            document_id: job.document_id.clone(),
            priority: priority.as_str().to_string(),
            state: job.state.as_str().to_string(),
            attempts: 0,
            error: None,
            payload: Some(job.payload.to_string()),
            created_at: now.clone(),
            updated_at: now,
            completed_at: None,
        };
        if let Err(e) = job_repo::insert(&self.core.db, &record) {
            self.core.release_reservation(&job);
            return Err(QueueError::Unavailable(e.to_string()));
        }

        let id = job.id.clone();
        relock(self.core.jobs.lock()).insert(id.clone(), job);
        relock(self.core.ready.lock())
            .entry(job_type)
            .or_default()
            .push(priority, id.clone());
        self.core.notify.notify_one();
        Ok(id)
    }

    /// Returns a snapshot of a job's current state.
    pub fn status(&self, job_id: &str) -> Option<Job> {
        relock(self.core.jobs.lock()).get(job_id).cloned()
    }

    /// Requeues a terminally failed job with a fresh attempt budget. The
    /// document reservation must be re-acquired first; if a newer submission
    /// for the same document is already pending, the retry is rejected.
    pub fn retry(&self, job_id: &str) -> Result<(), QueueError> {
        let snapshot = {
            let mut jobs = relock(self.core.jobs.lock());
            let job = jobs.get_mut(job_id).ok_or_else(|| QueueError::UnknownJob {
                queue: "any".to_string(),
                job_id: job_id.to_string(),
            })?;
            if job.state != JobState::Failed {
                return Err(QueueError::InvalidState {
                    job_id: job_id.to_string(),
                    state: job.state.as_str().to_string(),
                    operation: "retried",
                });
            }
            if let Some(document_id) = &job.document_id {
                let mut reserved = relock(self.core.reserved_documents.lock());
                if !reserved.insert(document_id.clone()) {
                    return Err(QueueError::DuplicateJob {
                        document_id: document_id.clone(),
                    });
                }
            }
            job.state = JobState::Queued;
            job.attempts = 0;
            job.error = None;
            job.clone()
        };

        relock(self.core.ready.lock())
            .entry(snapshot.job_type)
            .or_default()
            .push(snapshot.priority, snapshot.id.clone());
        self.core.persist(&snapshot);
        self.core.notify.notify_one();
        Ok(())
    }

    /// Removes a job that has not started yet. Active jobs cannot be
    /// cancelled.
    pub fn remove(&self, job_id: &str) -> Result<(), QueueError> {
        let snapshot = {
            let mut jobs = relock(self.core.jobs.lock());
            let job = jobs.get_mut(job_id).ok_or_else(|| QueueError::UnknownJob {
                queue: "any".to_string(),
                job_id: job_id.to_string(),
            })?;
            if job.state != JobState::Queued {
                return Err(QueueError::InvalidState {
                    job_id: job_id.to_string(),
                    state: job.state.as_str().to_string(),
                    operation: "removed",
                });
            }
            job.state = JobState::Removed;
            job.clone()
        };

        if let Some(ready) = relock(self.core.ready.lock()).get_mut(&snapshot.job_type) {
            ready.remove(job_id);
        }
        self.core.release_reservation(&snapshot);
        self.core.persist(&snapshot);
        Ok(())
    }

    /// Per-queue counts from the durable rows, plus an overall healthy flag.
    pub fn health_check(&self) -> HealthReport {
        let mut healthy = !self.core.is_closed();
        let queues = JobType::ALL
            .iter()
            .map(|t| {
                let counts = match job_repo::counts_for_queue(&self.core.db, t.queue_name()) {
                    Ok(counts) => counts,
                    Err(e) => {
                        warn!("health check query failed: {e}");
                        healthy = false;
                        QueueCounts::default()
                    }
                };
                QueueHealth {
                    name: t.queue_name(),
                    counts,
                }
            })
            .collect();
        HealthReport { healthy, queues }
    }

    /// Stops accepting work, lets workers drain, and waits for them.
    pub async fn close(mut self) {
        info!("closing job queues");
        self.core.closed.store(true, Ordering::Relaxed);
        self.core.notify.notify_waiters();

        for worker in self.workers.drain(..) {
            let _ = worker.await;
        }
        if let Some(sweeper) = self.sweeper.take() {
            let _ = sweeper.await;
        }
    }
}

/// Periodically resets PROCESSING documents whose lease expired; covers
/// workers that died without failing their document.
fn spawn_sweeper(core: Arc<QueueCore>, stale_lease_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(stale_lease_secs.clamp(1, 60));
    tokio::spawn(async move {
        loop {
            let mut waited = Duration::ZERO;
            while waited < interval {
                if core.is_closed() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(250)).await;
                waited += Duration::from_millis(250);
            }
            if let Err(e) = document_repo::sweep_stale(&core.db, stale_lease_secs) {
                warn!("stale-lease sweep failed: {e}");
            }
        }
    })
}
