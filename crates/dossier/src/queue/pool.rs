//! Supervised worker tasks. A panic inside a handler is caught and treated
//! as a job failure; the worker itself keeps running.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::job::JobType;
use super::{JobHandler, QueueCore};

const IDLE_POLL: Duration = Duration::from_millis(100);

pub(super) fn spawn_worker(
    core: Arc<QueueCore>,
    job_type: JobType,
    worker_id: usize,
    handler: Arc<dyn JobHandler>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(queue = job_type.queue_name(), worker_id, "worker started");
        loop {
            match core.claim_next(job_type) {
                Some(job) => {
                    let outcome = AssertUnwindSafe(handler.handle(&job)).catch_unwind().await;
                    match outcome {
                        Ok(Ok(())) => core.complete_job(&job.id),
                        Ok(Err(e)) => core.fail_or_retry(job, e.to_string()).await,
                        Err(_) => {
                            error!(
                                queue = job_type.queue_name(),
                                job_id = %job.id,
                                "job handler panicked"
                            );
                            core.fail_or_retry(job, "job handler panicked".to_string())
                                .await;
                        }
                    }
                }
                None => {
                    if core.is_closed() {
                        break;
                    }
                    tokio::select! {
                        _ = core.idle_wait() => {}
                        _ = tokio::time::sleep(IDLE_POLL) => {}
                    }
                }
            }
        }
        debug!(queue = job_type.queue_name(), worker_id, "worker stopped");
    })
}
