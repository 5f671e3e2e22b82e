pub mod engine;
pub mod video;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info};
use tokio::sync::oneshot;

use crate::error::ProcessError;

pub use engine::{OcrEngine, OcrOutput};
pub use video::{VideoFrame, VideoSampler, VideoSupport};

struct OcrRequest {
    image_data: Vec<u8>,
    reply: oneshot::Sender<Result<OcrOutput, ProcessError>>,
}

/// Fixed-size pool of recognition workers. All OCR goes through this
/// scheduler so a burst of concurrent documents cannot saturate CPU; async
/// callers suspend on a oneshot reply instead of blocking a runtime thread.
pub struct OcrScheduler {
    sender: Sender<OcrRequest>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl OcrScheduler {
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn new(engine: OcrEngine, worker_count: usize) -> Self {
        assert!(worker_count > 0, "worker_count must be > 0");
        let (sender, receiver) = bounded::<OcrRequest>(worker_count * 2);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let rx = receiver.clone();
            let worker_engine = engine.clone();
            let shutdown_flag = Arc::clone(&shutdown);

            workers.push(thread::spawn(move || {
                run_worker(worker_id, rx, worker_engine, shutdown_flag);
            }));
        }

        info!("Started {} OCR workers", worker_count);

        Self {
            sender,
            workers,
            shutdown,
        }
    }

    /// Queues a recognition request and awaits the result.
    pub async fn recognize(&self, image_data: Vec<u8>) -> Result<OcrOutput, ProcessError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(ProcessError::OcrFailed("OCR scheduler stopped".to_string()));
        }

        let (reply, response) = oneshot::channel();
        self.sender
            .send(OcrRequest { image_data, reply })
            .map_err(|_| ProcessError::OcrFailed("OCR scheduler stopped".to_string()))?;

        response
            .await
            .map_err(|_| ProcessError::OcrFailed("OCR worker dropped request".to_string()))?
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn wait(self) {
        drop(self.sender);
        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("OCR worker {} panicked: {:?}", i, e);
            } else {
                debug!("OCR worker {} finished", i);
            }
        }
    }
}

fn run_worker(
    worker_id: usize,
    receiver: Receiver<OcrRequest>,
    engine: OcrEngine,
    shutdown: Arc<AtomicBool>,
) {
    debug!("OCR worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        match receiver.recv_timeout(std::time::Duration::from_millis(100)) {
            Ok(request) => {
                let result = engine.recognize_bytes(&request.image_data);
                // A dropped receiver just means the caller gave up waiting.
                let _ = request.reply.send(result);
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!("OCR worker {} stopped", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_scheduler() -> OcrScheduler {
        OcrScheduler::new(OcrEngine::new(&["eng".to_string()], 2000), 2)
    }

    #[tokio::test]
    async fn test_invalid_bytes_surface_error_not_panic() {
        let scheduler = test_scheduler();
        let result = scheduler.recognize(b"garbage".to_vec()).await;
        assert!(matches!(result, Err(ProcessError::OcrFailed(_))));
        scheduler.shutdown();
        scheduler.wait();
    }

    #[tokio::test]
    async fn test_recognize_after_shutdown_fails_fast() {
        let scheduler = test_scheduler();
        scheduler.shutdown();
        let result = scheduler.recognize(vec![1, 2, 3]).await;
        assert!(matches!(result, Err(ProcessError::OcrFailed(_))));
        scheduler.wait();
    }

    #[tokio::test]
    async fn test_concurrent_requests_all_answered() {
        let scheduler = Arc::new(test_scheduler());
        let mut handles = Vec::new();
        for _ in 0..6 {
            let s = Arc::clone(&scheduler);
            handles.push(tokio::spawn(
                async move { s.recognize(vec![0u8; 4]).await },
            ));
        }
        for handle in handles {
            // Invalid image data: every request must still get a reply.
            assert!(handle.await.unwrap().is_err());
        }
    }
}
