use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, error, info, warn};

use crate::error::WorkerError;
use crate::pipeline::JobPipeline;
use crate::worker::job::JobOutcome;

/// Anything job ids can be handed to for processing.
pub trait JobQueue: Send + Sync {
    fn enqueue(&self, job_id: &str) -> Result<(), WorkerError>;
}

/// Cloneable submit side of a [`WorkerPool`].
#[derive(Clone)]
pub struct QueueHandle {
    sender: Sender<String>,
    shutdown: Arc<AtomicBool>,
}

impl JobQueue for QueueHandle {
    fn enqueue(&self, job_id: &str) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }
        self.sender
            .send(job_id.to_string())
            .map_err(|_| WorkerError::ChannelClosed)
    }
}

/// Fixed set of threads, each running one job at a time through the
/// shared pipeline.
pub struct WorkerPool {
    queue: QueueHandle,
    outcome_receiver: Receiver<JobOutcome>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Starts `worker_count` threads.
    pub fn new(pipeline: Arc<JobPipeline>, worker_count: usize) -> Result<Self, WorkerError> {
        if worker_count == 0 {
            return Err(WorkerError::SpawnFailed(
                "worker_count must be at least 1".to_string(),
            ));
        }

        let (job_sender, job_receiver) = bounded::<String>(worker_count * 2);
        // Outcomes are informational; results live in the database.
        let (outcome_sender, outcome_receiver) = unbounded::<JobOutcome>();
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let outcome_tx = outcome_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_pipeline = Arc::clone(&pipeline);

            let handle = thread::Builder::new()
                .name(format!("docroute-worker-{}", worker_id))
                .spawn(move || {
                    run_worker(worker_id, job_rx, outcome_tx, shutdown_flag, worker_pipeline);
                })
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Ok(Self {
            queue: QueueHandle {
                sender: job_sender,
                shutdown: Arc::clone(&shutdown),
            },
            outcome_receiver,
            workers,
            shutdown,
        })
    }

    /// Hands a job to the pool. Returns once a worker slot has accepted
    /// it into the queue; the result shows up later on the job row.
    pub fn enqueue_and_process(&self, job_id: &str) -> Result<(), WorkerError> {
        self.queue.enqueue(job_id)
    }

    pub fn handle(&self) -> QueueHandle {
        self.queue.clone()
    }

    pub fn try_recv_outcome(&self) -> Option<JobOutcome> {
        self.outcome_receiver.try_recv().ok()
    }

    pub fn recv_outcome_timeout(&self, timeout: Duration) -> Option<JobOutcome> {
        self.outcome_receiver.recv_timeout(timeout).ok()
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Stops accepting work and joins every thread. A job already running
    /// finishes first.
    pub fn wait(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        drop(self.queue);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }
}

impl JobQueue for WorkerPool {
    fn enqueue(&self, job_id: &str) -> Result<(), WorkerError> {
        self.enqueue_and_process(job_id)
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<String>,
    outcome_sender: Sender<JobOutcome>,
    shutdown: Arc<AtomicBool>,
    pipeline: Arc<JobPipeline>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(job_id) => {
                debug!("Worker {} processing job {}", worker_id, job_id);

                match pipeline.process(&job_id) {
                    Ok(outcome) => {
                        if outcome_sender.send(outcome).is_err() {
                            debug!("Worker {} outcome receiver gone", worker_id);
                        }
                    }
                    // The job row could not be read or written; it stays
                    // where it is and the lease sweep picks it up.
                    Err(e) => warn!("Worker {} could not process job {}: {}", worker_id, job_id, e),
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Database;
    use crate::error::{ProcessError, StorageError};
    use crate::extraction::{ExtractionRequest, ExtractionService};
    use crate::pipeline::PipelineServices;
    use crate::processor::ocr::{OcrEngine, OcrPage};
    use crate::processor::render::PageRenderer;
    use crate::processor::{Bitmap, Document};
    use crate::storage::ObjectStore;

    struct Nothing;

    impl ObjectStore for Nothing {
        fn fetch(&self, file_ref: &str) -> Result<Vec<u8>, StorageError> {
            Err(StorageError::NotFound(file_ref.to_string()))
        }
        fn put(&self, _file_ref: &str, _bytes: &[u8]) -> Result<(), StorageError> {
            Ok(())
        }
        fn remove(&self, _file_ref: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    impl PageRenderer for Nothing {
        fn render_pages(&self, _d: &Document, _dpi: u32) -> Result<Vec<Bitmap>, ProcessError> {
            Ok(vec![])
        }
    }

    impl OcrEngine for Nothing {
        fn recognize(&self, _i: &Bitmap, _l: &[String], _p: u32) -> Result<OcrPage, ProcessError> {
            Ok(OcrPage::default())
        }
    }

    impl ExtractionService for Nothing {
        fn extract_text(&self, _r: &ExtractionRequest<'_>) -> Result<String, ProcessError> {
            Ok("{}".to_string())
        }
        fn extract_vision(&self, _r: &ExtractionRequest<'_>) -> Result<String, ProcessError> {
            Ok("{}".to_string())
        }
    }

    fn pipeline() -> Arc<JobPipeline> {
        let services = PipelineServices {
            store: Arc::new(Nothing),
            renderer: Arc::new(Nothing),
            ocr: Arc::new(Nothing),
            extraction: Arc::new(Nothing),
        };
        let db = Database::open_in_memory().unwrap();
        Arc::new(JobPipeline::new(services, db, Arc::new(Config::default())))
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(
            WorkerPool::new(pipeline(), 0),
            Err(WorkerError::SpawnFailed(_))
        ));
    }

    #[test]
    fn test_worker_pool_shutdown() {
        let pool = WorkerPool::new(pipeline(), 2).unwrap();
        assert!(!pool.is_shutdown());

        pool.shutdown();
        assert!(pool.is_shutdown());
        assert!(matches!(
            pool.enqueue_and_process("j1"),
            Err(WorkerError::ChannelClosed)
        ));

        pool.wait();
    }

    #[test]
    fn test_unknown_job_produces_no_outcome() {
        let pool = WorkerPool::new(pipeline(), 1).unwrap();
        pool.enqueue_and_process("missing").unwrap();
        assert!(pool.recv_outcome_timeout(Duration::from_millis(500)).is_none());
        pool.wait();
    }
}
