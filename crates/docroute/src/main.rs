use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::sync::broadcast::error::RecvError;

use docroute::db::job_repo;
use docroute::worker::JobQueue;
use docroute::{
    init_logging, load_config, Config, Database, JobOutcome, JobPipeline,
    JobProgressBroadcaster, JobStatus, LeaseReconciler, PipelineServices, WorkerError,
    WorkerPool,
};

const CONFIG_ENV: &str = "DOCROUTE_CONFIG";

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("docroute-worker stopped: {}", e);
            eprintln!("docroute-worker: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Explicit argument, then `$DOCROUTE_CONFIG`, then the per-user config
/// file if it exists. Built-in defaults otherwise.
fn config_path() -> Option<PathBuf> {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .or_else(|| {
            dirs::config_dir()
                .map(|dir| dir.join("docroute").join("config.json"))
                .filter(|path| path.exists())
        })
}

fn run() -> docroute::Result<()> {
    let config = match config_path() {
        Some(path) => load_config(&path)?,
        None => Config::default(),
    };

    init_logging(config.log_format, None);
    info!("Starting docroute-worker v{}", env!("CARGO_PKG_VERSION"));

    let running = Arc::new(AtomicBool::new(true));
    let signal = Arc::clone(&running);
    ctrlc::set_handler(move || signal.store(false, Ordering::SeqCst))
        .map_err(|e| WorkerError::SpawnFailed(format!("signal handler: {}", e)))?;

    let db = Database::open(&config.database.path)?;
    let config = Arc::new(config);

    let broadcaster = JobProgressBroadcaster::default();
    spawn_progress_logger(&broadcaster);

    let services = PipelineServices::from_config(&config)?;
    let pipeline = Arc::new(
        JobPipeline::new(services, db.clone(), Arc::clone(&config)).with_progress(broadcaster),
    );
    let pool = WorkerPool::new(pipeline, config.worker.worker_count)?;

    // Recover leftovers from a previous run before taking new work. This
    // sweep does not dispatch; every QUEUED job is dispatched right after.
    let startup = LeaseReconciler::new(db.clone(), config.worker.stale_policy).sweep(Utc::now())?;
    if !startup.is_empty() {
        info!(
            "Recovered expired leases: {} requeued, {} failed",
            startup.requeued.len(),
            startup.failed.len()
        );
    }
    let pending = job_repo::list_by_status(&db, JobStatus::Queued)?;
    for row in &pending {
        pool.enqueue_and_process(&row.id)?;
    }
    info!("Dispatched {} queued job(s)", pending.len());

    let queue: Arc<dyn JobQueue> = Arc::new(pool.handle());
    let reconciler =
        LeaseReconciler::new(db.clone(), config.worker.stale_policy).with_queue(queue);
    let interval = Duration::from_secs(config.worker.reconcile_interval_secs.max(1));
    let mut last_sweep = Instant::now();

    while running.load(Ordering::SeqCst) {
        if let Some(outcome) = pool.recv_outcome_timeout(Duration::from_millis(200)) {
            log_outcome(&outcome);
        }

        if last_sweep.elapsed() >= interval {
            match reconciler.sweep(Utc::now()) {
                Ok(report) if !report.is_empty() => info!(
                    "Lease sweep: {} requeued, {} failed",
                    report.requeued.len(),
                    report.failed.len()
                ),
                Ok(_) => {}
                Err(e) => error!("Lease sweep failed: {}", e),
            }
            last_sweep = Instant::now();
        }
    }

    pool.shutdown();
    pool.wait();
    info!("docroute-worker stopped");
    Ok(())
}

fn log_outcome(outcome: &JobOutcome) {
    match outcome {
        JobOutcome::Completed {
            job_id,
            overall_risk,
            risk_score,
            field_count,
        } => info!(
            "Job {} completed: {} fields, risk {} ({})",
            job_id, field_count, overall_risk, risk_score
        ),
        JobOutcome::Failed { job_id, error } => warn!("Job {} failed: {}", job_id, error),
        JobOutcome::Skipped { job_id, status } => {
            debug!("Job {} skipped, already {}", job_id, status)
        }
        JobOutcome::Abandoned { job_id } => warn!("Job {} abandoned after losing its lease", job_id),
    }
}

fn spawn_progress_logger(broadcaster: &JobProgressBroadcaster) {
    let mut rx = broadcaster.subscribe();
    let spawned = thread::Builder::new()
        .name("docroute-progress".to_string())
        .spawn(move || loop {
            match rx.blocking_recv() {
                Ok(event) => debug!("[{}] {}: {}", event.job_id, event.phase, event.message),
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Progress logger skipped {} events", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        });
    if let Err(e) = spawned {
        warn!("Progress logging disabled: {}", e);
    }
}
