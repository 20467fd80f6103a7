pub mod intake;
pub mod job;
pub mod pool;
pub mod reconciler;

pub use intake::{submit, Submission};
pub use job::{Job, JobOutcome, JobStatus};
pub use pool::{JobQueue, QueueHandle, WorkerPool};
pub use reconciler::{LeaseReconciler, SweepReport, LEASE_EXPIRED_MESSAGE};
