//! Fan-out of job progress events to any number of subscribers.

pub mod job_progress;

pub use job_progress::{
    CompletionSummary, JobPhase, JobProgressBroadcaster, JobProgressEvent, JobProgressTracker,
};
