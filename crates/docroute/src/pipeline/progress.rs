use crate::broadcast::job_progress::{
    CompletionSummary, JobPhase, JobProgressBroadcaster, JobProgressTracker,
};

/// Events emitted by the pipeline during processing.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Phase { phase: JobPhase, message: String },
    Completed(CompletionSummary),
    Failed { error: String },
}

impl ProgressEvent {
    pub fn phase(phase: JobPhase, message: &str) -> Self {
        ProgressEvent::Phase {
            phase,
            message: message.to_string(),
        }
    }
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Discards everything.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Bridges pipeline events onto the broadcast channel.
pub struct BroadcastProgress {
    tracker: JobProgressTracker,
}

impl BroadcastProgress {
    pub fn new(broadcaster: &JobProgressBroadcaster, job_id: &str, filename: &str) -> Self {
        Self {
            tracker: broadcaster.tracker(job_id, filename),
        }
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Phase { phase, message } => self.tracker.update_phase(phase, &message),
            ProgressEvent::Completed(summary) => self.tracker.completed(&summary),
            ProgressEvent::Failed { error } => self.tracker.failed(&error),
        }
    }
}
