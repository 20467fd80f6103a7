//! Per-job progress events, fanned out to any number of subscribers.
//!
//! Sends never block and never fail the pipeline: with no subscriber the
//! event is dropped, and a slow subscriber sees `Lagged`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::worker::job::JobStatus;

/// Pipeline stage a job is in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Queued,
    Fetching,
    Hashing,
    Classifying,
    Extracting,
    Analyzing,
    Completed,
    Failed,
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobPhase::Queued => write!(f, "Queued"),
            JobPhase::Fetching => write!(f, "Fetching document"),
            JobPhase::Hashing => write!(f, "Hashing content"),
            JobPhase::Classifying => write!(f, "Classifying"),
            JobPhase::Extracting => write!(f, "Extracting fields"),
            JobPhase::Analyzing => write!(f, "Analyzing integrity"),
            JobPhase::Completed => write!(f, "Completed"),
            JobPhase::Failed => write!(f, "Failed"),
        }
    }
}

impl JobPhase {
    /// The job status a subscriber should show while in this phase.
    pub fn status(&self) -> JobStatus {
        match self {
            JobPhase::Queued => JobStatus::Queued,
            JobPhase::Completed => JobStatus::Completed,
            JobPhase::Failed => JobStatus::Failed,
            _ => JobStatus::Processing,
        }
    }
}

/// Progress event for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    pub job_id: String,
    pub filename: String,
    pub phase: JobPhase,
    pub status: JobStatus,
    /// Human-readable message describing current activity.
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Strategy picked by the classifier (set on completion).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_risk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<u8>,
    /// Error message (set on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result details carried by a completion event.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionSummary {
    pub strategy: String,
    pub field_count: usize,
    pub overall_risk: String,
    pub risk_score: u8,
}

impl JobProgressEvent {
    pub fn new(job_id: &str, filename: &str, phase: JobPhase, message: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            filename: filename.to_string(),
            phase,
            status: phase.status(),
            message: message.to_string(),
            timestamp: Utc::now(),
            strategy: None,
            field_count: None,
            overall_risk: None,
            risk_score: None,
            error: None,
        }
    }

    pub fn completed(job_id: &str, filename: &str, summary: &CompletionSummary) -> Self {
        Self {
            strategy: Some(summary.strategy.clone()),
            field_count: Some(summary.field_count),
            overall_risk: Some(summary.overall_risk.clone()),
            risk_score: Some(summary.risk_score),
            ..Self::new(
                job_id,
                filename,
                JobPhase::Completed,
                "Processing completed successfully",
            )
        }
    }

    pub fn failed(job_id: &str, filename: &str, error: &str) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(job_id, filename, JobPhase::Failed, "Processing failed")
        }
    }
}

/// Cloneable fan-out point shared by every pipeline worker.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: JobProgressEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }

    /// Creates a tracker for one job without emitting anything.
    pub fn tracker(&self, job_id: &str, filename: &str) -> JobProgressTracker {
        JobProgressTracker::new(job_id, filename, Arc::clone(&self.sender))
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Progress sink bound to one job.
pub struct JobProgressTracker {
    job_id: String,
    filename: String,
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressTracker {
    pub fn new(
        job_id: &str,
        filename: &str,
        sender: Arc<broadcast::Sender<JobProgressEvent>>,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            filename: filename.to_string(),
            sender,
        }
    }

    pub fn update_phase(&self, phase: JobPhase, message: &str) {
        let event = JobProgressEvent::new(&self.job_id, &self.filename, phase, message);
        let _ = self.sender.send(event);
    }

    pub fn completed(&self, summary: &CompletionSummary) {
        let event = JobProgressEvent::completed(&self.job_id, &self.filename, summary);
        let _ = self.sender.send(event);
    }

    pub fn failed(&self, error: &str) {
        let event = JobProgressEvent::failed(&self.job_id, &self.filename, error);
        let _ = self.sender.send(event);
    }
}
