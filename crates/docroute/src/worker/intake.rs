use std::path::Path;

use chrono::Utc;
use log::{info, warn};

use crate::db::job_repo::{self, JobRow};
use crate::db::Database;
use crate::error::{ProcessError, Result};
use crate::processor::{detect_kind, pdf};
use crate::sanitize;
use crate::storage::ObjectStore;
use crate::worker::pool::JobQueue;

/// An uploaded document waiting to become a job.
#[derive(Debug, Clone, Copy)]
pub struct Submission<'a> {
    pub owner_ref: &'a str,
    pub filename: &'a str,
    pub bytes: &'a [u8],
}

/// Stores the upload, records a QUEUED job and hands it to `queue`.
/// Returns the new job id.
///
/// If the job cannot be recorded the stored object is removed again. A job
/// that was recorded but could not be enqueued stays QUEUED; the daemon
/// re-dispatches QUEUED jobs on startup.
pub fn submit(
    store: &dyn ObjectStore,
    db: &Database,
    queue: &dyn JobQueue,
    submission: &Submission<'_>,
) -> Result<String> {
    if submission.bytes.is_empty() {
        return Err(ProcessError::UnsupportedFormat(format!(
            "empty upload: {}",
            submission.filename
        ))
        .into());
    }
    let kind = detect_kind(submission.filename, submission.bytes)?;

    let job_id = uuid::Uuid::new_v4().to_string();
    let filename = display_name(submission.filename);
    let file_ref = object_ref(submission.owner_ref, &job_id, &filename);

    store.put(&file_ref, submission.bytes)?;

    // Cost estimate only; never fails the upload.
    let page_estimate = if kind.is_pdf() {
        pdf::estimate_page_count(submission.bytes)
    } else {
        1
    };

    let row = JobRow::queued(
        &job_id,
        submission.owner_ref,
        &file_ref,
        &filename,
        page_estimate,
        Utc::now(),
    );
    if let Err(e) = job_repo::insert(db, &row) {
        if let Err(cleanup) = store.remove(&file_ref) {
            warn!(
                "Failed to remove unrecorded object {}: {}",
                sanitize::redact_ref(&file_ref),
                cleanup
            );
        }
        return Err(e.into());
    }

    info!(
        "Queued job {} ({}, {} page(s))",
        job_id,
        sanitize::redact_ref(&filename),
        page_estimate
    );

    queue.enqueue(&job_id)?;
    Ok(job_id)
}

/// Final path component of the uploaded name.
fn display_name(filename: &str) -> String {
    Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.trim().is_empty())
        .unwrap_or("document")
        .to_string()
}

/// `{owner}/{job_id}/{filename}` with the owner reduced to safe characters.
fn object_ref(owner_ref: &str, job_id: &str, filename: &str) -> String {
    let owner: String = owner_ref
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let owner = if owner.is_empty() { "_".to_string() } else { owner };
    format!("{}/{}/{}", owner, job_id, filename)
}
