use thiserror::Error;

use crate::db::DatabaseError;
use crate::error::{ProcessError, StorageError};

/// Fatal-per-job failures. The `Display` text is what the job's
/// `error_message` shows its owner.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to fetch document: {0}")]
    Fetch(#[source] StorageError),

    #[error("Failed to prepare local working copy: {0}")]
    LocalCopy(#[source] StorageError),

    #[error("Failed to hash document: {0}")]
    Hash(#[source] StorageError),

    #[error("Document classification failed: {0}")]
    Classification(#[source] ProcessError),

    #[error("Field extraction failed: {0}")]
    Extraction(#[source] ProcessError),

    #[error("Failed to persist results: {0}")]
    Persistence(#[source] DatabaseError),

    #[error("Integrity analysis failed: {0}")]
    Integrity(#[source] DatabaseError),

    #[error("Failed to serialize risk report: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The job stopped being ours while it ran.
    #[error("Processing lease lost")]
    LeaseLost,
}
