use serde::{Deserialize, Serialize};

use crate::db::DatabaseError;

/// A prior completed job with identical content for the same owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateMatch {
    pub job_id: String,
    pub filename: String,
    pub created_at: String,
}

/// Lookup over persisted job history, keyed by `(owner_ref, file_hash)`.
///
/// Two concurrent uploads of the same content can both miss each other:
/// a job only becomes visible here once it is COMPLETED.
pub trait DuplicateIndex {
    fn find_completed_duplicate(
        &self,
        owner_ref: &str,
        file_hash: &str,
        excluding_job: Option<&str>,
    ) -> Result<Option<DuplicateMatch>, DatabaseError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateFinding {
    pub is_duplicate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_upload_date: Option<String>,
}

impl DuplicateFinding {
    pub fn none() -> Self {
        Self {
            is_duplicate: false,
            original_job_id: None,
            original_filename: None,
            original_upload_date: None,
        }
    }

    pub fn found(original: &DuplicateMatch) -> Self {
        Self {
            is_duplicate: true,
            original_job_id: Some(original.job_id.clone()),
            original_filename: Some(original.filename.clone()),
            original_upload_date: Some(original.created_at.clone()),
        }
    }
}

pub fn check(
    index: &dyn DuplicateIndex,
    owner_ref: &str,
    file_hash: &str,
    excluding_job: Option<&str>,
) -> Result<DuplicateFinding, DatabaseError> {
    match index.find_completed_duplicate(owner_ref, file_hash, excluding_job)? {
        Some(original) => {
            tracing::info!(original_job = %original.job_id, "Duplicate content detected");
            Ok(DuplicateFinding::found(&original))
        }
        None => Ok(DuplicateFinding::none()),
    }
}
