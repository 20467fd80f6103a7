use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::job_repo::JobRow;
use crate::db::{parse_timestamp, DatabaseError};
use crate::integrity::{RiskLevel, RiskReport};

/// Lifecycle of a job. COMPLETED and FAILED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUEUED" => Ok(JobStatus::Queued),
            "PROCESSING" => Ok(JobStatus::Processing),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// A job as the rest of the crate sees it, decoded from its row.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub owner_ref: String,
    pub file_ref: String,
    pub filename: String,
    pub file_hash: Option<String>,
    pub page_estimate: usize,
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub risk_report: Option<RiskReport>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// MIME type guessed from the stored filename.
    pub fn mime_type(&self) -> Option<String> {
        mime_guess::from_path(&self.filename)
            .first()
            .map(|m| m.to_string())
    }
}

impl TryFrom<JobRow> for Job {
    type Error = DatabaseError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<JobStatus>()
            .map_err(|_| DatabaseError::InvalidColumn {
                column: "status",
                value: row.status.clone(),
            })?;

        let risk_report = row
            .risk_report
            .as_deref()
            .map(serde_json::from_str::<RiskReport>)
            .transpose()?;

        let page_estimate =
            usize::try_from(row.page_estimate).map_err(|_| DatabaseError::InvalidColumn {
                column: "page_estimate",
                value: row.page_estimate.to_string(),
            })?;

        Ok(Self {
            status,
            risk_report,
            page_estimate,
            lease_expires_at: row
                .lease_expires_at
                .as_deref()
                .map(|v| parse_timestamp("lease_expires_at", v))
                .transpose()?,
            created_at: parse_timestamp("created_at", &row.created_at)?,
            updated_at: parse_timestamp("updated_at", &row.updated_at)?,
            completed_at: row
                .completed_at
                .as_deref()
                .map(|v| parse_timestamp("completed_at", v))
                .transpose()?,
            id: row.id,
            owner_ref: row.owner_ref,
            file_ref: row.file_ref,
            filename: row.filename,
            file_hash: row.file_hash,
            error_message: row.error_message,
        })
    }
}

/// What one processing attempt ended in.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed {
        job_id: String,
        overall_risk: RiskLevel,
        risk_score: u8,
        field_count: usize,
    },
    Failed {
        job_id: String,
        error: String,
    },
    /// The claim was refused; someone else owns or finished the job.
    Skipped {
        job_id: String,
        status: String,
    },
    /// The lease was taken away mid-run; no terminal write was made.
    Abandoned {
        job_id: String,
    },
}

impl JobOutcome {
    pub fn job_id(&self) -> &str {
        match self {
            JobOutcome::Completed { job_id, .. }
            | JobOutcome::Failed { job_id, .. }
            | JobOutcome::Skipped { job_id, .. }
            | JobOutcome::Abandoned { job_id } => job_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Completed { .. })
    }
}
