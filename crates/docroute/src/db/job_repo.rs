//! Job repository: lifecycle writes for the `jobs` table.
//!
//! Every status change is a guarded `UPDATE ... WHERE status = ...`, so a
//! terminal job can never be moved again and two claims cannot both win.
//! A claim also writes a fresh `lease_owner` token; writes made on behalf
//! of that attempt must present it, so a worker whose lease was swept and
//! handed to another claim can no longer touch the job.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{timestamp, Database, DatabaseError};
use crate::worker::job::JobStatus;

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub owner_ref: String,
    pub file_ref: String,
    pub filename: String,
    pub file_hash: Option<String>,
    pub page_estimate: i64,
    pub status: String,
    pub error_message: Option<String>,
    /// Serialized `RiskReport`.
    pub risk_report: Option<String>,
    pub lease_expires_at: Option<String>,
    /// Token of the attempt currently holding the lease.
    pub lease_owner: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            owner_ref: row.get("owner_ref")?,
            file_ref: row.get("file_ref")?,
            filename: row.get("filename")?,
            file_hash: row.get("file_hash")?,
            page_estimate: row.get("page_estimate")?,
            status: row.get("status")?,
            error_message: row.get("error_message")?,
            risk_report: row.get("risk_report")?,
            lease_expires_at: row.get("lease_expires_at")?,
            lease_owner: row.get("lease_owner")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }

    /// A fresh QUEUED row.
    pub fn queued(
        id: &str,
        owner_ref: &str,
        file_ref: &str,
        filename: &str,
        page_estimate: usize,
        now: DateTime<Utc>,
    ) -> Self {
        let now = timestamp(now);
        Self {
            id: id.to_string(),
            owner_ref: owner_ref.to_string(),
            file_ref: file_ref.to_string(),
            filename: filename.to_string(),
            file_hash: None,
            page_estimate: page_estimate as i64,
            status: JobStatus::Queued.as_str().to_string(),
            error_message: None,
            risk_report: None,
            lease_expires_at: None,
            lease_owner: None,
            created_at: now.clone(),
            updated_at: now,
            completed_at: None,
        }
    }
}

/// Inserts a new job row.
pub fn insert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO jobs (id, owner_ref, file_ref, filename, file_hash, page_estimate,
             status, error_message, risk_report, lease_expires_at, lease_owner, created_at,
             updated_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                job.id,
                job.owner_ref,
                job.file_ref,
                job.filename,
                job.file_hash,
                job.page_estimate,
                job.status,
                job.error_message,
                job.risk_report,
                job.lease_expires_at,
                job.lease_owner,
                job.created_at,
                job.updated_at,
                job.completed_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| find_in(conn, id))
}

fn find_in(conn: &Connection, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    Ok(conn
        .query_row("SELECT * FROM jobs WHERE id = ?1", params![id], JobRow::from_row)
        .optional()?)
}

/// Newest first.
pub fn list_by_owner(db: &Database, owner_ref: &str) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM jobs WHERE owner_ref = ?1 ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt
            .query_map(params![owner_ref], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Oldest first, so re-dispatch preserves intake order.
pub fn list_by_status(db: &Database, status: JobStatus) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM jobs WHERE status = ?1 ORDER BY created_at ASC, id ASC")?;
        let rows = stmt
            .query_map(params![status.as_str()], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Deletes a job and, through the foreign key, its extracted fields.
/// Returns `false` when no such job exists.
pub fn delete(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    })
}

/// QUEUED -> PROCESSING, taking a lease until `lease_until`. Returns the
/// new attempt's lease token.
pub fn claim(
    db: &Database,
    id: &str,
    lease_until: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<String, DatabaseError> {
    let lease_owner = Uuid::new_v4().to_string();
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE jobs SET status = ?2, lease_expires_at = ?3, lease_owner = ?4, updated_at = ?5
             WHERE id = ?1 AND status = ?6",
            params![
                id,
                JobStatus::Processing.as_str(),
                timestamp(lease_until),
                lease_owner,
                timestamp(now),
                JobStatus::Queued.as_str(),
            ],
        )?;
        ensure_transition(conn, affected, id, JobStatus::Processing)
    })?;
    Ok(lease_owner)
}

/// Extends the lease of a job still PROCESSING under `lease_owner`.
pub fn renew_lease(
    db: &Database,
    id: &str,
    lease_owner: &str,
    lease_until: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE jobs SET lease_expires_at = ?3, updated_at = ?4
             WHERE id = ?1 AND lease_owner = ?2 AND status = ?5",
            params![
                id,
                lease_owner,
                timestamp(lease_until),
                timestamp(now),
                JobStatus::Processing.as_str(),
            ],
        )?;
        Ok(affected > 0)
    })
}

pub fn record_hash(
    db: &Database,
    id: &str,
    lease_owner: &str,
    file_hash: &str,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE jobs SET file_hash = ?3, updated_at = ?4
             WHERE id = ?1 AND lease_owner = ?2 AND status = ?5",
            params![
                id,
                lease_owner,
                file_hash,
                timestamp(now),
                JobStatus::Processing.as_str(),
            ],
        )?;
        ensure_held(conn, affected, id, JobStatus::Processing)
    })
}

/// PROCESSING -> COMPLETED with the serialized risk report.
pub fn complete(
    db: &Database,
    id: &str,
    lease_owner: &str,
    risk_report: &str,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let now = timestamp(now);
        let affected = conn.execute(
            "UPDATE jobs SET status = ?3, risk_report = ?4, error_message = NULL,
             lease_expires_at = NULL, lease_owner = NULL, completed_at = ?5, updated_at = ?5
             WHERE id = ?1 AND lease_owner = ?2 AND status = ?6",
            params![
                id,
                lease_owner,
                JobStatus::Completed.as_str(),
                risk_report,
                now,
                JobStatus::Processing.as_str(),
            ],
        )?;
        ensure_held(conn, affected, id, JobStatus::Completed)
    })
}

/// PROCESSING -> FAILED with a human-readable cause.
pub fn fail(
    db: &Database,
    id: &str,
    lease_owner: &str,
    error_message: &str,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let now = timestamp(now);
        let affected = conn.execute(
            "UPDATE jobs SET status = ?3, error_message = ?4, lease_expires_at = NULL,
             lease_owner = NULL, completed_at = ?5, updated_at = ?5
             WHERE id = ?1 AND lease_owner = ?2 AND status = ?6",
            params![
                id,
                lease_owner,
                JobStatus::Failed.as_str(),
                error_message,
                now,
                JobStatus::Processing.as_str(),
            ],
        )?;
        ensure_held(conn, affected, id, JobStatus::Failed)
    })
}

/// Whether `lease_owner` still holds the PROCESSING lease on `id`.
pub(crate) fn holds_lease(
    conn: &Connection,
    id: &str,
    lease_owner: &str,
) -> Result<bool, DatabaseError> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM jobs WHERE id = ?1 AND lease_owner = ?2 AND status = ?3",
            params![id, lease_owner, JobStatus::Processing.as_str()],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

/// The earliest COMPLETED job of `owner_ref` with identical content.
pub fn find_completed_by_hash(
    db: &Database,
    owner_ref: &str,
    file_hash: &str,
    excluding: Option<&str>,
) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM jobs
                 WHERE owner_ref = ?1 AND file_hash = ?2 AND status = ?3
                   AND (?4 IS NULL OR id != ?4)
                 ORDER BY completed_at ASC, id ASC
                 LIMIT 1",
                params![owner_ref, file_hash, JobStatus::Completed.as_str(), excluding],
                JobRow::from_row,
            )
            .optional()?)
    })
}

/// PROCESSING jobs whose lease is missing or ended before `now`.
pub fn find_expired_leases(db: &Database, now: DateTime<Utc>) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM jobs
             WHERE status = ?1 AND (lease_expires_at IS NULL OR lease_expires_at < ?2)
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(
                params![JobStatus::Processing.as_str(), timestamp(now)],
                JobRow::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// PROCESSING -> QUEUED for a job whose lease is still expired at `now`.
/// Returns `false` if the lease was renewed or the job moved meanwhile.
pub fn requeue(db: &Database, id: &str, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let now = timestamp(now);
        let affected = conn.execute(
            "UPDATE jobs SET status = ?2, lease_expires_at = NULL, lease_owner = NULL,
             updated_at = ?3
             WHERE id = ?1 AND status = ?4
               AND (lease_expires_at IS NULL OR lease_expires_at < ?3)",
            params![
                id,
                JobStatus::Queued.as_str(),
                now,
                JobStatus::Processing.as_str(),
            ],
        )?;
        Ok(affected > 0)
    })
}

/// PROCESSING -> FAILED for a job whose lease is still expired at `now`.
pub fn fail_expired(
    db: &Database,
    id: &str,
    error_message: &str,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let now = timestamp(now);
        let affected = conn.execute(
            "UPDATE jobs SET status = ?2, error_message = ?3, lease_expires_at = NULL,
             lease_owner = NULL, completed_at = ?4, updated_at = ?4
             WHERE id = ?1 AND status = ?5
               AND (lease_expires_at IS NULL OR lease_expires_at < ?4)",
            params![
                id,
                JobStatus::Failed.as_str(),
                error_message,
                now,
                JobStatus::Processing.as_str(),
            ],
        )?;
        Ok(affected > 0)
    })
}

/// Turns a zero-row guarded update into a precise error.
fn ensure_transition(
    conn: &Connection,
    affected: usize,
    id: &str,
    to: JobStatus,
) -> Result<(), DatabaseError> {
    if affected > 0 {
        return Ok(());
    }
    match find_in(conn, id)? {
        None => Err(DatabaseError::JobNotFound(id.to_string())),
        Some(row) => Err(DatabaseError::InvalidTransition {
            id: id.to_string(),
            from: row.status,
            to: to.as_str().to_string(),
        }),
    }
}

/// Like [`ensure_transition`] for writes guarded by a lease token: a miss
/// on a job that is still PROCESSING means another attempt holds it.
fn ensure_held(
    conn: &Connection,
    affected: usize,
    id: &str,
    to: JobStatus,
) -> Result<(), DatabaseError> {
    if affected > 0 {
        return Ok(());
    }
    match find_in(conn, id)? {
        Some(row) if row.status == JobStatus::Processing.as_str() => {
            Err(DatabaseError::LeaseNotHeld(id.to_string()))
        }
        _ => ensure_transition(conn, affected, id, to),
    }
}
