//! Database error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating directories or files.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// The database lock was poisoned.
    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Field not found: {0}")]
    FieldNotFound(i64),

    /// A status write that the job lifecycle does not allow.
    #[error("Job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: String,
        to: String,
    },

    /// The job is still PROCESSING, but under another attempt's lease.
    #[error("Job {0} is held by another processing attempt")]
    LeaseNotHeld(String),

    #[error("Invalid value in column '{column}': {value}")]
    InvalidColumn { column: &'static str, value: String },

    #[error("Failed to serialize column value: {0}")]
    Serialization(#[from] serde_json::Error),
}
