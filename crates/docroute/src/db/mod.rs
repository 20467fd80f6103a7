//! Persistent jobs, extracted fields and risk reports in SQLite.
//!
//! Repositories are free functions over [`Database`]; status changes are
//! conditional updates so concurrent workers cannot regress a job.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;

pub mod error;
pub mod field_repo;
pub mod job_repo;
pub mod migrations;

pub use error::DatabaseError;

use crate::integrity::{DuplicateIndex, DuplicateMatch};

/// Shared handle over one SQLite connection. Clones share the connection;
/// every call takes the lock for its duration.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens or creates the file at `path`, creating parent directories,
    /// and brings the schema up to date.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        // WAL lets the API read job rows while a worker writes.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let db = Self::prepare(conn)?;

        log::info!("Database opened at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(mut conn: Connection) -> Result<Self, DatabaseError> {
        // Fields cascade with their job.
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        migrations::run_all(&mut conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Provides locked access to the underlying connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }

    /// Like [`with_conn`](Self::with_conn) but inside a transaction that
    /// commits only when `f` succeeds.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T, DatabaseError>,
    {
        let mut conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

impl DuplicateIndex for Database {
    fn find_completed_duplicate(
        &self,
        owner_ref: &str,
        file_hash: &str,
        excluding_job: Option<&str>,
    ) -> Result<Option<DuplicateMatch>, DatabaseError> {
        let row = job_repo::find_completed_by_hash(self, owner_ref, file_hash, excluding_job)?;
        Ok(row.map(|r| DuplicateMatch {
            job_id: r.id,
            filename: r.filename,
            created_at: r.created_at,
        }))
    }
}

/// Fixed-width UTC timestamps, so SQL string comparison orders them.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(column: &'static str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DatabaseError::InvalidColumn {
            column,
            value: value.to_string(),
        })
}
