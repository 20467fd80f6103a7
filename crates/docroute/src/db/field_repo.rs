//! Extracted field repository.
//!
//! Fields keep their original extracted value; a reviewer edit is stored
//! alongside it and can be reset.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use super::{job_repo, timestamp, Database, DatabaseError};
use crate::sanitize::truncate_chars;

/// Keys of the pseudo-fields written next to the extracted pairs.
pub const METADATA_FIELDS: &[&str] = &[
    "_document_type",
    "_confidence",
    "_summary",
    "_method",
    "_strategy",
];

/// Metadata values are clipped to this many characters.
pub const METADATA_VALUE_LIMIT: usize = 500;

#[derive(Debug, Clone)]
pub struct FieldRow {
    pub id: i64,
    pub job_id: String,
    pub field_name: String,
    pub original_value: String,
    pub edited_value: Option<String>,
    pub confidence: Option<f64>,
    pub is_edited: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl FieldRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            field_name: row.get("field_name")?,
            original_value: row.get("original_value")?,
            edited_value: row.get("edited_value")?,
            confidence: row.get("confidence")?,
            is_edited: row.get::<_, i64>("is_edited")? != 0,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    /// The edited value if present, else the original.
    pub fn current_value(&self) -> &str {
        match (&self.edited_value, self.is_edited) {
            (Some(edited), true) => edited,
            _ => &self.original_value,
        }
    }

    pub fn is_metadata(&self) -> bool {
        self.field_name.starts_with('_')
    }
}

/// A field about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewField {
    pub field_name: String,
    pub value: String,
    pub confidence: Option<f64>,
}

impl NewField {
    pub fn new(field_name: impl Into<String>, value: impl Into<String>, confidence: Option<f64>) -> Self {
        Self {
            field_name: field_name.into(),
            value: value.into(),
            confidence,
        }
    }
}

/// Inserts all fields for a job in one transaction. Returns the number
/// of rows written.
pub fn insert_many(
    db: &Database,
    job_id: &str,
    fields: &[NewField],
    now: DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    db.with_transaction(|tx| insert_in(tx, job_id, fields, &timestamp(now)))
}

/// Swaps the job's fields for this attempt's, provided `lease_owner` still
/// holds the job. Check, delete and insert share one transaction, so an
/// attempt whose lease was handed on cannot overwrite its successor.
pub fn replace_for_attempt(
    db: &Database,
    job_id: &str,
    lease_owner: &str,
    fields: &[NewField],
    now: DateTime<Utc>,
) -> Result<(usize, usize), DatabaseError> {
    db.with_transaction(|tx| {
        if !job_repo::holds_lease(tx, job_id, lease_owner)? {
            return Err(DatabaseError::LeaseNotHeld(job_id.to_string()));
        }
        let cleared = tx.execute(
            "DELETE FROM extracted_fields WHERE job_id = ?1",
            params![job_id],
        )?;
        let written = insert_in(tx, job_id, fields, &timestamp(now))?;
        Ok((cleared, written))
    })
}

fn insert_in(
    conn: &Connection,
    job_id: &str,
    fields: &[NewField],
    now: &str,
) -> Result<usize, DatabaseError> {
    let mut stmt = conn.prepare(
        "INSERT INTO extracted_fields
         (job_id, field_name, original_value, edited_value, confidence, is_edited,
          created_at, updated_at)
         VALUES (?1, ?2, ?3, NULL, ?4, 0, ?5, ?5)",
    )?;
    for field in fields {
        let value = if field.field_name.starts_with('_') {
            truncate_chars(&field.value, METADATA_VALUE_LIMIT)
        } else {
            field.value.clone()
        };
        stmt.execute(params![job_id, field.field_name, value, field.confidence, now])?;
    }
    Ok(fields.len())
}

/// Fields of a job in insertion order.
pub fn list_for_job(db: &Database, job_id: &str) -> Result<Vec<FieldRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM extracted_fields WHERE job_id = ?1 ORDER BY id ASC")?;
        let rows = stmt
            .query_map(params![job_id], FieldRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Drops every field of a job. Used before a retried attempt writes its
/// own fields, so a requeued job never carries two generations.
pub fn delete_for_job(db: &Database, job_id: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn.execute(
            "DELETE FROM extracted_fields WHERE job_id = ?1",
            params![job_id],
        )?)
    })
}

/// Stores a reviewer correction; the original value is kept.
pub fn edit(
    db: &Database,
    field_id: i64,
    value: &str,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE extracted_fields SET edited_value = ?2, is_edited = 1, updated_at = ?3
             WHERE id = ?1",
            params![field_id, value, timestamp(now)],
        )?;
        if affected == 0 {
            return Err(DatabaseError::FieldNotFound(field_id));
        }
        Ok(())
    })
}

/// Drops a correction, restoring the original value.
pub fn reset(db: &Database, field_id: i64, now: DateTime<Utc>) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE extracted_fields SET edited_value = NULL, is_edited = 0, updated_at = ?2
             WHERE id = ?1",
            params![field_id, timestamp(now)],
        )?;
        if affected == 0 {
            return Err(DatabaseError::FieldNotFound(field_id));
        }
        Ok(())
    })
}
