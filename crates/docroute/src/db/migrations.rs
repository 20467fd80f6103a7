//! Database migration system.
//!
//! Forward-only: applied versions are recorded in `_migrations` and
//! pending ones run in order. Column additions are conditional so a
//! partially migrated file can be reopened.

use rusqlite::Connection;

use super::error::DatabaseError;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
    kind: MigrationKind,
}

enum MigrationKind {
    /// Execute the SQL directly.
    Standard,
    /// ALTER TABLE ADD COLUMN, skipped if the column already exists.
    AddColumn {
        table: &'static str,
        column: &'static str,
    },
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_jobs_table",
        sql: include_str!("sql/001_create_jobs.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 2,
        description: "create_extracted_fields_table",
        sql: include_str!("sql/002_create_extracted_fields.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 3,
        description: "add_lease_expires_at_to_jobs",
        sql: include_str!("sql/003_add_lease_expires_at.sql"),
        kind: MigrationKind::AddColumn {
            table: "jobs",
            column: "lease_expires_at",
        },
    },
    Migration {
        version: 4,
        description: "add_lease_owner_to_jobs",
        sql: include_str!("sql/004_add_lease_owner.sql"),
        kind: MigrationKind::AddColumn {
            table: "jobs",
            column: "lease_owner",
        },
    },
];

const TRACKING_TABLE: &str = "CREATE TABLE IF NOT EXISTS _migrations (
    version INTEGER PRIMARY KEY,
    description TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);";

/// Applies every migration newer than the recorded version and returns how
/// many were applied. Each one commits together with its `_migrations` row.
pub fn run_all(conn: &mut Connection) -> Result<usize, DatabaseError> {
    conn.execute_batch(TRACKING_TABLE)?;

    let applied: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > applied).collect();
    for migration in &pending {
        apply(conn, migration)?;
    }

    if !pending.is_empty() {
        log::info!(
            "Schema at v{} ({} migration(s) applied)",
            MIGRATIONS.last().map_or(0, |m| m.version),
            pending.len()
        );
    }
    Ok(pending.len())
}

fn apply(conn: &mut Connection, migration: &Migration) -> Result<(), DatabaseError> {
    let failed = |e: rusqlite::Error| DatabaseError::Migration {
        version: migration.version,
        reason: e.to_string(),
    };

    let tx = conn.transaction().map_err(failed)?;
    let needed = match migration.kind {
        MigrationKind::Standard => true,
        MigrationKind::AddColumn { table, column } => !column_exists(&tx, table, column)?,
    };

    if needed {
        log::info!("Applying migration v{}: {}", migration.version, migration.description);
        tx.execute_batch(migration.sql).map_err(failed)?;
    } else {
        log::debug!(
            "Migration v{} already reflected in schema, recording only",
            migration.version
        );
    }

    tx.execute(
        "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
        rusqlite::params![migration.version, migration.description],
    )
    .map_err(failed)?;
    tx.commit().map_err(failed)
}

/// `PRAGMA table_info` lookup. Table names are restricted to identifiers.
fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DatabaseError::Migration {
            version: 0,
            reason: format!("Invalid table name: {}", table),
        });
    }
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let mut names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    Ok(names.any(|name| name.is_ok_and(|n| n == column)))
}
