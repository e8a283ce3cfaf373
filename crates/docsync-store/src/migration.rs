//! Database schema migrations for SQLite.
//!
//! Versioned: each migration moves the schema from version N to N+1 inside
//! one transaction.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// Idempotent: running it against an up-to-date database is a no-op.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(from = current, to = CURRENT_VERSION, "metadata schema migrated");
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- One row per synchronized object
        CREATE TABLE mapped_objects (
            remote_id TEXT PRIMARY KEY,
            parent_id TEXT,                   -- NULL only for the sync root
            name TEXT NOT NULL,
            kind TEXT NOT NULL,               -- File, Folder or Unknown
            change_token TEXT,
            local_write_time INTEGER,         -- Unix ms
            remote_write_time INTEGER,        -- Unix ms
            checksum BLOB,
            checksum_algorithm TEXT,
            content_size INTEGER,
            guid TEXT,                        -- stable local identity
            ignored INTEGER NOT NULL DEFAULT 0
        );

        -- Single-valued settings such as the change-log token
        CREATE TABLE settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Resume state of interrupted uploads, stored as JSON
        CREATE TABLE transfers (
            remote_id TEXT PRIMARY KEY,
            state TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE INDEX idx_mapped_parent ON mapped_objects(parent_id);
        CREATE INDEX idx_mapped_guid ON mapped_objects(guid);
        "#,
    )?;

    Ok(())
}

/// Current time in Unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
