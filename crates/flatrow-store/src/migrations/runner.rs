//! Migration runner
//!
//! Applies embedded migrations with checksum verification and idempotency

use rusqlite::Connection;
use sha2::{Digest, Sha256};

use crate::errors::{checksum_mismatch, migration_error, persistence, Result};
use crate::migrations::get_migrations;

/// Apply all pending migrations to the database
pub fn apply_migrations(conn: &mut Connection) -> Result<()> {
    create_schema_version_table(conn)?;

    for migration in get_migrations() {
        apply_migration(conn, migration.id, migration.sql)?;
    }

    Ok(())
}

/// Create the schema_version table if it doesn't exist
fn create_schema_version_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY,
            migration_id TEXT NOT NULL UNIQUE,
            applied_at INTEGER NOT NULL,
            checksum TEXT
        )",
        [],
    )
    .map_err(|e| persistence("schema_version", e))?;

    Ok(())
}

/// Apply a single migration if not already applied
///
/// An already-applied migration is verified against its recorded checksum so
/// an edited migration file is detected instead of silently ignored.
fn apply_migration(conn: &mut Connection, migration_id: &str, sql: &str) -> Result<()> {
    let checksum = compute_checksum(sql);

    let recorded: Option<Option<String>> = conn
        .query_row(
            "SELECT checksum FROM schema_version WHERE migration_id = ?",
            [migration_id],
            |row| row.get(0),
        )
        .map(Some)
        .unwrap_or(None);

    if let Some(recorded) = recorded {
        if let Some(recorded) = recorded {
            if recorded != checksum {
                return Err(checksum_mismatch(migration_id, &recorded, &checksum));
            }
        }
        // Idempotent: already applied
        return Ok(());
    }

    let tx = conn
        .transaction()
        .map_err(|e| persistence("migration_begin", e))?;

    tx.execute_batch(sql)
        .map_err(|e| migration_error(migration_id, &e.to_string()))?;

    let now = chrono::Utc::now().timestamp();
    tx.execute(
        "INSERT INTO schema_version (migration_id, applied_at, checksum) VALUES (?, ?, ?)",
        rusqlite::params![migration_id, now, checksum],
    )
    .map_err(|e| persistence("migration_record", e))?;

    tx.commit().map_err(|e| persistence("migration_commit", e))?;

    tracing::debug!(migration_id, "applied migration");

    Ok(())
}

/// Compute SHA256 checksum of migration SQL
fn compute_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
