//! Database connection management
//!
//! Provides utilities for opening and configuring SQLite connections

use std::path::Path;

use rusqlite::Connection;

use crate::errors::{persistence, Result};

/// Open a SQLite database at the given path
pub fn open<P: AsRef<Path>>(path: P) -> Result<Connection> {
    Connection::open(path).map_err(|e| persistence("open", e))
}

/// Open an in-memory SQLite database (for testing)
pub fn open_in_memory() -> Result<Connection> {
    Connection::open_in_memory().map_err(|e| persistence("open_in_memory", e))
}

/// Configure a connection with the settings the orchestrator expects
pub fn configure(conn: &Connection) -> Result<()> {
    // Enable foreign keys
    conn.execute("PRAGMA foreign_keys = ON", [])
        .map_err(|e| persistence("configure", e))?;

    // Set WAL mode for better concurrency across independent callers
    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(|e| persistence("configure", e))?;

    Ok(())
}
