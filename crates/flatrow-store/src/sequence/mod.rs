//! Sequence service - monotonic human-readable identifier issuance
//!
//! Each (entity type, scope) pair owns a strictly increasing counter.
//! `next_value` is a side-effecting read-and-increment: no two callers ever
//! observe the same value, and issued values are never reused. The SQLite
//! implementation runs on its own dedicated connection so an entity
//! transaction that rolls back does not un-issue a value - the series is
//! gap-tolerant by design.

mod format;

pub use format::SequenceProfile;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};

use crate::errors::{persistence, sequence_error, Result};
use crate::migrations;

/// External generator of unique, ordered, human-readable identifiers
///
/// Uniqueness across concurrent callers for the same (entity type, scope)
/// pair is a correctness requirement on implementations; the orchestrator
/// treats a call as atomic and issues no locking of its own.
pub trait SequenceService {
    fn next_value(&self, entity_type: &str, scope_id: u32) -> Result<String>;
}

/// Sequence service backed by the `sequence_profile`/`sequence_value` tables
///
/// Increment requests for the same scope are serialized internally: the
/// connection is mutex-guarded and each issuance runs in an IMMEDIATE
/// transaction, so SQLite's write lock arbitrates between processes too.
pub struct SqliteSequenceService {
    conn: Mutex<Connection>,
}

impl SqliteSequenceService {
    /// Wrap an existing connection, applying infrastructure migrations
    pub fn new(mut conn: Connection) -> Result<Self> {
        migrations::apply_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a dedicated connection to the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(crate::db::open(path)?)
    }

    /// Get a handle on the sequence for one (entity type, scope) pair
    pub fn get_sequence(&self, entity_type: &str, scope_id: u32) -> Sequence<'_> {
        Sequence {
            service: self,
            entity_type: entity_type.to_string(),
            scope_id,
        }
    }

    fn issue(&self, entity_type: &str, scope_id: u32) -> Result<String> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| sequence_error(entity_type, scope_id, "sequence connection poisoned"))?;

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| persistence("sequence_begin", e))?;

        tx.execute(
            "INSERT OR IGNORE INTO sequence_value (entity_type, scope_id, current_value)
             VALUES (?1, ?2, 0)",
            rusqlite::params![entity_type, scope_id],
        )
        .map_err(|e| persistence("sequence_seed", e))?;

        tx.execute(
            "UPDATE sequence_value SET current_value = current_value + 1
             WHERE entity_type = ?1 AND scope_id = ?2",
            rusqlite::params![entity_type, scope_id],
        )
        .map_err(|e| persistence("sequence_increment", e))?;

        let value: i64 = tx
            .query_row(
                "SELECT current_value FROM sequence_value
                 WHERE entity_type = ?1 AND scope_id = ?2",
                rusqlite::params![entity_type, scope_id],
                |row| row.get(0),
            )
            .map_err(|e| persistence("sequence_read", e))?;

        let profile = load_or_seed_profile(&tx, entity_type, scope_id)?;

        tx.commit().map_err(|e| persistence("sequence_commit", e))?;

        tracing::debug!(entity_type, scope_id, value, "issued sequence value");

        Ok(profile.format_value(value as u64))
    }
}

/// Load the formatting profile for a sequence, seeding defaults on first use
fn load_or_seed_profile(
    tx: &Transaction,
    entity_type: &str,
    scope_id: u32,
) -> Result<SequenceProfile> {
    let existing = tx
        .query_row(
            "SELECT prefix, suffix, pad_width FROM sequence_profile
             WHERE entity_type = ?1 AND scope_id = ?2",
            rusqlite::params![entity_type, scope_id],
            |row| {
                Ok(SequenceProfile {
                    prefix: row.get(0)?,
                    suffix: row.get(1)?,
                    pad_width: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(|e| persistence("sequence_profile", e))?;

    if let Some(profile) = existing {
        return Ok(profile);
    }

    let profile = SequenceProfile::for_scope(scope_id);
    tx.execute(
        "INSERT INTO sequence_profile (entity_type, scope_id, prefix, suffix, pad_width)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            entity_type,
            scope_id,
            profile.prefix,
            profile.suffix,
            profile.pad_width
        ],
    )
    .map_err(|e| persistence("sequence_profile_seed", e))?;

    Ok(profile)
}

/// Handle on one sequence; each `next_value` call is an atomic issuance
pub struct Sequence<'a> {
    service: &'a SqliteSequenceService,
    entity_type: String,
    scope_id: u32,
}

impl Sequence<'_> {
    /// Issue the next value in this series
    pub fn next_value(&self) -> Result<String> {
        self.service.issue(&self.entity_type, self.scope_id)
    }
}

impl SequenceService for SqliteSequenceService {
    fn next_value(&self, entity_type: &str, scope_id: u32) -> Result<String> {
        self.get_sequence(entity_type, scope_id).next_value()
    }
}

/// In-memory sequence service for hermetic tests
///
/// Counters live in process memory; formatting uses a single shared profile.
pub struct MemorySequenceService {
    counters: Mutex<HashMap<(String, u32), u64>>,
    profile: SequenceProfile,
}

impl MemorySequenceService {
    /// Create a service with the default 9-digit profile
    pub fn new() -> Self {
        Self::with_profile(SequenceProfile::default())
    }

    /// Create a service with a custom formatting profile
    pub fn with_profile(profile: SequenceProfile) -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            profile,
        }
    }
}

impl Default for MemorySequenceService {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceService for MemorySequenceService {
    fn next_value(&self, entity_type: &str, scope_id: u32) -> Result<String> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| sequence_error(entity_type, scope_id, "counter lock poisoned"))?;
        let counter = counters
            .entry((entity_type.to_string(), scope_id))
            .or_insert(0);
        *counter += 1;
        Ok(self.profile.format_value(*counter))
    }
}
