//! Snapshot registry - fingerprint-based no-op detection for saves
//!
//! The registry keeps one fingerprint per live record, captured after load
//! and after every successful save. A save request first asks `is_modified`;
//! when the answer is false the persistence layer skips all store I/O.

pub mod fingerprint;

use std::collections::HashMap;

use uuid::Uuid;

use crate::errors::Result;
use crate::model::EntityRecord;
use fingerprint::compute_fingerprint;

/// Identity a fingerprint is keyed by
///
/// Persisted records are keyed by their primary identifier so the snapshot
/// survives reloads; never-inserted records fall back to the process-local
/// instance token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SnapshotKey {
    Persisted(i64),
    Unsaved(Uuid),
}

fn key_for(record: &EntityRecord) -> SnapshotKey {
    match record.id() {
        Some(id) => SnapshotKey::Persisted(id),
        None => SnapshotKey::Unsaved(record.instance_id()),
    }
}

/// Registry of entity fingerprints, one per live record
#[derive(Debug, Default)]
pub struct SnapshotRegistry {
    fingerprints: HashMap<SnapshotKey, String>,
}

impl SnapshotRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            fingerprints: HashMap::new(),
        }
    }

    /// Capture a fresh fingerprint for the record, replacing any prior one
    ///
    /// Called after load and after a successful save - never after a skipped
    /// save, since nothing changed. When a record gains its primary
    /// identifier the stale pre-insert entry is dropped.
    pub fn register(&mut self, record: &EntityRecord) -> Result<()> {
        let fingerprint = compute_fingerprint(record)?;
        if record.id().is_some() {
            self.fingerprints
                .remove(&SnapshotKey::Unsaved(record.instance_id()));
        }
        tracing::trace!(key = ?key_for(record), "registered entity snapshot");
        self.fingerprints.insert(key_for(record), fingerprint);
        Ok(())
    }

    /// Compare the record's current state against its last fingerprint
    ///
    /// Returns true when no fingerprint exists yet (never saved or loaded)
    /// or when any identity slot or field value differs.
    pub fn is_modified(&self, record: &EntityRecord) -> Result<bool> {
        match self.fingerprints.get(&key_for(record)) {
            None => Ok(true),
            Some(previous) => Ok(previous != &compute_fingerprint(record)?),
        }
    }

    /// Drop the fingerprint for a record (after delete)
    pub fn forget(&mut self, record: &EntityRecord) {
        if let Some(id) = record.id() {
            self.fingerprints.remove(&SnapshotKey::Persisted(id));
        }
        self.fingerprints
            .remove(&SnapshotKey::Unsaved(record.instance_id()));
    }

    /// Number of live fingerprints
    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    /// Whether the registry holds no fingerprints
    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }
}
