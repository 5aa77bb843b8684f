//! Fingerprint computation for entity records
//!
//! A fingerprint is a SHA256 digest over the canonical JSON rendering of a
//! record's persisted state: the identity slots plus the ordered field map.
//! Field ordering is canonical because the record stores fields in a
//! `BTreeMap`, so the same state always yields the same digest.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::errors::Result;
use crate::model::{EntityRecord, FieldValue};

/// Serializable view of the state a fingerprint covers
#[derive(Serialize)]
struct FingerprintView<'a> {
    id: Option<i64>,
    increment_id: Option<&'a str>,
    values: &'a std::collections::BTreeMap<String, FieldValue>,
}

/// Compute the fingerprint of a record's current state
///
/// # Errors
///
/// Returns `FlatrowError::Serialization` if JSON serialization fails.
pub fn compute_fingerprint(record: &EntityRecord) -> Result<String> {
    let view = FingerprintView {
        id: record.id(),
        increment_id: record.increment_id(),
        values: record.values(),
    };
    let canonical = serde_json::to_string(&view)?;
    Ok(hash_string(&canonical))
}

/// Hash a string using SHA256, hex-encoded
fn hash_string(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}
