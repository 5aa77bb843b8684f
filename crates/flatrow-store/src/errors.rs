//! Error helpers for flatrow-store
//!
//! Wraps flatrow-core's error taxonomy with store-specific constructors

use flatrow_core::errors::FlatrowError;

/// Result type alias using FlatrowError
pub type Result<T> = flatrow_core::errors::Result<T>;

/// Create a persistence error from a rusqlite error
pub fn persistence(op: &str, err: rusqlite::Error) -> FlatrowError {
    FlatrowError::Persistence {
        op: op.to_string(),
        message: err.to_string(),
    }
}

/// Create a migration error
pub fn migration_error(migration_id: &str, reason: &str) -> FlatrowError {
    FlatrowError::Persistence {
        op: "migration".to_string(),
        message: format!("Migration {} failed: {}", migration_id, reason),
    }
}

/// Create a checksum mismatch error for an already-applied migration
pub fn checksum_mismatch(migration_id: &str, expected: &str, actual: &str) -> FlatrowError {
    FlatrowError::IntegrityViolation {
        table: "schema_version".to_string(),
        reason: format!(
            "Checksum mismatch for migration {}: expected {}, got {}",
            migration_id, expected, actual
        ),
    }
}

/// Create a sequence failure error
pub fn sequence_error(entity_type: &str, scope_id: u32, reason: &str) -> FlatrowError {
    FlatrowError::SequenceFailure {
        entity_type: entity_type.to_string(),
        scope_id,
        reason: reason.to_string(),
    }
}

/// Create a unique-constraint violation error
pub fn unique_violation(table: &str, columns: &[String]) -> FlatrowError {
    FlatrowError::UniqueViolation {
        table: table.to_string(),
        columns: columns.to_vec(),
    }
}

/// Create an integrity violation error
pub fn integrity_violation(table: &str, reason: impl Into<String>) -> FlatrowError {
    FlatrowError::IntegrityViolation {
        table: table.to_string(),
        reason: reason.into(),
    }
}
