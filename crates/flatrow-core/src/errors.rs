use thiserror::Error;

/// Result type alias using FlatrowError
pub type Result<T> = std::result::Result<T, FlatrowError>;

/// Error taxonomy for flatrow operations
///
/// Every failure inside an open transaction rolls the transaction back and
/// propagates one of these variants untouched; this layer performs no retries
/// and no silent recovery.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlatrowError {
    /// Entity-level pre-save validation rejected the record
    #[error("Validation failed for {entity_type}: {reason}")]
    ValidationFailed { entity_type: String, reason: String },

    /// A unique constraint would be violated by the prepared field set
    #[error("Unique constraint {columns:?} violated on table {table}")]
    UniqueViolation { table: String, columns: Vec<String> },

    /// The prepared field set does not fit the target table
    #[error("Integrity violation on table {table}: {reason}")]
    IntegrityViolation { table: String, reason: String },

    /// An operation that requires a primary identifier was called on a
    /// record that has none
    #[error("Record has no primary identifier for operation '{op}'")]
    MissingIdentifier { op: String },

    /// The sequence service could not produce a value
    #[error("Sequence failure for {entity_type}/{scope_id}: {reason}")]
    SequenceFailure {
        entity_type: String,
        scope_id: u32,
        reason: String,
    },

    /// No row with the given identifier exists
    #[error("Record not found in table {table}: id {id}")]
    NotFound { table: String, id: i64 },

    /// The backing store rejected an operation
    #[error("Persistence error in '{op}': {message}")]
    Persistence { op: String, message: String },

    /// Serialization error (JSON encoding/decoding)
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl FlatrowError {
    /// Get the stable error code for this variant
    ///
    /// Codes are stable across releases and intended for programmatic
    /// handling and test assertions.
    pub fn code(&self) -> &'static str {
        match self {
            FlatrowError::ValidationFailed { .. } => "ERR_VALIDATION_FAILED",
            FlatrowError::UniqueViolation { .. } => "ERR_UNIQUE_VIOLATION",
            FlatrowError::IntegrityViolation { .. } => "ERR_INTEGRITY_VIOLATION",
            FlatrowError::MissingIdentifier { .. } => "ERR_MISSING_IDENTIFIER",
            FlatrowError::SequenceFailure { .. } => "ERR_SEQUENCE_FAILURE",
            FlatrowError::NotFound { .. } => "ERR_NOT_FOUND",
            FlatrowError::Persistence { .. } => "ERR_PERSISTENCE",
            FlatrowError::Serialization { .. } => "ERR_SERIALIZATION",
        }
    }
}

/// Conversion from serde_json::Error to FlatrowError
impl From<serde_json::Error> for FlatrowError {
    fn from(err: serde_json::Error) -> Self {
        FlatrowError::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_stable() {
        let cases = [
            (
                FlatrowError::ValidationFailed {
                    entity_type: "order".to_string(),
                    reason: "bad".to_string(),
                },
                "ERR_VALIDATION_FAILED",
            ),
            (
                FlatrowError::UniqueViolation {
                    table: "orders".to_string(),
                    columns: vec!["increment_id".to_string()],
                },
                "ERR_UNIQUE_VIOLATION",
            ),
            (
                FlatrowError::MissingIdentifier {
                    op: "delete".to_string(),
                },
                "ERR_MISSING_IDENTIFIER",
            ),
        ];
        for (err, expected_code) in cases {
            assert_eq!(err.code(), expected_code, "Wrong code for {:?}", err);
        }
    }

    #[test]
    fn test_display_includes_context() {
        let err = FlatrowError::SequenceFailure {
            entity_type: "order".to_string(),
            scope_id: 1,
            reason: "connection lost".to_string(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("order"));
        assert!(rendered.contains("connection lost"));
    }
}
