//! Structural validation for descriptors and records
//!
//! Descriptor names are interpolated into SQL as identifiers, so they are
//! validated once at repository construction. Record validation runs at the
//! top of every save, inside the transaction.

use crate::errors::{FlatrowError, Result};
use crate::model::{EntityDescriptor, EntityRecord};

/// Check that a string is a safe SQL identifier
///
/// Identifiers must be nonempty, start with a letter or underscore, and
/// contain only ASCII alphanumerics and underscores.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn invalid(descriptor: &EntityDescriptor, reason: String) -> FlatrowError {
    FlatrowError::ValidationFailed {
        entity_type: descriptor.entity_type.clone(),
        reason,
    }
}

/// Validate a descriptor's identifiers and internal consistency
///
/// # Errors
///
/// Returns `ValidationFailed` when any name is empty or not a safe SQL
/// identifier, or when a unique constraint is empty.
pub fn validate_descriptor(descriptor: &EntityDescriptor) -> Result<()> {
    if descriptor.entity_type.is_empty() {
        return Err(invalid(descriptor, "entity type must not be empty".into()));
    }
    for name in [&descriptor.main_table, &descriptor.id_column, &descriptor.scope_column] {
        if !is_identifier(name) {
            return Err(invalid(
                descriptor,
                format!("'{}' is not a valid SQL identifier", name),
            ));
        }
    }
    if let Some(column) = &descriptor.increment_column {
        if !is_identifier(column) {
            return Err(invalid(
                descriptor,
                format!("increment column '{}' is not a valid SQL identifier", column),
            ));
        }
    }
    for column in &descriptor.serialized_columns {
        if !is_identifier(column) {
            return Err(invalid(
                descriptor,
                format!("serialized column '{}' is not a valid SQL identifier", column),
            ));
        }
    }
    for constraint in &descriptor.unique_constraints {
        if constraint.is_empty() {
            return Err(invalid(descriptor, "unique constraint has no columns".into()));
        }
        for column in constraint {
            if !is_identifier(column) {
                return Err(invalid(
                    descriptor,
                    format!("unique column '{}' is not a valid SQL identifier", column),
                ));
            }
        }
    }
    Ok(())
}

/// Validate a record against its descriptor before a save
///
/// The identity slots own the identifier columns; a record that smuggles
/// them into the field map would bypass the immutability guarantees.
///
/// # Errors
///
/// Returns `ValidationFailed` when a field name is not a safe identifier or
/// when the field map contains an identity column.
pub fn validate_record(descriptor: &EntityDescriptor, record: &EntityRecord) -> Result<()> {
    for field in record.values().keys() {
        if !is_identifier(field) {
            return Err(invalid(
                descriptor,
                format!("field '{}' is not a valid SQL identifier", field),
            ));
        }
        if field == &descriptor.id_column {
            return Err(invalid(
                descriptor,
                format!(
                    "field map must not contain the identifier column '{}'",
                    field
                ),
            ));
        }
        if Some(field) == descriptor.increment_column.as_ref() {
            return Err(invalid(
                descriptor,
                format!(
                    "field map must not contain the increment column '{}'",
                    field
                ),
            ));
        }
    }
    Ok(())
}
