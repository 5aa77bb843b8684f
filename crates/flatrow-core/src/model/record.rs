use std::collections::BTreeMap;

use uuid::Uuid;

use super::field::FieldValue;

/// Generic mutable entity record
///
/// A record is a flat bag of named field values plus two identity slots and
/// three lifecycle flags. The identity slots are deliberately kept out of the
/// field map: the primary identifier is owned by the store (assigned on first
/// insert, immutable afterwards) and the increment identifier is owned by the
/// sequence service (assigned at most once, only when absent).
///
/// The `instance_id` is a process-local token assigned at construction. It
/// keys the snapshot registry for records that have never been inserted and
/// therefore have no primary identifier yet.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    instance_id: Uuid,
    id: Option<i64>,
    increment_id: Option<String>,
    values: BTreeMap<String, FieldValue>,
    is_new: bool,
    deleted: bool,
    data_changed: bool,
}

impl EntityRecord {
    /// Create a new, never-persisted record
    ///
    /// New records are flagged `is_new` and `data_changed`; both are cleared
    /// by the first successful save.
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            id: None,
            increment_id: None,
            values: BTreeMap::new(),
            is_new: true,
            deleted: false,
            data_changed: true,
        }
    }

    /// Process-local identity token (stable for the life of this value)
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Primary identifier, `None` until the first insert
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    /// Assign the store-generated primary identifier
    ///
    /// Called by the persistence layer on the insert path. The identifier is
    /// immutable for the record's lifetime once assigned.
    pub fn assign_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    /// Human-readable increment identifier, `None` until assigned
    pub fn increment_id(&self) -> Option<&str> {
        self.increment_id.as_deref()
    }

    /// Assign the increment identifier
    ///
    /// The persistence layer assigns one only when the slot is empty; it is
    /// never reassigned on update.
    pub fn set_increment_id(&mut self, value: impl Into<String>) {
        self.increment_id = Some(value.into());
    }

    /// Get a field value by name
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    /// Get a field as an integer, if present and integral
    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(FieldValue::as_i64)
    }

    /// Get a field as a string slice, if present and textual
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_str)
    }

    /// Set a field value, marking the record as having data changes
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> &mut Self {
        self.values.insert(field.into(), value.into());
        self.data_changed = true;
        self
    }

    /// Remove a field, marking the record as having data changes
    pub fn unset(&mut self, field: &str) -> Option<FieldValue> {
        let removed = self.values.remove(field);
        if removed.is_some() {
            self.data_changed = true;
        }
        removed
    }

    /// All field values, ordered by field name
    pub fn values(&self) -> &BTreeMap<String, FieldValue> {
        &self.values
    }

    /// Whether this record has never been inserted
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Set the "new" flag (cleared by the persistence layer after insert)
    pub fn set_is_new(&mut self, is_new: bool) {
        self.is_new = is_new;
    }

    /// Whether this record is flagged for deletion
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Flag or unflag this record for deletion
    ///
    /// A save of a record flagged deleted is dispatched to the delete path.
    pub fn mark_deleted(&mut self, deleted: bool) {
        self.deleted = deleted;
    }

    /// Whether an un-persisted data change is pending
    ///
    /// True after any mutation and after any failed save; false only after a
    /// successful save or delete.
    pub fn has_data_changes(&self) -> bool {
        self.data_changed
    }

    /// Set the "data changed" flag (managed by the persistence layer)
    pub fn set_data_changed(&mut self, changed: bool) {
        self.data_changed = changed;
    }
}

impl Default for EntityRecord {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_flags() {
        let record = EntityRecord::new();
        assert!(record.is_new());
        assert!(!record.is_deleted());
        assert!(record.has_data_changes());
        assert_eq!(record.id(), None);
        assert_eq!(record.increment_id(), None);
    }

    #[test]
    fn test_set_marks_data_changed() {
        let mut record = EntityRecord::new();
        record.set_data_changed(false);
        record.set("name", "A");
        assert!(record.has_data_changes());
        assert_eq!(record.get_str("name"), Some("A"));
    }

    #[test]
    fn test_unset_absent_field_keeps_flag() {
        let mut record = EntityRecord::new();
        record.set_data_changed(false);
        assert!(record.unset("missing").is_none());
        assert!(!record.has_data_changes());
    }

    #[test]
    fn test_identity_slots() {
        let mut record = EntityRecord::new();
        record.assign_id(42);
        record.set_increment_id("100000001");
        assert_eq!(record.id(), Some(42));
        assert_eq!(record.increment_id(), Some("100000001"));
    }

    #[test]
    fn test_instance_ids_distinct() {
        let a = EntityRecord::new();
        let b = EntityRecord::new();
        assert_ne!(a.instance_id(), b.instance_id());
    }
}
