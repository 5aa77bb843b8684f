use super::field::FieldValue;
use super::record::EntityRecord;

/// Default scope discriminator column for sequence-backed identifiers
pub const DEFAULT_SCOPE_COLUMN: &str = "store_id";

/// Per-entity-type persistence metadata
///
/// A descriptor binds an entity type to its flat backing table and carries
/// the strategy knobs the orchestrator branches on: which column holds the
/// primary identifier, whether the type carries sequence-issued increment
/// identifiers, which columns hold compound (JSON) data, and which column
/// sets must stay unique.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    /// Entity-type code, also the sequence key (e.g. "order")
    pub entity_type: String,
    /// Main backing table
    pub main_table: String,
    /// Primary identifier column (INTEGER PRIMARY KEY)
    pub id_column: String,
    /// Column holding the increment identifier; `None` for types without one
    pub increment_column: Option<String>,
    /// Tenant/store discriminator column read for sequence scoping
    pub scope_column: String,
    /// Columns whose compound values are stored as JSON text
    pub serialized_columns: Vec<String>,
    /// Unique constraints enforced before insert/update, each a column set
    pub unique_constraints: Vec<Vec<String>>,
    /// When true, a record with an identifier but a set "new" flag still
    /// takes the insert branch
    pub use_is_new_check: bool,
}

impl EntityDescriptor {
    /// Create a descriptor with defaults: no increment column, scope read
    /// from `store_id`, no serialized columns, no unique constraints, and
    /// the is-new check enabled
    pub fn new(
        entity_type: impl Into<String>,
        main_table: impl Into<String>,
        id_column: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            main_table: main_table.into(),
            id_column: id_column.into(),
            increment_column: None,
            scope_column: DEFAULT_SCOPE_COLUMN.to_string(),
            serialized_columns: Vec::new(),
            unique_constraints: Vec::new(),
            use_is_new_check: true,
        }
    }

    /// Enable increment identifiers, stored in the given column
    pub fn with_increment_column(mut self, column: impl Into<String>) -> Self {
        self.increment_column = Some(column.into());
        self
    }

    /// Override the scope discriminator column
    pub fn with_scope_column(mut self, column: impl Into<String>) -> Self {
        self.scope_column = column.into();
        self
    }

    /// Declare a column as holding compound (JSON) data
    pub fn with_serialized_column(mut self, column: impl Into<String>) -> Self {
        self.serialized_columns.push(column.into());
        self
    }

    /// Declare a unique constraint over the given columns
    pub fn with_unique_constraint(mut self, columns: Vec<String>) -> Self {
        self.unique_constraints.push(columns);
        self
    }

    /// Disable the is-new check: any record with an identifier updates
    pub fn without_is_new_check(mut self) -> Self {
        self.use_is_new_check = false;
        self
    }

    /// Whether this entity type carries increment identifiers
    pub fn uses_increment_id(&self) -> bool {
        self.increment_column.is_some()
    }

    /// Read the sequence scope for a record from the scope column
    ///
    /// Records without a scope value fall into scope 0.
    pub fn scope_of(&self, record: &EntityRecord) -> u32 {
        match record.get(&self.scope_column) {
            Some(FieldValue::Integer(value)) if *value >= 0 => *value as u32,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let descriptor = EntityDescriptor::new("order", "orders", "entity_id");
        assert_eq!(descriptor.scope_column, DEFAULT_SCOPE_COLUMN);
        assert!(!descriptor.uses_increment_id());
        assert!(descriptor.use_is_new_check);
        assert!(descriptor.unique_constraints.is_empty());
    }

    #[test]
    fn test_builder_chain() {
        let descriptor = EntityDescriptor::new("order", "orders", "entity_id")
            .with_increment_column("increment_id")
            .with_serialized_column("payload")
            .with_unique_constraint(vec!["increment_id".to_string(), "store_id".to_string()])
            .without_is_new_check();
        assert!(descriptor.uses_increment_id());
        assert_eq!(descriptor.serialized_columns, vec!["payload"]);
        assert_eq!(descriptor.unique_constraints.len(), 1);
        assert!(!descriptor.use_is_new_check);
    }

    #[test]
    fn test_scope_of_defaults_to_zero() {
        let descriptor = EntityDescriptor::new("order", "orders", "entity_id");
        let mut record = EntityRecord::new();
        assert_eq!(descriptor.scope_of(&record), 0);

        record.set("store_id", 3i64);
        assert_eq!(descriptor.scope_of(&record), 3);

        record.set("store_id", "not a number");
        assert_eq!(descriptor.scope_of(&record), 0);
    }
}
