//! Integration tests for the entity save/delete lifecycle
//!
//! Covers the orchestrator's contract: snapshot-based no-op skips, the
//! insert/update branch, increment identifier assignment, rollback behavior,
//! hook ordering, and commit callbacks.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use flatrow_core::errors::FlatrowError;
use flatrow_core::hooks::EntityHooks;
use flatrow_core::model::{EntityDescriptor, EntityRecord, FieldValue};
use flatrow_store::repo::{EntityRepo, SaveOutcome};
use flatrow_store::sequence::MemorySequenceService;
use rusqlite::Connection;

fn setup_orders_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE orders (
            entity_id INTEGER PRIMARY KEY AUTOINCREMENT,
            increment_id TEXT,
            store_id INTEGER NOT NULL DEFAULT 0,
            customer_name TEXT,
            customer_email TEXT,
            total REAL,
            payload TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );",
    )
    .unwrap();
    conn
}

fn order_descriptor() -> EntityDescriptor {
    EntityDescriptor::new("order", "orders", "entity_id")
        .with_increment_column("increment_id")
        .with_serialized_column("payload")
}

fn order_repo() -> EntityRepo {
    EntityRepo::new(order_descriptor())
        .unwrap()
        .with_sequence(Arc::new(MemorySequenceService::new()))
}

fn row_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))
        .unwrap()
}

/// Hooks implementation that records which extension points fired
#[derive(Clone, Default)]
struct RecordingHooks {
    log: Rc<RefCell<Vec<String>>>,
    allow_save: Rc<RefCell<bool>>,
}

impl RecordingHooks {
    fn new() -> Self {
        Self {
            log: Rc::new(RefCell::new(Vec::new())),
            allow_save: Rc::new(RefCell::new(true)),
        }
    }

    fn push(&self, label: &str) {
        self.log.borrow_mut().push(label.to_string());
    }

    fn entries(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    fn clear(&self) {
        self.log.borrow_mut().clear();
    }
}

impl EntityHooks for RecordingHooks {
    fn validate_before_save(&self, _record: &EntityRecord) -> flatrow_core::Result<()> {
        self.push("validate_before_save");
        Ok(())
    }

    fn before_save(&self, _record: &mut EntityRecord) -> flatrow_core::Result<()> {
        self.push("before_save");
        Ok(())
    }

    fn is_save_allowed(&self, _record: &EntityRecord) -> bool {
        *self.allow_save.borrow()
    }

    fn after_save(&self, _record: &mut EntityRecord) -> flatrow_core::Result<()> {
        self.push("after_save");
        Ok(())
    }

    fn before_delete(&self, _record: &mut EntityRecord) -> flatrow_core::Result<()> {
        self.push("before_delete");
        Ok(())
    }

    fn after_delete(&self, _record: &mut EntityRecord) -> flatrow_core::Result<()> {
        self.push("after_delete");
        Ok(())
    }

    fn process_relations(&self, _record: &mut EntityRecord) -> flatrow_core::Result<()> {
        self.push("process_relations");
        Ok(())
    }

    fn after_commit(&self, _record: &mut EntityRecord) {
        self.push("after_commit");
    }
}

#[test]
fn test_insert_assigns_identifiers() {
    let mut conn = setup_orders_db();
    let mut repo = order_repo();

    let mut order = EntityRecord::new();
    order.set("customer_name", "Alice").set("total", 10.5);

    let outcome = repo.save(&mut conn, &mut order).unwrap();
    assert_eq!(outcome, SaveOutcome::Inserted);
    assert_eq!(order.id(), Some(1));
    assert_eq!(order.increment_id(), Some("000000001"));
    assert!(!order.is_new());
    assert!(!order.has_data_changes());

    // Store-owned timestamps were read back
    assert!(order.get_str("created_at").is_some());
    assert!(order.get_str("updated_at").is_some());
}

#[test]
fn test_second_save_without_changes_is_noop() {
    let mut conn = setup_orders_db();
    let mut repo = order_repo();

    let mut order = EntityRecord::new();
    order.set("customer_name", "Alice");
    assert_eq!(repo.save(&mut conn, &mut order).unwrap(), SaveOutcome::Inserted);

    let outcome = repo.save(&mut conn, &mut order).unwrap();
    assert_eq!(outcome, SaveOutcome::Unchanged);
    assert_eq!(row_count(&conn), 1);
}

#[test]
fn test_overwriting_with_same_value_is_still_noop() {
    let mut conn = setup_orders_db();
    let mut repo = order_repo();

    let mut order = EntityRecord::new();
    order.set("customer_name", "A");
    repo.save(&mut conn, &mut order).unwrap();

    // Mutate to the identical value: no real change
    order.set("customer_name", "A");
    assert_eq!(repo.save(&mut conn, &mut order).unwrap(), SaveOutcome::Unchanged);

    // A real change goes through the update branch
    order.set("customer_name", "B");
    assert_eq!(repo.save(&mut conn, &mut order).unwrap(), SaveOutcome::Updated);

    let name: String = conn
        .query_row(
            "SELECT customer_name FROM orders WHERE entity_id = 1",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(name, "B");
    assert_eq!(row_count(&conn), 1);
}

#[test]
fn test_increment_identifier_assigned_once() {
    let mut conn = setup_orders_db();
    let mut repo = order_repo();

    let mut order = EntityRecord::new();
    order.set("customer_name", "Alice");
    repo.save(&mut conn, &mut order).unwrap();
    let first = order.increment_id().unwrap().to_string();
    assert!(!first.is_empty());

    order.set("customer_name", "Bob");
    repo.save(&mut conn, &mut order).unwrap();
    assert_eq!(order.increment_id(), Some(first.as_str()));

    let stored: String = conn
        .query_row(
            "SELECT increment_id FROM orders WHERE entity_id = 1",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(stored, first);
}

#[test]
fn test_update_branch_keeps_identifier() {
    let mut conn = setup_orders_db();
    let mut repo = order_repo();

    let mut order = EntityRecord::new();
    order.set("customer_name", "Alice");
    repo.save(&mut conn, &mut order).unwrap();
    assert_eq!(order.id(), Some(1));

    order.set("total", 99.0);
    assert_eq!(repo.save(&mut conn, &mut order).unwrap(), SaveOutcome::Updated);
    assert_eq!(order.id(), Some(1));
    assert_eq!(row_count(&conn), 1);
}

#[test]
fn test_unique_violation_rolls_back() {
    let mut conn = setup_orders_db();
    let descriptor =
        order_descriptor().with_unique_constraint(vec!["customer_email".to_string()]);
    let mut repo = EntityRepo::new(descriptor)
        .unwrap()
        .with_sequence(Arc::new(MemorySequenceService::new()));

    let mut first = EntityRecord::new();
    first.set("customer_email", "a@example.com");
    repo.save(&mut conn, &mut first).unwrap();

    let mut second = EntityRecord::new();
    second.set("customer_email", "a@example.com");
    let err = repo.save(&mut conn, &mut second).unwrap_err();
    assert!(matches!(err, FlatrowError::UniqueViolation { .. }));

    // No row beyond the first exists, and the failed record still signals a
    // pending change
    assert_eq!(row_count(&conn), 1);
    assert!(second.has_data_changes());
    assert_eq!(second.id(), None);
}

#[test]
fn test_unique_probe_excludes_own_row_on_update() {
    let mut conn = setup_orders_db();
    let descriptor =
        order_descriptor().with_unique_constraint(vec!["customer_email".to_string()]);
    let mut repo = EntityRepo::new(descriptor)
        .unwrap()
        .with_sequence(Arc::new(MemorySequenceService::new()));

    let mut order = EntityRecord::new();
    order.set("customer_email", "a@example.com");
    repo.save(&mut conn, &mut order).unwrap();

    // Re-saving the same record with its own email is not a violation
    order.set("total", 5.0);
    assert_eq!(repo.save(&mut conn, &mut order).unwrap(), SaveOutcome::Updated);
}

#[test]
fn test_store_rejection_rolls_back_and_sequence_is_gap_tolerant() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE orders (
            entity_id INTEGER PRIMARY KEY AUTOINCREMENT,
            increment_id TEXT,
            store_id INTEGER NOT NULL DEFAULT 0,
            customer_name TEXT,
            customer_email TEXT UNIQUE,
            total REAL,
            payload TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );",
    )
    .unwrap();
    let mut conn = conn;

    // Descriptor without the unique constraint declared: the store itself
    // rejects the duplicate
    let mut repo = order_repo();

    let mut first = EntityRecord::new();
    first.set("customer_email", "a@example.com");
    repo.save(&mut conn, &mut first).unwrap();
    assert_eq!(first.increment_id(), Some("000000001"));

    let mut second = EntityRecord::new();
    second.set("customer_email", "a@example.com");
    let err = repo.save(&mut conn, &mut second).unwrap_err();
    assert!(matches!(err, FlatrowError::Persistence { .. }));
    assert_eq!(row_count(&conn), 1);
    assert!(second.has_data_changes());

    // The failed save consumed a sequence value; the series never reuses it
    let mut third = EntityRecord::new();
    third.set("customer_email", "b@example.com");
    repo.save(&mut conn, &mut third).unwrap();
    assert_eq!(third.increment_id(), Some("000000003"));
}

#[test]
fn test_save_of_deleted_record_dispatches_to_delete() {
    let mut conn = setup_orders_db();
    let mut repo = order_repo();

    let mut order = EntityRecord::new();
    order.set("customer_name", "Alice");
    repo.save(&mut conn, &mut order).unwrap();
    assert_eq!(row_count(&conn), 1);

    order.mark_deleted(true);
    assert_eq!(repo.save(&mut conn, &mut order).unwrap(), SaveOutcome::Deleted);
    assert_eq!(row_count(&conn), 0);
    assert!(!order.has_data_changes());
}

#[test]
fn test_delete_without_identifier_is_an_error() {
    let mut conn = setup_orders_db();
    let mut repo = order_repo();

    let mut order = EntityRecord::new();
    let err = repo.delete(&mut conn, &mut order).unwrap_err();
    assert!(matches!(err, FlatrowError::MissingIdentifier { .. }));
}

#[test]
fn test_commit_callback_runs_only_after_commit() {
    let mut conn = setup_orders_db();
    let hooks = RecordingHooks::new();
    let mut repo = order_repo().with_hooks(Box::new(hooks.clone()));

    let mut order = EntityRecord::new();
    order.set("customer_name", "Alice");
    repo.save(&mut conn, &mut order).unwrap();

    let entries = hooks.entries();
    assert_eq!(
        entries,
        vec![
            "validate_before_save",
            "before_save",
            "after_save",
            "process_relations",
            "after_commit"
        ]
    );
    // Exactly once
    assert_eq!(entries.iter().filter(|e| *e == "after_commit").count(), 1);
}

#[test]
fn test_no_commit_callback_after_rollback() {
    let mut conn = setup_orders_db();
    let hooks = RecordingHooks::new();
    let descriptor =
        order_descriptor().with_unique_constraint(vec!["customer_email".to_string()]);
    let mut repo = EntityRepo::new(descriptor)
        .unwrap()
        .with_sequence(Arc::new(MemorySequenceService::new()))
        .with_hooks(Box::new(hooks.clone()));

    let mut first = EntityRecord::new();
    first.set("customer_email", "a@example.com");
    repo.save(&mut conn, &mut first).unwrap();
    hooks.clear();

    let mut second = EntityRecord::new();
    second.set("customer_email", "a@example.com");
    assert!(repo.save(&mut conn, &mut second).is_err());

    assert!(!hooks.entries().iter().any(|e| e == "after_commit"));
}

#[test]
fn test_noop_save_runs_relation_processing_only() {
    let mut conn = setup_orders_db();
    let hooks = RecordingHooks::new();
    let mut repo = order_repo().with_hooks(Box::new(hooks.clone()));

    let mut order = EntityRecord::new();
    order.set("customer_name", "Alice");
    repo.save(&mut conn, &mut order).unwrap();
    hooks.clear();

    assert_eq!(repo.save(&mut conn, &mut order).unwrap(), SaveOutcome::Unchanged);
    assert_eq!(hooks.entries(), vec!["process_relations"]);
}

#[test]
fn test_save_disallowed_writes_nothing() {
    let mut conn = setup_orders_db();
    let hooks = RecordingHooks::new();
    *hooks.allow_save.borrow_mut() = false;
    let mut repo = order_repo().with_hooks(Box::new(hooks.clone()));

    let mut order = EntityRecord::new();
    order.set("customer_name", "Alice");
    let outcome = repo.save(&mut conn, &mut order).unwrap();

    assert_eq!(outcome, SaveOutcome::Unchanged);
    assert_eq!(row_count(&conn), 0);
    assert_eq!(order.id(), None);
    assert_eq!(order.increment_id(), None);
    // The (empty) transaction still committed, so the callback ran
    assert!(hooks.entries().iter().any(|e| e == "after_commit"));
}

#[test]
fn test_delete_purges_and_processes_relations() {
    let mut conn = setup_orders_db();
    let hooks = RecordingHooks::new();
    let mut repo = order_repo().with_hooks(Box::new(hooks.clone()));

    let mut order = EntityRecord::new();
    order.set("customer_name", "Alice");
    repo.save(&mut conn, &mut order).unwrap();
    hooks.clear();

    repo.delete(&mut conn, &mut order).unwrap();
    assert_eq!(
        hooks.entries(),
        vec![
            "before_delete",
            "after_delete",
            "process_relations",
            "after_commit"
        ]
    );
}

#[test]
fn test_load_then_save_is_noop() {
    let mut conn = setup_orders_db();
    let mut repo = order_repo();

    let mut order = EntityRecord::new();
    order
        .set("customer_name", "Alice")
        .set("payload", serde_json::json!({"items": [1, 2]}));
    repo.save(&mut conn, &mut order).unwrap();
    let id = order.id().unwrap();

    let mut loaded = repo.load(&conn, id).unwrap().expect("row should exist");
    assert_eq!(loaded.get_str("customer_name"), Some("Alice"));
    assert_eq!(
        loaded.get("payload"),
        Some(&FieldValue::Json(serde_json::json!({"items": [1, 2]})))
    );
    assert_eq!(loaded.increment_id(), order.increment_id());

    assert_eq!(repo.save(&mut conn, &mut loaded).unwrap(), SaveOutcome::Unchanged);
}

#[test]
fn test_load_missing_row_returns_none() {
    let mut conn = setup_orders_db();
    let mut repo = order_repo();
    assert!(repo.load(&mut conn, 999).unwrap().is_none());
}

#[test]
fn test_serialized_payload_stored_as_text() {
    let mut conn = setup_orders_db();
    let mut repo = order_repo();

    let mut order = EntityRecord::new();
    order.set("payload", serde_json::json!({"sku": "X-1", "qty": 2}));
    repo.save(&mut conn, &mut order).unwrap();

    // Flattened to JSON text in the store
    let stored: String = conn
        .query_row("SELECT payload FROM orders WHERE entity_id = 1", [], |row| {
            row.get(0)
        })
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stored).unwrap();
    assert_eq!(parsed["sku"], "X-1");

    // Restored to compound form on the record after save
    assert!(matches!(order.get("payload"), Some(FieldValue::Json(_))));
}

#[test]
fn test_timestamps_are_store_authoritative() {
    let mut conn = setup_orders_db();
    let mut repo = order_repo();

    let mut order = EntityRecord::new();
    order.set("customer_name", "Alice");
    repo.save(&mut conn, &mut order).unwrap();

    let db_created: String = conn
        .query_row(
            "SELECT created_at FROM orders WHERE entity_id = 1",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(order.get_str("created_at"), Some(db_created.as_str()));
}

#[test]
fn test_failed_validation_propagates_untouched() {
    struct RejectingHooks;
    impl EntityHooks for RejectingHooks {
        fn validate_before_save(&self, record: &EntityRecord) -> flatrow_core::Result<()> {
            Err(FlatrowError::ValidationFailed {
                entity_type: "order".to_string(),
                reason: format!("rejected record {}", record.instance_id()),
            })
        }
    }

    let mut conn = setup_orders_db();
    let mut repo = order_repo().with_hooks(Box::new(RejectingHooks));

    let mut order = EntityRecord::new();
    order.set("customer_name", "Alice");
    let err = repo.save(&mut conn, &mut order).unwrap_err();
    assert!(matches!(err, FlatrowError::ValidationFailed { .. }));
    assert_eq!(row_count(&conn), 0);
    assert!(order.has_data_changes());
}
