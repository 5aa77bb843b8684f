//! Order Lifecycle Demonstration
//!
//! Walks an order entity through the full persistence lifecycle:
//! 1. Insert with sequence-issued increment identifier
//! 2. Snapshot-based no-op detection on an unchanged re-save
//! 3. Update with grid projection refresh
//! 4. Delete with grid purge

use std::sync::Arc;

use flatrow_core::logging_facility::{init, Profile};
use flatrow_core::model::{EntityDescriptor, EntityRecord};
use flatrow_store::projection::SqlGridProjection;
use flatrow_store::repo::EntityRepo;
use flatrow_store::sequence::MemorySequenceService;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init(Profile::Development);

    println!("=== Flatrow Order Lifecycle Demo ===\n");

    let mut conn = flatrow_store::db::open_in_memory()?;
    conn.execute_batch(
        "CREATE TABLE orders (
            entity_id INTEGER PRIMARY KEY AUTOINCREMENT,
            increment_id TEXT,
            store_id INTEGER NOT NULL DEFAULT 0,
            customer_name TEXT,
            total REAL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        CREATE TABLE orders_grid (
            entity_id INTEGER PRIMARY KEY,
            increment_id TEXT,
            customer_name TEXT
        );",
    )?;

    let descriptor = EntityDescriptor::new("order", "orders", "entity_id")
        .with_increment_column("increment_id");
    let mut repo = EntityRepo::new(descriptor)?
        .with_sequence(Arc::new(MemorySequenceService::new()))
        .with_projection(Box::new(SqlGridProjection::new(
            "orders",
            "orders_grid",
            "entity_id",
            vec!["increment_id".to_string(), "customer_name".to_string()],
        )));

    // Insert
    let mut order = EntityRecord::new();
    order.set("customer_name", "Alice").set("total", 42.0);
    let outcome = repo.save(&mut conn, &mut order)?;
    println!(
        "✓ First save: {:?} (id={:?}, increment_id={:?})",
        outcome,
        order.id(),
        order.increment_id()
    );

    // Unchanged re-save: no transaction, no store I/O
    let outcome = repo.save(&mut conn, &mut order)?;
    println!("✓ Second save without changes: {:?}", outcome);

    // Real change: update branch, grid refreshed
    order.set("total", 57.5);
    let outcome = repo.save(&mut conn, &mut order)?;
    println!("✓ Save after changing total: {:?}", outcome);

    let grid_name: String = conn.query_row(
        "SELECT customer_name FROM orders_grid WHERE entity_id = ?1",
        [order.id().unwrap()],
        |row| row.get(0),
    )?;
    println!("✓ Grid row mirrors the entity: customer_name={}", grid_name);

    // Delete: row removed, grid purged
    order.mark_deleted(true);
    let outcome = repo.save(&mut conn, &mut order)?;
    println!("✓ Save of deleted record: {:?}", outcome);

    let remaining: i64 = conn.query_row("SELECT COUNT(*) FROM orders_grid", [], |row| row.get(0))?;
    println!("✓ Grid rows remaining: {}", remaining);

    Ok(())
}
