//! Grid projection aggregator
//!
//! A projection keeps a denormalized read-model row in sync with an entity
//! row. `refresh` recomputes the grid row from the persisted entity state;
//! `purge` removes it. Rows are always replaced whole, never partially
//! updated. Both calls take the live connection so they join the
//! orchestrator's transaction.

use rusqlite::Connection;

use crate::errors::{persistence, Result};

/// Optional collaborator refreshing a denormalized read model
///
/// The orchestrator attempts `refresh` after every successful insert/update
/// and `purge` after every successful delete; when no aggregator is
/// configured both are skipped.
pub trait ProjectionAggregator {
    /// Recompute and replace the grid row for `entity_id`
    fn refresh(&self, conn: &Connection, entity_id: i64) -> Result<()>;

    /// Remove the grid row for `entity_id`
    fn purge(&self, conn: &Connection, entity_id: i64) -> Result<()>;
}

/// Projection that mirrors selected columns of the source table into a grid
/// table via `INSERT OR REPLACE ... SELECT`
pub struct SqlGridProjection {
    source_table: String,
    grid_table: String,
    id_column: String,
    columns: Vec<String>,
}

impl SqlGridProjection {
    /// Create a projection mirroring `columns` (plus the id column) from
    /// `source_table` into `grid_table`
    pub fn new(
        source_table: impl Into<String>,
        grid_table: impl Into<String>,
        id_column: impl Into<String>,
        columns: Vec<String>,
    ) -> Self {
        Self {
            source_table: source_table.into(),
            grid_table: grid_table.into(),
            id_column: id_column.into(),
            columns,
        }
    }

    fn column_list(&self) -> String {
        let mut names = Vec::with_capacity(self.columns.len() + 1);
        names.push(self.id_column.clone());
        names.extend(self.columns.iter().cloned());
        names.join(", ")
    }
}

impl ProjectionAggregator for SqlGridProjection {
    fn refresh(&self, conn: &Connection, entity_id: i64) -> Result<()> {
        let columns = self.column_list();
        let sql = format!(
            "INSERT OR REPLACE INTO {grid} ({columns})
             SELECT {columns} FROM {source} WHERE {id} = ?1",
            grid = self.grid_table,
            columns = columns,
            source = self.source_table,
            id = self.id_column,
        );
        conn.execute(&sql, [entity_id])
            .map_err(|e| persistence("grid_refresh", e))?;

        tracing::debug!(grid = %self.grid_table, entity_id, "refreshed grid row");
        Ok(())
    }

    fn purge(&self, conn: &Connection, entity_id: i64) -> Result<()> {
        let sql = format!(
            "DELETE FROM {grid} WHERE {id} = ?1",
            grid = self.grid_table,
            id = self.id_column,
        );
        conn.execute(&sql, [entity_id])
            .map_err(|e| persistence("grid_purge", e))?;

        tracing::debug!(grid = %self.grid_table, entity_id, "purged grid row");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE orders (
                entity_id INTEGER PRIMARY KEY AUTOINCREMENT,
                customer_name TEXT,
                total REAL
            );
            CREATE TABLE orders_grid (
                entity_id INTEGER PRIMARY KEY,
                customer_name TEXT
            );",
        )
        .unwrap();
        conn
    }

    fn grid() -> SqlGridProjection {
        SqlGridProjection::new(
            "orders",
            "orders_grid",
            "entity_id",
            vec!["customer_name".to_string()],
        )
    }

    #[test]
    fn test_refresh_mirrors_row() {
        let conn = setup();
        conn.execute(
            "INSERT INTO orders (customer_name, total) VALUES ('Alice', 10.0)",
            [],
        )
        .unwrap();

        grid().refresh(&conn, 1).unwrap();

        let name: String = conn
            .query_row(
                "SELECT customer_name FROM orders_grid WHERE entity_id = 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(name, "Alice");
    }

    #[test]
    fn test_refresh_replaces_whole_row() {
        let conn = setup();
        conn.execute(
            "INSERT INTO orders (customer_name, total) VALUES ('Alice', 10.0)",
            [],
        )
        .unwrap();
        grid().refresh(&conn, 1).unwrap();

        conn.execute("UPDATE orders SET customer_name = 'Bob' WHERE entity_id = 1", [])
            .unwrap();
        grid().refresh(&conn, 1).unwrap();

        let name: String = conn
            .query_row(
                "SELECT customer_name FROM orders_grid WHERE entity_id = 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(name, "Bob");
    }

    #[test]
    fn test_purge_removes_row() {
        let conn = setup();
        conn.execute(
            "INSERT INTO orders (customer_name, total) VALUES ('Alice', 10.0)",
            [],
        )
        .unwrap();
        let projection = grid();
        projection.refresh(&conn, 1).unwrap();
        projection.purge(&conn, 1).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM orders_grid", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_refresh_missing_source_row_is_a_noop() {
        let conn = setup();
        grid().refresh(&conn, 99).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM orders_grid", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
