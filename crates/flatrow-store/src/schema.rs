//! Table schema and capability cache
//!
//! The orchestrator resolves the main table's column layout once per
//! repository via `PRAGMA table_info` and derives capability flags from it
//! (timestamp sync is skipped when the columns are absent rather than
//! failing). Nothing here is re-queried on every save.

use rusqlite::Connection;

use crate::errors::{integrity_violation, persistence, Result};

/// One column of a backing table
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub not_null: bool,
    pub has_default: bool,
    pub primary_key: bool,
}

/// Cached column layout of a backing table
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnInfo>,
}

/// Capability flags derived from the column layout
#[derive(Debug, Clone, Copy, Default)]
pub struct TableCapabilities {
    pub has_created_at: bool,
    pub has_updated_at: bool,
}

impl TableCapabilities {
    /// Whether the store owns creation/update timestamps for this table
    pub fn timestamps(&self) -> bool {
        self.has_created_at && self.has_updated_at
    }
}

impl TableSchema {
    /// Load the column layout of a table
    ///
    /// # Errors
    ///
    /// Returns `IntegrityViolation` when the table does not exist.
    pub fn load(conn: &Connection, table: &str) -> Result<Self> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info(\"{}\")", table))
            .map_err(|e| persistence("table_info", e))?;

        let columns = stmt
            .query_map([], |row| {
                let name: String = row.get("name")?;
                let not_null: i32 = row.get("notnull")?;
                let default_value: Option<String> = row.get("dflt_value")?;
                let primary_key: i32 = row.get("pk")?;
                Ok(ColumnInfo {
                    name,
                    not_null: not_null != 0,
                    has_default: default_value.is_some(),
                    primary_key: primary_key != 0,
                })
            })
            .map_err(|e| persistence("table_info", e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| persistence("table_info", e))?;

        if columns.is_empty() {
            return Err(integrity_violation(table, "table does not exist"));
        }

        Ok(Self {
            table: table.to_string(),
            columns,
        })
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether the table has a column with the given name
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Derive the capability flags for this table
    pub fn capabilities(&self) -> TableCapabilities {
        TableCapabilities {
            has_created_at: self.has_column("created_at"),
            has_updated_at: self.has_column("updated_at"),
        }
    }
}
