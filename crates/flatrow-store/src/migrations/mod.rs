//! Migration framework for the infrastructure tables
//!
//! Migrations are embedded at compile time, applied idempotently inside a
//! transaction each, and recorded in `schema_version` with a checksum that
//! is verified on every subsequent run.

mod runner;

pub use runner::apply_migrations;

/// Migration metadata
pub struct Migration {
    pub id: &'static str,
    pub sql: &'static str,
}

/// Get all embedded migrations in order
pub fn get_migrations() -> Vec<Migration> {
    vec![Migration {
        id: "001_sequence_schema",
        sql: include_str!("../../migrations/001_sequence_schema.sql"),
    }]
}
