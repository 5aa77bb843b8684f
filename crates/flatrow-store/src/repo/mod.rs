//! Repository layer - the entity persistence orchestrator
//!
//! `EntityRepo` composes the snapshot registry, sequence service, optional
//! projection aggregator, and per-type hooks into the save/delete/load
//! lifecycle over a flat SQLite table.

mod commit;
mod entity_repo;
mod hydration;

pub use commit::CommitContext;
pub use entity_repo::{EntityRepo, SaveOutcome};
pub use hydration::{record_from_row, value_from_sql, value_to_sql};
