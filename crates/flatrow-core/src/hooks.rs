//! Entity lifecycle hooks
//!
//! The orchestrator invokes these at fixed points in the save/delete state
//! machine. Implement the trait per entity type to attach behavior; every
//! method defaults to a no-op so implementations override only what they
//! need. This is the seam that replaces subclass overrides: behavior is
//! injected as a strategy object, not inherited.

use crate::errors::Result;
use crate::model::EntityRecord;

/// Per-entity-type extension points for the persistence lifecycle
pub trait EntityHooks {
    /// Entity-level pre-save validation; runs inside the transaction,
    /// before any write
    fn validate_before_save(&self, _record: &EntityRecord) -> Result<()> {
        Ok(())
    }

    /// Runs after validation, before field preparation
    fn before_save(&self, _record: &mut EntityRecord) -> Result<()> {
        Ok(())
    }

    /// Entity-level guard: some lifecycle states forbid persistence.
    /// Returning false skips every write for this save (not an error).
    fn is_save_allowed(&self, _record: &EntityRecord) -> bool {
        true
    }

    /// Runs after the row is written and the snapshot recaptured
    fn after_save(&self, _record: &mut EntityRecord) -> Result<()> {
        Ok(())
    }

    /// Runs after a record is hydrated from the store
    fn after_load(&self, _record: &mut EntityRecord) -> Result<()> {
        Ok(())
    }

    /// Runs inside the delete transaction, before the row is removed
    fn before_delete(&self, _record: &mut EntityRecord) -> Result<()> {
        Ok(())
    }

    /// Runs inside the delete transaction, after the row is removed
    fn after_delete(&self, _record: &mut EntityRecord) -> Result<()> {
        Ok(())
    }

    /// Relation-processing extension point
    ///
    /// Invoked on every save - including the snapshot-skip fast path - and
    /// on delete. No-op in this core.
    fn process_relations(&self, _record: &mut EntityRecord) -> Result<()> {
        Ok(())
    }

    /// Post-commit observer; runs exactly once, only after a successful
    /// commit, never after a rollback
    fn after_commit(&self, _record: &mut EntityRecord) {}
}

/// Hooks implementation with every extension point left as a no-op
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl EntityHooks for NoopHooks {}
