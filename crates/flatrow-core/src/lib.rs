//! Flatrow Core - domain kernel for flat-table entity persistence
//!
//! This crate provides the foundational pieces the persistence layer is
//! built on:
//! - `FieldValue` and the generic `EntityRecord` (a flat bag of named fields
//!   plus identity slots and lifecycle flags)
//! - `EntityDescriptor` - per-entity-type metadata (table, columns, unique
//!   constraints, increment-id configuration)
//! - `SnapshotRegistry` - fingerprint-based no-op detection for saves
//! - `EntityHooks` - the per-type extension seam (validation, before/after
//!   save, relation processing, post-commit observation)
//! - Error and logging facilities shared by the store layer

pub mod errors;
pub mod hooks;
pub mod logging_facility;
pub mod model;
pub mod rules;
pub mod snapshot;

// Re-export commonly used types
pub use errors::{FlatrowError, Result};
pub use hooks::{EntityHooks, NoopHooks};
pub use model::{EntityDescriptor, EntityRecord, FieldValue};
pub use snapshot::SnapshotRegistry;
