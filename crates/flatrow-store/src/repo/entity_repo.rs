//! Entity persistence orchestrator
//!
//! `EntityRepo` drives the save/delete lifecycle for one entity type:
//! snapshot check, transaction, hooks, sequence assignment, uniqueness and
//! integrity checks, the insert/update branch, projection refresh, timestamp
//! sync, snapshot recapture, and the post-commit callback queue.
//!
//! ## Atomicity contract
//!
//! Everything between transaction begin and commit is all-or-nothing: any
//! error rolls the transaction back, leaves the record's "data changed" flag
//! set, and propagates unchanged. The only fast path is the snapshot skip,
//! which performs no store I/O at all.

use std::sync::Arc;

use flatrow_core::errors::FlatrowError;
use flatrow_core::hooks::{EntityHooks, NoopHooks};
use flatrow_core::model::{EntityDescriptor, EntityRecord, FieldValue};
use flatrow_core::rules::validation;
use flatrow_core::snapshot::SnapshotRegistry;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Transaction};

use crate::errors::{integrity_violation, persistence, sequence_error, unique_violation, Result};
use crate::projection::ProjectionAggregator;
use crate::repo::commit::CommitContext;
use crate::repo::hydration::{record_from_row, value_to_sql};
use crate::schema::{TableCapabilities, TableSchema};
use crate::sequence::SequenceService;

/// What a save call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A new row was inserted and the record received its identifier
    Inserted,
    /// The existing row was updated
    Updated,
    /// Nothing was written (snapshot unchanged, or saving disallowed)
    Unchanged,
    /// The record was flagged deleted and took the delete path
    Deleted,
}

/// Persistence orchestrator for one entity type
///
/// The repo owns the snapshot registry and schema cache for its type;
/// the connection is supplied per call so independent repos can share one
/// logical database connection.
pub struct EntityRepo {
    descriptor: EntityDescriptor,
    snapshots: SnapshotRegistry,
    sequence: Option<Arc<dyn SequenceService>>,
    projection: Option<Box<dyn ProjectionAggregator>>,
    hooks: Box<dyn EntityHooks>,
    schema: Option<TableSchema>,
}

impl EntityRepo {
    /// Create a repo for the given descriptor
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailed` when the descriptor's identifiers are
    /// malformed.
    pub fn new(descriptor: EntityDescriptor) -> Result<Self> {
        validation::validate_descriptor(&descriptor)?;
        Ok(Self {
            descriptor,
            snapshots: SnapshotRegistry::new(),
            sequence: None,
            projection: None,
            hooks: Box::new(NoopHooks),
            schema: None,
        })
    }

    /// Attach the sequence service used for increment identifier assignment
    pub fn with_sequence(mut self, sequence: Arc<dyn SequenceService>) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Attach a projection aggregator; refresh/purge are skipped when absent
    pub fn with_projection(mut self, projection: Box<dyn ProjectionAggregator>) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Attach per-type lifecycle hooks
    pub fn with_hooks(mut self, hooks: Box<dyn EntityHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// The descriptor this repo persists
    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    /// The snapshot registry for this repo's records
    pub fn snapshots(&self) -> &SnapshotRegistry {
        &self.snapshots
    }

    /// Resolve (and cache) the main table's column layout
    fn schema(&mut self, conn: &Connection) -> Result<TableSchema> {
        if let Some(schema) = &self.schema {
            return Ok(schema.clone());
        }
        let schema = TableSchema::load(conn, &self.descriptor.main_table)?;
        self.schema = Some(schema.clone());
        Ok(schema)
    }

    /// Save a record: insert, update, delete-dispatch, or snapshot skip
    ///
    /// # Errors
    ///
    /// Any failure rolls back the open transaction, leaves the record's
    /// "data changed" flag set, and propagates unchanged; see the crate's
    /// error taxonomy.
    pub fn save(&mut self, conn: &mut Connection, record: &mut EntityRecord) -> Result<SaveOutcome> {
        if record.is_deleted() {
            self.delete(conn, record)?;
            return Ok(SaveOutcome::Deleted);
        }

        if !self.snapshots.is_modified(record)? {
            tracing::debug!(
                entity_type = %self.descriptor.entity_type,
                id = record.id(),
                "save skipped: snapshot unchanged"
            );
            self.hooks.process_relations(record)?;
            return Ok(SaveOutcome::Unchanged);
        }

        let schema = self.schema(conn)?;
        match self.save_modified(conn, &schema, record) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                // A fingerprint captured mid-transaction no longer matches
                // the store after rollback; dropping it forces the next save
                // to take the write path
                self.snapshots.forget(record);
                record.set_data_changed(true);
                Err(err)
            }
        }
    }

    fn save_modified(
        &mut self,
        conn: &mut Connection,
        schema: &TableSchema,
        record: &mut EntityRecord,
    ) -> Result<SaveOutcome> {
        let caps = schema.capabilities();
        let mut ctx = CommitContext::new();
        let outcome;

        let tx = conn.transaction().map_err(|e| persistence("begin", e))?;

        validation::validate_record(&self.descriptor, record)?;
        self.hooks.validate_before_save(record)?;
        self.hooks.before_save(record)?;

        if self.hooks.is_save_allowed(record) {
            let serialized = serialize_fields(&self.descriptor, record)?;
            self.assign_increment_id(record)?;
            check_unique(&tx, &self.descriptor, record)?;
            check_integrity(schema, &self.descriptor, record)?;

            outcome = if record.id().is_some()
                && (!self.descriptor.use_is_new_check || !record.is_new())
            {
                update_row(&tx, &self.descriptor, &caps, record)?;
                SaveOutcome::Updated
            } else {
                let id = insert_row(&tx, &self.descriptor, &caps, record)?;
                record.assign_id(id);
                record.set_is_new(false);
                SaveOutcome::Inserted
            };

            unserialize_fields(&serialized, record)?;

            if let Some(projection) = &self.projection {
                let id = record.id().ok_or_else(|| FlatrowError::MissingIdentifier {
                    op: "projection_refresh".to_string(),
                })?;
                projection.refresh(&tx, id)?;
            }
            sync_timestamps(&tx, &self.descriptor, &caps, record)?;

            self.snapshots.register(record)?;
            self.hooks.after_save(record)?;
            self.hooks.process_relations(record)?;
        } else {
            tracing::debug!(
                entity_type = %self.descriptor.entity_type,
                id = record.id(),
                "save suppressed: entity state forbids persistence"
            );
            outcome = SaveOutcome::Unchanged;
        }

        let hooks = self.hooks.as_ref();
        ctx.register(Box::new(move |rec| hooks.after_commit(rec)));
        tx.commit().map_err(|e| persistence("commit", e))?;

        record.set_data_changed(false);
        ctx.run(record);

        tracing::debug!(
            entity_type = %self.descriptor.entity_type,
            id = record.id(),
            outcome = ?outcome,
            "entity saved"
        );
        Ok(outcome)
    }

    /// Delete a record's row, purge its projection, forget its snapshot
    ///
    /// # Errors
    ///
    /// Mirrors `save`: failures roll back, set "data changed", and propagate.
    pub fn delete(&mut self, conn: &mut Connection, record: &mut EntityRecord) -> Result<()> {
        match self.delete_row(conn, record) {
            Ok(()) => Ok(()),
            Err(err) => {
                record.set_data_changed(true);
                Err(err)
            }
        }
    }

    fn delete_row(&mut self, conn: &mut Connection, record: &mut EntityRecord) -> Result<()> {
        let id = record.id().ok_or_else(|| FlatrowError::MissingIdentifier {
            op: "delete".to_string(),
        })?;

        let mut ctx = CommitContext::new();

        let tx = conn.transaction().map_err(|e| persistence("begin", e))?;

        self.hooks.before_delete(record)?;

        tx.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?1",
                self.descriptor.main_table, self.descriptor.id_column
            ),
            [id],
        )
        .map_err(|e| persistence("delete", e))?;

        if let Some(projection) = &self.projection {
            projection.purge(&tx, id)?;
        }

        self.hooks.after_delete(record)?;
        self.hooks.process_relations(record)?;

        let hooks = self.hooks.as_ref();
        ctx.register(Box::new(move |rec| hooks.after_commit(rec)));
        tx.commit().map_err(|e| persistence("commit", e))?;

        self.snapshots.forget(record);
        record.set_data_changed(false);
        ctx.run(record);

        tracing::debug!(
            entity_type = %self.descriptor.entity_type,
            id,
            "entity deleted"
        );
        Ok(())
    }

    /// Load a record by primary identifier
    ///
    /// Runs the after-load hook and registers a snapshot, so saving an
    /// unmodified loaded record is a no-op.
    pub fn load(&mut self, conn: &Connection, id: i64) -> Result<Option<EntityRecord>> {
        let schema = self.schema(conn)?;
        let column_names: Vec<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1",
            column_names.join(", "),
            self.descriptor.main_table,
            self.descriptor.id_column
        );

        let record = conn
            .query_row(&sql, [id], |row| {
                record_from_row(&self.descriptor, &schema, row)
            })
            .optional()
            .map_err(|e| persistence("load", e))?;

        match record {
            None => Ok(None),
            Some(mut record) => {
                unserialize_loaded(&self.descriptor, &mut record);
                record.set_data_changed(false);
                self.hooks.after_load(&mut record)?;
                self.snapshots.register(&record)?;
                Ok(Some(record))
            }
        }
    }

    /// Orchestrator-level before-save step: assign the next increment
    /// identifier when the type carries one and the slot is empty
    ///
    /// Runs before the insert/update branch; increment identifiers are
    /// independent of primary identifiers.
    fn assign_increment_id(&self, record: &mut EntityRecord) -> Result<()> {
        if !self.descriptor.uses_increment_id() || record.increment_id().is_some() {
            return Ok(());
        }

        let scope_id = self.descriptor.scope_of(record);
        let sequence = self.sequence.as_ref().ok_or_else(|| {
            sequence_error(
                &self.descriptor.entity_type,
                scope_id,
                "no sequence service configured",
            )
        })?;
        let value = sequence.next_value(&self.descriptor.entity_type, scope_id)?;

        tracing::debug!(
            entity_type = %self.descriptor.entity_type,
            scope_id,
            increment_id = %value,
            "assigned increment identifier"
        );
        record.set_increment_id(value);
        Ok(())
    }
}

/// Serialize compound fields of declared columns to storable text
///
/// Returns the columns actually converted so the post-write step can restore
/// exactly those, leaving caller-supplied text untouched.
fn serialize_fields(descriptor: &EntityDescriptor, record: &mut EntityRecord) -> Result<Vec<String>> {
    let mut converted = Vec::new();
    for column in &descriptor.serialized_columns {
        let text = match record.get(column) {
            Some(FieldValue::Json(value)) => Some(serde_json::to_string(value)?),
            _ => None,
        };
        if let Some(text) = text {
            record.set(column.clone(), FieldValue::Text(text));
            converted.push(column.clone());
        }
    }
    Ok(converted)
}

/// Restore compound fields that `serialize_fields` flattened
fn unserialize_fields(columns: &[String], record: &mut EntityRecord) -> Result<()> {
    for column in columns {
        let value = match record.get(column) {
            Some(FieldValue::Text(text)) => Some(serde_json::from_str(text)?),
            _ => None,
        };
        if let Some(value) = value {
            record.set(column.clone(), FieldValue::Json(value));
        }
    }
    Ok(())
}

/// Lenient compound-field restoration for loaded rows
///
/// Stored text that does not parse as JSON stays text rather than failing
/// the load.
fn unserialize_loaded(descriptor: &EntityDescriptor, record: &mut EntityRecord) {
    for column in &descriptor.serialized_columns {
        let value = match record.get(column) {
            Some(FieldValue::Text(text)) => serde_json::from_str(text).ok(),
            _ => None,
        };
        if let Some(value) = value {
            record.set(column.clone(), FieldValue::Json(value));
        }
    }
}

/// Read the value a column would be written with, for the unique probe
fn column_value(
    descriptor: &EntityDescriptor,
    record: &EntityRecord,
    column: &str,
) -> Result<Value> {
    if Some(column) == descriptor.increment_column.as_deref() {
        return Ok(match record.increment_id() {
            Some(value) => Value::Text(value.to_string()),
            None => Value::Null,
        });
    }
    match record.get(column) {
        Some(value) => value_to_sql(value),
        None => Ok(Value::Null),
    }
}

/// Enforce the descriptor's unique constraints with a probe per constraint
///
/// On update the record's own row is excluded from the probe. Constraints
/// whose probe value set contains NULL cannot match and are effectively
/// skipped, mirroring SQL unique semantics.
fn check_unique(tx: &Transaction, descriptor: &EntityDescriptor, record: &EntityRecord) -> Result<()> {
    for constraint in &descriptor.unique_constraints {
        let mut predicates = Vec::with_capacity(constraint.len() + 1);
        let mut params = Vec::with_capacity(constraint.len() + 1);
        for (index, column) in constraint.iter().enumerate() {
            predicates.push(format!("{} = ?{}", column, index + 1));
            params.push(column_value(descriptor, record, column)?);
        }
        if let Some(id) = record.id() {
            predicates.push(format!(
                "{} != ?{}",
                descriptor.id_column,
                params.len() + 1
            ));
            params.push(Value::Integer(id));
        }

        let sql = format!(
            "SELECT {} FROM {} WHERE {} LIMIT 1",
            descriptor.id_column,
            descriptor.main_table,
            predicates.join(" AND ")
        );
        let existing: Option<i64> = tx
            .query_row(&sql, rusqlite::params_from_iter(params.iter()), |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| persistence("check_unique", e))?;

        if existing.is_some() {
            return Err(unique_violation(&descriptor.main_table, constraint));
        }
    }
    Ok(())
}

/// Validate the prepared field set against the target table's constraints
fn check_integrity(
    schema: &TableSchema,
    descriptor: &EntityDescriptor,
    record: &EntityRecord,
) -> Result<()> {
    for column in record.values().keys() {
        if !schema.has_column(column) {
            return Err(integrity_violation(
                &schema.table,
                format!("unknown column '{}'", column),
            ));
        }
    }
    if record.increment_id().is_some() {
        if let Some(column) = &descriptor.increment_column {
            if !schema.has_column(column) {
                return Err(integrity_violation(
                    &schema.table,
                    format!("increment column '{}' missing from table", column),
                ));
            }
        }
    }

    let inserting = record.id().is_none() || (descriptor.use_is_new_check && record.is_new());
    if inserting {
        let caps = schema.capabilities();
        for column in &schema.columns {
            if !column.not_null || column.has_default || column.primary_key {
                continue;
            }
            // Store-owned timestamps are filled by column defaults
            if caps.timestamps() && (column.name == "created_at" || column.name == "updated_at") {
                continue;
            }
            if Some(&column.name) == descriptor.increment_column.as_ref() {
                if record.increment_id().is_none() {
                    return Err(integrity_violation(
                        &schema.table,
                        format!("required column '{}' has no value", column.name),
                    ));
                }
                continue;
            }
            let satisfied = record.get(&column.name).map(|v| !v.is_null()).unwrap_or(false);
            if !satisfied {
                return Err(integrity_violation(
                    &schema.table,
                    format!("required column '{}' has no value", column.name),
                ));
            }
        }
    }
    Ok(())
}

/// Build the (column, value) list for an insert/update
///
/// The identifier column never appears (it lives in the id slot); the
/// increment column is taken from its slot; store-owned timestamp columns
/// are excluded so the store stays authoritative for them.
fn prepare_data(
    descriptor: &EntityDescriptor,
    caps: &TableCapabilities,
    record: &EntityRecord,
) -> Result<Vec<(String, Value)>> {
    let mut data = Vec::with_capacity(record.values().len() + 1);

    if let (Some(column), Some(increment_id)) =
        (&descriptor.increment_column, record.increment_id())
    {
        data.push((column.clone(), Value::Text(increment_id.to_string())));
    }

    for (column, value) in record.values() {
        if caps.timestamps() && (column == "created_at" || column == "updated_at") {
            continue;
        }
        data.push((column.clone(), value_to_sql(value)?));
    }

    Ok(data)
}

/// Insert the prepared field set and return the store-generated identifier
fn insert_row(
    tx: &Transaction,
    descriptor: &EntityDescriptor,
    caps: &TableCapabilities,
    record: &EntityRecord,
) -> Result<i64> {
    let data = prepare_data(descriptor, caps, record)?;

    if data.is_empty() {
        tx.execute(
            &format!("INSERT INTO {} DEFAULT VALUES", descriptor.main_table),
            [],
        )
        .map_err(|e| persistence("insert", e))?;
    } else {
        let columns: Vec<&str> = data.iter().map(|(name, _)| name.as_str()).collect();
        let placeholders: Vec<String> = (1..=data.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            descriptor.main_table,
            columns.join(", "),
            placeholders.join(", ")
        );
        tx.execute(
            &sql,
            rusqlite::params_from_iter(data.iter().map(|(_, value)| value)),
        )
        .map_err(|e| persistence("insert", e))?;
    }

    Ok(tx.last_insert_rowid())
}

/// Update the row matching the record's identifier
///
/// The identifier column is excluded from the updated column set; when the
/// table carries store-owned timestamps, `updated_at` is bumped in place.
fn update_row(
    tx: &Transaction,
    descriptor: &EntityDescriptor,
    caps: &TableCapabilities,
    record: &EntityRecord,
) -> Result<()> {
    let id = record.id().ok_or_else(|| FlatrowError::MissingIdentifier {
        op: "update".to_string(),
    })?;

    let data = prepare_data(descriptor, caps, record)?;
    let mut assignments: Vec<String> = data
        .iter()
        .enumerate()
        .map(|(index, (name, _))| format!("{} = ?{}", name, index + 1))
        .collect();
    if caps.timestamps() {
        assignments.push("updated_at = CURRENT_TIMESTAMP".to_string());
    }
    if assignments.is_empty() {
        return Ok(());
    }

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?{}",
        descriptor.main_table,
        assignments.join(", "),
        descriptor.id_column,
        data.len() + 1
    );
    let mut params: Vec<Value> = data.into_iter().map(|(_, value)| value).collect();
    params.push(Value::Integer(id));

    tx.execute(&sql, rusqlite::params_from_iter(params.iter()))
        .map_err(|e| persistence("update", e))?;

    Ok(())
}

/// Read store-owned timestamps back onto the record after a write
///
/// Skipped entirely when the table lacks the columns; the store, not the
/// entity, is authoritative for these values.
fn sync_timestamps(
    tx: &Transaction,
    descriptor: &EntityDescriptor,
    caps: &TableCapabilities,
    record: &mut EntityRecord,
) -> Result<()> {
    if !caps.timestamps() {
        return Ok(());
    }
    let id = record.id().ok_or_else(|| FlatrowError::MissingIdentifier {
        op: "timestamp_sync".to_string(),
    })?;

    let row: Option<(Option<String>, Option<String>)> = tx
        .query_row(
            &format!(
                "SELECT created_at, updated_at FROM {} WHERE {} = ?1",
                descriptor.main_table, descriptor.id_column
            ),
            [id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(|e| persistence("timestamp_sync", e))?;

    if let Some((created_at, updated_at)) = row {
        if let Some(created_at) = created_at {
            record.set("created_at", FieldValue::Text(created_at));
        }
        if let Some(updated_at) = updated_at {
            record.set("updated_at", FieldValue::Text(updated_at));
        }
    }
    Ok(())
}
