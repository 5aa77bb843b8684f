//! Hydration layer - converts between field values and SQLite values
//!
//! Loads table rows back into `EntityRecord`s (identity columns land in the
//! identity slots, everything else in the field map) and converts field
//! values into bind parameters for insert/update.

use flatrow_core::errors::Result;
use flatrow_core::model::{EntityDescriptor, EntityRecord, FieldValue};
use rusqlite::types::{Value, ValueRef};

use crate::schema::TableSchema;

/// Convert a field value into a SQLite bind value
///
/// Compound values are flattened to JSON text; the orchestrator normally
/// does this ahead of time for declared serialized columns, so this branch
/// covers undeclared compound fields.
pub fn value_to_sql(value: &FieldValue) -> Result<Value> {
    Ok(match value {
        FieldValue::Null => Value::Null,
        FieldValue::Integer(v) => Value::Integer(*v),
        FieldValue::Real(v) => Value::Real(*v),
        FieldValue::Text(v) => Value::Text(v.clone()),
        FieldValue::Bool(v) => Value::Integer(i64::from(*v)),
        FieldValue::Json(v) => Value::Text(serde_json::to_string(v)?),
    })
}

/// Convert a SQLite value into a field value
///
/// BLOB columns are not modeled by the field taxonomy and hydrate as `Null`.
pub fn value_from_sql(value: ValueRef<'_>) -> FieldValue {
    match value {
        ValueRef::Null => FieldValue::Null,
        ValueRef::Integer(v) => FieldValue::Integer(v),
        ValueRef::Real(v) => FieldValue::Real(v),
        ValueRef::Text(v) => FieldValue::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(_) => FieldValue::Null,
    }
}

/// Build an `EntityRecord` from a row selected in schema column order
///
/// The identifier column fills the id slot, the increment column (when the
/// descriptor declares one) fills the increment slot, and remaining columns
/// land in the field map. The record comes back with `is_new` cleared and no
/// pending data changes.
pub fn record_from_row(
    descriptor: &EntityDescriptor,
    schema: &TableSchema,
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<EntityRecord> {
    let mut record = EntityRecord::new();

    for (index, column) in schema.columns.iter().enumerate() {
        if column.name == descriptor.id_column {
            if let Some(id) = row.get::<_, Option<i64>>(index)? {
                record.assign_id(id);
            }
            continue;
        }
        if Some(&column.name) == descriptor.increment_column.as_ref() {
            if let Some(increment_id) = row.get::<_, Option<String>>(index)? {
                record.set_increment_id(increment_id);
            }
            continue;
        }
        let value = value_from_sql(row.get_ref(index)?);
        record.set(column.name.clone(), value);
    }

    record.set_is_new(false);
    record.set_data_changed(false);
    Ok(record)
}
