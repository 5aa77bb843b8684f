//! Domain model: field values, entity records, and entity descriptors

pub mod descriptor;
pub mod field;
pub mod record;

pub use descriptor::EntityDescriptor;
pub use field::FieldValue;
pub use record::EntityRecord;
