pub mod entity_type;
pub mod field;

pub use entity_type::{EntityType, EntityTypeId, EntityTypeRegistry, EXTENDED_TABLE_SUFFIX};
pub use field::FieldDef;
