pub mod catalog;
pub mod data_type;
pub mod settings;

pub use catalog::{ExtendedPropertyDef, PropertyCatalog, MAX_NATIVE_NAME_LEN};
pub use data_type::{ExtendedDataType, ScalarKind, DEFAULT_STRING_SIZE};
pub use settings::{ExtensionSettings, SETTINGS_SCHEMA_VERSION};
