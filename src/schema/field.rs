use crate::core::{DbType, Result, StoreError, Value};
use serde::{Deserialize, Serialize};

/// A statically declared column of an entity's primary table, or the
/// field-shaped projection of an extended property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    /// Logical field name used by callers.
    pub name: String,

    /// Native column name in the table.
    pub column: String,

    pub db_type: DbType,

    /// Declared size, for sized types (CHAR/STRING).
    pub size: Option<usize>,

    pub nullable: bool,

    /// Part of the entity key.
    pub key: bool,

    /// Value is generated by the store on insert.
    pub auto_increment: bool,

    /// Set when this field is the projection of an extended property.
    pub extended: bool,

    /// Lookup set name for link-shaped fields.
    pub link_set: Option<String>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, db_type: DbType) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            db_type,
            size: None,
            nullable: true,
            key: false,
            auto_increment: false,
            extended: false,
            link_set: None,
        }
    }

    /// Use a native column name different from the logical name.
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn key(mut self) -> Self {
        self.key = true;
        self.nullable = false;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn validate(&self, value: &Value) -> Result<()> {
        if value.is_null() {
            if !self.nullable {
                return Err(StoreError::TypeMismatch(format!(
                    "Field '{}' cannot be NULL",
                    self.name
                )));
            }
            return Ok(());
        }
        if !self.db_type.is_compatible(value) {
            return Err(StoreError::TypeMismatch(format!(
                "Field '{}' expects type {}, got {}",
                self.name,
                self.db_type,
                value.type_name()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_pattern() {
        let field = FieldDef::new("Id", DbType::Int64).key().auto_increment();
        assert_eq!(field.column, "Id");
        assert!(field.key);
        assert!(field.auto_increment);
        assert!(!field.nullable);

        let field = FieldDef::new("Subject", DbType::String)
            .column("subject_text")
            .size(255);
        assert_eq!(field.column, "subject_text");
        assert_eq!(field.size, Some(255));
    }

    #[test]
    fn test_validate() {
        let field = FieldDef::new("Total", DbType::Decimal);
        assert!(field.validate(&Value::Decimal(1.5)).is_ok());
        assert!(field.validate(&Value::Int(2)).is_ok());
        assert!(field.validate(&Value::Null).is_ok());
        assert!(field.validate(&Value::Text("x".into())).is_err());

        let key = FieldDef::new("Id", DbType::Int64).key();
        assert!(key.validate(&Value::Null).is_err());
    }
}
