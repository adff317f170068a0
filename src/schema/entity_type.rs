use crate::core::{Result, StoreError};
use crate::schema::FieldDef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub type EntityTypeId = u32;

/// Suffix appended to the primary table name to derive the extended value
/// table name.
pub const EXTENDED_TABLE_SUFFIX: &str = "Bfx";

/// Static schema metadata for one entity class. Created once at
/// registration, read-only afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityType {
    id: EntityTypeId,
    name: String,
    table: String,
    fields: Vec<FieldDef>,
}

impl EntityType {
    pub fn new(
        id: EntityTypeId,
        name: impl Into<String>,
        table: impl Into<String>,
        fields: Vec<FieldDef>,
    ) -> Result<Self> {
        let name = name.into();
        let table = table.into();
        if name.is_empty() || table.is_empty() {
            return Err(StoreError::InvalidArgument(
                "Entity type name and table must not be empty".to_string(),
            ));
        }
        if !fields.iter().any(|f| f.key) {
            return Err(StoreError::InvalidArgument(format!(
                "Entity type '{}' declares no key field",
                name
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(StoreError::InvalidArgument(format!(
                    "Entity type '{}' declares field '{}' twice",
                    name, field.name
                )));
            }
        }
        Ok(Self {
            id,
            name,
            table,
            fields,
        })
    }

    pub fn id(&self) -> EntityTypeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Name of the extended value side table for this entity type.
    pub fn extended_table(&self) -> String {
        format!("{}{}", self.table, EXTENDED_TABLE_SUFFIX)
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn key_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.key)
    }

    pub fn auto_increment_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.auto_increment)
    }

    pub fn non_key_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| !f.key)
    }
}

/// Immutable registry of entity types. Cloning is cheap; mutation returns a
/// new registry (copy-on-write), so lookups never take a lock.
#[derive(Debug, Clone, Default)]
pub struct EntityTypeRegistry {
    types: Arc<HashMap<EntityTypeId, Arc<EntityType>>>,
}

impl EntityTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type, returning a new registry. The old registry is left
    /// unchanged.
    pub fn with_type(self, entity_type: EntityType) -> Result<Self> {
        if self.types.contains_key(&entity_type.id()) {
            return Err(StoreError::InvalidArgument(format!(
                "Entity type id {} is already registered",
                entity_type.id()
            )));
        }
        if self.types.values().any(|t| t.name() == entity_type.name()) {
            return Err(StoreError::InvalidArgument(format!(
                "Entity type '{}' is already registered",
                entity_type.name()
            )));
        }
        let mut new_types = (*self.types).clone();
        new_types.insert(entity_type.id(), Arc::new(entity_type));
        Ok(Self {
            types: Arc::new(new_types),
        })
    }

    pub fn get(&self, id: EntityTypeId) -> Result<Arc<EntityType>> {
        self.types
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::EntityTypeNotFound(id.to_string()))
    }

    pub fn get_by_name(&self, name: &str) -> Result<Arc<EntityType>> {
        self.types
            .values()
            .find(|t| t.name() == name)
            .cloned()
            .ok_or_else(|| StoreError::EntityTypeNotFound(name.to_string()))
    }

    pub fn contains(&self, id: EntityTypeId) -> bool {
        self.types.contains_key(&id)
    }

    pub fn list(&self) -> Vec<Arc<EntityType>> {
        self.types.values().cloned().collect()
    }
}
