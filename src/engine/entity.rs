use crate::core::{Result, StoreError, Value};
use crate::schema::EntityType;
use std::collections::HashMap;
use std::sync::Arc;

/// Provenance of a field value, driving dirty tracking.
///
/// Demand-loaded values came from the store on request and never count as
/// dirty; only `Modified` fields produce change units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldState {
    Clean,
    Modified,
    DemandLoaded,
}

/// One entity instance: a bag of core and extended field values plus the
/// flags the save state machine evaluates.
#[derive(Debug, Clone)]
pub struct Entity {
    entity_type: Arc<EntityType>,
    values: HashMap<String, Value>,
    core_state: HashMap<String, FieldState>,
    extended: HashMap<String, Value>,
    extended_state: HashMap<String, FieldState>,
    is_new: bool,
    delete_requested: bool,
    deleted: bool,
}

impl Entity {
    /// A new entity that has never been saved.
    pub fn new(entity_type: Arc<EntityType>) -> Self {
        Self {
            entity_type,
            values: HashMap::new(),
            core_state: HashMap::new(),
            extended: HashMap::new(),
            extended_state: HashMap::new(),
            is_new: true,
            delete_requested: false,
            deleted: false,
        }
    }

    /// An entity shell about to be populated from stored rows.
    pub(crate) fn existing(entity_type: Arc<EntityType>) -> Self {
        let mut entity = Self::new(entity_type);
        entity.is_new = false;
        entity
    }

    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.entity_type
    }

    /// Set a core field, marking it modified.
    pub fn set(&mut self, field: &str, value: Value) -> Result<()> {
        self.assert_not_deleted("set a field on")?;
        let def = self.entity_type.field(field).ok_or_else(|| {
            StoreError::FieldNotFound(field.to_string(), self.entity_type.name().to_string())
        })?;
        def.validate(&value)?;
        self.values.insert(field.to_string(), value);
        self.core_state.insert(field.to_string(), FieldState::Modified);
        Ok(())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Set an extended property by native name. `Value::Null` clears it:
    /// on save the backing side-table row is removed.
    pub fn set_extended(&mut self, native_name: &str, value: Value) -> Result<()> {
        self.assert_not_deleted("set a property on")?;
        self.extended.insert(native_name.to_string(), value);
        self.extended_state
            .insert(native_name.to_string(), FieldState::Modified);
        Ok(())
    }

    pub fn get_extended(&self, native_name: &str) -> Option<&Value> {
        self.extended.get(native_name)
    }

    /// Apply a stored value without dirtying the field.
    pub(crate) fn apply_loaded(&mut self, field: &str, value: Value) {
        self.values.insert(field.to_string(), value);
        self.core_state.insert(field.to_string(), FieldState::Clean);
    }

    pub(crate) fn apply_demand_loaded(&mut self, field: &str, value: Value) {
        self.values.insert(field.to_string(), value);
        self.core_state
            .insert(field.to_string(), FieldState::DemandLoaded);
    }

    pub(crate) fn apply_loaded_extended(&mut self, native_name: &str, value: Value) {
        self.extended.insert(native_name.to_string(), value);
        self.extended_state
            .insert(native_name.to_string(), FieldState::Clean);
    }

    pub(crate) fn apply_demand_loaded_extended(&mut self, native_name: &str, value: Value) {
        self.extended.insert(native_name.to_string(), value);
        self.extended_state
            .insert(native_name.to_string(), FieldState::DemandLoaded);
    }

    /// Request deletion on next save.
    pub fn mark_deleted(&mut self) -> Result<()> {
        self.assert_not_deleted("delete")?;
        self.delete_requested = true;
        Ok(())
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_delete_requested(&self) -> bool {
        self.delete_requested
    }

    /// Physically deleted: the primary row is gone.
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn is_modified(&self) -> bool {
        self.core_state.values().any(|s| *s == FieldState::Modified)
            || self
                .extended_state
                .values()
                .any(|s| *s == FieldState::Modified)
    }

    pub(crate) fn assert_not_deleted(&self, action: &str) -> Result<()> {
        if self.deleted {
            return Err(StoreError::InvalidOperation(format!(
                "Cannot {} a deleted entity of type '{}'",
                action,
                self.entity_type.name()
            )));
        }
        Ok(())
    }

    /// Key `(column, value)` pairs for WHERE clauses. Every key field must
    /// carry a value, except that an unset auto-increment key of a new
    /// entity snapshots as `Null`; the save pipeline rebinds it after the
    /// core insert reports the generated id.
    pub fn key_column_values(&self) -> Result<Vec<(String, Value)>> {
        let mut key = Vec::new();
        for field in self.entity_type.key_fields() {
            let value = match self.values.get(&field.name) {
                Some(value) => value.clone(),
                None if self.is_new && field.auto_increment => Value::Null,
                None => {
                    return Err(StoreError::InvalidOperation(format!(
                        "Key field '{}' of entity type '{}' has no value",
                        field.name,
                        self.entity_type.name()
                    )));
                }
            };
            key.push((field.column.clone(), value));
        }
        Ok(key)
    }

    /// Core fields whose values were set by the caller, in declaration
    /// order.
    pub(crate) fn set_core_fields(&self) -> Vec<(&str, &Value)> {
        self.entity_type
            .fields()
            .iter()
            .filter_map(|f| {
                self.core_state
                    .get(&f.name)
                    .filter(|s| **s == FieldState::Modified)
                    .and_then(|_| self.values.get(&f.name))
                    .map(|v| (f.name.as_str(), v))
            })
            .collect()
    }

    /// Modified non-key core fields; an update unit is emitted only when
    /// this is non-empty.
    pub(crate) fn modified_non_key_fields(&self) -> Vec<(&str, &Value)> {
        self.entity_type
            .non_key_fields()
            .filter_map(|f| {
                self.core_state
                    .get(&f.name)
                    .filter(|s| **s == FieldState::Modified)
                    .and_then(|_| self.values.get(&f.name))
                    .map(|v| (f.name.as_str(), v))
            })
            .collect()
    }

    /// Every extended property value the entity carries.
    pub fn extended_values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.extended.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn modified_extended_values(&self) -> Vec<(&str, &Value)> {
        let mut modified: Vec<(&str, &Value)> = self
            .extended
            .iter()
            .filter(|(name, _)| {
                self.extended_state.get(*name) == Some(&FieldState::Modified)
            })
            .map(|(k, v)| (k.as_str(), v))
            .collect();
        // Deterministic unit order regardless of map iteration.
        modified.sort_by_key(|(name, _)| *name);
        modified
    }

    pub(crate) fn clear_core_modified(&mut self) {
        for state in self.core_state.values_mut() {
            if *state == FieldState::Modified {
                *state = FieldState::Clean;
            }
        }
    }

    pub(crate) fn clear_extended_modified(&mut self) {
        for state in self.extended_state.values_mut() {
            if *state == FieldState::Modified {
                *state = FieldState::Clean;
            }
        }
    }

    pub(crate) fn mark_saved(&mut self) {
        self.is_new = false;
        self.clear_core_modified();
        self.clear_extended_modified();
    }

    pub(crate) fn mark_physically_deleted(&mut self) {
        self.deleted = true;
        self.delete_requested = false;
    }

    pub(crate) fn assign_generated_key(&mut self, field: &str, id: i64) {
        self.values.insert(field.to_string(), Value::Int(id));
        self.core_state.insert(field.to_string(), FieldState::Clean);
    }
}
