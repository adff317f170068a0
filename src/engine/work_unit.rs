//! Change units.
//!
//! One unit describes one SQL operation bound to an entity type and a
//! value snapshot. Values are copied out of the entity when the unit is
//! built; mutating the entity afterward never changes what the unit
//! executes.

use crate::core::{Result, StoreError};
use crate::engine::entity::Entity;
use crate::schema::EntityTypeId;
use crate::sql::Statement;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkUnitKind {
    Insert,
    Update,
    Delete,
    /// DDL marker; reconciliation treats it as a no-op.
    Schema,
}

/// Which table a unit touches: the entity's primary table or its extended
/// value side table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitTarget {
    Core,
    Extended,
}

#[derive(Debug, Clone)]
pub struct WorkUnit {
    kind: WorkUnitKind,
    target: UnitTarget,
    entity_type_id: EntityTypeId,
    statement: Statement,
}

impl WorkUnit {
    pub fn new(
        kind: WorkUnitKind,
        target: UnitTarget,
        entity_type_id: EntityTypeId,
        statement: Statement,
    ) -> Self {
        Self {
            kind,
            target,
            entity_type_id,
            statement,
        }
    }

    pub fn kind(&self) -> WorkUnitKind {
        self.kind
    }

    pub fn target(&self) -> UnitTarget {
        self.target
    }

    pub fn entity_type_id(&self) -> EntityTypeId {
        self.entity_type_id
    }

    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    /// Render the unit's SQL text.
    pub fn sql(&self) -> String {
        self.statement.sql()
    }

    /// Insert unit for the entity's primary row. Auto-increment fields are
    /// omitted unless the caller assigned them explicitly.
    pub fn core_insert(entity: &Entity) -> Result<Self> {
        let entity_type = entity.entity_type();
        let mut columns = Vec::new();
        let mut values = Vec::new();
        for (name, value) in entity.set_core_fields() {
            let field = entity_type.field(name).ok_or_else(|| {
                StoreError::FieldNotFound(name.to_string(), entity_type.name().to_string())
            })?;
            columns.push(field.column.clone());
            values.push(value.clone());
        }
        Ok(Self::new(
            WorkUnitKind::Insert,
            UnitTarget::Core,
            entity_type.id(),
            Statement::Insert {
                table: entity_type.table().to_string(),
                columns,
                values,
            },
        ))
    }

    /// Update unit for the modified non-key fields of the primary row.
    /// Returns `None` when no non-key core field changed.
    pub fn core_update(entity: &Entity) -> Result<Option<Self>> {
        let entity_type = entity.entity_type();
        let modified = entity.modified_non_key_fields();
        if modified.is_empty() {
            return Ok(None);
        }
        let mut set = Vec::new();
        for (name, value) in modified {
            let field = entity_type.field(name).ok_or_else(|| {
                StoreError::FieldNotFound(name.to_string(), entity_type.name().to_string())
            })?;
            set.push((field.column.clone(), value.clone()));
        }
        Ok(Some(Self::new(
            WorkUnitKind::Update,
            UnitTarget::Core,
            entity_type.id(),
            Statement::Update {
                table: entity_type.table().to_string(),
                set,
                filter: entity.key_column_values()?,
            },
        )))
    }

    /// Delete unit for the primary row.
    pub fn core_delete(entity: &Entity) -> Result<Self> {
        let entity_type = entity.entity_type();
        Ok(Self::new(
            WorkUnitKind::Delete,
            UnitTarget::Core,
            entity_type.id(),
            Statement::Delete {
                table: entity_type.table().to_string(),
                filter: entity.key_column_values()?,
            },
        ))
    }
}
