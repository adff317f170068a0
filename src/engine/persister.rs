//! Save orchestration.
//!
//! A save is one synchronous call: build change units in memory, execute
//! them sequentially inside one transaction scope, commit, then reconcile
//! in-memory entity state. Rollback is the only automatic recovery and it
//! never restores dirty flags mutated before the save began.
//!
//! Concurrency policy: two concurrent saves of the same entity are last
//! write wins. There is no row-version check.

use crate::backend::{Backend, ExecOutcome};
use crate::core::{DbType, Result, StoreError, Value};
use crate::engine::entity::Entity;
use crate::engine::work_unit::{UnitTarget, WorkUnit, WorkUnitKind};
use crate::extended::PropertyCatalog;
use crate::provider::ExtensibilityProvider;
use crate::schema::EntityType;
use crate::sql::{SelectItem, SelectStatement};
use std::sync::{Arc, RwLock};

/// Target of one loaded column when applying a result row back onto an
/// entity.
enum LoadTarget {
    Core { field: String, fixed_length: bool },
    Extended { native_name: String },
}

/// Persistence engine for one entity type.
pub struct Persister {
    entity_type: Arc<EntityType>,
    provider: Arc<dyn ExtensibilityProvider>,
    catalog: Arc<RwLock<PropertyCatalog>>,
}

impl Persister {
    pub fn new(
        entity_type: Arc<EntityType>,
        provider: Arc<dyn ExtensibilityProvider>,
        catalog: Arc<RwLock<PropertyCatalog>>,
    ) -> Self {
        Self {
            entity_type,
            provider,
            catalog,
        }
    }

    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.entity_type
    }

    /// Build the ordered change-unit list for one entity. Pure: no side
    /// effects, usable for batch collection before a shared transaction.
    ///
    /// Ordering is fixed: a core insert precedes every extended insert
    /// (the side table's key references the core row), and extended
    /// delete-all precedes the core delete.
    pub fn work_units(&self, entity: &Entity) -> Result<Vec<WorkUnit>> {
        if entity.entity_type().id() != self.entity_type.id() {
            return Err(StoreError::InvalidArgument(format!(
                "Entity of type '{}' handed to the '{}' persister",
                entity.entity_type().name(),
                self.entity_type.name()
            )));
        }
        entity.assert_not_deleted("save")?;
        let catalog = self.catalog.read()?;

        if entity.is_delete_requested() {
            if entity.is_new() {
                // Never persisted, nothing to remove.
                return Ok(Vec::new());
            }
            let mut units = self.provider.delete_work_units(entity)?;
            units.push(WorkUnit::core_delete(entity)?);
            return Ok(units);
        }

        if entity.is_new() {
            let mut units = vec![WorkUnit::core_insert(entity)?];
            units.extend(self.provider.insert_work_units(entity, &catalog)?);
            return Ok(units);
        }

        let mut units = Vec::new();
        if let Some(update) = WorkUnit::core_update(entity)? {
            units.push(update);
        }
        units.extend(self.provider.update_work_units(entity, &catalog)?);
        Ok(units)
    }

    /// Commit the entity's state inside one transaction.
    pub fn save_changes(&self, backend: &mut dyn Backend, entity: &mut Entity) -> Result<()> {
        let units = self.work_units(entity)?;
        if units.is_empty() {
            return Ok(());
        }
        let side_available = self.ensure_side_table(backend, &units)?;
        tracing::debug!(
            entity_type = %self.entity_type.name(),
            units = units.len(),
            "saving entity"
        );

        backend.begin()?;
        let executed = match self.execute_units(backend, &units, side_available) {
            Ok(executed) => executed,
            Err(err) => {
                tracing::warn!(
                    entity_type = %self.entity_type.name(),
                    error = %err,
                    "save failed, rolling back"
                );
                backend.rollback()?;
                return Err(err);
            }
        };
        backend.commit()?;
        self.reconcile(entity, &executed)
    }

    /// Commit without the transaction wrapper, for callers that manage
    /// their own scope.
    pub fn save_changes_outside_transaction(
        &self,
        backend: &mut dyn Backend,
        entity: &mut Entity,
    ) -> Result<()> {
        let units = self.work_units(entity)?;
        if units.is_empty() {
            return Ok(());
        }
        let side_available = self.ensure_side_table(backend, &units)?;
        let executed = self.execute_units(backend, &units, side_available)?;
        self.reconcile(entity, &executed)
    }

    /// Save several entities in one all-or-nothing transaction. Units are
    /// concatenated in entity order; reconciliation happens per entity
    /// only after the whole batch commits.
    pub fn save_batch(&self, backend: &mut dyn Backend, entities: &mut [Entity]) -> Result<()> {
        let mut all_units = Vec::new();
        let mut spans = Vec::with_capacity(entities.len());
        for entity in entities.iter() {
            let units = self.work_units(entity)?;
            spans.push((all_units.len(), units.len()));
            all_units.extend(units);
        }
        if all_units.is_empty() {
            return Ok(());
        }
        let side_available = self.ensure_side_table(backend, &all_units)?;

        backend.begin()?;
        let executed = match self.execute_units(backend, &all_units, side_available) {
            Ok(executed) => executed,
            Err(err) => {
                tracing::warn!(
                    entity_type = %self.entity_type.name(),
                    error = %err,
                    "batch save failed, rolling back"
                );
                backend.rollback()?;
                return Err(err);
            }
        };
        backend.commit()?;

        for (entity, (start, len)) in entities.iter_mut().zip(spans) {
            self.reconcile(entity, &executed[start..start + len])?;
        }
        Ok(())
    }

    /// Apply post-commit state changes for one executed batch. Units
    /// belonging to other entity types are skipped; a cross-type batch
    /// reconciles per type.
    pub fn reconcile(
        &self,
        entity: &mut Entity,
        executed: &[(WorkUnit, ExecOutcome)],
    ) -> Result<()> {
        for (unit, outcome) in executed {
            if unit.entity_type_id() != self.entity_type.id() {
                continue;
            }
            match (unit.target(), unit.kind()) {
                (UnitTarget::Core, WorkUnitKind::Insert) => {
                    self.assign_generated_key(entity, outcome)?;
                    entity.mark_saved();
                }
                (UnitTarget::Core, WorkUnitKind::Update) => {
                    entity.clear_core_modified();
                }
                (UnitTarget::Core, WorkUnitKind::Delete) => {
                    entity.mark_physically_deleted();
                }
                (UnitTarget::Core, WorkUnitKind::Schema) => {}
                (UnitTarget::Extended, _) => {
                    entity.clear_extended_modified();
                }
            }
        }
        Ok(())
    }

    /// Reload exactly the requested fields (core or extended) with
    /// demand-load provenance.
    pub fn demand_load(
        &self,
        backend: &mut dyn Backend,
        entity: &mut Entity,
        fields: &[&str],
    ) -> Result<()> {
        entity.assert_not_deleted("demand-load")?;
        if entity.is_new() {
            return Err(StoreError::InvalidOperation(
                "Cannot demand-load a new entity".to_string(),
            ));
        }
        if fields.is_empty() {
            return Ok(());
        }

        let catalog = self.catalog.read()?;
        let mut select = SelectStatement::new(self.entity_type.table());
        let mut targets = Vec::with_capacity(fields.len());
        for name in fields {
            if let Some(field) = self.entity_type.field(name) {
                select.items.push(SelectItem::Column {
                    column: field.column.clone(),
                    alias: None,
                });
                targets.push(LoadTarget::Core {
                    field: field.name.clone(),
                    fixed_length: field.db_type == DbType::Char,
                });
            } else if let Some(def) = catalog
                .by_name(self.entity_type.id(), name)
                .or_else(|| catalog.by_native_name(self.entity_type.id(), name))
            {
                self.provider
                    .add_to_select(&mut select, &self.entity_type, def)?;
                targets.push(LoadTarget::Extended {
                    native_name: def.native_name.clone(),
                });
            } else {
                return Err(StoreError::FieldNotFound(
                    (*name).to_string(),
                    self.entity_type.name().to_string(),
                ));
            }
        }
        for (column, value) in entity.key_column_values()? {
            select.filter.push((column, value));
        }

        let mut rows = backend.query(&select)?;
        let row = if rows.is_empty() {
            return Err(StoreError::NotFound(format!(
                "{} row to demand-load",
                self.entity_type.name()
            )));
        } else {
            rows.remove(0)
        };
        if row.len() != targets.len() {
            return Err(StoreError::ExecutionError(format!(
                "Demand load returned {} values for {} requested fields",
                row.len(),
                targets.len()
            )));
        }

        for (target, value) in targets.iter().zip(row) {
            match target {
                LoadTarget::Core {
                    field,
                    fixed_length,
                } => {
                    let value = trim_fixed_length(value, *fixed_length);
                    entity.apply_demand_loaded(field, value);
                }
                LoadTarget::Extended { native_name } => {
                    entity.apply_demand_loaded_extended(native_name, value);
                }
            }
        }
        Ok(())
    }

    /// Fetch one entity by key values, or `None` when no row matches.
    pub fn get_by_id(
        &self,
        backend: &mut dyn Backend,
        key_values: &[Value],
    ) -> Result<Option<Entity>> {
        let key_fields: Vec<_> = self.entity_type.key_fields().collect();
        if key_values.len() != key_fields.len() {
            return Err(StoreError::InvalidArgument(format!(
                "Entity type '{}' has {} key fields, got {} key values",
                self.entity_type.name(),
                key_fields.len(),
                key_values.len()
            )));
        }
        let filter: Vec<(String, Value)> = key_fields
            .iter()
            .map(|f| f.column.clone())
            .zip(key_values.iter().cloned())
            .collect();
        let mut entities = self.fetch(backend, filter, Some(1))?;
        Ok(if entities.is_empty() {
            None
        } else {
            Some(entities.remove(0))
        })
    }

    /// `get_by_id` that treats a missing row as an error.
    pub fn require_by_id(&self, backend: &mut dyn Backend, key_values: &[Value]) -> Result<Entity> {
        self.get_by_id(backend, key_values)?.ok_or_else(|| {
            StoreError::NotFound(format!(
                "{} with key {:?}",
                self.entity_type.name(),
                key_values
            ))
        })
    }

    pub fn get_all(&self, backend: &mut dyn Backend) -> Result<Vec<Entity>> {
        self.fetch(backend, Vec::new(), None)
    }

    /// Fetch entities for a list of single-column key values. Missing ids
    /// are skipped.
    pub fn get_by_ids(&self, backend: &mut dyn Backend, ids: &[Value]) -> Result<Vec<Entity>> {
        self.single_key_column()?;
        let mut entities = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entity) = self.get_by_id(backend, std::slice::from_ref(id))? {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    /// Delete rows by single-column key, clearing side-table rows first.
    pub fn delete_ids(
        &self,
        backend: &mut dyn Backend,
        ids: &[Value],
        in_transaction: bool,
    ) -> Result<()> {
        let key_column = self.single_key_column()?;
        if in_transaction {
            backend.begin()?;
        }
        let result = self.delete_ids_inner(backend, &key_column, ids);
        if in_transaction {
            match result {
                Ok(()) => backend.commit()?,
                Err(err) => {
                    backend.rollback()?;
                    return Err(err);
                }
            }
            Ok(())
        } else {
            result
        }
    }

    fn delete_ids_inner(
        &self,
        backend: &mut dyn Backend,
        key_column: &str,
        ids: &[Value],
    ) -> Result<()> {
        let side_table = self.entity_type.extended_table();
        let side_exists = backend.table_exists(&side_table)?;
        for id in ids {
            let filter = vec![(key_column.to_string(), id.clone())];
            if side_exists {
                backend.execute(&crate::sql::Statement::Delete {
                    table: side_table.clone(),
                    filter: filter.clone(),
                })?;
            }
            backend.execute(&crate::sql::Statement::Delete {
                table: self.entity_type.table().to_string(),
                filter,
            })?;
        }
        Ok(())
    }

    fn single_key_column(&self) -> Result<String> {
        let mut key_fields = self.entity_type.key_fields();
        let first = key_fields.next().ok_or_else(|| {
            StoreError::InvalidArgument(format!(
                "Entity type '{}' has no key field",
                self.entity_type.name()
            ))
        })?;
        if key_fields.next().is_some() {
            return Err(StoreError::InvalidArgument(format!(
                "Entity type '{}' has a composite key; use mark_deleted and save_changes",
                self.entity_type.name()
            )));
        }
        Ok(first.column.clone())
    }

    fn fetch(
        &self,
        backend: &mut dyn Backend,
        filter: Vec<(String, Value)>,
        top: Option<usize>,
    ) -> Result<Vec<Entity>> {
        let catalog = self.catalog.read()?;
        let mut select = SelectStatement::new(self.entity_type.table());
        for field in self.entity_type.fields() {
            select.items.push(SelectItem::Column {
                column: field.column.clone(),
                alias: None,
            });
        }
        let defs: Vec<_> = catalog.properties_for(self.entity_type.id()).collect();
        for def in &defs {
            self.provider
                .add_to_select(&mut select, &self.entity_type, def)?;
        }
        select.filter = filter;
        select.top = top;

        let rows = backend.query(&select)?;
        let mut entities = Vec::with_capacity(rows.len());
        for row in rows {
            let mut entity = Entity::existing(self.entity_type.clone());
            let mut values = row.into_iter();
            for field in self.entity_type.fields() {
                let value = values.next().unwrap_or(Value::Null);
                let value = trim_fixed_length(value, field.db_type == DbType::Char);
                entity.apply_loaded(&field.name, value);
            }
            for def in &defs {
                let value = values.next().unwrap_or(Value::Null);
                entity.apply_loaded_extended(&def.native_name, value);
            }
            entities.push(entity);
        }
        Ok(entities)
    }

    /// Create the side table when the unit list writes extended rows.
    /// A delete-only extended list never creates it; the returned flag
    /// tells the executor whether the side table can be targeted at all.
    fn ensure_side_table(&self, backend: &mut dyn Backend, units: &[WorkUnit]) -> Result<bool> {
        let mut has_extended = false;
        let mut writes_extended = false;
        for unit in units {
            if unit.target() == UnitTarget::Extended {
                has_extended = true;
                if unit.kind() != WorkUnitKind::Delete {
                    writes_extended = true;
                }
            }
        }
        if writes_extended {
            self.provider
                .ensure_extended_table(backend, &self.entity_type)?;
            return Ok(true);
        }
        if has_extended {
            return backend.table_exists(&self.entity_type.extended_table());
        }
        Ok(true)
    }

    fn execute_units(
        &self,
        backend: &mut dyn Backend,
        units: &[WorkUnit],
        side_table_available: bool,
    ) -> Result<Vec<(WorkUnit, ExecOutcome)>> {
        let mut executed = Vec::with_capacity(units.len());
        // Generated key of the most recent core insert, rebound into the
        // Null key placeholders of the units that follow it.
        let mut generated: Option<(String, i64)> = None;
        for unit in units {
            // Extended deletes against a never-created side table have
            // nothing to remove; reconcile them as executed no-ops.
            if !side_table_available && unit.target() == UnitTarget::Extended {
                executed.push((unit.clone(), ExecOutcome::default()));
                continue;
            }
            let statement = match &generated {
                Some((column, id)) => unit.statement().bind_generated_key(column, *id),
                None => unit.statement().clone(),
            };
            let outcome = backend.execute(&statement)?;
            if unit.kind() == WorkUnitKind::Insert
                && unit.target() == UnitTarget::Core
                && let Some(id) = outcome.last_insert_id
                && let Some(field) = self.entity_type.auto_increment_fields().next()
            {
                generated = Some((field.column.clone(), id));
            }
            executed.push((unit.clone(), outcome));
        }
        Ok(executed)
    }

    fn assign_generated_key(&self, entity: &mut Entity, outcome: &ExecOutcome) -> Result<()> {
        let unassigned: Vec<_> = self
            .entity_type
            .auto_increment_fields()
            .filter(|f| entity.get(&f.name).is_none_or(Value::is_null))
            .collect();
        match (outcome.last_insert_id, unassigned.len()) {
            (_, 0) => Ok(()),
            (Some(id), 1) => {
                let name = unassigned[0].name.clone();
                entity.assign_generated_key(&name, id);
                Ok(())
            }
            (Some(_), _) => Err(StoreError::InvalidOperation(format!(
                "Entity type '{}' has more than one auto-increment field without a provided id",
                self.entity_type.name()
            ))),
            (None, _) => Err(StoreError::ExecutionError(format!(
                "Insert into '{}' returned no generated id for field '{}'",
                self.entity_type.table(),
                unassigned[0].name
            ))),
        }
    }
}

fn trim_fixed_length(value: Value, fixed_length: bool) -> Value {
    match value {
        Value::Text(s) if fixed_length => Value::Text(s.trim_end().to_string()),
        other => other,
    }
}
