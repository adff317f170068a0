//! Flat side-table extensibility strategy.
//!
//! One shared side table per entity table, named `<table>Bfx`, one row per
//! `(entity key, property name)`. Five typed value columns; each property
//! populates exactly one of them, chosen by `column_for_type`.

use crate::backend::Backend;
use crate::core::{DbType, Result, StoreError, Value};
use crate::engine::entity::Entity;
use crate::engine::work_unit::{UnitTarget, WorkUnit, WorkUnitKind};
use crate::extended::{ExtendedPropertyDef, PropertyCatalog, MAX_NATIVE_NAME_LEN};
use crate::provider::{ExtensibilityProvider, TableExistenceCache};
use crate::schema::EntityType;
use crate::sql::{self, SelectItem, SelectStatement, Statement};

pub const COLUMN_NAME: &str = "Name";
pub const COLUMN_INT64: &str = "Int64";
pub const COLUMN_DECIMAL: &str = "Decimal";
pub const COLUMN_DATETIME: &str = "DateTime";
pub const COLUMN_STRING: &str = "String";
pub const COLUMN_BINARY: &str = "Binary";

#[derive(Debug, Default)]
pub struct FlatTableProvider {
    table_cache: TableExistenceCache,
}

impl FlatTableProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Side-table key columns: the entity key fields in their
    /// non-auto-increment form.
    fn key_columns(entity_type: &EntityType) -> Vec<(String, DbType, Option<usize>)> {
        entity_type
            .key_fields()
            .map(|f| (f.column.clone(), f.db_type, f.size))
            .collect()
    }

    fn value_column_for(
        &self,
        catalog: &PropertyCatalog,
        entity_type: &EntityType,
        native_name: &str,
    ) -> Result<&'static str> {
        let def = catalog
            .by_native_name(entity_type.id(), native_name)
            .ok_or_else(|| {
                StoreError::FieldNotFound(native_name.to_string(), entity_type.name().to_string())
            })?;
        self.column_for_type(def.data_type.db_type())
    }

    fn create_table_statement(entity_type: &EntityType) -> Statement {
        Statement::CreateExtendedTable {
            table: entity_type.extended_table(),
            key_columns: Self::key_columns(entity_type),
            name_size: MAX_NATIVE_NAME_LEN,
            string_size: crate::extended::DEFAULT_STRING_SIZE,
        }
    }
}

impl ExtensibilityProvider for FlatTableProvider {
    fn ensure_extended_table(
        &self,
        backend: &mut dyn Backend,
        entity_type: &EntityType,
    ) -> Result<()> {
        if self.table_cache.get(entity_type.id())? == Some(true) {
            return Ok(());
        }
        let table = entity_type.extended_table();
        if !backend.table_exists(&table)? {
            tracing::debug!(table = %table, "creating extended value table");
            backend.execute(&Self::create_table_statement(entity_type))?;
        }
        self.table_cache.put(entity_type.id(), true)?;
        Ok(())
    }

    fn invalidate_table_cache(&self) {
        self.table_cache.invalidate_all();
    }

    fn is_property_in_use(
        &self,
        backend: &mut dyn Backend,
        entity_type: &EntityType,
        native_name: &str,
    ) -> Result<bool> {
        let table = entity_type.extended_table();
        if !backend.table_exists(&table)? {
            return Ok(false);
        }
        let probe_column = entity_type
            .key_fields()
            .next()
            .map(|f| f.column.clone())
            .unwrap_or_else(|| COLUMN_NAME.to_string());
        let select = SelectStatement::new(table)
            .column(probe_column)
            .filter(COLUMN_NAME, Value::Text(native_name.to_string()))
            .top(1);
        Ok(!backend.query(&select)?.is_empty())
    }

    fn assert_property_feasible(&self, def: &ExtendedPropertyDef) -> Result<()> {
        if def.native_name.len() > MAX_NATIVE_NAME_LEN {
            return Err(StoreError::IllegalName(
                def.native_name.clone(),
                format!("native name exceeds {} characters", MAX_NATIVE_NAME_LEN),
            ));
        }
        // Confirms the type has a value column before any row is written.
        self.column_for_type(def.data_type.db_type())?;
        Ok(())
    }

    fn column_for_type(&self, db_type: DbType) -> Result<&'static str> {
        if db_type.is_integer_family() {
            return Ok(COLUMN_INT64);
        }
        if db_type.is_decimal_family() {
            return Ok(COLUMN_DECIMAL);
        }
        if db_type.is_string_family() {
            return Ok(COLUMN_STRING);
        }
        match db_type {
            DbType::DateTime => Ok(COLUMN_DATETIME),
            DbType::Binary => Ok(COLUMN_BINARY),
            other => Err(StoreError::CannotHandle(other)),
        }
    }

    fn insert_work_units(
        &self,
        entity: &Entity,
        catalog: &PropertyCatalog,
    ) -> Result<Vec<WorkUnit>> {
        let entity_type = entity.entity_type();
        let table = entity_type.extended_table();
        let key = entity.key_column_values()?;

        let mut units = Vec::new();
        for (native_name, value) in entity.extended_values() {
            if value.is_null() {
                continue;
            }
            let value_column = self.value_column_for(catalog, entity_type, native_name)?;
            let mut columns: Vec<String> = key.iter().map(|(col, _)| col.clone()).collect();
            columns.push(COLUMN_NAME.to_string());
            columns.push(value_column.to_string());
            let mut values: Vec<Value> = key.iter().map(|(_, val)| val.clone()).collect();
            values.push(Value::Text(native_name.to_string()));
            values.push(value.clone());
            units.push(WorkUnit::new(
                WorkUnitKind::Insert,
                UnitTarget::Extended,
                entity_type.id(),
                Statement::Insert {
                    table: table.clone(),
                    columns,
                    values,
                },
            ));
        }
        Ok(units)
    }

    fn update_work_units(
        &self,
        entity: &Entity,
        catalog: &PropertyCatalog,
    ) -> Result<Vec<WorkUnit>> {
        let entity_type = entity.entity_type();
        let table = entity_type.extended_table();
        let key = entity.key_column_values()?;

        let mut units = Vec::new();
        for (native_name, value) in entity.modified_extended_values() {
            if value.is_null() {
                // Null means the attribute no longer applies: remove the
                // row rather than storing a database NULL.
                let mut filter = key.clone();
                filter.push((COLUMN_NAME.to_string(), Value::Text(native_name.to_string())));
                units.push(WorkUnit::new(
                    WorkUnitKind::Delete,
                    UnitTarget::Extended,
                    entity_type.id(),
                    Statement::Delete {
                        table: table.clone(),
                        filter,
                    },
                ));
            } else {
                let value_column = self.value_column_for(catalog, entity_type, native_name)?;
                units.push(WorkUnit::new(
                    WorkUnitKind::Update,
                    UnitTarget::Extended,
                    entity_type.id(),
                    Statement::UpsertExtendedRow {
                        table: table.clone(),
                        key: key.clone(),
                        property: native_name.to_string(),
                        value_column: value_column.to_string(),
                        value: value.clone(),
                    },
                ));
            }
        }
        Ok(units)
    }

    fn delete_work_units(&self, entity: &Entity) -> Result<Vec<WorkUnit>> {
        let entity_type = entity.entity_type();
        Ok(vec![WorkUnit::new(
            WorkUnitKind::Delete,
            UnitTarget::Extended,
            entity_type.id(),
            Statement::Delete {
                table: entity_type.extended_table(),
                filter: entity.key_column_values()?,
            },
        )])
    }

    fn add_to_select(
        &self,
        select: &mut SelectStatement,
        entity_type: &EntityType,
        def: &ExtendedPropertyDef,
    ) -> Result<()> {
        let value_column = self.column_for_type(def.data_type.db_type())?;
        let key_join = entity_type
            .key_fields()
            .map(|f| (f.column.clone(), f.column.clone()))
            .collect();
        select.items.push(SelectItem::ExtendedScalar {
            side_table: entity_type.extended_table(),
            value_column: value_column.to_string(),
            property: def.native_name.clone(),
            key_join,
            alias: def.name.clone(),
        });
        Ok(())
    }

    fn filter_constraint(
        &self,
        entity_type: &EntityType,
        def: &ExtendedPropertyDef,
        op: &str,
        value: &Value,
    ) -> Result<String> {
        let value_column = self.column_for_type(def.data_type.db_type())?;
        let key_column = entity_type
            .key_fields()
            .next()
            .map(|f| f.column.clone())
            .ok_or_else(|| {
                StoreError::InvalidArgument(format!(
                    "Entity type '{}' has no key column",
                    entity_type.name()
                ))
            })?;
        Ok(sql::extended_filter_constraint(
            &key_column,
            &entity_type.extended_table(),
            &def.native_name,
            value_column,
            op,
            value,
        ))
    }
}
