pub mod flat_table;
pub mod table_cache;

pub use flat_table::FlatTableProvider;
pub use table_cache::TableExistenceCache;

use crate::backend::Backend;
use crate::core::{DbType, Result, Value};
use crate::engine::entity::Entity;
use crate::engine::work_unit::WorkUnit;
use crate::extended::{ExtendedPropertyDef, PropertyCatalog};
use crate::schema::EntityType;
use crate::sql::SelectStatement;

/// Pluggable strategy for storing and querying extended properties.
///
/// The shipped implementation is the flat side-table strategy
/// (`FlatTableProvider`); the persistence engine only talks to this trait.
pub trait ExtensibilityProvider: Send + Sync {
    /// Make sure the side table for this entity type exists, creating it
    /// when absent. Idempotent; results are cached until
    /// `invalidate_table_cache` is called.
    fn ensure_extended_table(
        &self,
        backend: &mut dyn Backend,
        entity_type: &EntityType,
    ) -> Result<()>;

    /// Drop the whole existence cache. Must be called synchronously when
    /// the active database target changes, before any further probe.
    fn invalidate_table_cache(&self);

    /// Does at least one entity carry a stored value for this property?
    /// Sole guard for property-definition deletion.
    fn is_property_in_use(
        &self,
        backend: &mut dyn Backend,
        entity_type: &EntityType,
        native_name: &str,
    ) -> Result<bool>;

    /// Assert that a definition can be stored by this provider.
    fn assert_property_feasible(&self, def: &ExtendedPropertyDef) -> Result<()>;

    /// Total mapping from a logical type to the one side-table value
    /// column holding it.
    fn column_for_type(&self, db_type: DbType) -> Result<&'static str>;

    /// One insert unit per extended field of a new entity that has a
    /// value.
    fn insert_work_units(
        &self,
        entity: &Entity,
        catalog: &PropertyCatalog,
    ) -> Result<Vec<WorkUnit>>;

    /// One unit per modified extended field. A null new value emits a
    /// delete-one unit: the attribute no longer applies to the entity.
    fn update_work_units(
        &self,
        entity: &Entity,
        catalog: &PropertyCatalog,
    ) -> Result<Vec<WorkUnit>>;

    /// Delete-all unit clearing every side-table row of the entity.
    fn delete_work_units(&self, entity: &Entity) -> Result<Vec<WorkUnit>>;

    /// Surface an extended property as a pseudo-column of a select.
    fn add_to_select(
        &self,
        select: &mut SelectStatement,
        entity_type: &EntityType,
        def: &ExtendedPropertyDef,
    ) -> Result<()>;

    /// Rewrite a comparison on an extended field into side-table SQL for
    /// an outer query's WHERE clause.
    fn filter_constraint(
        &self,
        entity_type: &EntityType,
        def: &ExtendedPropertyDef,
        op: &str,
        value: &Value,
    ) -> Result<String>;
}
