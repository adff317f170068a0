// ============================================================================
// Flexstore Library
// ============================================================================

pub mod backend;
pub mod core;
pub mod engine;
pub mod extended;
pub mod provider;
pub mod schema;
pub mod sql;

// Re-export main types for convenience
pub use crate::backend::{Backend, ExecOutcome, MemoryBackend, Row};
pub use crate::core::{DbType, Result, StoreError, Value};
pub use crate::engine::{Entity, Persister, UnitTarget, WorkUnit, WorkUnitKind};
pub use crate::extended::{
    ExtendedDataType, ExtendedPropertyDef, ExtensionSettings, PropertyCatalog, ScalarKind,
};
pub use crate::provider::{ExtensibilityProvider, FlatTableProvider};
pub use crate::schema::{EntityType, EntityTypeId, EntityTypeRegistry, FieldDef};

use crate::sql::Statement;
use std::sync::{Arc, RwLock};

/// Type id written to saved settings documents, resolved on load.
pub const FLAT_TABLE_PROVIDER_TYPE: &str = "FlatTableProvider, Flexstore.Extended";

// ============================================================================
// High-level Store API
// ============================================================================

/// Object store over one backend.
///
/// This is the recommended entry point. It owns the backend, the entity
/// type registry, the extended property catalog and the extensibility
/// provider, and hands out per-type [`Persister`]s that share all of them.
///
/// # Examples
///
/// ```
/// use flexstore::{DbType, EntityType, EntityTypeRegistry, FieldDef, MemoryBackend, Store, Value};
///
/// # fn main() -> flexstore::Result<()> {
/// let registry = EntityTypeRegistry::new().with_type(EntityType::new(
///     1,
///     "Order",
///     "Order",
///     vec![
///         FieldDef::new("Id", DbType::Int32).key().auto_increment(),
///         FieldDef::new("Subject", DbType::String).size(255),
///     ],
/// )?)?;
///
/// let mut backend = MemoryBackend::new();
/// backend.create_table("Order", &["Id", "Subject"], Some("Id"));
/// let mut store = Store::new(backend, registry);
///
/// let mut order = store.new_entity("Order")?;
/// order.set("Subject", Value::from("first"))?;
/// store.save(&mut order)?;
/// assert_eq!(order.get("Id"), Some(&Value::Int(1)));
/// # Ok(())
/// # }
/// ```
pub struct Store<B: Backend> {
    backend: B,
    registry: EntityTypeRegistry,
    catalog: Arc<RwLock<PropertyCatalog>>,
    provider: Arc<FlatTableProvider>,
}

impl<B: Backend> Store<B> {
    pub fn new(backend: B, registry: EntityTypeRegistry) -> Self {
        let catalog = PropertyCatalog::new(registry.clone());
        Self {
            backend,
            registry,
            catalog: Arc::new(RwLock::new(catalog)),
            provider: Arc::new(FlatTableProvider::new()),
        }
    }

    pub fn registry(&self) -> &EntityTypeRegistry {
        &self.registry
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Persister for one entity type, by type name.
    pub fn persister(&self, entity_type: &str) -> Result<Persister> {
        let entity_type = self.registry.get_by_name(entity_type)?;
        Ok(Persister::new(
            entity_type,
            self.provider.clone(),
            self.catalog.clone(),
        ))
    }

    /// Blank in-memory entity of the named type.
    pub fn new_entity(&self, entity_type: &str) -> Result<Entity> {
        Ok(Entity::new(self.registry.get_by_name(entity_type)?))
    }

    /// Save one entity inside its own transaction.
    pub fn save(&mut self, entity: &mut Entity) -> Result<()> {
        let entity_type = self.registry.get(entity.entity_type().id())?;
        let persister = Persister::new(entity_type, self.provider.clone(), self.catalog.clone());
        persister.save_changes(&mut self.backend, entity)
    }

    /// Define a new extended property for the named entity type.
    pub fn create_extended_property(
        &mut self,
        entity_type: &str,
        display_name: &str,
        data_type: ExtendedDataType,
        size: Option<usize>,
        multi_value: bool,
    ) -> Result<ExtendedPropertyDef> {
        let entity_type = self.registry.get_by_name(entity_type)?;
        let mut catalog = self.catalog.write()?;
        let def = catalog.create_property(
            self.provider.as_ref(),
            entity_type.id(),
            display_name,
            data_type,
            size,
            multi_value,
        )?;
        Ok(def.clone())
    }

    /// Remove a property definition. Fails when any entity still stores a
    /// value for it.
    pub fn delete_extended_property(&mut self, entity_type: &str, name: &str) -> Result<()> {
        let entity_type = self.registry.get_by_name(entity_type)?;
        let mut catalog = self.catalog.write()?;
        catalog.delete_property(
            self.provider.as_ref(),
            &mut self.backend,
            entity_type.id(),
            name,
        )
    }

    pub fn extended_properties(&self, entity_type: &str) -> Result<Vec<ExtendedPropertyDef>> {
        let entity_type = self.registry.get_by_name(entity_type)?;
        let catalog = self.catalog.read()?;
        Ok(catalog.properties_for(entity_type.id()).cloned().collect())
    }

    /// Register a named lookup set usable by lookup-typed properties.
    pub fn add_lookup(&mut self, name: &str) -> Result<()> {
        self.catalog.write()?.add_lookup(name)
    }

    /// Serialize the catalog to the versioned settings document.
    pub fn settings_xml(&self) -> Result<String> {
        let catalog = self.catalog.read()?;
        let (lookups, properties) = catalog.snapshot();
        let settings = ExtensionSettings {
            provider_type: FLAT_TABLE_PROVIDER_TYPE.to_string(),
            lookups,
            properties,
        };
        settings.to_xml()
    }

    /// Replace the catalog content from a settings document.
    pub fn load_settings_xml(&mut self, xml: &str) -> Result<()> {
        let settings = ExtensionSettings::from_xml(xml)?;
        self.catalog
            .write()?
            .restore(settings.lookups, settings.properties);
        Ok(())
    }

    /// Swap the active backend. The side-table existence cache is dropped
    /// synchronously: cached answers describe the old target.
    pub fn switch_backend(&mut self, backend: B) -> B {
        self.provider.invalidate_table_cache();
        std::mem::replace(&mut self.backend, backend)
    }

    /// Run one ad-hoc statement against the backend.
    pub fn execute(&mut self, statement: &Statement) -> Result<ExecOutcome> {
        self.backend.execute(statement)
    }
}
