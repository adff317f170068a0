use crate::core::Result;
use crate::schema::EntityTypeId;
use std::collections::HashMap;
use std::sync::RwLock;

/// Per-entity-type side-table existence cache.
///
/// Lazily populated from live probes and discarded wholesale on a database
/// switch. Owned by the provider instance, never process-global, so the
/// invalidation ordering stays testable.
#[derive(Debug, Default)]
pub struct TableExistenceCache {
    known: RwLock<HashMap<EntityTypeId, bool>>,
}

impl TableExistenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, entity_type_id: EntityTypeId) -> Result<Option<bool>> {
        Ok(self.known.read()?.get(&entity_type_id).copied())
    }

    pub fn put(&self, entity_type_id: EntityTypeId, exists: bool) -> Result<()> {
        self.known.write()?.insert(entity_type_id, exists);
        Ok(())
    }

    /// Drop every cached entry. Called on database switch, before any
    /// subsequent probe.
    pub fn invalidate_all(&self) {
        if let Ok(mut known) = self.known.write() {
            known.clear();
        }
    }
}
