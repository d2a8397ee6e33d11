use std::collections::HashMap;
use std::sync::RwLock;

use seis_types::{EntityId, EntityKind, StoredEntity};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::SharedStore;

/// In-memory, HashMap-based shared store.
///
/// Entities are held behind a `RwLock` so the store can be shared between
/// sessions through an `Arc`. Entities are cloned on read and write.
pub struct InMemorySharedStore {
    entities: RwLock<HashMap<(EntityKind, EntityId), StoredEntity>>,
}

impl InMemorySharedStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
        }
    }

    /// Number of entities of every kind.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self
            .entities
            .read()
            .map_err(|_| StoreError::LockPoisoned)?
            .len())
    }

    /// Returns `true` if the store holds no entities.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove every entity.
    pub fn clear(&self) -> StoreResult<()> {
        self.entities
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .clear();
        Ok(())
    }
}

impl Default for InMemorySharedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedStore for InMemorySharedStore {
    fn get(&self, kind: EntityKind, id: &EntityId) -> StoreResult<Option<StoredEntity>> {
        let map = self.entities.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.get(&(kind, *id)).cloned())
    }

    fn set(&self, entity: &StoredEntity) -> StoreResult<()> {
        let kind = entity.kind();
        let id = *entity.id();
        if id.is_nil() {
            return Err(StoreError::NullEntityId(kind));
        }
        let mut map = self.entities.write().map_err(|_| StoreError::LockPoisoned)?;
        map.insert((kind, id), entity.clone());
        debug!(%kind, id = %id.short_id(), "shared store write");
        Ok(())
    }

    fn has(&self, kind: EntityKind, id: &EntityId) -> StoreResult<bool> {
        let map = self.entities.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.contains_key(&(kind, *id)))
    }

    fn ids(&self, kind: EntityKind) -> StoreResult<Vec<EntityId>> {
        let map = self.entities.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut ids: Vec<EntityId> = map
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, id)| *id)
            .collect();
        ids.sort();
        Ok(ids)
    }
}

impl std::fmt::Debug for InMemorySharedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.entities.read().map(|m| m.len()).unwrap_or(0);
        f.debug_struct("InMemorySharedStore")
            .field("entity_count", &count)
            .finish()
    }
}
