use seis_types::{EntityId, EntityKind, StoredEntity};

use crate::error::StoreResult;

/// The single authoritative collection of entities shared by all sessions.
///
/// All implementations must satisfy these invariants:
/// - The store is a dumb keyed map: it validates nothing beyond a
///   well-formed (non-nil) id.
/// - Writes are last-write-wins per `(kind, id)`.
/// - Values are cloned on the way in and out; callers never hold references
///   into the store.
pub trait SharedStore: Send + Sync {
    /// Read an entity. Returns `Ok(None)` if it does not exist.
    fn get(&self, kind: EntityKind, id: &EntityId) -> StoreResult<Option<StoredEntity>>;

    /// Write an entity, replacing any previous value with the same id.
    fn set(&self, entity: &StoredEntity) -> StoreResult<()>;

    /// Check whether an entity exists.
    fn has(&self, kind: EntityKind, id: &EntityId) -> StoreResult<bool>;

    /// All ids of the given kind, sorted.
    fn ids(&self, kind: EntityKind) -> StoreResult<Vec<EntityId>>;

    /// Read multiple entities of one kind.
    ///
    /// Default implementation calls `get()` for each id.
    fn get_batch(
        &self,
        kind: EntityKind,
        ids: &[EntityId],
    ) -> StoreResult<Vec<Option<StoredEntity>>> {
        ids.iter().map(|id| self.get(kind, id)).collect()
    }

    /// Write multiple entities.
    ///
    /// Default implementation calls `set()` for each entity.
    fn set_batch(&self, entities: &[StoredEntity]) -> StoreResult<()> {
        entities.iter().try_for_each(|entity| self.set(entity))
    }

    /// Every entity of the given kind, ordered by id.
    fn all(&self, kind: EntityKind) -> StoreResult<Vec<StoredEntity>> {
        let ids = self.ids(kind)?;
        Ok(self.get_batch(kind, &ids)?.into_iter().flatten().collect())
    }
}
