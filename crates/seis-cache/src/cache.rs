//! The per-session working cache.
//!
//! [`WorkingCache`] keeps a `BTreeMap` overlay of events and detections on
//! top of a shared store. Reads fall through to the store without touching
//! the overlay; writes land in the overlay only, until committed.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use seis_conflict::{resolve, Resolution};
use seis_history::{
    ActionDescriber, ActionDescription, ChangeSet, HistoryEntry, HistoryLedger, RevisionRestore,
};
use seis_store::SharedStore;
use seis_types::{
    Association, AssociationId, Detection, DetectionRevision, Entity, EntityId, EntityKind, Event, HistoryId,
    Revision, RevisionId, StoredEntity,
};

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::restore::apply_restore;

/// Entity types a working cache holds an overlay for.
pub trait CachedEntity: Entity {
    fn overlay(cache: &WorkingCache) -> &BTreeMap<EntityId, Self>;

    fn overlay_mut(cache: &mut WorkingCache) -> &mut BTreeMap<EntityId, Self>;
}

impl CachedEntity for Event {
    fn overlay(cache: &WorkingCache) -> &BTreeMap<EntityId, Self> {
        &cache.events
    }

    fn overlay_mut(cache: &mut WorkingCache) -> &mut BTreeMap<EntityId, Self> {
        &mut cache.events
    }
}

impl CachedEntity for Detection {
    fn overlay(cache: &WorkingCache) -> &BTreeMap<EntityId, Self> {
        &cache.detections
    }

    fn overlay_mut(cache: &mut WorkingCache) -> &mut BTreeMap<EntityId, Self> {
        &mut cache.detections
    }
}

/// Valid entities updated by an undo or redo.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UndoOutcome {
    pub events: Vec<Event>,
    pub detections: Vec<Detection>,
}

impl UndoOutcome {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.detections.is_empty()
    }
}

/// A detection as seen from the event it is shown against.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionContext {
    pub detection: Detection,
    pub event: Option<Event>,
    /// The hypothesis to display; `None` only for an invalid detection.
    pub revision: Option<DetectionRevision>,
}

/// One side of a detection conflict: an event holding a live association
/// to the detection, and the detection revision it points at.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConflictingRevision {
    pub event_id: EntityId,
    pub detection_revision_id: RevisionId,
    pub phase: String,
    pub arrival_time: f64,
}

/// A single analyst session's isolated view of the shared store.
pub struct WorkingCache {
    store: Arc<dyn SharedStore>,
    events: BTreeMap<EntityId, Event>,
    detections: BTreeMap<EntityId, Detection>,
    resolution: Resolution,
    ledger: HistoryLedger,
    open_event: Option<EntityId>,
    config: CacheConfig,
}

impl std::fmt::Debug for WorkingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkingCache")
            .field("events", &self.events.len())
            .field("detections", &self.detections.len())
            .field("associations", &self.resolution.associations().len())
            .field("history", &self.ledger.len())
            .field("open_event", &self.open_event)
            .finish()
    }
}

impl WorkingCache {
    /// Create an empty overlay over `store` with the default configuration.
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self::with_config(store, CacheConfig::default())
    }

    pub fn with_config(store: Arc<dyn SharedStore>, config: CacheConfig) -> Self {
        Self {
            store,
            events: BTreeMap::new(),
            detections: BTreeMap::new(),
            resolution: Resolution::default(),
            ledger: HistoryLedger::new(),
            open_event: None,
            config,
        }
    }

    /// Replace the change descriptor formatter. Clears the history.
    pub fn with_describer(mut self, describer: Box<dyn ActionDescriber>) -> Self {
        self.ledger = HistoryLedger::with_describer(describer);
        self
    }

    /// Copy every entity in the shared store into the overlay, keeping
    /// local edits.
    pub fn load_from_store(&mut self) -> CacheResult<()> {
        let events = self
            .store
            .all(EntityKind::Event)?
            .into_iter()
            .map(Event::try_from_stored)
            .collect::<Result<Vec<_>, _>>()?;
        let detections = self
            .store
            .all(EntityKind::Detection)?
            .into_iter()
            .map(Detection::try_from_stored)
            .collect::<Result<Vec<_>, _>>()?;
        self.merge(events, false);
        self.merge(detections, false);
        self.recompute();
        Ok(())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn open_event(&self) -> Option<&EntityId> {
        self.open_event.as_ref()
    }

    pub fn set_open_event(&mut self, id: Option<EntityId>) {
        debug!(open_event = ?id, "open event changed");
        self.open_event = id;
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    /// The local copy if present, else the shared store's. Never changes
    /// the overlay.
    pub fn get<E: CachedEntity>(&self, id: &EntityId) -> CacheResult<Option<E>> {
        if let Some(local) = E::overlay(self).get(id) {
            return Ok(Some(local.clone()));
        }
        match self.store.get(E::KIND, id)? {
            Some(stored) => Ok(Some(E::try_from_stored(stored)?)),
            None => Ok(None),
        }
    }

    pub fn get_event(&self, id: &EntityId) -> CacheResult<Option<Event>> {
        self.get(id)
    }

    pub fn get_detection(&self, id: &EntityId) -> CacheResult<Option<Detection>> {
        self.get(id)
    }

    /// Kind-addressed form of [`get`](Self::get).
    pub fn get_any(&self, kind: EntityKind, id: &EntityId) -> CacheResult<Option<StoredEntity>> {
        Ok(match kind {
            EntityKind::Event => self.get_event(id)?.map(StoredEntity::from),
            EntityKind::Detection => self.get_detection(id)?.map(StoredEntity::from),
        })
    }

    /// Valid events in the overlay.
    pub fn get_events(&self) -> Vec<Event> {
        self.events.values().filter(|e| e.is_valid()).cloned().collect()
    }

    /// Valid detections in the overlay.
    pub fn get_detections(&self) -> Vec<Detection> {
        self.detections
            .values()
            .filter(|d| d.is_valid())
            .cloned()
            .collect()
    }

    pub fn get_associations(&self) -> &[Association] {
        self.resolution.associations()
    }

    pub fn is_conflicted(&self, kind: EntityKind, id: &EntityId) -> bool {
        self.resolution.is_conflicted(kind, id)
    }

    pub fn any_event_conflicted(&self) -> bool {
        !self.resolution.conflicted(EntityKind::Event).is_empty()
    }

    pub fn any_detection_conflicted(&self) -> bool {
        !self.resolution.conflicted(EntityKind::Detection).is_empty()
    }

    /// Overlay ids whose current revision pointer resolves to nothing.
    pub fn invalid_ids(&self, kind: EntityKind) -> Vec<EntityId> {
        match kind {
            EntityKind::Event => invalid(&self.events),
            EntityKind::Detection => invalid(&self.detections),
        }
    }

    /// `true` if the overlay copy carries uncommitted edits.
    pub fn is_modified(&self, kind: EntityKind, id: &EntityId) -> bool {
        match kind {
            EntityKind::Event => self.events.get(id).is_some_and(Entity::is_modified),
            EntityKind::Detection => self.detections.get(id).is_some_and(Entity::is_modified),
        }
    }

    /// A detection together with the event it is shown against (the open
    /// event when associated to it, else its only associated event) and the
    /// revision to display: the one that event references, else the current
    /// one.
    pub fn detection_and_event(&self, detection_id: &EntityId) -> CacheResult<DetectionContext> {
        let detection = self.require::<Detection>(detection_id)?;
        let event = match self
            .resolution
            .event_for_detection(detection_id, self.open_event.as_ref())
        {
            Some(event_id) => self.get_event(&event_id)?,
            None => None,
        };
        let revision = event
            .as_ref()
            .and_then(|e| self.resolution.revision_for_event(detection_id, &e.id))
            .and_then(|id| detection.revision(&id))
            .or_else(|| detection.current_revision())
            .cloned();
        Ok(DetectionContext {
            detection,
            event,
            revision,
        })
    }

    /// The detection revisions each associated event points at.
    pub fn conflicting_revisions(&self, detection_id: &EntityId) -> Vec<ConflictingRevision> {
        let Some(detection) = self.detections.get(detection_id) else {
            return Vec::new();
        };
        self.resolution
            .active_for_detection(detection_id)
            .filter_map(|assoc| {
                detection
                    .revision(&assoc.detection_revision_id)
                    .map(|rev| ConflictingRevision {
                        event_id: assoc.event_id,
                        detection_revision_id: rev.id,
                        phase: rev.phase.clone(),
                        arrival_time: rev.arrival_time,
                    })
            })
            .collect()
    }

    // ---------------------------------------------------------------
    // History queries
    // ---------------------------------------------------------------

    pub fn get_history(&self) -> &[HistoryEntry] {
        self.ledger.history()
    }

    pub fn get_event_history(&self, event_id: &EntityId) -> Vec<HistoryEntry> {
        self.ledger.event_history(event_id)
    }

    pub fn get_redo_priority_order(&self, id: &HistoryId) -> Option<usize> {
        self.ledger.redo_priority_order(id)
    }

    pub fn clear_history(&mut self) {
        self.ledger.clear();
    }

    // ---------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------

    pub fn set_events(
        &mut self,
        action: ActionDescription,
        events: Vec<Event>,
    ) -> CacheResult<Option<HistoryId>> {
        self.set_events_and_detections(action, events, Vec::new())
    }

    pub fn set_detections(
        &mut self,
        action: ActionDescription,
        detections: Vec<Detection>,
    ) -> CacheResult<Option<HistoryId>> {
        self.set_events_and_detections(action, Vec::new(), detections)
    }

    /// Kind-addressed form of [`set_events_and_detections`](Self::set_events_and_detections).
    pub fn set(
        &mut self,
        action: ActionDescription,
        entities: Vec<StoredEntity>,
    ) -> CacheResult<Option<HistoryId>> {
        let mut events = Vec::new();
        let mut detections = Vec::new();
        for entity in entities {
            match entity {
                StoredEntity::Event(e) => events.push(e),
                StoredEntity::Detection(d) => detections.push(d),
            }
        }
        self.set_events_and_detections(action, events, detections)
    }

    /// Store new local copies, recompute associations and record the change.
    ///
    /// All inputs are validated before anything is written: either every
    /// entity lands or none does. The current revision of each entity is
    /// marked modified. Returns the history entry id when the action was
    /// recorded.
    pub fn set_events_and_detections(
        &mut self,
        action: ActionDescription,
        events: Vec<Event>,
        detections: Vec<Detection>,
    ) -> CacheResult<Option<HistoryId>> {
        let mut events = dedupe(events);
        let mut detections = dedupe(detections);

        let previous_events = self.validate(action, &events)?;
        let previous_detections = self.validate(action, &detections)?;
        for detection in &detections {
            self.check_conflict_lock(&detection.id)?;
        }
        for event in &events {
            check_rejections(event, previous_events.get(&event.id))?;
        }

        mark_current_modified(&mut events);
        mark_current_modified(&mut detections);

        let calm_events: BTreeSet<EntityId> = events
            .iter()
            .filter(|e| !self.resolution.is_conflicted(EntityKind::Event, &e.id))
            .map(|e| e.id)
            .collect();
        let calm_detections: BTreeSet<EntityId> = detections
            .iter()
            .filter(|d| !self.resolution.is_conflicted(EntityKind::Detection, &d.id))
            .map(|d| d.id)
            .collect();

        for event in &events {
            self.events.insert(event.id, event.clone());
        }
        for detection in &detections {
            self.detections.insert(detection.id, detection.clone());
        }
        self.recompute();

        let conflict_created = calm_events
            .iter()
            .any(|id| self.resolution.is_conflicted(EntityKind::Event, id))
            || calm_detections
                .iter()
                .any(|id| self.resolution.is_conflicted(EntityKind::Detection, id));

        debug!(
            %action,
            events = events.len(),
            detections = detections.len(),
            conflict_created,
            "working cache set"
        );

        if !self.config.is_undoable(action) {
            return Ok(None);
        }
        Ok(self.ledger.append(ChangeSet {
            action,
            events: &events,
            detections: &detections,
            previous_events: &previous_events,
            previous_detections: &previous_detections,
            resolution: &self.resolution,
            conflict_created,
        }))
    }

    /// Existence check for a batch about to be set. Returns the entities'
    /// state before the change, keyed by id.
    fn validate<E: CachedEntity>(
        &self,
        action: ActionDescription,
        incoming: &[E],
    ) -> CacheResult<HashMap<EntityId, E>> {
        let mut previous = HashMap::with_capacity(incoming.len());
        for entity in incoming {
            match self.get::<E>(entity.id())? {
                Some(existing) => {
                    previous.insert(*entity.id(), existing);
                }
                None if action.is_creation() => {}
                None => {
                    return Err(CacheError::NotFound {
                        kind: E::KIND,
                        id: *entity.id(),
                    })
                }
            }
        }
        Ok(previous)
    }

    fn check_conflict_lock(&self, detection_id: &EntityId) -> CacheResult<()> {
        if !self.config.enforce_conflict_lock {
            return Ok(());
        }
        let Some(open) = self.open_event.as_ref() else {
            return Ok(());
        };
        let locked = self
            .resolution
            .is_conflicted(EntityKind::Detection, detection_id)
            && self
                .resolution
                .event_for_detection(detection_id, Some(open))
                .is_none();
        if locked {
            return Err(CacheError::ConflictLocked { id: *detection_id });
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Synchronization with the shared store
    // ---------------------------------------------------------------

    /// Merge shared store state into the overlay. Without `overwrite`,
    /// locally modified entities are left alone. Returns how many entities
    /// were taken.
    pub fn pull_events(&mut self, events: Vec<Event>, overwrite: bool) -> usize {
        let taken = self.merge(events, overwrite);
        self.recompute();
        taken
    }

    pub fn pull_detections(&mut self, detections: Vec<Detection>, overwrite: bool) -> usize {
        let taken = self.merge(detections, overwrite);
        self.recompute();
        taken
    }

    fn merge<E: CachedEntity>(&mut self, incoming: Vec<E>, overwrite: bool) -> usize {
        let overlay = E::overlay_mut(self);
        let mut taken = 0;
        for entity in incoming {
            let keep_local = !overwrite
                && overlay
                    .get(entity.id())
                    .is_some_and(|local| local.is_modified());
            if keep_local {
                debug!(kind = %E::KIND, id = %entity.id().short_id(), "pull kept local edits");
                continue;
            }
            overlay.insert(*entity.id(), entity);
            taken += 1;
        }
        taken
    }

    /// Write locally modified entities of `kind` to the shared store with
    /// their modified flags cleared. `ids` narrows the set; unmodified ids
    /// are skipped. Returns the committed ids.
    ///
    /// A commit that writes anything clears the history: undo baselines
    /// were taken from the store as it was before the commit.
    pub fn commit(
        &mut self,
        kind: EntityKind,
        ids: Option<&[EntityId]>,
    ) -> CacheResult<Vec<EntityId>> {
        let committed = match kind {
            EntityKind::Event => self.commit_kind::<Event>(ids)?,
            EntityKind::Detection => self.commit_kind::<Detection>(ids)?,
        };
        if !committed.is_empty() {
            self.ledger.clear();
        }
        self.recompute();
        Ok(committed)
    }

    /// Commit every modified event and detection.
    pub fn commit_all(&mut self) -> CacheResult<Vec<EntityId>> {
        let mut committed = self.commit(EntityKind::Event, None)?;
        committed.extend(self.commit(EntityKind::Detection, None)?);
        Ok(committed)
    }

    fn commit_kind<E: CachedEntity>(&mut self, ids: Option<&[EntityId]>) -> CacheResult<Vec<EntityId>> {
        if let Some(ids) = ids {
            for id in ids {
                self.require::<E>(id)?;
            }
        }
        let wanted: Option<HashSet<&EntityId>> = ids.map(|ids| ids.iter().collect());
        let targets: Vec<EntityId> = E::overlay(self)
            .values()
            .filter(|e| e.is_modified())
            .filter(|e| wanted.as_ref().map_or(true, |w| w.contains(&e.id())))
            .map(|e| *e.id())
            .collect();

        let mut committed = Vec::with_capacity(targets.len());
        for id in targets {
            let Some(mut clean) = E::overlay(self).get(&id).cloned() else {
                continue;
            };
            clean.clear_modified();
            self.store.set(&clean.clone().into_stored())?;
            E::overlay_mut(self).insert(id, clean);
            committed.push(id);
        }
        debug!(kind = %E::KIND, count = committed.len(), "committed to shared store");
        Ok(committed)
    }

    // ---------------------------------------------------------------
    // Undo / redo
    // ---------------------------------------------------------------

    pub fn undo(&mut self, count: usize) -> CacheResult<UndoOutcome> {
        self.materialize_history()?;
        let restores = self.ledger.undo(count);
        self.apply_restores(restores)
    }

    pub fn redo(&mut self, count: usize) -> CacheResult<UndoOutcome> {
        self.materialize_history()?;
        let restores = self.ledger.redo(count);
        self.apply_restores(restores)
    }

    pub fn undo_by_id(&mut self, id: HistoryId) -> CacheResult<UndoOutcome> {
        self.materialize_history()?;
        let restores = self.ledger.undo_by_id(id)?;
        self.apply_restores(restores)
    }

    pub fn redo_by_id(&mut self, id: HistoryId) -> CacheResult<UndoOutcome> {
        self.materialize_history()?;
        let restores = self.ledger.redo_by_id(id)?;
        self.apply_restores(restores)
    }

    /// Undo changes attributed to `owner`; `None` targets unassociated
    /// changes.
    pub fn undo_for(&mut self, owner: Option<EntityId>, count: usize) -> CacheResult<UndoOutcome> {
        self.materialize_history()?;
        let restores = self.ledger.undo_for(owner, count);
        self.apply_restores(restores)
    }

    pub fn redo_for(&mut self, owner: Option<EntityId>, count: usize) -> CacheResult<UndoOutcome> {
        self.materialize_history()?;
        let restores = self.ledger.redo_for(owner, count);
        self.apply_restores(restores)
    }

    pub fn undo_for_by_id(
        &mut self,
        owner: Option<EntityId>,
        id: HistoryId,
    ) -> CacheResult<UndoOutcome> {
        self.materialize_history()?;
        let restores = self.ledger.undo_for_by_id(owner, id)?;
        self.apply_restores(restores)
    }

    pub fn redo_for_by_id(
        &mut self,
        owner: Option<EntityId>,
        id: HistoryId,
    ) -> CacheResult<UndoOutcome> {
        self.materialize_history()?;
        let restores = self.ledger.redo_for_by_id(owner, id)?;
        self.apply_restores(restores)
    }

    /// Scoped undo against the open event. `None` when no event is open.
    pub fn undo_for_open_event(&mut self, count: usize) -> CacheResult<Option<UndoOutcome>> {
        match self.open_event {
            Some(open) => self.undo_for(Some(open), count).map(Some),
            None => Ok(None),
        }
    }

    pub fn redo_for_open_event(&mut self, count: usize) -> CacheResult<Option<UndoOutcome>> {
        match self.open_event {
            Some(open) => self.redo_for(Some(open), count).map(Some),
            None => Ok(None),
        }
    }

    pub fn undo_for_open_event_by_id(&mut self, id: HistoryId) -> CacheResult<Option<UndoOutcome>> {
        match self.open_event {
            Some(open) => self.undo_for_by_id(Some(open), id).map(Some),
            None => Ok(None),
        }
    }

    pub fn redo_for_open_event_by_id(&mut self, id: HistoryId) -> CacheResult<Option<UndoOutcome>> {
        match self.open_event {
            Some(open) => self.redo_for_by_id(Some(open), id).map(Some),
            None => Ok(None),
        }
    }

    /// Write ledger results into the overlay, recompute associations, then
    /// drop association records on touched events that no longer resolve.
    fn apply_restores(&mut self, restores: Vec<RevisionRestore>) -> CacheResult<UndoOutcome> {
        let mut touched_events = BTreeSet::new();
        let mut touched_detections = BTreeSet::new();
        for restore in restores {
            match restore {
                RevisionRestore::Event {
                    event_id,
                    revision_id,
                    revision,
                } => {
                    if let Some(event) = self.events.get_mut(&event_id) {
                        apply_restore(event, &revision_id, revision);
                    }
                    touched_events.insert(event_id);
                }
                RevisionRestore::Detection {
                    detection_id,
                    revision_id,
                    revision,
                } => {
                    if let Some(detection) = self.detections.get_mut(&detection_id) {
                        apply_restore(detection, &revision_id, revision);
                    }
                    touched_detections.insert(detection_id);
                }
            }
        }

        // events linked to a touched detection, before and after the restore
        let linked = |res: &Resolution| -> Vec<EntityId> {
            res.associations()
                .iter()
                .filter(|a| touched_detections.contains(&a.detection_id))
                .map(|a| a.event_id)
                .collect()
        };
        touched_events.extend(linked(&self.resolution));
        self.recompute();
        touched_events.extend(linked(&self.resolution));

        let live: HashSet<AssociationId> = self
            .resolution
            .associations()
            .iter()
            .map(|a| a.id)
            .collect();
        let mut dropped = 0;
        for id in &touched_events {
            if let Some(current) = self.events.get_mut(id).and_then(|e| e.current_revision_mut()) {
                let before = current.associations.len();
                current.associations.retain(|r| live.contains(&r.id));
                dropped += before - current.associations.len();
            }
        }
        if dropped > 0 {
            self.recompute();
        }

        debug!(
            events = touched_events.len(),
            detections = touched_detections.len(),
            dropped_associations = dropped,
            "applied undo/redo"
        );
        Ok(UndoOutcome {
            events: touched_events
                .iter()
                .filter_map(|id| self.events.get(id))
                .filter(|e| e.is_valid())
                .cloned()
                .collect(),
            detections: touched_detections
                .iter()
                .filter_map(|id| self.detections.get(id))
                .filter(|d| d.is_valid())
                .cloned()
                .collect(),
        })
    }

    // ---------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------

    fn recompute(&mut self) {
        self.resolution = resolve(self.events.values(), self.detections.values());
    }

    fn require<E: CachedEntity>(&self, id: &EntityId) -> CacheResult<E> {
        self.get::<E>(id)?.ok_or(CacheError::NotFound {
            kind: E::KIND,
            id: *id,
        })
    }

    /// Pull every entity the history refers to into the overlay, so undo and
    /// redo fail before the ledger moves rather than half way through.
    fn materialize_history(&mut self) -> CacheResult<()> {
        for (kind, id) in self.ledger.entities() {
            match kind {
                EntityKind::Event => self.materialize::<Event>(&id)?,
                EntityKind::Detection => self.materialize::<Detection>(&id)?,
            }
        }
        Ok(())
    }

    /// Make sure the overlay holds `id`, pulling it through from the store.
    fn materialize<E: CachedEntity>(&mut self, id: &EntityId) -> CacheResult<()> {
        if E::overlay(self).contains_key(id) {
            return Ok(());
        }
        let entity = self.require::<E>(id)?;
        E::overlay_mut(self).insert(*id, entity);
        Ok(())
    }
}

fn invalid<E: Entity>(overlay: &BTreeMap<EntityId, E>) -> Vec<EntityId> {
    overlay
        .values()
        .filter(|e| !e.is_valid())
        .map(|e| *e.id())
        .collect()
}

/// Keep the last copy of each id, in first-seen order.
fn dedupe<E: Entity>(entities: Vec<E>) -> Vec<E> {
    let mut unique: Vec<E> = Vec::with_capacity(entities.len());
    for entity in entities {
        match unique.iter_mut().find(|u| u.id() == entity.id()) {
            Some(slot) => *slot = entity,
            None => unique.push(entity),
        }
    }
    unique
}

fn mark_current_modified<E: Entity>(entities: &mut [E]) {
    for entity in entities {
        if let Some(revision) = entity.current_revision_mut() {
            revision.set_modified(true);
        }
    }
}

/// Refuse an event revision that re-activates an association id the local
/// copy already holds as rejected.
fn check_rejections(event: &Event, local: Option<&Event>) -> CacheResult<()> {
    let (Some(current), Some(local)) = (event.current_revision(), local) else {
        return Ok(());
    };
    let rejected: HashSet<AssociationId> = local
        .revisions
        .iter()
        .flat_map(|r| &r.associations)
        .filter(|a| a.rejected)
        .map(|a| a.id)
        .collect();
    match current
        .associations
        .iter()
        .find(|a| !a.rejected && rejected.contains(&a.id))
    {
        Some(record) => Err(CacheError::AssociationRejected {
            event: event.id,
            association: record.id,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use seis_store::InMemorySharedStore;
    use seis_types::{DetectionRevision, EventRevision, Location};

    use ActionDescription as A;

    fn make_store() -> Arc<InMemorySharedStore> {
        Arc::new(InMemorySharedStore::new())
    }

    fn seed(store: &InMemorySharedStore, entity: impl Into<StoredEntity>) {
        store.set(&entity.into()).unwrap();
    }

    fn make_detection(phase: &str) -> Detection {
        let id = EntityId::new();
        Detection::new(id, "ASAR", DetectionRevision::new(id, phase, 100.0))
    }

    fn make_event(detections: &[&Detection]) -> Event {
        let mut rev = EventRevision::new(EntityId::new());
        for sd in detections {
            rev = rev.with_association(sd.current.unwrap());
        }
        Event::new(rev)
    }

    fn re_phase(sd: &Detection, phase: &str) -> Detection {
        let mut sd = sd.clone();
        let mut rev = sd.current_revision().unwrap().successor();
        rev.phase = phase.into();
        sd.revise(rev);
        sd
    }

    fn relocate(ev: &Event, time: f64) -> Event {
        let mut ev = ev.clone();
        let rev = ev.current_revision().unwrap().successor().with_location(Location {
            latitude: 10.0,
            longitude: 20.0,
            depth_km: 5.0,
            time,
        });
        ev.revise(rev);
        ev
    }

    fn phase_of(cache: &WorkingCache, id: &EntityId) -> String {
        let sd = cache.get_detection(id).unwrap().unwrap();
        sd.current_revision().unwrap().phase.clone()
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    #[test]
    fn reads_fall_through_without_touching_overlay() {
        let store = make_store();
        let sd = make_detection("P");
        seed(&store, sd.clone());
        let cache = WorkingCache::new(store.clone());

        assert_eq!(cache.get_detection(&sd.id).unwrap(), Some(sd.clone()));
        assert!(cache.get_detections().is_empty());
        assert!(cache.get_history().is_empty());
        assert!(cache.get_event(&sd.id).unwrap().is_none());
    }

    #[test]
    fn load_from_store_seeds_overlay() {
        let store = make_store();
        let sd = make_detection("P");
        let ev = make_event(&[&sd]);
        seed(&store, sd.clone());
        seed(&store, ev.clone());

        let mut cache = WorkingCache::new(store.clone());
        cache.load_from_store().unwrap();

        assert_eq!(cache.get_events(), vec![ev.clone()]);
        assert_eq!(cache.get_detections(), vec![sd.clone()]);
        assert_eq!(cache.get_associations().len(), 1);
        assert!(cache.get_history().is_empty());
    }

    #[test]
    fn detection_and_event_uses_single_association() {
        let store = make_store();
        let sd = make_detection("P");
        let ev = make_event(&[&sd]);
        seed(&store, sd.clone());
        seed(&store, ev.clone());
        let mut cache = WorkingCache::new(store.clone());
        cache.load_from_store().unwrap();

        let found = cache.detection_and_event(&sd.id).unwrap();
        assert_eq!(found.detection.id, sd.id);
        assert_eq!(found.event.map(|e| e.id), Some(ev.id));
        assert_eq!(found.revision.map(|r| r.id), sd.current);

        let missing = cache.detection_and_event(&EntityId::new());
        assert!(matches!(missing, Err(CacheError::NotFound { .. })));
    }

    #[test]
    fn detection_and_event_shows_the_revision_each_event_references() {
        let store = make_store();
        let sd = make_detection("P");
        let e1 = make_event(&[&sd]);
        seed(&store, sd.clone());
        seed(&store, e1.clone());
        let mut cache = WorkingCache::new(store.clone());
        cache.load_from_store().unwrap();

        let revised = re_phase(&sd, "S");
        cache
            .set_detections(A::UpdateDetectionRePhase, vec![revised.clone()])
            .unwrap();
        let e2 = make_event(&[&revised]);
        cache.set_events(A::CreateEvent, vec![e2.clone()]).unwrap();

        cache.set_open_event(Some(e2.id));
        let found = cache.detection_and_event(&sd.id).unwrap();
        assert_eq!(found.event.map(|e| e.id), Some(e2.id));
        assert_eq!(found.revision.unwrap().phase, "S");

        cache.set_open_event(Some(e1.id));
        let found = cache.detection_and_event(&sd.id).unwrap();
        assert_eq!(found.event.map(|e| e.id), Some(e1.id));
        let rev = found.revision.unwrap();
        assert_eq!(Some(rev.id), sd.current);
        assert_eq!(rev.phase, "P");

        cache.set_open_event(None);
        let found = cache.detection_and_event(&sd.id).unwrap();
        assert!(found.event.is_none());
        assert_eq!(found.revision.map(|r| r.id), revised.current);
    }

    // -----------------------------------------------------------------------
    // Set
    // -----------------------------------------------------------------------

    #[test]
    fn set_unknown_entity_requires_creation() {
        let store = make_store();
        let mut cache = WorkingCache::new(store.clone());
        let sd = make_detection("P");

        let err = cache.set_detections(A::UpdateDetectionRePhase, vec![sd.clone()]);
        assert!(matches!(err, Err(CacheError::NotFound { kind: EntityKind::Detection, .. })));
        assert!(cache.get_detections().is_empty());

        let entry = cache.set_detections(A::CreateDetection, vec![sd.clone()]).unwrap();
        assert!(entry.is_some());
        assert!(cache.is_modified(EntityKind::Detection, &sd.id));
        assert!(!store.has(EntityKind::Detection, &sd.id).unwrap());
    }

    #[test]
    fn failed_set_writes_nothing() {
        let store = make_store();
        let known = make_detection("P");
        seed(&store, known.clone());
        let mut cache = WorkingCache::new(store.clone());

        let result = cache.set_detections(
            A::UpdateDetectionRePhase,
            vec![re_phase(&known, "S"), make_detection("Pn")],
        );
        assert!(result.is_err());
        assert!(cache.get_detections().is_empty());
        assert!(cache.get_history().is_empty());
    }

    #[test]
    fn non_undoable_action_skips_history() {
        let store = make_store();
        let ev = make_event(&[]);
        seed(&store, ev.clone());
        let mut cache = WorkingCache::new(store.clone());

        let entry = cache.set_events(A::SaveEvent, vec![ev.clone()]).unwrap();
        assert!(entry.is_none());
        assert!(cache.get_history().is_empty());
        assert!(cache.is_modified(EntityKind::Event, &ev.id));
    }

    #[test]
    fn duplicate_inputs_keep_the_last_copy() {
        let store = make_store();
        let sd = make_detection("P");
        seed(&store, sd.clone());
        let mut cache = WorkingCache::new(store.clone());

        cache
            .set_detections(
                A::UpdateDetectionRePhase,
                vec![re_phase(&sd, "S"), re_phase(&sd, "Pn")],
            )
            .unwrap();
        assert_eq!(phase_of(&cache, &sd.id), "Pn");
        assert_eq!(cache.get_history()[0].changes.len(), 1);
    }

    #[test]
    fn rejected_association_cannot_be_reactivated() {
        let store = make_store();
        let sd = make_detection("P");
        seed(&store, sd.clone());
        let mut cache = WorkingCache::new(store.clone());

        let mut ev = make_event(&[&sd]);
        ev.current_revision_mut()
            .unwrap()
            .reject_association(&sd.current.unwrap());
        cache.set_events(A::CreateEvent, vec![ev.clone()]).unwrap();

        let mut revived = ev.clone();
        let mut rev = ev.current_revision().unwrap().successor();
        rev.associations[0].rejected = false;
        revived.revise(rev);

        let err = cache.set_events(A::Associate, vec![revived]);
        assert!(matches!(err, Err(CacheError::AssociationRejected { .. })));
        let local = cache.get_event(&ev.id).unwrap().unwrap();
        assert_eq!(local.current, ev.current);
    }

    // -----------------------------------------------------------------------
    // Conflicts
    // -----------------------------------------------------------------------

    fn make_conflict() -> (Arc<InMemorySharedStore>, WorkingCache, Detection, Event, Event) {
        let store = make_store();
        let sd = make_detection("P");
        let e1 = make_event(&[&sd]);
        let e2 = make_event(&[&sd]);
        seed(&store, sd.clone());
        seed(&store, e1.clone());
        let mut cache = WorkingCache::new(store.clone());
        cache.load_from_store().unwrap();
        cache.set_events(A::CreateEvent, vec![e2.clone()]).unwrap();
        (store, cache, sd, e1, e2)
    }

    #[test]
    fn shared_detection_conflicts_both_events() {
        let (_store, cache, sd, e1, e2) = make_conflict();

        assert!(cache.is_conflicted(EntityKind::Detection, &sd.id));
        assert!(cache.is_conflicted(EntityKind::Event, &e1.id));
        assert!(cache.is_conflicted(EntityKind::Event, &e2.id));
        assert!(cache.any_detection_conflicted());
        assert!(cache.any_event_conflicted());

        let sides = cache.conflicting_revisions(&sd.id);
        assert_eq!(sides.len(), 2);
        assert!(sides.iter().all(|s| s.phase == "P"));
    }

    #[test]
    fn second_association_marks_conflict_created() {
        let (_store, cache, ..) = make_conflict();
        let entry = cache.get_history().last().unwrap();
        assert!(entry.changes.iter().any(|c| c.conflict_created));
    }

    #[test]
    fn rejecting_one_side_clears_conflict() {
        let (_store, mut cache, sd, e1, e2) = make_conflict();

        let mut rejecting = e2.clone();
        let mut rev = e2.current_revision().unwrap().successor();
        rev.reject_association(&sd.current.unwrap());
        rejecting.revise(rev);
        cache.set_events(A::Unassociate, vec![rejecting]).unwrap();

        assert!(!cache.is_conflicted(EntityKind::Detection, &sd.id));
        assert!(!cache.is_conflicted(EntityKind::Event, &e1.id));
        assert!(!cache.is_conflicted(EntityKind::Event, &e2.id));
        assert_eq!(cache.get_associations().len(), 2);
    }

    #[test]
    fn conflicted_detection_is_locked_outside_its_events() {
        let (_store, mut cache, sd, e1, _e2) = make_conflict();
        let unrelated = make_event(&[]);
        cache.set_events(A::CreateEvent, vec![unrelated.clone()]).unwrap();

        cache.set_open_event(Some(unrelated.id));
        let err = cache.set_detections(A::UpdateDetectionRePhase, vec![re_phase(&sd, "S")]);
        assert!(matches!(err, Err(CacheError::ConflictLocked { id }) if id == sd.id));

        cache.set_open_event(Some(e1.id));
        cache
            .set_detections(A::UpdateDetectionRePhase, vec![re_phase(&sd, "S")])
            .unwrap();
        assert_eq!(phase_of(&cache, &sd.id), "S");
    }

    #[test]
    fn permissive_config_disables_the_lock() {
        let store = make_store();
        let sd = make_detection("P");
        seed(&store, sd.clone());
        seed(&store, make_event(&[&sd]));
        seed(&store, make_event(&[&sd]));
        let mut cache = WorkingCache::with_config(store.clone(), CacheConfig::permissive());
        cache.load_from_store().unwrap();
        cache.set_open_event(Some(EntityId::new()));

        cache
            .set_detections(A::UpdateDetectionRePhase, vec![re_phase(&sd, "S")])
            .unwrap();
    }

    // -----------------------------------------------------------------------
    // Pull and commit
    // -----------------------------------------------------------------------

    #[test]
    fn pull_without_overwrite_keeps_local_edits() {
        let store = make_store();
        let sd = make_detection("P");
        seed(&store, sd.clone());
        let mut cache = WorkingCache::new(store.clone());
        cache
            .set_detections(A::UpdateDetectionRePhase, vec![re_phase(&sd, "S")])
            .unwrap();

        let remote = re_phase(&sd, "Pn");
        assert_eq!(cache.pull_detections(vec![remote.clone()], false), 0);
        assert_eq!(phase_of(&cache, &sd.id), "S");

        assert_eq!(cache.pull_detections(vec![remote], true), 1);
        assert_eq!(phase_of(&cache, &sd.id), "Pn");
        assert_eq!(cache.get_history().len(), 1);
    }

    #[test]
    fn commit_writes_clean_copies_once() {
        let store = make_store();
        let sd = make_detection("P");
        seed(&store, sd.clone());
        let mut cache = WorkingCache::new(store.clone());
        cache
            .set_detections(A::UpdateDetectionRePhase, vec![re_phase(&sd, "S")])
            .unwrap();

        let committed = cache.commit(EntityKind::Detection, None).unwrap();
        assert_eq!(committed, vec![sd.id]);
        assert!(!cache.is_modified(EntityKind::Detection, &sd.id));

        let stored = store.get(EntityKind::Detection, &sd.id).unwrap().unwrap();
        assert!(!stored.is_modified());
        assert_eq!(cache.get_detection(&sd.id).unwrap().map(StoredEntity::from), Some(stored.clone()));

        assert!(cache.commit(EntityKind::Detection, None).unwrap().is_empty());
        assert_eq!(store.get(EntityKind::Detection, &sd.id).unwrap(), Some(stored));
    }

    #[test]
    fn commit_clears_history() {
        let store = make_store();
        let sd = make_detection("P");
        seed(&store, sd.clone());
        let mut cache = WorkingCache::new(store.clone());
        cache
            .set_detections(A::UpdateDetectionRePhase, vec![re_phase(&sd, "S")])
            .unwrap();
        cache.commit(EntityKind::Detection, None).unwrap();
        assert!(cache.get_history().is_empty());

        assert!(cache.undo(1).unwrap().is_empty());
        assert_eq!(phase_of(&cache, &sd.id), "S");
        assert!(!cache.is_modified(EntityKind::Detection, &sd.id));
        assert!(cache.commit(EntityKind::Detection, None).unwrap().is_empty());

        let stored = store.get(EntityKind::Detection, &sd.id).unwrap();
        assert_eq!(stored, cache.get_detection(&sd.id).unwrap().map(StoredEntity::from));
    }

    #[test]
    fn empty_commit_keeps_history() {
        let store = make_store();
        let ev = make_event(&[]);
        seed(&store, ev.clone());
        let mut cache = WorkingCache::new(store.clone());
        cache
            .set_events(A::UpdateEventLocate, vec![relocate(&ev, 60.0)])
            .unwrap();

        assert!(cache.commit(EntityKind::Detection, None).unwrap().is_empty());
        assert_eq!(cache.get_history().len(), 1);
    }

    #[test]
    fn commit_narrowed_to_listed_ids() {
        let store = make_store();
        let mut cache = WorkingCache::new(store.clone());
        let a = make_detection("P");
        let b = make_detection("S");
        cache
            .set_detections(A::CreateDetection, vec![a.clone(), b.clone()])
            .unwrap();

        let committed = cache.commit(EntityKind::Detection, Some(&[b.id])).unwrap();
        assert_eq!(committed, vec![b.id]);
        assert!(store.has(EntityKind::Detection, &b.id).unwrap());
        assert!(!store.has(EntityKind::Detection, &a.id).unwrap());
        assert!(cache.is_modified(EntityKind::Detection, &a.id));
    }

    #[test]
    fn commit_unknown_id_is_not_found() {
        let store = make_store();
        let mut cache = WorkingCache::new(store.clone());
        let err = cache.commit(EntityKind::Event, Some(&[EntityId::new()]));
        assert!(matches!(err, Err(CacheError::NotFound { kind: EntityKind::Event, .. })));
    }

    // -----------------------------------------------------------------------
    // Undo / redo
    // -----------------------------------------------------------------------

    #[test]
    fn re_phase_undo_redo_then_commit() {
        let store = make_store();
        let sd = make_detection("P");
        seed(&store, sd.clone());
        let mut cache = WorkingCache::new(store.clone());

        let edited = re_phase(&sd, "S");
        let h2 = edited.current.unwrap();
        cache
            .set_detections(A::UpdateDetectionRePhase, vec![edited])
            .unwrap();

        let outcome = cache.undo_for(None, 1).unwrap();
        assert_eq!(outcome.detections.len(), 1);
        let local = cache.get_detection(&sd.id).unwrap().unwrap();
        assert_eq!(local.current, Some(h2));
        assert_eq!(local.current_revision().unwrap().phase, "P");

        cache.redo(1).unwrap();
        assert_eq!(phase_of(&cache, &sd.id), "S");

        cache.commit(EntityKind::Detection, None).unwrap();
        let stored = store.get(EntityKind::Detection, &sd.id).unwrap().unwrap();
        let stored = Detection::try_from_stored(stored).unwrap();
        assert_eq!(stored.current_revision().unwrap().phase, "S");
        assert!(!stored.is_modified());
    }

    #[test]
    fn undoing_stacked_re_phases_leaves_nothing_to_commit() {
        let store = make_store();
        let sd = make_detection("P");
        seed(&store, sd.clone());
        let mut cache = WorkingCache::new(store.clone());

        let first = re_phase(&sd, "S");
        cache
            .set_detections(A::UpdateDetectionRePhase, vec![first.clone()])
            .unwrap();
        cache
            .set_detections(A::UpdateDetectionRePhase, vec![re_phase(&first, "Pn")])
            .unwrap();

        cache.undo(2).unwrap();
        assert_eq!(phase_of(&cache, &sd.id), "P");
        assert!(!cache.is_modified(EntityKind::Detection, &sd.id));
        assert!(cache.commit(EntityKind::Detection, None).unwrap().is_empty());
        assert_eq!(
            store.get(EntityKind::Detection, &sd.id).unwrap(),
            Some(StoredEntity::from(sd))
        );
    }

    #[test]
    fn undo_fails_before_moving_history_when_an_entity_is_gone() {
        let store = make_store();
        let mut cache = WorkingCache::new(store.clone());
        let sd = make_detection("P");
        cache.set_detections(A::CreateDetection, vec![sd.clone()]).unwrap();
        cache.detections.remove(&sd.id);

        let err = cache.undo(1);
        assert!(matches!(err, Err(CacheError::NotFound { kind: EntityKind::Detection, .. })));
        assert!(cache.get_history()[0].is_applied());
    }

    #[test]
    fn undone_creation_leaves_an_invalid_entity() {
        let store = make_store();
        let mut cache = WorkingCache::new(store.clone());
        let sd = make_detection("P");
        cache.set_detections(A::CreateDetection, vec![sd.clone()]).unwrap();

        let outcome = cache.undo(1).unwrap();
        assert!(outcome.is_empty());
        assert!(cache.get_detections().is_empty());
        assert_eq!(cache.invalid_ids(EntityKind::Detection), vec![sd.id]);

        let outcome = cache.redo(1).unwrap();
        assert_eq!(outcome.detections.len(), 1);
        assert!(cache.invalid_ids(EntityKind::Detection).is_empty());
    }

    #[test]
    fn undo_drops_records_to_removed_revisions() {
        let store = make_store();
        let ev = make_event(&[]);
        seed(&store, ev.clone());
        let mut cache = WorkingCache::new(store.clone());

        let sd = make_detection("P");
        cache.set_detections(A::CreateDetection, vec![sd.clone()]).unwrap();

        let mut associated = ev.clone();
        let rev = ev
            .current_revision()
            .unwrap()
            .successor()
            .with_association(sd.current.unwrap());
        associated.revise(rev);
        cache.set_events(A::Associate, vec![associated]).unwrap();
        assert_eq!(cache.get_associations().len(), 1);

        let outcome = cache.undo_for(None, 1).unwrap();
        assert_eq!(outcome.events.len(), 1);
        assert!(cache.get_associations().is_empty());
        let local = cache.get_event(&ev.id).unwrap().unwrap();
        assert!(local.current_revision().unwrap().associations.is_empty());
    }

    #[test]
    fn open_event_scope_needs_an_open_event() {
        let store = make_store();
        let ev = make_event(&[]);
        seed(&store, ev.clone());
        let mut cache = WorkingCache::new(store.clone());
        cache
            .set_events(A::UpdateEventLocate, vec![relocate(&ev, 60.0)])
            .unwrap();

        assert_eq!(cache.undo_for_open_event(1).unwrap(), None);

        cache.set_open_event(Some(ev.id));
        let outcome = cache.undo_for_open_event(1).unwrap().unwrap();
        assert_eq!(outcome.events.len(), 1);
        assert!(cache.get_history()[0].is_undone());

        let id = cache.get_history()[0].id;
        cache.redo_for_open_event_by_id(id).unwrap().unwrap();
        assert!(cache.get_history()[0].is_applied());
    }

    #[test]
    fn unknown_history_id_surfaces_as_history_error() {
        let store = make_store();
        let mut cache = WorkingCache::new(store.clone());
        let err = cache.undo_by_id(HistoryId::new());
        assert!(matches!(err, Err(CacheError::History(_))));
    }

    const PHASES: [&str; 4] = ["S", "Pn", "Sn", "Lg"];

    fn current_phases(cache: &WorkingCache) -> BTreeMap<EntityId, String> {
        cache
            .get_detections()
            .into_iter()
            .map(|sd| {
                let phase = sd.current_revision().map(|r| r.phase.clone()).unwrap_or_default();
                (sd.id, phase)
            })
            .collect()
    }

    proptest! {
        #[test]
        fn undo_all_then_redo_all_restores_post_set_state(
            ops in prop::collection::vec((0u8..3, 0usize..3), 1..8)
        ) {
            let store = make_store();
            let detections: Vec<Detection> =
                ["P", "S", "Pn"].iter().map(|p| make_detection(p)).collect();
            let ev = make_event(&[&detections[0]]);
            for sd in &detections {
                seed(&store, sd.clone());
            }
            seed(&store, ev.clone());

            let mut cache = WorkingCache::new(store.clone());
            cache.load_from_store().unwrap();
            let initial = current_phases(&cache);

            for (step, (op, target)) in ops.iter().enumerate() {
                match op {
                    0 => {
                        let id = detections[*target].id;
                        let sd = cache.get_detection(&id).unwrap().unwrap();
                        cache
                            .set_detections(
                                A::UpdateDetectionRePhase,
                                vec![re_phase(&sd, PHASES[step % PHASES.len()])],
                            )
                            .unwrap();
                    }
                    1 => {
                        cache
                            .set_detections(A::CreateDetection, vec![make_detection("Lg")])
                            .unwrap();
                    }
                    _ => {
                        let current = cache.get_event(&ev.id).unwrap().unwrap();
                        cache
                            .set_events(A::UpdateEventLocate, vec![relocate(&current, step as f64)])
                            .unwrap();
                    }
                }
            }
            prop_assert_eq!(cache.get_history().len(), ops.len());
            let after_set = (cache.get_events(), cache.get_detections());

            cache.undo(ops.len()).unwrap();
            prop_assert_eq!(current_phases(&cache), initial);

            cache.redo(ops.len()).unwrap();
            prop_assert_eq!((cache.get_events(), cache.get_detections()), after_set);
        }
    }
}
