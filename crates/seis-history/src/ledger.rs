use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use seis_conflict::Resolution;
use seis_types::{
    ChangeId, Detection, DetectionRevision, Entity, EntityId, EntityKind, Event, EventRevision,
    HistoryId, Revision, RevisionId,
};

use crate::action::ActionDescription;
use crate::describe::{ActionDescriber, DefaultDescriber};
use crate::error::{HistoryError, HistoryResult};
use crate::stack::RevisionUndoStack;

// ---------------------------------------------------------------
// Records
// ---------------------------------------------------------------

/// One revision touched by a history entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub id: ChangeId,
    /// `true` while applied, `false` once undone.
    pub active: bool,
    /// Event the change is attributed to; `None` for unassociated edits.
    pub owner: Option<EntityId>,
    pub conflict_created: bool,
    pub revision_id: RevisionId,
    pub revision_kind: EntityKind,
    /// Entity owning the revision.
    pub parent_id: EntityId,
    pub descriptor: String,
}

/// One recorded analyst action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: HistoryId,
    pub action: ActionDescription,
    pub changes: Vec<Change>,
}

impl HistoryEntry {
    /// `true` when every change is applied.
    pub fn is_applied(&self) -> bool {
        self.changes.iter().all(|c| c.active)
    }

    /// `true` when every change is undone.
    pub fn is_undone(&self) -> bool {
        self.changes.iter().all(|c| !c.active)
    }
}

/// Revision content produced by an undo or redo step. `revision: None`
/// means the revision must be removed from its entity.
#[derive(Clone, Debug, PartialEq)]
pub enum RevisionRestore {
    Event {
        event_id: EntityId,
        revision_id: RevisionId,
        revision: Option<EventRevision>,
    },
    Detection {
        detection_id: EntityId,
        revision_id: RevisionId,
        revision: Option<DetectionRevision>,
    },
}

impl RevisionRestore {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Event { .. } => EntityKind::Event,
            Self::Detection { .. } => EntityKind::Detection,
        }
    }

    pub fn entity_id(&self) -> &EntityId {
        match self {
            Self::Event { event_id, .. } => event_id,
            Self::Detection { detection_id, .. } => detection_id,
        }
    }

    pub fn revision_id(&self) -> &RevisionId {
        match self {
            Self::Event { revision_id, .. } | Self::Detection { revision_id, .. } => revision_id,
        }
    }

    pub fn is_removal(&self) -> bool {
        match self {
            Self::Event { revision, .. } => revision.is_none(),
            Self::Detection { revision, .. } => revision.is_none(),
        }
    }
}

/// Everything the ledger needs to record one `set`.
///
/// `events` and `detections` are the changed entities as they now stand;
/// the `previous_*` maps hold their state before the change (absent for
/// creations); `resolution` is the association view after the change.
#[derive(Clone, Copy, Debug)]
pub struct ChangeSet<'a> {
    pub action: ActionDescription,
    pub events: &'a [Event],
    pub detections: &'a [Detection],
    pub previous_events: &'a HashMap<EntityId, Event>,
    pub previous_detections: &'a HashMap<EntityId, Detection>,
    pub resolution: &'a Resolution,
    pub conflict_created: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Undo,
    Redo,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Scope {
    Global,
    Owner(Option<EntityId>),
}

impl Scope {
    fn covers(&self, change: &Change) -> bool {
        match self {
            Self::Global => true,
            Self::Owner(owner) => change.owner == *owner,
        }
    }
}

// ---------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------

/// Ordered log of analyst actions with per-revision undo stacks.
pub struct HistoryLedger {
    event_stacks: HashMap<RevisionId, RevisionUndoStack<EventRevision>>,
    detection_stacks: HashMap<RevisionId, RevisionUndoStack<DetectionRevision>>,
    entries: Vec<HistoryEntry>,
    /// Undone entry ids, most recently undone last.
    redo_priority: Vec<HistoryId>,
    describer: Box<dyn ActionDescriber>,
}

impl HistoryLedger {
    pub fn new() -> Self {
        Self::with_describer(Box::new(DefaultDescriber))
    }

    pub fn with_describer(describer: Box<dyn ActionDescriber>) -> Self {
        Self {
            event_stacks: HashMap::new(),
            detection_stacks: HashMap::new(),
            entries: Vec::new(),
            redo_priority: Vec::new(),
            describer,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every entry, oldest first.
    pub fn history(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Entries touching `event_id`, each reduced to that event's changes.
    pub fn event_history(&self, event_id: &EntityId) -> Vec<HistoryEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.changes.iter().any(|c| c.owner == Some(*event_id)))
            .map(|entry| HistoryEntry {
                id: entry.id,
                action: entry.action,
                changes: entry
                    .changes
                    .iter()
                    .filter(|c| c.owner == Some(*event_id))
                    .cloned()
                    .collect(),
            })
            .collect()
    }

    /// Redo order of an undone entry: 1 is redone first. `None` if the entry
    /// is not waiting to be redone.
    pub fn redo_priority_order(&self, id: &HistoryId) -> Option<usize> {
        self.redo_priority
            .iter()
            .position(|h| h == id)
            .map(|index| self.redo_priority.len() - index)
    }

    /// Every entity referenced by a recorded change.
    pub fn entities(&self) -> BTreeSet<(EntityKind, EntityId)> {
        self.entries
            .iter()
            .flat_map(|e| &e.changes)
            .map(|c| (c.revision_kind, c.parent_id))
            .collect()
    }

    /// Wipe every entry, stack and the redo order.
    pub fn clear(&mut self) {
        self.event_stacks.clear();
        self.detection_stacks.clear();
        self.entries.clear();
        self.redo_priority.clear();
    }

    // ---------------------------------------------------------------
    // Recording
    // ---------------------------------------------------------------

    /// Record one action. Returns the new entry id, or `None` when nothing
    /// recordable changed.
    pub fn append(&mut self, set: ChangeSet<'_>) -> Option<HistoryId> {
        let mut changes = Vec::with_capacity(set.events.len() + set.detections.len());

        for event in set.events {
            let Some(revision) = event.current_revision() else {
                warn!(event = %event.id.short_id(), "changed event has no current revision");
                continue;
            };
            let previous = set
                .previous_events
                .get(&event.id)
                .and_then(|e| e.current_revision());
            self.event_stacks
                .entry(revision.id)
                .or_insert_with(|| RevisionUndoStack::new(previous.map(|p| p.relabeled(revision.id))))
                .push(revision.clone());

            changes.push(Change {
                id: ChangeId::new(),
                active: true,
                owner: Some(event.id),
                conflict_created: set.conflict_created,
                revision_id: revision.id,
                revision_kind: EntityKind::Event,
                parent_id: event.id,
                descriptor: self.describer.describe_event(set.action, previous, revision),
            });
        }

        for detection in set.detections {
            let revision_id = match set.events {
                [event] if set.action.targets_updated_event() => set
                    .resolution
                    .revision_for_event(&detection.id, &event.id)
                    .or(detection.current),
                _ => detection.current,
            };
            let Some(revision) = revision_id.and_then(|id| detection.revision(&id)) else {
                warn!(detection = %detection.id.short_id(), "changed detection has no current revision");
                continue;
            };
            let previous = set
                .previous_detections
                .get(&detection.id)
                .and_then(|d| d.current_revision());
            // a revision minted on top of an uncommitted one has nothing to fall back to
            let baseline = previous
                .filter(|p| !p.is_modified())
                .map(|p| p.relabeled(revision.id));
            self.detection_stacks
                .entry(revision.id)
                .or_insert_with(|| RevisionUndoStack::new(baseline))
                .push(revision.clone());

            let owner = set
                .resolution
                .owner_event(&revision.id, set.action.counts_rejected_associations());
            changes.push(Change {
                id: ChangeId::new(),
                active: true,
                owner,
                conflict_created: set.conflict_created,
                revision_id: revision.id,
                revision_kind: EntityKind::Detection,
                parent_id: detection.id,
                descriptor: self
                    .describer
                    .describe_detection(set.action, detection, previous, revision),
            });
        }

        if changes.is_empty() {
            return None;
        }

        self.prune(&changes);

        let id = HistoryId::new();
        debug!(
            entry = %id.short_id(),
            action = %set.action,
            changes = changes.len(),
            "recorded history entry"
        );
        self.entries.push(HistoryEntry {
            id,
            action: set.action,
            changes,
        });
        Some(id)
    }

    /// Drop undone changes that a fresh action has made unreachable.
    ///
    /// An action is global when it touches more than one owner or any
    /// unassociated change. A global action clears every entry holding an
    /// undone change; otherwise only the undone changes of the touched
    /// owners go.
    fn prune(&mut self, incoming: &[Change]) {
        let owners: BTreeSet<Option<EntityId>> = incoming.iter().map(|c| c.owner).collect();
        let global = owners.len() > 1 || owners.contains(&None);

        for entry in &mut self.entries {
            if global && entry.changes.iter().any(|c| !c.active) {
                entry.changes.clear();
            } else {
                entry
                    .changes
                    .retain(|c| c.active || !owners.contains(&c.owner));
            }
        }

        let dropped: BTreeSet<HistoryId> = self
            .entries
            .iter()
            .filter(|e| e.changes.is_empty())
            .map(|e| e.id)
            .collect();
        if !dropped.is_empty() {
            debug!(count = dropped.len(), global, "pruned history entries");
            self.entries.retain(|e| !dropped.contains(&e.id));
            self.redo_priority.retain(|id| !dropped.contains(id));
        }
    }

    // ---------------------------------------------------------------
    // Undo / redo
    // ---------------------------------------------------------------

    /// Undo the `count` most recent entries that still have applied changes.
    pub fn undo(&mut self, count: usize) -> Vec<RevisionRestore> {
        self.step_many(Direction::Undo, Scope::Global, vec![None; count])
    }

    /// Redo `count` entries in the reverse of the order they were undone.
    pub fn redo(&mut self, count: usize) -> Vec<RevisionRestore> {
        self.step_many(Direction::Redo, Scope::Global, vec![None; count])
    }

    /// Undo every entry from the newest back to `id` inclusive.
    pub fn undo_by_id(&mut self, id: HistoryId) -> HistoryResult<Vec<RevisionRestore>> {
        let targets = self.targets_through(id, Direction::Undo, Scope::Global)?;
        Ok(self.step_many(Direction::Undo, Scope::Global, targets))
    }

    /// Redo every entry from the oldest forward to `id` inclusive.
    pub fn redo_by_id(&mut self, id: HistoryId) -> HistoryResult<Vec<RevisionRestore>> {
        let targets = self.targets_through(id, Direction::Redo, Scope::Global)?;
        Ok(self.step_many(Direction::Redo, Scope::Global, targets))
    }

    /// Undo the `count` most recent entries touching `owner`, flipping only
    /// that owner's changes. `None` addresses unassociated changes.
    pub fn undo_for(&mut self, owner: Option<EntityId>, count: usize) -> Vec<RevisionRestore> {
        self.step_many(Direction::Undo, Scope::Owner(owner), vec![None; count])
    }

    /// Redo the `count` oldest undone entries touching `owner`.
    pub fn redo_for(&mut self, owner: Option<EntityId>, count: usize) -> Vec<RevisionRestore> {
        self.step_many(Direction::Redo, Scope::Owner(owner), vec![None; count])
    }

    pub fn undo_for_by_id(
        &mut self,
        owner: Option<EntityId>,
        id: HistoryId,
    ) -> HistoryResult<Vec<RevisionRestore>> {
        let targets = self.targets_through(id, Direction::Undo, Scope::Owner(owner))?;
        Ok(self.step_many(Direction::Undo, Scope::Owner(owner), targets))
    }

    pub fn redo_for_by_id(
        &mut self,
        owner: Option<EntityId>,
        id: HistoryId,
    ) -> HistoryResult<Vec<RevisionRestore>> {
        let targets = self.targets_through(id, Direction::Redo, Scope::Owner(owner))?;
        Ok(self.step_many(Direction::Redo, Scope::Owner(owner), targets))
    }

    /// Entry ids from the walk start up to and including `id`.
    fn targets_through(
        &self,
        id: HistoryId,
        direction: Direction,
        scope: Scope,
    ) -> HistoryResult<Vec<Option<HistoryId>>> {
        let ordered: Vec<&HistoryEntry> = match direction {
            Direction::Undo => self.entries.iter().rev().collect(),
            Direction::Redo => self.entries.iter().collect(),
        };
        let index = ordered
            .iter()
            .position(|e| e.id == id)
            .ok_or(HistoryError::EntryNotFound(id))?;
        Ok(ordered[..=index]
            .iter()
            .filter(|e| e.changes.iter().any(|c| scope.covers(c)))
            .map(|e| Some(e.id))
            .collect())
    }

    fn step_many(
        &mut self,
        direction: Direction,
        scope: Scope,
        targets: Vec<Option<HistoryId>>,
    ) -> Vec<RevisionRestore> {
        let mut restores = Vec::new();
        for target in targets {
            match self.find_entry(direction, scope, target) {
                Some(index) => restores.extend(self.step_entry(index, direction, scope)),
                None => debug!(?direction, ?scope, "nothing left to step"),
            }
        }
        restores
    }

    fn find_entry(
        &self,
        direction: Direction,
        scope: Scope,
        target: Option<HistoryId>,
    ) -> Option<usize> {
        let undo = direction == Direction::Undo;
        let eligible = |entry: &HistoryEntry| {
            if target.is_some_and(|id| id != entry.id) {
                return false;
            }
            match scope {
                Scope::Global if undo => entry.changes.iter().any(|c| c.active),
                Scope::Global => match target {
                    None => self.redo_priority.last() == Some(&entry.id),
                    Some(_) => entry.changes.iter().any(|c| !c.active),
                },
                Scope::Owner(_) => entry
                    .changes
                    .iter()
                    .find(|c| scope.covers(c))
                    .is_some_and(|c| c.active == undo),
            }
        };
        if undo {
            self.entries.iter().rposition(eligible)
        } else {
            self.entries.iter().position(eligible)
        }
    }

    fn step_entry(
        &mut self,
        index: usize,
        direction: Direction,
        scope: Scope,
    ) -> Vec<RevisionRestore> {
        let undo = direction == Direction::Undo;
        let entry = &mut self.entries[index];
        let mut restores = Vec::new();

        for change in entry.changes.iter_mut() {
            if !scope.covers(change) || change.active != undo {
                continue;
            }
            let restore = match change.revision_kind {
                EntityKind::Event => self.event_stacks.get_mut(&change.revision_id).map(|stack| {
                    RevisionRestore::Event {
                        event_id: change.parent_id,
                        revision_id: change.revision_id,
                        revision: if undo { stack.undo() } else { stack.redo() },
                    }
                }),
                EntityKind::Detection => {
                    self.detection_stacks
                        .get_mut(&change.revision_id)
                        .map(|stack| RevisionRestore::Detection {
                            detection_id: change.parent_id,
                            revision_id: change.revision_id,
                            revision: if undo { stack.undo() } else { stack.redo() },
                        })
                }
            };
            match restore {
                Some(restore) => restores.push(restore),
                None => warn!(
                    revision = %change.revision_id.short_id(),
                    "no undo stack tracked for revision"
                ),
            }
            change.active = !undo;
        }

        let id = entry.id;
        let applied = entry.is_applied();
        debug!(entry = %id.short_id(), ?direction, restores = restores.len(), "stepped history entry");
        self.update_redo_priority(id, undo, applied);
        restores
    }

    fn update_redo_priority(&mut self, id: HistoryId, undo: bool, applied: bool) {
        if let Some(pos) = self.redo_priority.iter().position(|h| *h == id) {
            if undo || applied {
                self.redo_priority.remove(pos);
            }
        }
        if undo {
            self.redo_priority.push(id);
        }
    }
}

impl Default for HistoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HistoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryLedger")
            .field("entries", &self.entries.len())
            .field("event_stacks", &self.event_stacks.len())
            .field("detection_stacks", &self.detection_stacks.len())
            .field("redo_priority", &self.redo_priority)
            .finish()
    }
}
