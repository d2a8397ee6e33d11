use serde::{Deserialize, Serialize};

use crate::association::AssociationRecord;
use crate::entity::{Entity, EntityKind, Revision, StoredEntity};
use crate::error::TypeError;
use crate::id::{EntityId, RevisionId};

/// Hypocenter of an event revision. `time` is the origin time in epoch seconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub depth_km: f64,
    pub time: f64,
}

/// One hypothesis of an event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventRevision {
    pub id: RevisionId,
    pub event_id: EntityId,
    #[serde(default)]
    pub rejected: bool,
    #[serde(default)]
    pub modified: bool,
    #[serde(default)]
    pub associations: Vec<AssociationRecord>,
    #[serde(default)]
    pub location: Option<Location>,
}

impl EventRevision {
    /// A fresh, empty revision for `event_id`.
    pub fn new(event_id: EntityId) -> Self {
        Self {
            id: RevisionId::new(),
            event_id,
            rejected: false,
            modified: false,
            associations: Vec::new(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Append a non-rejected association to `detection_revision_id`.
    pub fn with_association(mut self, detection_revision_id: RevisionId) -> Self {
        self.associations
            .push(AssociationRecord::new(self.id, detection_revision_id));
        self
    }

    /// Copy-on-write successor: same content under a new revision id, with
    /// association records re-pointed at the new id.
    pub fn successor(&self) -> Self {
        let mut next = self.relabeled(RevisionId::new());
        next.modified = false;
        next
    }

    /// Mark every association to `detection_revision_id` rejected.
    pub fn reject_association(&mut self, detection_revision_id: &RevisionId) {
        for record in &mut self.associations {
            if record.detection_revision_id == *detection_revision_id {
                record.rejected = true;
            }
        }
    }
}

impl Revision for EventRevision {
    fn id(&self) -> &RevisionId {
        &self.id
    }

    fn owner_id(&self) -> &EntityId {
        &self.event_id
    }

    fn is_rejected(&self) -> bool {
        self.rejected
    }

    fn is_modified(&self) -> bool {
        self.modified
    }

    fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }

    fn relabeled(&self, id: RevisionId) -> Self {
        let mut copy = self.clone();
        copy.id = id;
        for record in &mut copy.associations {
            record.event_revision_id = id;
        }
        copy
    }
}

/// A seismic event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EntityId,
    pub revisions: Vec<EventRevision>,
    pub current: Option<RevisionId>,
    #[serde(default)]
    pub preferred_history: Vec<RevisionId>,
}

impl Event {
    /// An event whose only revision is `revision`, which is current and
    /// preferred.
    pub fn new(revision: EventRevision) -> Self {
        Self {
            id: revision.event_id,
            current: Some(revision.id),
            preferred_history: vec![revision.id],
            revisions: vec![revision],
        }
    }
}

impl Entity for Event {
    type Revision = EventRevision;

    const KIND: EntityKind = EntityKind::Event;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn revisions(&self) -> &[EventRevision] {
        &self.revisions
    }

    fn revisions_mut(&mut self) -> &mut Vec<EventRevision> {
        &mut self.revisions
    }

    fn current_id(&self) -> Option<&RevisionId> {
        self.current.as_ref()
    }

    fn set_current_id(&mut self, id: Option<RevisionId>) {
        self.current = id;
    }

    fn preferred_history(&self) -> &[RevisionId] {
        &self.preferred_history
    }

    fn preferred_history_mut(&mut self) -> &mut Vec<RevisionId> {
        &mut self.preferred_history
    }

    fn into_stored(self) -> StoredEntity {
        StoredEntity::Event(self)
    }

    fn try_from_stored(stored: StoredEntity) -> Result<Self, TypeError> {
        match stored {
            StoredEntity::Event(event) => Ok(event),
            other => Err(TypeError::KindMismatch {
                expected: EntityKind::Event,
                actual: other.kind(),
            }),
        }
    }

    fn from_stored_ref(stored: &StoredEntity) -> Option<&Self> {
        match stored {
            StoredEntity::Event(event) => Some(event),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relabel_repoints_association_records() {
        let rev = EventRevision::new(EntityId::new()).with_association(RevisionId::new());
        let new_id = RevisionId::new();
        let copy = rev.relabeled(new_id);
        assert_eq!(copy.id, new_id);
        assert_eq!(copy.associations[0].event_revision_id, new_id);
        assert_eq!(copy.associations[0].id, rev.associations[0].id);
    }

    #[test]
    fn successor_is_unmodified_with_new_id() {
        let mut rev = EventRevision::new(EntityId::new());
        rev.modified = true;
        let next = rev.successor();
        assert_ne!(next.id, rev.id);
        assert!(!next.modified);
        assert_eq!(next.event_id, rev.event_id);
    }

    #[test]
    fn reject_association_flags_matching_records() {
        let sd_rev = RevisionId::new();
        let mut rev = EventRevision::new(EntityId::new())
            .with_association(sd_rev)
            .with_association(RevisionId::new());
        rev.reject_association(&sd_rev);
        assert!(rev.associations[0].rejected);
        assert!(!rev.associations[1].rejected);
    }

    #[test]
    fn new_event_points_at_its_revision() {
        let rev = EventRevision::new(EntityId::new());
        let ev = Event::new(rev.clone());
        assert_eq!(ev.id, rev.event_id);
        assert_eq!(ev.current_revision(), Some(&rev));
        assert_eq!(ev.preferred_history, vec![rev.id]);
    }
}
