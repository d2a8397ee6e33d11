use serde::{Deserialize, Serialize};

use crate::id::{AssociationId, EntityId, RevisionId};

/// A link stored on an event revision, pointing at one detection revision.
///
/// Once an association id has been rejected it stays rejected: it must never
/// be re-activated under the same id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssociationRecord {
    pub id: AssociationId,
    pub event_revision_id: RevisionId,
    pub detection_revision_id: RevisionId,
    pub rejected: bool,
}

impl AssociationRecord {
    /// Create a new, non-rejected association record with a fresh id.
    pub fn new(event_revision_id: RevisionId, detection_revision_id: RevisionId) -> Self {
        Self {
            id: AssociationId::new(),
            event_revision_id,
            detection_revision_id,
            rejected: false,
        }
    }

    /// The same record, marked rejected.
    pub fn rejected(mut self) -> Self {
        self.rejected = true;
        self
    }
}

/// A resolved association between an event and a detection.
///
/// Derived from the current event revisions; never stored.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Association {
    pub id: AssociationId,
    pub event_id: EntityId,
    pub detection_id: EntityId,
    pub event_revision_id: RevisionId,
    pub detection_revision_id: RevisionId,
    pub rejected: bool,
}

impl Association {
    /// Resolve a record owned by `event_id` against the detection that owns
    /// the referenced revision.
    pub fn resolve(event_id: EntityId, detection_id: EntityId, record: &AssociationRecord) -> Self {
        Self {
            id: record.id,
            event_id,
            detection_id,
            event_revision_id: record.event_revision_id,
            detection_revision_id: record.detection_revision_id,
            rejected: record.rejected,
        }
    }
}
