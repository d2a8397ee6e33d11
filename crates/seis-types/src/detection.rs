use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityKind, Revision, StoredEntity};
use crate::error::TypeError;
use crate::id::{EntityId, RevisionId};

/// One hypothesis of a signal detection. `arrival_time` is epoch seconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionRevision {
    pub id: RevisionId,
    pub detection_id: EntityId,
    #[serde(default)]
    pub rejected: bool,
    #[serde(default)]
    pub modified: bool,
    pub phase: String,
    pub arrival_time: f64,
    #[serde(default)]
    pub amplitude: Option<f64>,
}

impl DetectionRevision {
    pub fn new(detection_id: EntityId, phase: impl Into<String>, arrival_time: f64) -> Self {
        Self {
            id: RevisionId::new(),
            detection_id,
            rejected: false,
            modified: false,
            phase: phase.into(),
            arrival_time,
            amplitude: None,
        }
    }

    pub fn with_amplitude(mut self, amplitude: f64) -> Self {
        self.amplitude = Some(amplitude);
        self
    }

    /// Copy-on-write successor: same content under a new revision id.
    pub fn successor(&self) -> Self {
        let mut next = self.relabeled(RevisionId::new());
        next.modified = false;
        next
    }
}

impl Revision for DetectionRevision {
    fn id(&self) -> &RevisionId {
        &self.id
    }

    fn owner_id(&self) -> &EntityId {
        &self.detection_id
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
        Self {
            id,
            ..self.clone()
        }
    }
}

/// A signal detection recorded at one station.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: EntityId,
    pub station: String,
    pub revisions: Vec<DetectionRevision>,
    pub current: Option<RevisionId>,
    #[serde(default)]
    pub preferred_history: Vec<RevisionId>,
}

impl Detection {
    pub fn new(id: EntityId, station: impl Into<String>, revision: DetectionRevision) -> Self {
        Self {
            id,
            station: station.into(),
            current: Some(revision.id),
            preferred_history: vec![revision.id],
            revisions: vec![revision],
        }
    }
}

impl Entity for Detection {
    type Revision = DetectionRevision;

    const KIND: EntityKind = EntityKind::Detection;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn revisions(&self) -> &[DetectionRevision] {
        &self.revisions
    }

    fn revisions_mut(&mut self) -> &mut Vec<DetectionRevision> {
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
        StoredEntity::Detection(self)
    }

    fn try_from_stored(stored: StoredEntity) -> Result<Self, TypeError> {
        match stored {
            StoredEntity::Detection(detection) => Ok(detection),
            other => Err(TypeError::KindMismatch {
                expected: EntityKind::Detection,
                actual: other.kind(),
            }),
        }
    }

    fn from_stored_ref(stored: &StoredEntity) -> Option<&Self> {
        match stored {
            StoredEntity::Detection(detection) => Some(detection),
            _ => None,
        }
    }
}
