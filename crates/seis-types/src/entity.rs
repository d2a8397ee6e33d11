use std::fmt;

use serde::{Deserialize, Serialize};

use crate::detection::Detection;
use crate::error::TypeError;
use crate::event::Event;
use crate::id::{EntityId, RevisionId};

/// The two kinds of entity the cache versions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Event,
    Detection,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event => write!(f, "event"),
            Self::Detection => write!(f, "detection"),
        }
    }
}

/// One versioned content snapshot of an entity (a hypothesis).
pub trait Revision: Clone + fmt::Debug + PartialEq {
    /// This revision's own id.
    fn id(&self) -> &RevisionId;

    /// Id of the entity this revision belongs to.
    fn owner_id(&self) -> &EntityId;

    fn is_rejected(&self) -> bool;

    fn is_modified(&self) -> bool;

    fn set_modified(&mut self, modified: bool);

    /// A copy of this content addressed under a different revision id.
    fn relabeled(&self, id: RevisionId) -> Self;
}

/// A long-lived, externally addressable object with an append-only list of
/// revisions, a current pointer and a preferred-revision history.
pub trait Entity: Clone + fmt::Debug + PartialEq {
    type Revision: Revision;

    const KIND: EntityKind;

    fn id(&self) -> &EntityId;

    fn revisions(&self) -> &[Self::Revision];

    fn revisions_mut(&mut self) -> &mut Vec<Self::Revision>;

    fn current_id(&self) -> Option<&RevisionId>;

    fn set_current_id(&mut self, id: Option<RevisionId>);

    fn preferred_history(&self) -> &[RevisionId];

    fn preferred_history_mut(&mut self) -> &mut Vec<RevisionId>;

    fn into_stored(self) -> StoredEntity;

    fn try_from_stored(stored: StoredEntity) -> Result<Self, TypeError>;

    fn from_stored_ref(stored: &StoredEntity) -> Option<&Self>;

    /// Look up a revision by id.
    fn revision(&self, id: &RevisionId) -> Option<&Self::Revision> {
        self.revisions().iter().find(|r| r.id() == id)
    }

    /// The revision the current pointer resolves to, if any.
    fn current_revision(&self) -> Option<&Self::Revision> {
        self.current_id().and_then(|id| self.revision(id))
    }

    fn current_revision_mut(&mut self) -> Option<&mut Self::Revision> {
        let id = *self.current_id()?;
        self.revisions_mut().iter_mut().find(|r| *r.id() == id)
    }

    /// An entity whose current pointer resolves to nothing is invalid and
    /// must not be surfaced as a valid entity.
    fn is_valid(&self) -> bool {
        self.current_revision().is_some()
    }

    /// `true` if any revision carries uncommitted edits.
    fn is_modified(&self) -> bool {
        self.revisions().iter().any(Revision::is_modified)
    }

    fn clear_modified(&mut self) {
        for revision in self.revisions_mut() {
            revision.set_modified(false);
        }
    }

    /// Replace or append `revision`, make it current and record it in the
    /// preferred history.
    fn revise(&mut self, revision: Self::Revision) {
        let id = *revision.id();
        match self.revisions_mut().iter_mut().find(|r| *r.id() == id) {
            Some(slot) => *slot = revision,
            None => self.revisions_mut().push(revision),
        }
        if !self.preferred_history().contains(&id) {
            self.preferred_history_mut().push(id);
        }
        self.set_current_id(Some(id));
    }
}

/// The unit of storage in the shared store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoredEntity {
    Event(Event),
    Detection(Detection),
}

impl StoredEntity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Event(_) => EntityKind::Event,
            Self::Detection(_) => EntityKind::Detection,
        }
    }

    pub fn id(&self) -> &EntityId {
        match self {
            Self::Event(e) => e.id(),
            Self::Detection(d) => d.id(),
        }
    }

    pub fn is_modified(&self) -> bool {
        match self {
            Self::Event(e) => e.is_modified(),
            Self::Detection(d) => d.is_modified(),
        }
    }
}

impl From<Event> for StoredEntity {
    fn from(event: Event) -> Self {
        Self::Event(event)
    }
}

impl From<Detection> for StoredEntity {
    fn from(detection: Detection) -> Self {
        Self::Detection(detection)
    }
}
