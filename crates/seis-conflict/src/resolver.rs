use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::warn;

use seis_types::{
    Association, AssociationId, Detection, Entity, EntityId, EntityKind, Event, RevisionId,
};

/// Derived association and conflict view of one snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    associations: Vec<Association>,
    conflicted_detections: BTreeSet<EntityId>,
    conflicted_events: BTreeSet<EntityId>,
    stale: Vec<AssociationId>,
}

/// Resolve the association records of every valid event against the given
/// detections and compute conflicts.
pub fn resolve<'a, E, D>(events: E, detections: D) -> Resolution
where
    E: IntoIterator<Item = &'a Event>,
    D: IntoIterator<Item = &'a Detection>,
{
    let owners: HashMap<RevisionId, EntityId> = detections
        .into_iter()
        .flat_map(|sd| sd.revisions.iter().map(move |rev| (rev.id, sd.id)))
        .collect();

    let mut associations = Vec::new();
    let mut stale = Vec::new();
    for event in events {
        let Some(current) = event.current_revision() else {
            continue;
        };
        for record in &current.associations {
            match owners.get(&record.detection_revision_id) {
                Some(detection_id) => {
                    associations.push(Association::resolve(event.id, *detection_id, record));
                }
                None => {
                    warn!(
                        event = %event.id.short_id(),
                        association = %record.id.short_id(),
                        detection_revision = %record.detection_revision_id.short_id(),
                        "dropping stale association reference"
                    );
                    stale.push(record.id);
                }
            }
        }
    }

    let mut events_per_detection: BTreeMap<EntityId, BTreeSet<EntityId>> = BTreeMap::new();
    for assoc in associations.iter().filter(|a| !a.rejected) {
        events_per_detection
            .entry(assoc.detection_id)
            .or_default()
            .insert(assoc.event_id);
    }
    let conflicted_detections: BTreeSet<EntityId> = events_per_detection
        .into_iter()
        .filter(|(_, events)| events.len() > 1)
        .map(|(detection_id, _)| detection_id)
        .collect();
    let conflicted_events = associations
        .iter()
        .filter(|a| !a.rejected && conflicted_detections.contains(&a.detection_id))
        .map(|a| a.event_id)
        .collect();

    Resolution {
        associations,
        conflicted_detections,
        conflicted_events,
        stale,
    }
}

impl Resolution {
    /// Every resolved association, rejected ones included.
    pub fn associations(&self) -> &[Association] {
        &self.associations
    }

    /// Ids of records dropped because they referenced no known revision.
    pub fn stale(&self) -> &[AssociationId] {
        &self.stale
    }

    pub fn contains(&self, id: &AssociationId) -> bool {
        self.associations.iter().any(|a| a.id == *id)
    }

    pub fn is_conflicted(&self, kind: EntityKind, id: &EntityId) -> bool {
        self.conflicted(kind).contains(id)
    }

    /// Ids of the given kind that are in conflict.
    pub fn conflicted(&self, kind: EntityKind) -> &BTreeSet<EntityId> {
        match kind {
            EntityKind::Event => &self.conflicted_events,
            EntityKind::Detection => &self.conflicted_detections,
        }
    }

    /// Non-rejected associations referencing `detection_id`.
    pub fn active_for_detection<'a>(
        &'a self,
        detection_id: &'a EntityId,
    ) -> impl Iterator<Item = &'a Association> + 'a {
        self.associations
            .iter()
            .filter(move |a| !a.rejected && a.detection_id == *detection_id)
    }

    /// Non-rejected associations owned by `event_id`.
    pub fn active_for_event<'a>(
        &'a self,
        event_id: &'a EntityId,
    ) -> impl Iterator<Item = &'a Association> + 'a {
        self.associations
            .iter()
            .filter(move |a| !a.rejected && a.event_id == *event_id)
    }

    /// `true` if a non-rejected association links the two entities.
    pub fn is_associated(&self, detection_id: &EntityId, event_id: &EntityId) -> bool {
        self.active_for_detection(detection_id)
            .any(|a| a.event_id == *event_id)
    }

    /// The event owning an association to `detection_revision_id`.
    ///
    /// Rejected associations are only considered when `include_rejected`.
    pub fn owner_event(
        &self,
        detection_revision_id: &RevisionId,
        include_rejected: bool,
    ) -> Option<EntityId> {
        self.associations
            .iter()
            .find(|a| {
                a.detection_revision_id == *detection_revision_id && (include_rejected || !a.rejected)
            })
            .map(|a| a.event_id)
    }

    /// The detection revision associated to `event_id`, if any.
    pub fn revision_for_event(
        &self,
        detection_id: &EntityId,
        event_id: &EntityId,
    ) -> Option<RevisionId> {
        self.associations
            .iter()
            .find(|a| a.detection_id == *detection_id && a.event_id == *event_id)
            .map(|a| a.detection_revision_id)
    }

    /// The event a detection should be shown against: the open event when
    /// associated to it, otherwise the single event it is associated to.
    pub fn event_for_detection(
        &self,
        detection_id: &EntityId,
        open_event: Option<&EntityId>,
    ) -> Option<EntityId> {
        if let Some(open) = open_event {
            if self.is_associated(detection_id, open) {
                return Some(*open);
            }
        }
        let mut active = self.active_for_detection(detection_id);
        match (active.next(), active.next()) {
            (Some(only), None) => Some(only.event_id),
            _ => None,
        }
    }
}
