//! Applying undo/redo results to an entity's revision list and pointers.

use seis_types::{Entity, Revision, RevisionId};
use tracing::{error, warn};

/// Put `revision` (or its removal, when `None`) back into `entity`.
///
/// The revision list, preferred history and current pointer are realigned:
/// a restored value becomes current; removing the current revision falls
/// back to the newest preferred revision still present, then to the newest
/// remaining revision, then to nothing.
pub fn apply_restore<E: Entity>(
    entity: &mut E,
    revision_id: &RevisionId,
    revision: Option<E::Revision>,
) {
    let position = entity
        .revisions()
        .iter()
        .position(|r| r.id() == revision_id);
    match (position, &revision) {
        (Some(index), Some(value)) => entity.revisions_mut()[index] = value.clone(),
        (Some(index), None) => {
            entity.revisions_mut().remove(index);
        }
        (None, Some(value)) => entity.revisions_mut().push(value.clone()),
        (None, None) => error!(
            kind = %E::KIND,
            entity = %entity.id().short_id(),
            revision = %revision_id.short_id(),
            "cannot remove a revision the entity does not hold"
        ),
    }

    let preferred = entity.preferred_history().contains(revision_id);
    match (&revision, preferred) {
        (None, true) => entity.preferred_history_mut().retain(|id| id != revision_id),
        (Some(_), false) => entity.preferred_history_mut().push(*revision_id),
        _ => {}
    }

    let is_current = entity.current_id() == Some(revision_id);
    match (is_current, revision.is_some()) {
        (true, false) => {
            let fallback = fallback_current(entity);
            entity.set_current_id(fallback);
        }
        (false, true) => {
            warn!(
                kind = %E::KIND,
                entity = %entity.id().short_id(),
                revision = %revision_id.short_id(),
                "restored revision was not current; making it current"
            );
            entity.set_current_id(Some(*revision_id));
        }
        _ => {}
    }

    if !entity.is_valid() {
        error!(
            kind = %E::KIND,
            entity = %entity.id().short_id(),
            "entity has no current revision after restore"
        );
    }
}

fn fallback_current<E: Entity>(entity: &E) -> Option<RevisionId> {
    entity
        .preferred_history()
        .iter()
        .rev()
        .find(|id| entity.revision(id).is_some())
        .copied()
        .or_else(|| entity.revisions().last().map(|r| *r.id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use seis_types::{Detection, DetectionRevision, EntityId, Event, EventRevision};

    fn make_detection() -> Detection {
        let id = EntityId::new();
        Detection::new(id, "ASAR", DetectionRevision::new(id, "P", 1.0))
    }

    #[test]
    fn replaces_current_value_in_place() {
        let mut sd = make_detection();
        let rev_id = sd.current.unwrap();
        let mut value = sd.revisions[0].clone();
        value.phase = "S".into();
        apply_restore(&mut sd, &rev_id, Some(value));

        assert_eq!(sd.revisions.len(), 1);
        assert_eq!(sd.current_revision().unwrap().phase, "S");
        assert_eq!(sd.preferred_history, vec![rev_id]);
    }

    #[test]
    fn removing_only_revision_invalidates_entity() {
        let mut ev = Event::new(EventRevision::new(EntityId::new()));
        let rev_id = ev.current.unwrap();
        apply_restore(&mut ev, &rev_id, None);

        assert!(ev.revisions.is_empty());
        assert!(ev.preferred_history.is_empty());
        assert_eq!(ev.current, None);
        assert!(!ev.is_valid());
    }

    #[test]
    fn removal_falls_back_to_last_preferred() {
        let mut sd = make_detection();
        let first = sd.current.unwrap();
        let second = sd.revisions[0].successor();
        let second_id = second.id;
        sd.revise(second);

        apply_restore(&mut sd, &second_id, None);
        assert_eq!(sd.current, Some(first));
        assert_eq!(sd.preferred_history, vec![first]);
    }

    #[test]
    fn re_adding_a_removed_revision_makes_it_current() {
        let mut sd = make_detection();
        let rev = sd.revisions[0].clone();
        apply_restore(&mut sd, &rev.id, None);
        apply_restore(&mut sd, &rev.id, Some(rev.clone()));

        assert_eq!(sd.current, Some(rev.id));
        assert_eq!(sd.preferred_history, vec![rev.id]);
        assert_eq!(sd.revisions, vec![rev]);
    }

    #[test]
    fn removing_unknown_revision_changes_nothing() {
        let mut sd = make_detection();
        let before = sd.clone();
        apply_restore(&mut sd, &RevisionId::new(), None);
        assert_eq!(sd, before);
    }
}
