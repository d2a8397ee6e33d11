//! Foundation types for the seismic analysis working cache.
//!
//! Every other `seis-*` crate depends on `seis-types`. The types here are
//! plain data: they carry no cache, ledger or store behavior.
//!
//! # Key Types
//!
//! - [`EntityId`], [`RevisionId`], [`AssociationId`], [`HistoryId`], [`ChangeId`], [`SessionId`] -- UUID v7 identifiers
//! - [`Event`] / [`EventRevision`] -- seismic events and their hypotheses
//! - [`Detection`] / [`DetectionRevision`] -- signal detections and their hypotheses
//! - [`AssociationRecord`] -- stored event-to-detection link
//! - [`Association`] -- derived, resolved association
//! - [`Entity`] / [`Revision`] -- shared shape used by the ledger and cache
//! - [`StoredEntity`] -- the unit of storage in the shared store

pub mod association;
pub mod detection;
pub mod entity;
pub mod error;
pub mod event;
pub mod id;

pub use association::{Association, AssociationRecord};
pub use detection::{Detection, DetectionRevision};
pub use entity::{Entity, EntityKind, Revision, StoredEntity};
pub use error::TypeError;
pub use event::{Event, EventRevision, Location};
pub use id::{AssociationId, ChangeId, EntityId, HistoryId, RevisionId, SessionId};
