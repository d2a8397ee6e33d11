//! Association and conflict resolution for the seismic analysis working cache.
//!
//! [`resolve`] is a pure function over a snapshot of events and detections.
//! It turns the association records stored on each event's current revision
//! into resolved [`Association`](seis_types::Association)s and derives which
//! entities are in conflict. It keeps no state between calls and is re-run
//! after every mutation of a working cache.
//!
//! # Rules
//!
//! - A record is resolved only if some detection owns the referenced
//!   revision. Records that do not resolve are stale: they are logged and
//!   dropped, never resurrected.
//! - A detection is in conflict when non-rejected associations from two or
//!   more distinct events reference it.
//! - An event is in conflict when any of its non-rejected associations
//!   references a detection in conflict.

pub mod resolver;

pub use resolver::{resolve, Resolution};
