//! Per-session working cache for seismic event analysis.
//!
//! Each analyst session edits events and detections in a private overlay on
//! top of the shared store. Edits are staged locally, recorded in a history
//! ledger for undo/redo, checked for association conflicts, and only reach
//! other sessions once committed.
//!
//! # Key Types
//!
//! - [`WorkingCache`] -- The overlay, its association view and its history
//! - [`CacheConfig`] -- Undoable actions and the conflict lock switch
//! - [`UndoOutcome`] -- Entities touched by an undo or redo
//! - [`DetectionContext`] -- A detection with its event and displayed revision
//! - [`ConflictingRevision`] -- One side of a detection conflict

pub mod cache;
pub mod config;
pub mod error;
pub mod restore;

pub use cache::{CachedEntity, ConflictingRevision, DetectionContext, UndoOutcome, WorkingCache};
pub use config::CacheConfig;
pub use error::{CacheError, CacheResult};
pub use restore::apply_restore;
