//! History ledger for the seismic analysis working cache.
//!
//! Every undoable `set` on a working cache becomes one [`HistoryEntry`]
//! made of per-revision [`Change`]s. The ledger owns one
//! [`RevisionUndoStack`] per revision chain and answers undo/redo requests
//! with the revision contents the cache must restore.
//!
//! # Revision chains
//!
//! Stacks are keyed by the revision id an entity currently points to. The
//! first time a new revision id is seen, its stack baseline is seeded with
//! the entity's previous current revision re-labeled under the new id, or
//! with nothing for a creation. Undoing to a missing baseline removes the
//! revision.
//!
//! # Key Types
//!
//! - [`HistoryLedger`] -- ordered entries, stacks and redo order
//! - [`ActionDescription`] -- analyst action taxonomy
//! - [`ActionDescriber`] / [`DefaultDescriber`] -- change descriptor text
//! - [`RevisionRestore`] -- one undo/redo result to apply to an entity

pub mod action;
pub mod describe;
pub mod error;
pub mod ledger;
pub mod stack;

pub use action::ActionDescription;
pub use describe::{ActionDescriber, DefaultDescriber};
pub use error::{HistoryError, HistoryResult};
pub use ledger::{Change, ChangeSet, HistoryEntry, HistoryLedger, RevisionRestore};
pub use stack::RevisionUndoStack;
