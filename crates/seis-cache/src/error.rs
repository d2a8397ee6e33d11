//! Error types for the working cache.

use seis_types::{AssociationId, EntityId, EntityKind};

/// Errors that can occur during working cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The id is absent from both the overlay and the shared store.
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: EntityId },

    /// The detection is in conflict and not associated to the open event.
    #[error("cannot update detection {id}: it is in conflict and not associated to the currently open event")]
    ConflictLocked { id: EntityId },

    /// An edit tried to re-activate an association that was rejected.
    #[error("association {association} on event {event} was rejected and cannot be re-created")]
    AssociationRejected {
        event: EntityId,
        association: AssociationId,
    },

    /// History ledger operation failed.
    #[error("history error: {0}")]
    History(#[from] seis_history::HistoryError),

    /// Shared store operation failed.
    #[error("store error: {0}")]
    Store(#[from] seis_store::StoreError),

    /// A stored value had the wrong kind.
    #[error("type error: {0}")]
    Type(#[from] seis_types::TypeError),
}

/// Convenience alias for cache results.
pub type CacheResult<T> = Result<T, CacheError>;
