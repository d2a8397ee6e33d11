use seis_types::EntityKind;

/// Errors from shared store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Attempted to write an entity carrying the nil id.
    #[error("cannot store {0} with null id")]
    NullEntityId(EntityKind),

    /// The store's lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
