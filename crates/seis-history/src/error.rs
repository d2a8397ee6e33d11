use seis_types::HistoryId;

/// Errors produced by history ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("history entry not found: {0}")]
    EntryNotFound(HistoryId),
}

/// Result alias for history operations.
pub type HistoryResult<T> = Result<T, HistoryError>;
