//! Multi-analyst workspace for seismic event review.
//!
//! A [`Workspace`] owns the shared store and one [`WorkingCache`] per open
//! analyst session. Newly admitted data reaches every session; committed
//! edits reach every session except the one that made them.

pub mod commit;
pub mod config;
pub mod error;
pub mod workspace;

pub use commit::CommitReport;
pub use config::WorkspaceConfig;
pub use error::{SdkError, SdkResult};
pub use workspace::Workspace;

// Re-export key types
pub use seis_cache::{CacheConfig, UndoOutcome, WorkingCache};
pub use seis_history::ActionDescription;
pub use seis_types::{Detection, EntityId, EntityKind, Event, SessionId};
