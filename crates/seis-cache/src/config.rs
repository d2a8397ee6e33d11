use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use seis_history::ActionDescription;

/// Configuration for a working cache.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Actions that never enter the history ledger.
    pub non_undoable: BTreeSet<ActionDescription>,
    /// When `true`, edits to a conflicted detection that is not associated
    /// to the open event are refused.
    pub enforce_conflict_lock: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            non_undoable: ActionDescription::ALL
                .into_iter()
                .filter(|a| !a.undoable_by_default())
                .collect(),
            enforce_conflict_lock: true,
        }
    }
}

impl CacheConfig {
    /// No conflict lock. Every action is still recorded per the default
    /// non-undoable set.
    pub fn permissive() -> Self {
        Self {
            enforce_conflict_lock: false,
            ..Default::default()
        }
    }

    pub fn is_undoable(&self, action: ActionDescription) -> bool {
        !self.non_undoable.contains(&action)
    }
}
