use serde::{Deserialize, Serialize};

use seis_cache::CacheConfig;

use crate::error::SdkResult;

/// Workspace-wide settings, loadable from TOML.
///
/// ```toml
/// broadcast_overwrite = false
///
/// [cache]
/// enforce_conflict_lock = true
/// non_undoable = ["SAVE_EVENT", "UPDATE_EVENT_MARK_COMPLETE"]
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Settings applied to every session's working cache.
    pub cache: CacheConfig,
    /// Whether committed entities replace other sessions' local edits.
    pub broadcast_overwrite: bool,
}

impl WorkspaceConfig {
    pub fn from_toml_str(text: &str) -> SdkResult<Self> {
        Ok(toml::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seis_history::ActionDescription;

    #[test]
    fn empty_toml_is_default() {
        let config = WorkspaceConfig::from_toml_str("").unwrap();
        assert_eq!(config, WorkspaceConfig::default());
        assert!(!config.broadcast_overwrite);
        assert!(config.cache.enforce_conflict_lock);
    }

    #[test]
    fn cache_section_overrides_defaults() {
        let config = WorkspaceConfig::from_toml_str(
            r#"
            broadcast_overwrite = true

            [cache]
            enforce_conflict_lock = false
            non_undoable = ["SAVE_EVENT"]
            "#,
        )
        .unwrap();
        assert!(config.broadcast_overwrite);
        assert!(!config.cache.enforce_conflict_lock);
        assert_eq!(config.cache.non_undoable.len(), 1);
        assert!(config.cache.is_undoable(ActionDescription::UpdateEventMarkComplete));
    }

    #[test]
    fn unknown_action_is_rejected() {
        let err = WorkspaceConfig::from_toml_str("[cache]\nnon_undoable = [\"NOPE\"]\n");
        assert!(err.is_err());
    }
}
