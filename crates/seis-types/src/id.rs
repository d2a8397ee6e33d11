use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Generate a new time-ordered identifier (UUID v7).
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// Create from an existing UUID.
            pub fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// The nil identifier. Never accepted by the shared store.
            pub fn nil() -> Self {
                Self(uuid::Uuid::nil())
            }

            /// The underlying UUID.
            pub fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }

            /// Returns `true` for the nil identifier.
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }

            /// Short representation (first 8 characters of UUID).
            pub fn short_id(&self) -> String {
                self.0.to_string()[..8].to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.short_id())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::error::TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                uuid::Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| crate::error::TypeError::InvalidId(format!("{s}: {e}")))
            }
        }
    };
}

uuid_id! {
    /// Identity of an event or a signal detection.
    EntityId
}

uuid_id! {
    /// Identity of one revision (hypothesis) of an entity.
    RevisionId
}

uuid_id! {
    /// Identity of an association record. Rejection is permanent per id.
    AssociationId
}

uuid_id! {
    /// Identity of a history ledger entry.
    HistoryId
}

uuid_id! {
    /// Identity of a single change inside a history entry.
    ChangeId
}

uuid_id! {
    /// Identity of an analyst session.
    SessionId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_are_distinct() {
        let a = EntityId::new();
        let b = EntityId::new();
        assert_ne!(a, b);
        assert_eq!(a.as_uuid().get_version_num(), 7);
    }

    #[test]
    fn short_id_is_prefix_of_display() {
        let id = RevisionId::new();
        assert_eq!(id.short_id().len(), 8);
        assert!(id.to_string().starts_with(&id.short_id()));
        assert!(format!("{id:?}").starts_with("RevisionId("));
    }

    #[test]
    fn nil_is_detected() {
        assert!(EntityId::nil().is_nil());
        assert!(!EntityId::new().is_nil());
    }

    #[test]
    fn parse_round_trip() {
        let id = HistoryId::new();
        let parsed: HistoryId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<HistoryId>().is_err());
    }

    #[test]
    fn serde_is_transparent() {
        let id = AssociationId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }
}
