use serde::{Deserialize, Serialize};

use seis_types::{EntityId, SessionId};

/// What a session commit wrote and who was told about it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReport {
    pub session: SessionId,
    pub events: Vec<EntityId>,
    pub detections: Vec<EntityId>,
    /// Other sessions that received the committed entities.
    pub notified_sessions: usize,
}

impl CommitReport {
    pub fn new(session: SessionId) -> Self {
        Self {
            session,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.detections.is_empty()
    }

    pub fn total(&self) -> usize {
        self.events.len() + self.detections.len()
    }
}
