use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info};

use seis_cache::WorkingCache;
use seis_store::{InMemorySharedStore, SharedStore};
use seis_types::{Detection, Entity, EntityId, EntityKind, Event, SessionId, StoredEntity};

use crate::commit::CommitReport;
use crate::config::WorkspaceConfig;
use crate::error::{SdkError, SdkResult};

struct Session {
    user: String,
    cache: WorkingCache,
}

/// The shared store plus every open analyst session.
pub struct Workspace {
    store: Arc<InMemorySharedStore>,
    sessions: BTreeMap<SessionId, Session>,
    event_users: BTreeMap<EntityId, BTreeSet<String>>,
    config: WorkspaceConfig,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("store", &self.store)
            .field("sessions", &self.sessions.len())
            .field("open_events", &self.event_users.len())
            .finish()
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Workspace {
    pub fn new() -> Self {
        Self::with_config(WorkspaceConfig::default())
    }

    pub fn with_config(config: WorkspaceConfig) -> Self {
        Self {
            store: Arc::new(InMemorySharedStore::new()),
            sessions: BTreeMap::new(),
            event_users: BTreeMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<InMemorySharedStore> {
        &self.store
    }

    // ---- Ingest ----

    /// Write new events to the shared store and hand them to every session.
    /// Sessions keep their own edits to the same ids.
    pub fn admit_events(&mut self, events: Vec<Event>) -> SdkResult<()> {
        for event in &events {
            self.store.set(&StoredEntity::from(event.clone()))?;
        }
        for session in self.sessions.values_mut() {
            session.cache.pull_events(events.clone(), false);
        }
        info!(count = events.len(), "admitted events");
        Ok(())
    }

    pub fn admit_detections(&mut self, detections: Vec<Detection>) -> SdkResult<()> {
        for detection in &detections {
            self.store.set(&StoredEntity::from(detection.clone()))?;
        }
        for session in self.sessions.values_mut() {
            session.cache.pull_detections(detections.clone(), false);
        }
        info!(count = detections.len(), "admitted detections");
        Ok(())
    }

    // ---- Sessions ----

    /// Open a session for `user`, seeded with the current shared store.
    pub fn open_session(&mut self, user: impl Into<String>) -> SdkResult<SessionId> {
        let user = user.into();
        let store: Arc<dyn SharedStore> = self.store.clone();
        let mut cache = WorkingCache::with_config(store, self.config.cache.clone());
        cache.load_from_store()?;

        let id = SessionId::new();
        info!(session = %id.short_id(), %user, "session opened");
        self.sessions.insert(id, Session { user, cache });
        Ok(id)
    }

    /// Drop a session and its uncommitted edits.
    pub fn close_session(&mut self, id: &SessionId) -> SdkResult<()> {
        let session = self
            .sessions
            .remove(id)
            .ok_or(SdkError::SessionNotFound(*id))?;
        if let Some(open) = session.cache.open_event() {
            let still_open = self
                .sessions
                .values()
                .any(|s| s.user == session.user && s.cache.open_event() == Some(open));
            if !still_open {
                self.remove_event_user(open, &session.user);
            }
        }
        info!(session = %id.short_id(), user = %session.user, "session closed");
        Ok(())
    }

    pub fn session(&self, id: &SessionId) -> SdkResult<&WorkingCache> {
        self.sessions
            .get(id)
            .map(|s| &s.cache)
            .ok_or(SdkError::SessionNotFound(*id))
    }

    pub fn session_mut(&mut self, id: &SessionId) -> SdkResult<&mut WorkingCache> {
        self.sessions
            .get_mut(id)
            .map(|s| &mut s.cache)
            .ok_or(SdkError::SessionNotFound(*id))
    }

    pub fn user(&self, id: &SessionId) -> SdkResult<&str> {
        self.sessions
            .get(id)
            .map(|s| s.user.as_str())
            .ok_or(SdkError::SessionNotFound(*id))
    }

    /// Open sessions and their users, ordered by session id.
    pub fn sessions(&self) -> Vec<(SessionId, String)> {
        self.sessions
            .iter()
            .map(|(id, s)| (*id, s.user.clone()))
            .collect()
    }

    // ---- Commit ----

    /// Commit a session's modified entities of `kind` and pass the committed
    /// values to every other session.
    pub fn commit(
        &mut self,
        session: &SessionId,
        kind: EntityKind,
        ids: Option<&[EntityId]>,
    ) -> SdkResult<CommitReport> {
        let committed = self.session_mut(session)?.commit(kind, ids)?;

        let mut report = CommitReport::new(*session);
        let mut events = Vec::new();
        let mut detections = Vec::new();
        for id in &committed {
            match self.store.get(kind, id)? {
                Some(StoredEntity::Event(e)) => events.push(e),
                Some(StoredEntity::Detection(d)) => detections.push(d),
                None => {}
            }
        }
        report.events = events.iter().map(|e| *e.id()).collect();
        report.detections = detections.iter().map(|d| *d.id()).collect();
        if report.is_empty() {
            return Ok(report);
        }

        let overwrite = self.config.broadcast_overwrite;
        for (other, s) in self.sessions.iter_mut().filter(|(other, _)| *other != session) {
            s.cache.pull_events(events.clone(), overwrite);
            s.cache.pull_detections(detections.clone(), overwrite);
            report.notified_sessions += 1;
            debug!(from = %session.short_id(), to = %other.short_id(), "broadcast commit");
        }
        info!(
            session = %session.short_id(),
            events = report.events.len(),
            detections = report.detections.len(),
            notified = report.notified_sessions,
            "commit"
        );
        Ok(report)
    }

    /// Commit every modified event and detection of a session.
    pub fn commit_all(&mut self, session: &SessionId) -> SdkResult<CommitReport> {
        let mut report = self.commit(session, EntityKind::Event, None)?;
        let detections = self.commit(session, EntityKind::Detection, None)?;
        report.detections = detections.detections;
        report.notified_sessions = report.notified_sessions.max(detections.notified_sessions);
        Ok(report)
    }

    // ---- Open events ----

    /// Open `event_id` in a session and record its user against the event.
    /// A previously open event in that session is closed first.
    pub fn open_event_for_user(&mut self, session: &SessionId, event_id: EntityId) -> SdkResult<()> {
        let s = self
            .sessions
            .get_mut(session)
            .ok_or(SdkError::SessionNotFound(*session))?;
        let previous = s.cache.open_event().copied();
        let user = s.user.clone();
        s.cache.set_open_event(Some(event_id));

        if let Some(previous) = previous.filter(|p| *p != event_id) {
            self.remove_event_user(&previous, &user);
        }
        self.event_users.entry(event_id).or_default().insert(user);
        Ok(())
    }

    pub fn close_event_for_user(
        &mut self,
        session: &SessionId,
        event_id: &EntityId,
    ) -> SdkResult<()> {
        let s = self
            .sessions
            .get_mut(session)
            .ok_or(SdkError::SessionNotFound(*session))?;
        if s.cache.open_event() == Some(event_id) {
            s.cache.set_open_event(None);
        }
        let user = s.user.clone();
        self.remove_event_user(event_id, &user);
        Ok(())
    }

    /// Users that currently have `event_id` open, sorted.
    pub fn users_for_event(&self, event_id: &EntityId) -> Vec<String> {
        self.event_users
            .get(event_id)
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn remove_event_user(&mut self, event_id: &EntityId, user: &str) {
        if let Some(users) = self.event_users.get_mut(event_id) {
            users.remove(user);
            if users.is_empty() {
                self.event_users.remove(event_id);
            }
        }
    }
}
