use std::collections::BTreeMap;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tracing::debug;

use seis_history::{ActionDescription, HistoryEntry};
use seis_sdk::Workspace;
use seis_types::{Detection, Entity, EntityId, EntityKind, Event, HistoryId, SessionId};

/// A replayable analyst session script.
///
/// Entities listed at the top level are admitted before the first step.
#[derive(Debug, Default, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub detections: Vec<Detection>,
    pub steps: Vec<Step>,
}

impl Script {
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        serde_json::from_str(text).context("malformed script")
    }
}

/// One scripted action. Sessions are addressed by user name.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Admit {
        #[serde(default)]
        events: Vec<Event>,
        #[serde(default)]
        detections: Vec<Detection>,
    },
    OpenSession {
        user: String,
    },
    CloseSession {
        user: String,
    },
    OpenEvent {
        user: String,
        event: EntityId,
    },
    CloseEvent {
        user: String,
        event: EntityId,
    },
    Set {
        user: String,
        action: ActionDescription,
        #[serde(default)]
        events: Vec<Event>,
        #[serde(default)]
        detections: Vec<Detection>,
    },
    /// Give a detection a new revision with another phase.
    RePhase {
        user: String,
        detection: EntityId,
        phase: String,
    },
    Undo {
        user: String,
        #[serde(default = "one")]
        count: usize,
    },
    Redo {
        user: String,
        #[serde(default = "one")]
        count: usize,
    },
    UndoFor {
        user: String,
        #[serde(default)]
        owner: Option<EntityId>,
        #[serde(default = "one")]
        count: usize,
    },
    RedoFor {
        user: String,
        #[serde(default)]
        owner: Option<EntityId>,
        #[serde(default = "one")]
        count: usize,
    },
    /// Commit one kind, or everything when `kind` is omitted.
    Commit {
        user: String,
        #[serde(default)]
        kind: Option<EntityKind>,
    },
}

fn one() -> usize {
    1
}

#[derive(Clone, Debug, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<HistoryId>,
}

/// End-of-run view of one session.
#[derive(Clone, Debug, Serialize)]
pub struct SessionState {
    pub user: String,
    pub events: Vec<Event>,
    pub detections: Vec<Detection>,
    pub conflicted_detections: Vec<EntityId>,
    pub history: Vec<HistoryEntry>,
}

/// Drives a [`Workspace`] through a script.
#[derive(Debug)]
pub struct Runner {
    workspace: Workspace,
    users: BTreeMap<String, SessionId>,
}

impl Runner {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            users: BTreeMap::new(),
        }
    }

    pub fn run(&mut self, script: Script) -> anyhow::Result<Vec<StepReport>> {
        if !script.events.is_empty() {
            self.workspace.admit_events(script.events)?;
        }
        if !script.detections.is_empty() {
            self.workspace.admit_detections(script.detections)?;
        }
        let mut reports = Vec::with_capacity(script.steps.len());
        for (index, step) in script.steps.into_iter().enumerate() {
            let (summary, history) = self
                .step(step)
                .with_context(|| format!("step {} failed", index + 1))?;
            debug!(index, %summary, "script step");
            reports.push(StepReport {
                index: index + 1,
                summary,
                history,
            });
        }
        Ok(reports)
    }

    fn session(&self, user: &str) -> anyhow::Result<SessionId> {
        match self.users.get(user) {
            Some(id) => Ok(*id),
            None => bail!("no open session for user {user}"),
        }
    }

    fn step(&mut self, step: Step) -> anyhow::Result<(String, Option<HistoryId>)> {
        let summary = match step {
            Step::Admit { events, detections } => {
                let text = format!(
                    "admitted {} events, {} detections",
                    events.len(),
                    detections.len()
                );
                self.workspace.admit_events(events)?;
                self.workspace.admit_detections(detections)?;
                text
            }
            Step::OpenSession { user } => {
                if self.users.contains_key(&user) {
                    bail!("user {user} already has a session");
                }
                let id = self.workspace.open_session(user.clone())?;
                self.users.insert(user.clone(), id);
                format!("{user}: session {} opened", id.short_id())
            }
            Step::CloseSession { user } => {
                let id = self.session(&user)?;
                self.workspace.close_session(&id)?;
                self.users.remove(&user);
                format!("{user}: session closed")
            }
            Step::OpenEvent { user, event } => {
                let id = self.session(&user)?;
                self.workspace.open_event_for_user(&id, event)?;
                format!("{user}: opened event {}", event.short_id())
            }
            Step::CloseEvent { user, event } => {
                let id = self.session(&user)?;
                self.workspace.close_event_for_user(&id, &event)?;
                format!("{user}: closed event {}", event.short_id())
            }
            Step::Set {
                user,
                action,
                events,
                detections,
            } => {
                let id = self.session(&user)?;
                let history = self
                    .workspace
                    .session_mut(&id)?
                    .set_events_and_detections(action, events, detections)?;
                return Ok((format!("{user}: {action}"), history));
            }
            Step::RePhase {
                user,
                detection,
                phase,
            } => {
                let id = self.session(&user)?;
                let cache = self.workspace.session_mut(&id)?;
                let Some(mut sd) = cache.get_detection(&detection)? else {
                    bail!("unknown detection {}", detection.short_id());
                };
                let Some(mut rev) = sd.current_revision().map(|r| r.successor()) else {
                    bail!("detection {} has no current revision", detection.short_id());
                };
                rev.phase = phase.clone();
                sd.revise(rev);
                let history = cache.set_detections(ActionDescription::UpdateDetectionRePhase, vec![sd])?;
                return Ok((
                    format!("{user}: re-phased {} to {phase}", detection.short_id()),
                    history,
                ));
            }
            Step::Undo { user, count } => {
                let id = self.session(&user)?;
                let outcome = self.workspace.session_mut(&id)?.undo(count)?;
                format!("{user}: undo {count} ({} entities)", outcome.events.len() + outcome.detections.len())
            }
            Step::Redo { user, count } => {
                let id = self.session(&user)?;
                let outcome = self.workspace.session_mut(&id)?.redo(count)?;
                format!("{user}: redo {count} ({} entities)", outcome.events.len() + outcome.detections.len())
            }
            Step::UndoFor { user, owner, count } => {
                let id = self.session(&user)?;
                let outcome = self.workspace.session_mut(&id)?.undo_for(owner, count)?;
                format!(
                    "{user}: undo {count} for {} ({} entities)",
                    owner_label(owner),
                    outcome.events.len() + outcome.detections.len()
                )
            }
            Step::RedoFor { user, owner, count } => {
                let id = self.session(&user)?;
                let outcome = self.workspace.session_mut(&id)?.redo_for(owner, count)?;
                format!(
                    "{user}: redo {count} for {} ({} entities)",
                    owner_label(owner),
                    outcome.events.len() + outcome.detections.len()
                )
            }
            Step::Commit { user, kind } => {
                let id = self.session(&user)?;
                let report = match kind {
                    Some(kind) => self.workspace.commit(&id, kind, None)?,
                    None => self.workspace.commit_all(&id)?,
                };
                format!(
                    "{user}: committed {} entities, {} sessions notified",
                    report.total(),
                    report.notified_sessions
                )
            }
        };
        Ok((summary, None))
    }

    /// Final state of every open session, ordered by user.
    pub fn sessions(&self) -> anyhow::Result<Vec<SessionState>> {
        self.users
            .iter()
            .map(|(user, id)| {
                let cache = self.workspace.session(id)?;
                let detections = cache.get_detections();
                let conflicted_detections = detections
                    .iter()
                    .filter(|d| cache.is_conflicted(EntityKind::Detection, d.id()))
                    .map(|d| *d.id())
                    .collect();
                Ok(SessionState {
                    user: user.clone(),
                    events: cache.get_events(),
                    detections,
                    conflicted_detections,
                    history: cache.get_history().to_vec(),
                })
            })
            .collect()
    }
}

fn owner_label(owner: Option<EntityId>) -> String {
    match owner {
        Some(id) => format!("event {}", id.short_id()),
        None => "unassociated changes".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seis_types::DetectionRevision;

    fn make_detection(phase: &str) -> Detection {
        let id = EntityId::new();
        Detection::new(id, "ASAR", DetectionRevision::new(id, phase, 100.0))
    }

    fn make_script(detection: &Detection, steps: serde_json::Value) -> Script {
        let json = serde_json::json!({
            "detections": [detection],
            "steps": steps,
        });
        Script::from_json(&json.to_string()).unwrap()
    }

    fn phase_for(states: &[SessionState], user: &str) -> String {
        let state = states.iter().find(|s| s.user == user).unwrap();
        state.detections[0].current_revision().unwrap().phase.clone()
    }

    #[test]
    fn parses_tagged_steps_with_defaults() {
        let script = Script::from_json(
            r#"{"steps": [
                {"op": "open_session", "user": "alice"},
                {"op": "undo", "user": "alice"},
                {"op": "commit", "user": "alice", "kind": "detection"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(script.steps.len(), 3);
        assert!(matches!(script.steps[1], Step::Undo { count: 1, .. }));
        assert!(matches!(
            script.steps[2],
            Step::Commit { kind: Some(EntityKind::Detection), .. }
        ));
    }

    #[test]
    fn unknown_op_is_rejected() {
        assert!(Script::from_json(r#"{"steps": [{"op": "explode"}]}"#).is_err());
    }

    #[test]
    fn replay_re_phase_and_commit() {
        let sd = make_detection("P");
        let script = make_script(
            &sd,
            serde_json::json!([
                {"op": "open_session", "user": "alice"},
                {"op": "open_session", "user": "bob"},
                {"op": "re_phase", "user": "alice", "detection": sd.id, "phase": "S"},
                {"op": "undo_for", "user": "alice"},
                {"op": "redo", "user": "alice"},
                {"op": "commit", "user": "alice"}
            ]),
        );
        let mut runner = Runner::new(Workspace::new());
        let reports = runner.run(script).unwrap();
        assert_eq!(reports.len(), 6);
        assert!(reports[2].history.is_some());

        let states = runner.sessions().unwrap();
        assert_eq!(phase_for(&states, "alice"), "S");
        assert_eq!(phase_for(&states, "bob"), "S");
        assert!(states[0].history.is_empty());
    }

    #[test]
    fn step_for_unknown_user_fails() {
        let sd = make_detection("P");
        let script = make_script(&sd, serde_json::json!([{"op": "undo", "user": "carol"}]));
        let err = Runner::new(Workspace::new()).run(script).unwrap_err();
        assert!(format!("{err:#}").contains("carol"));
    }
}
