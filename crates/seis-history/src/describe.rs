use seis_types::{Detection, DetectionRevision, EventRevision};

use crate::action::ActionDescription;

/// Turns an action and the revisions it touched into the text stored on a
/// history change.
pub trait ActionDescriber: Send + Sync {
    fn describe_event(
        &self,
        action: ActionDescription,
        old: Option<&EventRevision>,
        new: &EventRevision,
    ) -> String;

    fn describe_detection(
        &self,
        action: ActionDescription,
        detection: &Detection,
        old: Option<&DetectionRevision>,
        new: &DetectionRevision,
    ) -> String;
}

/// Built-in descriptions for every action.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultDescriber;

impl ActionDescriber for DefaultDescriber {
    fn describe_event(
        &self,
        action: ActionDescription,
        _old: Option<&EventRevision>,
        new: &EventRevision,
    ) -> String {
        use ActionDescription as A;
        match action {
            A::CreateEvent | A::UpdateEventLocate => match new.location {
                Some(loc) => format!("{action} at {}", clock_time(loc.time)),
                None => action.to_string(),
            },
            a if a.is_detection_action() => A::UpdateEventFromDetectionChange.to_string(),
            a => a.to_string(),
        }
    }

    fn describe_detection(
        &self,
        action: ActionDescription,
        detection: &Detection,
        old: Option<&DetectionRevision>,
        new: &DetectionRevision,
    ) -> String {
        use ActionDescription as A;
        let station = &detection.station;
        let phase = &new.phase;
        match action {
            A::CreateDetection => format!(
                "{action} {phase} on {station} at {}",
                clock_time(new.arrival_time)
            ),
            A::RejectDetection | A::RejectMultipleDetections => {
                format!("{action} {phase} on {station}")
            }
            A::CreateEvent | A::Associate | A::AssociateMultiple => {
                format!("{} {phase} on {station}", A::Associate)
            }
            A::Unassociate | A::UnassociateMultiple => {
                format!("{} {phase} on {station}", A::Unassociate)
            }
            A::ComputeFk | A::ComputeMultipleFk => format!("{} {phase} on {station}", A::ComputeFk),
            A::UpdateDetectionRePhase | A::UpdateMultipleDetectionsRePhase => {
                let old_phase = old.map_or(phase.as_str(), |o| o.phase.as_str());
                format!("{} from {old_phase} to {phase} on {station}", A::UpdateDetectionRePhase)
            }
            A::UpdateDetectionReTime => {
                let old_time = old.map_or(new.arrival_time, |o| o.arrival_time);
                format!(
                    "{action} {phase} from {} to {} on {station}",
                    clock_time(old_time),
                    clock_time(new.arrival_time)
                )
            }
            A::UpdateDetectionAmplitude => format!(
                "Amplitude for {phase} on {station} from {} to {}",
                amplitude(old.and_then(|o| o.amplitude)),
                amplitude(new.amplitude)
            ),
            a => a.to_string(),
        }
    }
}

/// `HH:MM:SS` in UTC for an epoch-seconds timestamp.
fn clock_time(epoch_seconds: f64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp(epoch_seconds.floor() as i64, 0)
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| format!("{epoch_seconds:.3}"))
}

fn amplitude(value: Option<f64>) -> String {
    value.map_or_else(|| "none".to_string(), |v| format!("{v:.3}"))
}
