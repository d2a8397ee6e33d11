use std::fmt;

use serde::{Deserialize, Serialize};

/// The analyst action that produced a set of changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionDescription {
    Unknown,
    Associate,
    AssociateMultiple,
    Unassociate,
    UnassociateMultiple,
    CreateDetection,
    RejectDetection,
    RejectMultipleDetections,
    UpdateDetectionReTime,
    UpdateDetectionRePhase,
    UpdateMultipleDetectionsRePhase,
    UpdateDetectionAmplitude,
    UpdateDetectionReviewAmplitude,
    UpdateDetection,
    ComputeFk,
    ComputeMultipleFk,
    CreateEvent,
    UpdateEventLocate,
    UpdateEventFromDetectionChange,
    UpdateEventFeaturePredictions,
    UpdateEventOpenForRefinement,
    UpdateEventMarkComplete,
    UpdateEventPreferredHypothesis,
    UpdateEventMagnitude,
    SaveEvent,
}

impl ActionDescription {
    pub const ALL: [ActionDescription; 25] = [
        Self::Unknown,
        Self::Associate,
        Self::AssociateMultiple,
        Self::Unassociate,
        Self::UnassociateMultiple,
        Self::CreateDetection,
        Self::RejectDetection,
        Self::RejectMultipleDetections,
        Self::UpdateDetectionReTime,
        Self::UpdateDetectionRePhase,
        Self::UpdateMultipleDetectionsRePhase,
        Self::UpdateDetectionAmplitude,
        Self::UpdateDetectionReviewAmplitude,
        Self::UpdateDetection,
        Self::ComputeFk,
        Self::ComputeMultipleFk,
        Self::CreateEvent,
        Self::UpdateEventLocate,
        Self::UpdateEventFromDetectionChange,
        Self::UpdateEventFeaturePredictions,
        Self::UpdateEventOpenForRefinement,
        Self::UpdateEventMarkComplete,
        Self::UpdateEventPreferredHypothesis,
        Self::UpdateEventMagnitude,
        Self::SaveEvent,
    ];

    /// Human-readable label shown in history listings.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Associate => "Associate",
            Self::AssociateMultiple => "Associate multiple detections",
            Self::Unassociate => "Unassociate",
            Self::UnassociateMultiple => "Unassociate multiple detections",
            Self::CreateDetection => "Create detection",
            Self::RejectDetection => "Reject detection",
            Self::RejectMultipleDetections => "Reject multiple detections",
            Self::UpdateDetectionReTime => "Time",
            Self::UpdateDetectionRePhase => "Phase",
            Self::UpdateMultipleDetectionsRePhase => "Phase multiple detections",
            Self::UpdateDetectionAmplitude => "Update detection amplitude",
            Self::UpdateDetectionReviewAmplitude => "Update detection review amplitude",
            Self::UpdateDetection => "Update detection",
            Self::ComputeFk => "Fk",
            Self::ComputeMultipleFk => "Fk multiple detections",
            Self::CreateEvent => "Create event",
            Self::UpdateEventLocate => "Locate event",
            Self::UpdateEventFromDetectionChange => "Update event from signal detection change",
            Self::UpdateEventFeaturePredictions => "Update event feature predictions",
            Self::UpdateEventOpenForRefinement => "Event opened for refinement",
            Self::UpdateEventMarkComplete => "Event marked complete",
            Self::UpdateEventPreferredHypothesis => "Update event preferred hypothesis",
            Self::UpdateEventMagnitude => "Change magnitude defining settings",
            Self::SaveEvent => "Save event",
        }
    }

    /// Whether the action enters the history ledger unless configured
    /// otherwise.
    pub fn undoable_by_default(&self) -> bool {
        !matches!(
            self,
            Self::UpdateEventFeaturePredictions
                | Self::UpdateEventOpenForRefinement
                | Self::UpdateEventMarkComplete
                | Self::SaveEvent
                | Self::UpdateDetectionReviewAmplitude
        )
    }

    /// Actions allowed to introduce entities unknown to the cache.
    pub fn is_creation(&self) -> bool {
        matches!(self, Self::CreateEvent | Self::CreateDetection)
    }

    /// Actions whose detection changes are attributed through rejected
    /// associations as well as live ones.
    pub fn counts_rejected_associations(&self) -> bool {
        matches!(
            self,
            Self::RejectDetection
                | Self::RejectMultipleDetections
                | Self::Unassociate
                | Self::UnassociateMultiple
        )
    }

    /// Actions whose detection changes are read against the single event
    /// being updated instead of the detection's current revision.
    pub fn targets_updated_event(&self) -> bool {
        matches!(
            self,
            Self::CreateEvent | Self::Unassociate | Self::UnassociateMultiple
        )
    }

    /// Actions that originate on a signal detection.
    pub fn is_detection_action(&self) -> bool {
        matches!(
            self,
            Self::Associate
                | Self::AssociateMultiple
                | Self::Unassociate
                | Self::UnassociateMultiple
                | Self::CreateDetection
                | Self::RejectDetection
                | Self::RejectMultipleDetections
                | Self::UpdateDetectionReTime
                | Self::UpdateDetectionRePhase
                | Self::UpdateMultipleDetectionsRePhase
                | Self::UpdateDetectionAmplitude
                | Self::UpdateDetectionReviewAmplitude
                | Self::UpdateDetection
                | Self::ComputeFk
                | Self::ComputeMultipleFk
        )
    }
}

impl fmt::Display for ActionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
