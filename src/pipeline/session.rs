use tracing::{debug, warn};

use crate::encoding::EncodedImage;
use crate::pipeline::history::{HistoryEntry, HistoryLog};
use crate::pipeline::types::{DetectionParameters, InferenceResult, LoopState};

/// Everything the user can see or change, owned by the controller.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    parameters: DetectionParameters,
    available_classes: Vec<String>,
    annotated: Option<EncodedImage>,
    history: HistoryLog,
}

impl SessionContext {
    pub fn new(parameters: DetectionParameters) -> Self {
        Self {
            parameters,
            ..Self::default()
        }
    }

    pub fn parameters(&self) -> &DetectionParameters {
        &self.parameters
    }

    pub fn annotated(&self) -> Option<&EncodedImage> {
        self.annotated.as_ref()
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn available_classes(&self) -> &[String] {
        &self.available_classes
    }

    pub fn set_available_classes(&mut self, classes: Vec<String>) {
        self.available_classes = classes;
    }

    pub fn set_threshold(&mut self, threshold: f32) -> f32 {
        self.parameters.set_threshold(threshold)
    }

    /// Toggles a label in the class filter. Unknown labels are ignored once the
    /// service has told us which classes exist.
    pub fn toggle_class(&mut self, label: &str) -> Option<bool> {
        if !self.available_classes.is_empty()
            && !self.available_classes.iter().any(|class| class == label)
        {
            warn!("Ignoring toggle of unknown class '{}'", label);
            return None;
        }
        let selected = self.parameters.class_filter_mut().toggle(label);
        debug!("Class '{}' selected: {}", label, selected);
        Some(selected)
    }

    /// Replaces the annotated image and logs the round's tally.
    pub fn apply(&mut self, result: InferenceResult) -> HistoryEntry {
        self.annotated = Some(result.annotated_image);
        self.history.record(&result.detections)
    }
}

/// Counters describing how the poll loop has spent its ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundStats {
    pub scheduled: u64,
    pub dispatched: u64,
    pub skipped_busy: u64,
    pub skipped_not_ready: u64,
    pub completed: u64,
    pub failed: u64,
    pub discarded_stale: u64,
}

/// Read-only copy of the session handed out to the UI.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: LoopState,
    pub parameters: DetectionParameters,
    pub available_classes: Vec<String>,
    pub annotated: Option<EncodedImage>,
    pub history: Vec<HistoryEntry>,
    pub stats: RoundStats,
}
