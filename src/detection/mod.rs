//! Detection phase gate: throttles the background object-detection loop.
//!
//! The gate never touches audio or the session phase. Its output is the
//! current set of detected objects, consumed by the object-mention lookup.

pub mod objects;

pub use objects::{DetectedObject, coco_label, mentioned_objects};

use crate::config::DetectionConfig;
use crate::session::Phase;
use std::time::Duration;

/// Per-session detection cycle state.
#[derive(Debug)]
pub struct DetectionGate {
    scanning_interval: Duration,
    interactive_interval: Duration,
    /// Cycle currently awaiting a result.
    processing: Option<u64>,
    next_cycle: u64,
    /// Set once a cycle reports objects; switches to the interactive interval.
    visualization: bool,
    objects: Vec<DetectedObject>,
}

impl DetectionGate {
    pub fn new(scanning_interval: Duration, interactive_interval: Duration) -> Self {
        Self {
            scanning_interval,
            interactive_interval,
            processing: None,
            next_cycle: 1,
            visualization: false,
            objects: Vec::new(),
        }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(
            Duration::from_millis(config.scanning_interval_ms),
            Duration::from_millis(config.interactive_interval_ms),
        )
    }

    /// Cycle interval for `phase`, or `None` when detection does not run.
    ///
    /// Early phases scan at the short interval. Continuous dialogue keeps
    /// scanning until the first objects are found, then slows down.
    pub fn interval_for(&self, phase: Phase) -> Option<Duration> {
        match phase {
            Phase::Initializing | Phase::Stabilizing => Some(self.scanning_interval),
            Phase::ContinuousDialogue if self.visualization => Some(self.interactive_interval),
            Phase::ContinuousDialogue => Some(self.scanning_interval),
            Phase::Idle | Phase::Ending => None,
        }
    }

    /// Start a cycle unless one is still processing.
    pub fn try_begin(&mut self) -> Option<u64> {
        if self.processing.is_some() {
            return None;
        }
        let cycle = self.next_cycle;
        self.next_cycle += 1;
        self.processing = Some(cycle);
        Some(cycle)
    }

    /// Finish `cycle`. `objects` is `None` when the cycle failed. Returns
    /// `false` (and changes nothing) for a cycle that is not the current one.
    pub fn finish(&mut self, cycle: u64, objects: Option<Vec<DetectedObject>>) -> bool {
        if self.processing != Some(cycle) {
            return false;
        }
        self.processing = None;
        if let Some(objects) = objects {
            if !objects.is_empty() {
                self.visualization = true;
            }
            self.objects = objects;
        }
        true
    }

    /// Abandon the running cycle, if any (phase change or error).
    pub fn abandon(&mut self) {
        self.processing = None;
    }

    pub fn is_processing(&self) -> bool {
        self.processing.is_some()
    }

    pub fn visualization_enabled(&self) -> bool {
        self.visualization
    }

    pub fn objects(&self) -> &[DetectedObject] {
        &self.objects
    }

    pub fn reset(&mut self) {
        self.processing = None;
        self.visualization = false;
        self.objects.clear();
    }
}
