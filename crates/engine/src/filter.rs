//! Turns raw samples and transitions into a de-duplicated activity stream.
//!
//! Samples pass when the label differs from the last forwarded one, the
//! label is not TILTING and the confidence meets the threshold. Transitions
//! only need a new label and an ENTER direction. Both paths share one
//! `StreamState`, so a transition and a sample reporting the same activity
//! produce a single forwarded event.

use crate::platform::Clock;
use sentinel_events::{
    ActivityLabel, ActivitySample, ForwardedEvent, RawTransition, TransitionEvent, TransitionKind,
    DEFAULT_CONFIDENCE_THRESHOLD,
};

/// Filter memory for one process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamState {
    pub last_forwarded_label: Option<ActivityLabel>,
    pub last_forwarded_at_epoch_millis: i64,
    /// True until the first event of this process lifetime is forwarded.
    pub is_initial_delivery: bool,
}

impl Default for StreamState {
    fn default() -> Self {
        Self {
            last_forwarded_label: None,
            last_forwarded_at_epoch_millis: 0,
            is_initial_delivery: true,
        }
    }
}

/// Why an input was not forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Unchanged,
    Tilting,
    LowConfidence { confidence: u8, threshold: u8 },
    ExitTransition,
}

#[derive(Debug, Clone)]
pub struct EventFilter {
    state: StreamState,
    threshold: u8,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_THRESHOLD)
    }
}

impl EventFilter {
    pub fn new(threshold: u8) -> Self {
        Self {
            state: StreamState::default(),
            threshold: threshold.min(100),
        }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: u8) {
        self.threshold = threshold.min(100);
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn evaluate_sample(&mut self, sample: ActivitySample) -> Result<ForwardedEvent, Rejection> {
        if self.state.last_forwarded_label == Some(sample.label) {
            return Err(Rejection::Unchanged);
        }
        if sample.label.is_tilting() {
            return Err(Rejection::Tilting);
        }
        if sample.confidence < self.threshold {
            return Err(Rejection::LowConfidence {
                confidence: sample.confidence,
                threshold: self.threshold,
            });
        }
        Ok(self.forward(sample.label, sample.observed_at_epoch_millis))
    }

    pub fn evaluate_transition(
        &mut self,
        transition: TransitionEvent,
    ) -> Result<ForwardedEvent, Rejection> {
        if transition.kind == TransitionKind::Exit {
            return Err(Rejection::ExitTransition);
        }
        if transition.label.is_tilting() {
            return Err(Rejection::Tilting);
        }
        if self.state.last_forwarded_label == Some(transition.label) {
            return Err(Rejection::Unchanged);
        }
        Ok(self.forward(transition.label, transition.observed_at_epoch_millis))
    }

    pub fn on_sample(&mut self, sample: ActivitySample) -> Option<ForwardedEvent> {
        match self.evaluate_sample(sample) {
            Ok(event) => Some(event),
            Err(reason) => {
                tracing::trace!(label = %sample.label, ?reason, "Sample dropped");
                None
            }
        }
    }

    pub fn on_transition(&mut self, transition: TransitionEvent) -> Option<ForwardedEvent> {
        match self.evaluate_transition(transition) {
            Ok(event) => Some(event),
            Err(reason) => {
                tracing::trace!(label = %transition.label, ?reason, "Transition dropped");
                None
            }
        }
    }

    /// Record `label` as already delivered, e.g. by a cold-attach query, so
    /// the next identical sample is treated as unchanged. TILTING and
    /// UNKNOWN are ignored.
    pub fn seed(&mut self, label: ActivityLabel, timestamp: i64) {
        if label.is_tilting() || label == ActivityLabel::Unknown {
            return;
        }
        self.forward(label, timestamp);
    }

    /// Reconstruct the wall-clock time of a boot-relative transition, then
    /// filter it.
    pub fn on_raw_transition(
        &mut self,
        raw: RawTransition,
        clock: &dyn Clock,
    ) -> Option<ForwardedEvent> {
        let event =
            TransitionEvent::reconstruct(raw, clock.now_epoch_millis(), clock.uptime_millis());
        self.on_transition(event)
    }

    fn forward(&mut self, label: ActivityLabel, timestamp: i64) -> ForwardedEvent {
        let event = ForwardedEvent {
            label,
            timestamp,
            is_initial_delivery: self.state.is_initial_delivery,
        };
        self.state.last_forwarded_label = Some(label);
        self.state.last_forwarded_at_epoch_millis = timestamp;
        self.state.is_initial_delivery = false;
        event
    }
}
