//! Samples and transitions as delivered by the classification services,
//! and the forwarded events derived from them.

use crate::label::ActivityLabel;
use serde::{Deserialize, Serialize};

/// Periodic "most probable activity" report from the classification service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySample {
    pub label: ActivityLabel,
    /// Classifier confidence, 0-100.
    pub confidence: u8,
    pub observed_at_epoch_millis: i64,
}

impl ActivitySample {
    pub fn new(label: ActivityLabel, confidence: u8, observed_at_epoch_millis: i64) -> Self {
        Self {
            label,
            confidence: confidence.min(100),
            observed_at_epoch_millis,
        }
    }
}

/// Direction of an activity transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitionKind {
    Enter,
    Exit,
}

/// Transition as reported by the transition service.
///
/// The event time is relative to device boot, not wall-clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransition {
    /// Platform detected-activity code.
    pub activity_code: i32,
    pub kind: TransitionKind,
    pub elapsed_realtime_nanos: i64,
}

/// Transition with a reconstructed wall-clock timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionEvent {
    pub label: ActivityLabel,
    pub kind: TransitionKind,
    pub observed_at_epoch_millis: i64,
}

impl TransitionEvent {
    /// Rebuild wall-clock time from a boot-relative event time.
    ///
    /// `now_epoch_millis` and `uptime_millis` must be captured together at
    /// receipt. If the device rebooted between occurrence and delivery the
    /// result is approximate.
    pub fn reconstruct(raw: RawTransition, now_epoch_millis: i64, uptime_millis: i64) -> Self {
        let boot_anchor = now_epoch_millis - uptime_millis;
        Self {
            label: ActivityLabel::from_code(raw.activity_code),
            kind: raw.kind,
            observed_at_epoch_millis: boot_anchor + raw.elapsed_realtime_nanos / 1_000_000,
        }
    }
}

/// An activity change accepted by the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardedEvent {
    pub label: ActivityLabel,
    pub timestamp: i64,
    pub is_initial_delivery: bool,
}

impl ForwardedEvent {
    /// Copy of this event flagged as the initial state for a new subscriber.
    pub fn as_initial(&self) -> Self {
        Self {
            is_initial_delivery: true,
            ..*self
        }
    }
}

/// Outbound record as delivered across the event channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityChangedPayload {
    pub activity: String,
    pub timestamp: i64,
    #[serde(default)]
    pub is_initial_state: bool,
}

impl From<&ForwardedEvent> for ActivityChangedPayload {
    fn from(event: &ForwardedEvent) -> Self {
        Self {
            activity: event.label.as_str().to_string(),
            timestamp: event.timestamp,
            is_initial_state: event.is_initial_delivery,
        }
    }
}
