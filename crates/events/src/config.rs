//! Tracking configuration supplied by the embedding application.

use serde::{Deserialize, Serialize};

/// Default classification sampling interval.
pub const DEFAULT_SAMPLE_INTERVAL_MILLIS: u64 = 10_000;

/// Default minimum classifier confidence for a sample to be forwarded.
pub const DEFAULT_CONFIDENCE_THRESHOLD: u8 = 60;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("confidence threshold must be within 0-100, got {0}")]
    ConfidenceOutOfRange(u32),
}

/// Options for a tracking session.
///
/// Immutable once running, except for `emit_notification`, which can be
/// hot-swapped by a repeated start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackingConfig {
    #[serde(alias = "showNotification")]
    pub emit_notification: bool,
    #[serde(alias = "useTransitionRecognition")]
    pub use_transitions: bool,
    #[serde(alias = "useActivityRecognition")]
    pub use_classification: bool,
    #[serde(alias = "detectionIntervalMillis")]
    pub sample_interval_millis: u64,
    pub confidence_threshold: u32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            emit_notification: true,
            use_transitions: true,
            use_classification: true,
            sample_interval_millis: DEFAULT_SAMPLE_INTERVAL_MILLIS,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD as u32,
        }
    }
}

impl TrackingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.confidence_threshold > 100 {
            return Err(ConfigError::ConfidenceOutOfRange(self.confidence_threshold));
        }
        Ok(())
    }

    /// Threshold narrowed to the confidence scale. Call after `validate`.
    pub fn threshold(&self) -> u8 {
        self.confidence_threshold.min(100) as u8
    }
}
