//! Engine tuning knobs.
//!
//! Defaults come from `constants`; hosts may override any of them from JSON.

use crate::constants::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub liveness_period_ms: u64,
    pub health_check_period_ms: u64,
    pub wake_grace_ms: u64,
    pub wake_ceiling_ms: u64,
    pub health_check_wake_timeout_ms: u64,
    pub initial_query_timeout_ms: u64,
    /// Verify tracking intent, owner process and sibling components before
    /// honoring a liveness tick.
    pub strict_liveness: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            liveness_period_ms: LIVENESS_PERIOD.as_millis() as u64,
            health_check_period_ms: HEALTH_CHECK_PERIOD.as_millis() as u64,
            wake_grace_ms: WAKE_GRACE.as_millis() as u64,
            wake_ceiling_ms: WAKE_CEILING.as_millis() as u64,
            health_check_wake_timeout_ms: HEALTH_CHECK_WAKE_TIMEOUT.as_millis() as u64,
            initial_query_timeout_ms: INITIAL_QUERY_TIMEOUT.as_millis() as u64,
            strict_liveness: true,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn liveness_period(&self) -> Duration {
        Duration::from_millis(self.liveness_period_ms)
    }

    pub fn health_check_period(&self) -> Duration {
        Duration::from_millis(self.health_check_period_ms)
    }

    pub fn wake_grace(&self) -> Duration {
        Duration::from_millis(self.wake_grace_ms)
    }

    pub fn wake_ceiling(&self) -> Duration {
        Duration::from_millis(self.wake_ceiling_ms)
    }

    pub fn health_check_wake_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_wake_timeout_ms)
    }

    pub fn initial_query_timeout(&self) -> Duration {
        Duration::from_millis(self.initial_query_timeout_ms)
    }
}
