//! Periodic timers that keep tracking alive through OS process kills.
//!
//! Two independent timers: a short liveness tick that re-verifies the
//! service, and a slower health check that resurrects it. Exact alarms are
//! preferred; when power policy refuses them the watchdog silently falls
//! back to an inexact repeating alarm.

use crate::error::ScheduleError;
use crate::platform::{AlarmKind, AlarmScheduler, LivenessProbe};
use sentinel_storage::IntentStore;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleMode {
    Exact,
    InexactRepeating,
}

#[derive(Clone)]
pub struct Watchdog {
    scheduler: Arc<dyn AlarmScheduler>,
    liveness_period: Duration,
    health_check_period: Duration,
}

impl Watchdog {
    pub fn new(
        scheduler: Arc<dyn AlarmScheduler>,
        liveness_period: Duration,
        health_check_period: Duration,
    ) -> Self {
        Self {
            scheduler,
            liveness_period,
            health_check_period,
        }
    }

    pub fn period(&self, kind: AlarmKind) -> Duration {
        match kind {
            AlarmKind::Liveness => self.liveness_period,
            AlarmKind::HealthCheck => self.health_check_period,
        }
    }

    /// Arm both timers.
    pub fn arm(&self) {
        self.rearm(AlarmKind::Liveness);
        self.rearm(AlarmKind::HealthCheck);
    }

    /// Schedule the next fire of `kind`, replacing any pending one.
    ///
    /// Returns the mode that was used, or `None` if even the inexact
    /// fallback failed.
    pub fn rearm(&self, kind: AlarmKind) -> Option<ScheduleMode> {
        let period = self.period(kind);
        self.scheduler.cancel(kind);

        if self.scheduler.can_schedule_exact() {
            match self.scheduler.schedule_exact(kind, period) {
                Ok(()) => {
                    tracing::debug!(alarm = kind.as_str(), ?period, "Exact alarm scheduled");
                    return Some(ScheduleMode::Exact);
                }
                Err(ScheduleError::ExactRefused) => {
                    tracing::debug!(alarm = kind.as_str(), "Exact alarm refused, using inexact");
                }
                Err(e) => {
                    tracing::warn!(alarm = kind.as_str(), error = %e, "Exact alarm failed, using inexact");
                }
            }
        }

        match self
            .scheduler
            .schedule_inexact_repeating(kind, period, period)
        {
            Ok(()) => {
                tracing::debug!(alarm = kind.as_str(), ?period, "Inexact alarm scheduled");
                Some(ScheduleMode::InexactRepeating)
            }
            Err(e) => {
                tracing::error!(alarm = kind.as_str(), error = %e, "Failed to schedule alarm");
                None
            }
        }
    }

    pub fn cancel(&self) {
        self.scheduler.cancel(AlarmKind::Liveness);
        self.scheduler.cancel(AlarmKind::HealthCheck);
        tracing::debug!("Watchdog alarms cancelled");
    }
}

/// Why a liveness tick refused to keep the service alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessFailure {
    NoTrackingIntent,
    OwnerProcessGone,
    NoSiblingComponent,
}

impl fmt::Display for LivenessFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            LivenessFailure::NoTrackingIntent => "tracking intent not registered",
            LivenessFailure::OwnerProcessGone => "owner process not alive",
            LivenessFailure::NoSiblingComponent => "no sibling component active",
        };
        f.write_str(reason)
    }
}

/// All three must hold before a tick may resurrect or re-verify tracking.
pub fn check_preconditions(
    store: &dyn IntentStore,
    probe: &dyn LivenessProbe,
) -> Result<(), LivenessFailure> {
    match store.tracking_intent() {
        Ok(true) => {}
        Ok(false) => return Err(LivenessFailure::NoTrackingIntent),
        Err(e) => {
            tracing::warn!(error = %e, "Could not read tracking intent");
            return Err(LivenessFailure::NoTrackingIntent);
        }
    }
    if !probe.owner_process_alive() {
        return Err(LivenessFailure::OwnerProcessGone);
    }
    if !probe.sibling_component_active() {
        return Err(LivenessFailure::NoSiblingComponent);
    }
    Ok(())
}

/// What a watchdog tick ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Service was running; subscriptions re-verified.
    Verified,
    /// Service was stopped and has been started from persisted config.
    Resurrected,
    /// Preconditions failed; the service was stopped and timers cancelled.
    Aborted(LivenessFailure),
    /// Start was refused (permissions, foreground). Timers stay armed so
    /// the next tick retries.
    Failed,
    /// A stop was in progress; nothing done and nothing re-armed.
    Skipped,
}
