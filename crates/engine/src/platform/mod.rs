//! Seams to the host operating system.
//!
//! Every external service the engine touches sits behind one of these
//! traits so the lifecycle logic stays testable off-device. Implementations
//! live in the host; `memory` has in-process doubles and a tokio-backed
//! alarm scheduler.

pub mod memory;

use crate::constants::{CLASSIFICATION_REQUEST_CODE, TRANSITION_REQUEST_CODE};
use crate::error::{ForegroundError, ScheduleError, SubscriptionError, WakeLockError};
use crate::notification::NotificationContent;
use async_trait::async_trait;
use sentinel_events::{ActivityLabel, ActivitySample, RawTransition};
use std::time::{Duration, Instant};

/// Which recognition API a registration belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiKind {
    Classification,
    Transitions,
}

impl ApiKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiKind::Classification => "classification",
            ApiKind::Transitions => "transitions",
        }
    }
}

/// Opaque token identifying one registration with a recognition API.
///
/// The OS matches registrations by request code, which is stable across
/// process restarts. Tearing down with a fresh token therefore also removes
/// a registration left behind by a previous process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    kind: ApiKind,
    generation: u64,
}

impl SubscriptionHandle {
    pub fn new(kind: ApiKind, generation: u64) -> Self {
        Self { kind, generation }
    }

    pub fn kind(&self) -> ApiKind {
        self.kind
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn request_code(&self) -> i32 {
        match self.kind {
            ApiKind::Classification => CLASSIFICATION_REQUEST_CODE,
            ApiKind::Transitions => TRANSITION_REQUEST_CODE,
        }
    }
}

/// Anything the recognition services deliver back to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionEvent {
    Sample(ActivitySample),
    Transition(RawTransition),
}

/// Periodic activity classification.
#[async_trait]
pub trait ClassificationApi: Send + Sync {
    /// Register for samples every `interval`.
    async fn subscribe(
        &self,
        handle: &SubscriptionHandle,
        interval: Duration,
    ) -> Result<(), SubscriptionError>;

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), SubscriptionError>;

    /// One-shot query for the current most probable activity.
    async fn query_current(&self) -> Result<ActivitySample, SubscriptionError>;
}

/// Activity transition detection.
#[async_trait]
pub trait TransitionApi: Send + Sync {
    /// Register for ENTER transitions of `labels`.
    async fn subscribe(
        &self,
        handle: &SubscriptionHandle,
        labels: &[ActivityLabel],
    ) -> Result<(), SubscriptionError>;

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), SubscriptionError>;
}

/// OS-level partial wake lock. Binary, not reference counted.
pub trait WakeLock: Send + Sync {
    /// Acquire with an OS-enforced `timeout`.
    fn acquire(&self, timeout: Duration) -> Result<(), WakeLockError>;

    fn release(&self) -> Result<(), WakeLockError>;

    fn is_held(&self) -> bool;
}

/// Timer identity with the OS alarm service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmKind {
    Liveness,
    HealthCheck,
}

impl AlarmKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmKind::Liveness => "liveness",
            AlarmKind::HealthCheck => "health_check",
        }
    }
}

/// Device-idle-aware alarm service.
pub trait AlarmScheduler: Send + Sync {
    /// Whether power policy currently permits exact alarms.
    fn can_schedule_exact(&self) -> bool;

    /// One-shot alarm that fires even in deep idle.
    fn schedule_exact(&self, kind: AlarmKind, delay: Duration) -> Result<(), ScheduleError>;

    /// Repeating alarm the OS may batch or defer.
    fn schedule_inexact_repeating(
        &self,
        kind: AlarmKind,
        delay: Duration,
        interval: Duration,
    ) -> Result<(), ScheduleError>;

    fn cancel(&self, kind: AlarmKind);
}

/// Long-running presentation mode backed by a persistent notification.
pub trait ForegroundHost: Send + Sync {
    fn enter_foreground(&self, content: &NotificationContent) -> Result<(), ForegroundError>;

    fn leave_foreground(&self);
}

/// Updates to the persistent notification while in foreground.
pub trait NotificationSurface: Send + Sync {
    fn show(&self, content: &NotificationContent);

    fn cancel(&self);
}

/// Evidence that the owning app still wants the service alive.
pub trait LivenessProbe: Send + Sync {
    /// Owning application process is alive.
    fn owner_process_alive(&self) -> bool;

    /// At least one sibling component of the owning app is active.
    fn sibling_component_active(&self) -> bool;
}

/// Hardware and power facts used for availability and diagnostics.
pub trait DeviceFeatures: Send + Sync {
    fn has_step_counter(&self) -> bool;

    fn has_step_detector(&self) -> bool;

    fn is_device_idle(&self) -> bool {
        false
    }

    fn is_ignoring_battery_optimizations(&self) -> bool {
        false
    }
}

/// Wall-clock and monotonic uptime, read together.
pub trait Clock: Send + Sync {
    fn now_epoch_millis(&self) -> i64;

    /// Milliseconds since device boot.
    fn uptime_millis(&self) -> i64;
}

/// Host clock. Uptime counts from construction unless a boot offset is given.
pub struct SystemClock {
    started: Instant,
    boot_offset_millis: i64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::with_boot_offset(0)
    }

    /// `boot_offset_millis` is the uptime at the moment of construction.
    pub fn with_boot_offset(boot_offset_millis: i64) -> Self {
        Self {
            started: Instant::now(),
            boot_offset_millis,
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_epoch_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn uptime_millis(&self) -> i64 {
        self.boot_offset_millis + self.started.elapsed().as_millis() as i64
    }
}

/// Null implementation for headless runs and unsupported platforms.
pub struct NullPlatform;

impl LivenessProbe for NullPlatform {
    fn owner_process_alive(&self) -> bool {
        true
    }

    fn sibling_component_active(&self) -> bool {
        true
    }
}

impl DeviceFeatures for NullPlatform {
    fn has_step_counter(&self) -> bool {
        false
    }

    fn has_step_detector(&self) -> bool {
        false
    }
}

impl ForegroundHost for NullPlatform {
    fn enter_foreground(&self, _content: &NotificationContent) -> Result<(), ForegroundError> {
        Ok(())
    }

    fn leave_foreground(&self) {}
}

impl NotificationSurface for NullPlatform {
    fn show(&self, _content: &NotificationContent) {}

    fn cancel(&self) {}
}
