//! Background resilience and activity stream engine.
//!
//! Keeps motion-activity tracking alive across OS process kills, device
//! idle and app backgrounding, and turns raw classifier output into a
//! de-duplicated stream of activity changes for a single consumer.
//!
//! `ServiceController` is the entry point. Platform services are reached
//! through the traits in `platform`; `platform::memory` provides
//! in-process implementations.

pub mod config;
pub mod constants;
pub mod controller;
pub mod error;
pub mod filter;
pub mod health;
pub mod notification;
pub mod platform;
pub mod runtime;
pub mod sink;
pub mod subscription;
pub mod wake;
pub mod watchdog;

pub use config::EngineConfig;
pub use controller::{merge_running, Platform, ServiceController, ServiceLifecycleState};
pub use error::{
    EngineError, ForegroundError, Result, ScheduleError, SubscriptionError, WakeLockError,
};
pub use filter::{EventFilter, Rejection, StreamState};
pub use health::{HealthCheckReceiver, ServiceLauncher};
pub use notification::{DisplayState, NotificationChannel, NotificationContent};
pub use platform::{
    AlarmKind, AlarmScheduler, ApiKind, ClassificationApi, Clock, DeviceFeatures, ForegroundHost,
    LivenessProbe, MotionEvent, NotificationSurface, NullPlatform, SubscriptionHandle,
    SystemClock, TransitionApi, WakeLock,
};
pub use runtime::{start_runtime, RuntimeHandle};
pub use sink::{AttachOutcome, EventSink};
pub use subscription::{SubscriptionManager, SubsystemState};
pub use wake::{WakeGuard, WakeTicket};
pub use watchdog::{check_preconditions, LivenessFailure, ScheduleMode, TickOutcome, Watchdog};
