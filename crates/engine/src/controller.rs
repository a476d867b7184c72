//! Service lifecycle and the control surface exposed to the host app.
//!
//! `ServiceController` owns every other component. All reconfiguration
//! (start, stop, watchdog ticks) is serialized through one async lock;
//! the lifecycle state lives outside that lock so `stop` can flip it to
//! STOPPING immediately and in-flight ticks see the change before arming
//! anything else.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::filter::{EventFilter, StreamState};
use crate::health::{HealthCheckReceiver, ServiceLauncher};
use crate::notification::DisplayState;
use crate::platform::{
    AlarmKind, AlarmScheduler, ApiKind, ClassificationApi, Clock, DeviceFeatures,
    ForegroundHost, LivenessProbe, MotionEvent, NotificationSurface, TransitionApi, WakeLock,
};
use crate::sink::{AttachOutcome, EventSink};
use crate::subscription::{SubscriptionManager, SubsystemState};
use crate::wake::WakeGuard;
use crate::watchdog::{check_preconditions, LivenessFailure, TickOutcome, Watchdog};
use async_trait::async_trait;
use sentinel_events::{
    ActivityLabel, ActivitySample, EventBusRef, ForwardedEvent, RawTransition, TrackingConfig,
};
use sentinel_permissions::{Capability, PermissionGate, PermissionRequester, PermissionStatus};
use sentinel_storage::IntentStore;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Host implementations of every platform seam.
#[derive(Clone)]
pub struct Platform {
    pub classification: Arc<dyn ClassificationApi>,
    pub transitions: Arc<dyn TransitionApi>,
    pub wake_lock: Arc<dyn WakeLock>,
    /// Separate lock for the health-check receiver.
    pub health_wake_lock: Arc<dyn WakeLock>,
    pub alarms: Arc<dyn AlarmScheduler>,
    pub foreground: Arc<dyn ForegroundHost>,
    pub notifications: Arc<dyn NotificationSurface>,
    pub liveness: Arc<dyn LivenessProbe>,
    pub device: Arc<dyn DeviceFeatures>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceLifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for ServiceLifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceLifecycleState::Stopped => "STOPPED",
            ServiceLifecycleState::Starting => "STARTING",
            ServiceLifecycleState::Running => "RUNNING",
            ServiceLifecycleState::Stopping => "STOPPING",
        };
        f.write_str(name)
    }
}

#[derive(Clone)]
pub struct ServiceController {
    inner: Arc<Inner>,
}

struct Inner {
    config: EngineConfig,
    platform: Platform,
    gate: PermissionGate,
    store: Arc<dyn IntentStore>,
    lifecycle: watch::Sender<ServiceLifecycleState>,
    session: tokio::sync::Mutex<Session>,
    filter: Mutex<EventFilter>,
    display: Mutex<DisplayState>,
    emit_notification: AtomicBool,
    sink: EventSink,
    watchdog: Watchdog,
    wake: WakeGuard,
    health: HealthCheckReceiver,
}

/// State guarded by the reconfiguration lock.
struct Session {
    tracking: Option<TrackingConfig>,
    subscriptions: SubscriptionManager,
}

impl ServiceController {
    pub fn new(
        config: EngineConfig,
        platform: Platform,
        gate: PermissionGate,
        store: Arc<dyn IntentStore>,
    ) -> Self {
        let wake = WakeGuard::new(
            platform.wake_lock.clone(),
            config.wake_grace(),
            config.wake_ceiling(),
        );
        let watchdog = Watchdog::new(
            platform.alarms.clone(),
            config.liveness_period(),
            config.health_check_period(),
        );
        let health = HealthCheckReceiver::new(
            platform.health_wake_lock.clone(),
            config.health_check_wake_timeout(),
        );
        let subscriptions = SubscriptionManager::new(
            platform.classification.clone(),
            platform.transitions.clone(),
            wake.clone(),
            config.wake_ceiling(),
        );
        let (lifecycle, _) = watch::channel(ServiceLifecycleState::Stopped);

        Self {
            inner: Arc::new(Inner {
                config,
                platform,
                gate,
                store,
                lifecycle,
                session: tokio::sync::Mutex::new(Session {
                    tracking: None,
                    subscriptions,
                }),
                filter: Mutex::new(EventFilter::default()),
                display: Mutex::new(DisplayState::default()),
                emit_notification: AtomicBool::new(true),
                sink: EventSink::new(),
                watchdog,
                wake,
                health,
            }),
        }
    }

    pub fn lifecycle(&self) -> ServiceLifecycleState {
        *self.inner.lifecycle.borrow()
    }

    pub fn watch_lifecycle(&self) -> watch::Receiver<ServiceLifecycleState> {
        self.inner.lifecycle.subscribe()
    }

    pub fn gate(&self) -> &PermissionGate {
        &self.inner.gate
    }

    pub fn last_event(&self) -> Option<ForwardedEvent> {
        self.inner.sink.last_event()
    }

    pub fn stream_state(&self) -> StreamState {
        self.inner
            .filter
            .lock()
            .map(|f| f.state().clone())
            .unwrap_or_default()
    }

    pub fn display_state(&self) -> DisplayState {
        self.inner
            .display
            .lock()
            .map(|d| *d)
            .unwrap_or_default()
    }

    /// Config of the current session, if one is running.
    pub async fn tracking_config(&self) -> Option<TrackingConfig> {
        self.inner.session.lock().await.tracking
    }

    pub async fn subsystem_state(&self, kind: ApiKind) -> SubsystemState {
        self.inner.session.lock().await.subscriptions.state(kind)
    }

    // Control surface

    pub async fn request_permissions(&self, requester: &dyn PermissionRequester) -> bool {
        self.inner.gate.request_permissions(requester).await
    }

    pub fn check_permission_status(&self) -> PermissionStatus {
        self.inner.gate.check_permission_status()
    }

    /// Advisory capabilities not currently granted. Tracking runs without
    /// them, with weaker watchdog timing.
    pub fn missing_advisory_capabilities(&self) -> Vec<Capability> {
        let gate = &self.inner.gate;
        gate.advisory_capabilities()
            .into_iter()
            .filter(|c| !gate.status(*c).is_authorized())
            .collect()
    }

    /// Step counter and step detector are both present.
    pub fn is_available(&self) -> bool {
        let device = &self.inner.platform.device;
        device.has_step_counter() && device.has_step_detector()
    }

    pub async fn start_tracking(&self, config: TrackingConfig) -> Result<bool> {
        self.start(config).await
    }

    pub async fn stop_tracking(&self) -> bool {
        self.stop().await
    }

    // Lifecycle

    /// Start tracking, or apply `config` to an already running service.
    ///
    /// Returns `Ok(false)` when required permissions are missing or a stop
    /// overtook the start.
    pub async fn start(&self, config: TrackingConfig) -> Result<bool> {
        config.validate()?;

        if !self.inner.gate.has_required_permissions() {
            tracing::warn!("Missing required permissions, not starting");
            return Ok(false);
        }

        let mut session = self.inner.session.lock().await;
        match self.lifecycle() {
            ServiceLifecycleState::Running => {
                self.reconfigure(&mut session, config).await;
                Ok(true)
            }
            ServiceLifecycleState::Stopped => {
                let started = self.start_locked(&mut session, config).await;
                if !matches!(started, Ok(true)) {
                    self.clear_intent();
                }
                started
            }
            state => {
                tracing::debug!(%state, "Start ignored");
                Ok(false)
            }
        }
    }

    /// Stop tracking and release every resource.
    ///
    /// The state flips to STOPPING before any await, so a watchdog tick that
    /// is already running will not arm anything further.
    pub async fn stop(&self) -> bool {
        self.inner.lifecycle.send_if_modified(|state| match state {
            ServiceLifecycleState::Running | ServiceLifecycleState::Starting => {
                *state = ServiceLifecycleState::Stopping;
                true
            }
            _ => false,
        });

        // Early clear so a tick that is already waiting sees no intent.
        self.clear_intent();

        let mut session = self.inner.session.lock().await;
        // A start queued ahead of us may have set the intent again.
        self.clear_intent();
        self.teardown(&mut session).await;
        tracing::info!("Tracking stopped");
        true
    }

    /// Re-arm both watchdog timers after the owning task was removed.
    pub fn on_task_removed(&self) {
        if self.lifecycle() == ServiceLifecycleState::Running || self.intended() {
            tracing::info!("Task removed, re-arming watchdog");
            self.inner.watchdog.arm();
        }
    }

    pub async fn on_alarm(&self, kind: AlarmKind) -> TickOutcome {
        match kind {
            AlarmKind::Liveness => self.on_liveness_tick().await,
            AlarmKind::HealthCheck => self.inner.health.on_receive(self).await,
        }
    }

    /// Short-period watchdog tick.
    ///
    /// Re-arms itself, even when recognition setup failed, unless a stop is
    /// in progress or the tick aborted and stopped the service.
    pub async fn on_liveness_tick(&self) -> TickOutcome {
        if self.lifecycle() == ServiceLifecycleState::Stopping {
            return TickOutcome::Skipped;
        }

        let outcome = self
            .inner
            .wake
            .with_wake(async {
                let next = AlarmKind::Liveness;
                match self.lifecycle() {
                    ServiceLifecycleState::Running => self.checked_verify(next).await,
                    ServiceLifecycleState::Stopped => self.checked_launch(next).await,
                    _ => TickOutcome::Skipped,
                }
            })
            .await;

        if let TickOutcome::Aborted(reason) = outcome {
            tracing::info!(%reason, "Liveness tick aborted");
        }
        outcome
    }

    // Event stream

    pub fn on_motion(&self, event: MotionEvent) -> Option<ForwardedEvent> {
        match event {
            MotionEvent::Sample(sample) => self.on_sample(sample),
            MotionEvent::Transition(raw) => self.on_transition(raw),
        }
    }

    pub fn on_sample(&self, sample: ActivitySample) -> Option<ForwardedEvent> {
        if !self.accepting_events() {
            tracing::debug!(label = %sample.label, "Sample dropped, service not running");
            return None;
        }
        let forwarded = self.inner.filter.lock().ok()?.on_sample(sample)?;
        self.deliver(forwarded);
        Some(forwarded)
    }

    pub fn on_transition(&self, raw: RawTransition) -> Option<ForwardedEvent> {
        if !self.accepting_events() {
            tracing::debug!(code = raw.activity_code, "Transition dropped, service not running");
            return None;
        }
        let clock = self.inner.platform.clock.as_ref();
        let forwarded = self
            .inner
            .filter
            .lock()
            .ok()?
            .on_raw_transition(raw, clock)?;
        self.deliver(forwarded);
        Some(forwarded)
    }

    /// Attach the downstream consumer and give it an initial state.
    pub async fn attach(&self, consumer: EventBusRef) {
        if let AttachOutcome::Replayed(event) = self.inner.sink.attach(consumer) {
            tracing::debug!(label = %event.label, "Replayed last activity to new consumer");
            return;
        }

        let timeout = self.inner.config.initial_query_timeout();
        let query = self.inner.platform.classification.query_current();
        let (label, timestamp) = match tokio::time::timeout(timeout, query).await {
            Ok(Ok(sample)) if !sample.label.is_tilting() => {
                (sample.label, sample.observed_at_epoch_millis)
            }
            Ok(Ok(_)) => (ActivityLabel::Unknown, self.now()),
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Initial activity query failed");
                (ActivityLabel::Unknown, self.now())
            }
            Err(_) => {
                tracing::debug!(?timeout, "Initial activity query timed out");
                (ActivityLabel::Unknown, self.now())
            }
        };
        if self.inner.sink.publish_initial(label, timestamp) {
            // The consumer now knows this label; a matching sample is not a change.
            if let Ok(mut filter) = self.inner.filter.lock() {
                filter.seed(label, timestamp);
            }
        }
    }

    pub fn detach(&self) {
        self.inner.sink.detach();
    }

    // Internals

    async fn start_locked(&self, session: &mut Session, config: TrackingConfig) -> Result<bool> {
        if !self.transition(ServiceLifecycleState::Stopped, ServiceLifecycleState::Starting) {
            return Ok(false);
        }

        if !self.inner.gate.may_run() {
            tracing::warn!("Location or activity recognition not granted, aborting start");
            self.set_lifecycle(ServiceLifecycleState::Stopped);
            return Ok(false);
        }

        for capability in self.missing_advisory_capabilities() {
            tracing::info!(%capability, "Advisory capability not granted, continuing");
        }

        if let Err(e) = self.persist(&config) {
            self.set_lifecycle(ServiceLifecycleState::Stopped);
            return Err(e);
        }

        self.inner
            .emit_notification
            .store(config.emit_notification, Ordering::SeqCst);
        if let Ok(mut filter) = self.inner.filter.lock() {
            filter.set_threshold(config.threshold());
        }

        let content = self.display_state().render(config.emit_notification);
        if let Err(e) = self.inner.platform.foreground.enter_foreground(&content) {
            tracing::error!(error = %e, "Foreground start refused");
            self.set_lifecycle(ServiceLifecycleState::Stopped);
            return Err(e.into());
        }

        if !self.transition(ServiceLifecycleState::Starting, ServiceLifecycleState::Running) {
            tracing::info!("Stop requested during start");
            return Ok(false);
        }

        session.tracking = Some(config);
        self.inner.watchdog.arm();
        self.arm_session(session).await;

        tracing::info!(
            transitions = config.use_transitions,
            classification = config.use_classification,
            interval_ms = config.sample_interval_millis,
            threshold = config.confidence_threshold,
            "Tracking started"
        );
        Ok(true)
    }

    async fn reconfigure(&self, session: &mut Session, incoming: TrackingConfig) {
        let classification_configured =
            session.subscriptions.state(ApiKind::Classification) == SubsystemState::Configured;
        let merged = merge_running(session.tracking, incoming, classification_configured);

        self.inner
            .emit_notification
            .store(merged.emit_notification, Ordering::SeqCst);
        self.refresh_notification();

        if let Ok(mut filter) = self.inner.filter.lock() {
            filter.set_threshold(merged.threshold());
        }
        if let Err(e) = self.inner.store.save_config(&merged) {
            tracing::warn!(error = %e, "Failed to persist updated config");
        }

        session.tracking = Some(merged);
        self.arm_session(session).await;
        tracing::debug!("Running service reconfigured");
    }

    async fn teardown(&self, session: &mut Session) {
        self.set_lifecycle(ServiceLifecycleState::Stopping);
        self.inner.watchdog.cancel();
        session.subscriptions.disarm().await;
        session.tracking = None;
        self.inner.platform.foreground.leave_foreground();
        self.inner.platform.notifications.cancel();
        self.inner.wake.release_now();
        self.set_lifecycle(ServiceLifecycleState::Stopped);
    }

    /// Arm whatever is enabled and not yet configured. Failures are left
    /// for the next watchdog tick.
    async fn arm_session(&self, session: &mut Session) {
        let Some(config) = session.tracking else {
            return;
        };
        let lifecycle = self.inner.lifecycle.subscribe();
        let result = session
            .subscriptions
            .arm_while(&config, || {
                matches!(
                    *lifecycle.borrow(),
                    ServiceLifecycleState::Starting | ServiceLifecycleState::Running
                )
            })
            .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "Recognition setup incomplete, will retry on next tick");
        }
    }

    /// Re-verify a running service under the reconfiguration lock and
    /// re-arm `next` while still holding it, so a concurrent stop always
    /// cancels after us.
    async fn verify(&self, next: AlarmKind) -> TickOutcome {
        let mut session = self.inner.session.lock().await;
        if self.lifecycle() != ServiceLifecycleState::Running {
            return TickOutcome::Skipped;
        }
        self.log_device_state();
        self.arm_session(&mut session).await;
        self.refresh_notification();
        if self.lifecycle() == ServiceLifecycleState::Running {
            self.inner.watchdog.rearm(next);
        }
        TickOutcome::Verified
    }

    async fn resurrect(&self, next: AlarmKind) -> TickOutcome {
        let mut session = self.inner.session.lock().await;
        match self.lifecycle() {
            ServiceLifecycleState::Stopped => {}
            ServiceLifecycleState::Running => {
                self.inner.watchdog.rearm(next);
                return TickOutcome::Verified;
            }
            _ => return TickOutcome::Skipped,
        }

        // A stop may have completed while this tick waited for the lock.
        if !self.intended() {
            self.inner.watchdog.cancel();
            return TickOutcome::Aborted(LivenessFailure::NoTrackingIntent);
        }

        let config = match self.inner.store.load_config() {
            Ok(Some(config)) => config,
            Ok(None) => TrackingConfig::default(),
            Err(e) => {
                tracing::warn!(error = %e, "Could not load persisted config, using defaults");
                TrackingConfig::default()
            }
        };

        let outcome = match self.start_locked(&mut session, config).await {
            Ok(true) => {
                tracing::info!("Service resurrected");
                TickOutcome::Resurrected
            }
            Ok(false) => TickOutcome::Failed,
            Err(e) => {
                tracing::warn!(error = %e, "Resurrection failed");
                TickOutcome::Failed
            }
        };
        if outcome == TickOutcome::Failed && self.intended() {
            self.inner.watchdog.rearm(next);
        }
        outcome
    }

    async fn checked_verify(&self, next: AlarmKind) -> TickOutcome {
        if let Some(outcome) = self.enforce_preconditions().await {
            return outcome;
        }
        self.verify(next).await
    }

    async fn checked_launch(&self, next: AlarmKind) -> TickOutcome {
        if let Some(outcome) = self.enforce_preconditions().await {
            return outcome;
        }
        self.resurrect(next).await
    }

    /// With strict liveness on, stop instead of resurrecting when the
    /// owning app no longer wants tracking.
    async fn enforce_preconditions(&self) -> Option<TickOutcome> {
        if !self.inner.config.strict_liveness {
            return None;
        }
        let store = self.inner.store.as_ref();
        let probe = self.inner.platform.liveness.as_ref();
        match check_preconditions(store, probe) {
            Ok(()) => None,
            Err(failure) => {
                tracing::info!(reason = %failure, "Liveness preconditions failed, stopping");
                self.stop().await;
                Some(TickOutcome::Aborted(failure))
            }
        }
    }

    fn deliver(&self, event: ForwardedEvent) {
        self.inner.sink.publish(event);
        if let Ok(mut display) = self.inner.display.lock() {
            display.label = event.label;
            display.changed_at_epoch_millis = event.timestamp;
        }
        tracing::debug!(label = %event.label, timestamp = event.timestamp, "Activity changed");
        if self.lifecycle() == ServiceLifecycleState::Running {
            self.refresh_notification();
        }
    }

    fn refresh_notification(&self) {
        let emit = self.inner.emit_notification.load(Ordering::SeqCst);
        let content = self.display_state().render(emit);
        self.inner.platform.notifications.show(&content);
    }

    fn log_device_state(&self) {
        let device = &self.inner.platform.device;
        tracing::debug!(
            idle = device.is_device_idle(),
            battery_exempt = device.is_ignoring_battery_optimizations(),
            exact_alarms = self.inner.platform.alarms.can_schedule_exact(),
            exact_alarm_granted = self.inner.gate.can_schedule_exact_alarms(),
            "Device state"
        );
    }

    fn accepting_events(&self) -> bool {
        matches!(
            self.lifecycle(),
            ServiceLifecycleState::Starting | ServiceLifecycleState::Running
        )
    }

    fn intended(&self) -> bool {
        match self.inner.store.tracking_intent() {
            Ok(intended) => intended,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read tracking intent");
                false
            }
        }
    }

    fn clear_intent(&self) {
        if let Err(e) = self.inner.store.set_tracking_intent(false) {
            tracing::warn!(error = %e, "Failed to clear tracking intent");
        }
    }

    fn persist(&self, config: &TrackingConfig) -> Result<()> {
        self.inner.store.save_config(config)?;
        self.inner.store.set_tracking_intent(true)?;
        Ok(())
    }

    fn now(&self) -> i64 {
        self.inner.platform.clock.now_epoch_millis()
    }

    /// Compare-and-set on the lifecycle.
    fn transition(&self, from: ServiceLifecycleState, to: ServiceLifecycleState) -> bool {
        let changed = self.inner.lifecycle.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if changed {
            tracing::debug!(%from, %to, "Lifecycle transition");
        }
        changed
    }

    fn set_lifecycle(&self, to: ServiceLifecycleState) {
        let from = self.inner.lifecycle.send_replace(to);
        if from != to {
            tracing::debug!(%from, %to, "Lifecycle transition");
        }
    }
}

#[async_trait]
impl ServiceLauncher for ServiceController {
    fn is_running(&self) -> bool {
        self.lifecycle() == ServiceLifecycleState::Running
    }

    async fn verify(&self, next: AlarmKind) -> TickOutcome {
        self.checked_verify(next).await
    }

    async fn launch(&self, next: AlarmKind) -> TickOutcome {
        self.checked_launch(next).await
    }
}

/// Apply a start request to a running session.
///
/// Notification visibility and the subsystem switches always follow the
/// request. Interval and threshold belong to the classification
/// registration and only change while it is not yet configured.
pub fn merge_running(
    current: Option<TrackingConfig>,
    incoming: TrackingConfig,
    classification_configured: bool,
) -> TrackingConfig {
    let Some(current) = current else {
        return incoming;
    };
    let (sample_interval_millis, confidence_threshold) = if classification_configured {
        (current.sample_interval_millis, current.confidence_threshold)
    } else {
        (incoming.sample_interval_millis, incoming.confidence_threshold)
    };
    TrackingConfig {
        emit_notification: incoming.emit_notification,
        use_transitions: incoming.use_transitions,
        use_classification: incoming.use_classification,
        sample_interval_millis,
        confidence_threshold,
    }
}
