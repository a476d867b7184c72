//! In-process platform implementations.
//!
//! The `InMemory*`, `Manual*` and `Static*` types record what the engine did
//! and let callers script failures. `TokioAlarmScheduler` is a working
//! scheduler for headless hosts: it delivers alarm fires into a channel.

use super::{
    AlarmKind, AlarmScheduler, ApiKind, ClassificationApi, Clock, DeviceFeatures, ForegroundHost,
    LivenessProbe, MotionEvent, NotificationSurface, SubscriptionHandle, TransitionApi, WakeLock,
};
use crate::error::{ForegroundError, ScheduleError, SubscriptionError, WakeLockError};
use crate::notification::NotificationContent;
use crate::watchdog::ScheduleMode;
use async_trait::async_trait;
use sentinel_events::{ActivityLabel, ActivitySample, RawTransition};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// One live registration with the recognition service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub kind: ApiKind,
    pub request_code: i32,
    pub generation: u64,
}

/// Scriptable classification and transition service.
///
/// Registrations accumulate like they do in the OS: subscribing twice
/// without tearing down leaves two live registrations.
pub struct InMemoryMotion {
    registrations: Mutex<Vec<Registration>>,
    subscribe_calls: Mutex<HashMap<ApiKind, usize>>,
    unsubscribe_calls: Mutex<HashMap<ApiKind, usize>>,
    failures: Mutex<HashMap<ApiKind, VecDeque<SubscriptionError>>>,
    current: Mutex<Option<ActivitySample>>,
    query_delay: Mutex<Option<Duration>>,
    last_interval: Mutex<Option<Duration>>,
    gate: watch::Sender<bool>,
    sink: Mutex<Option<mpsc::UnboundedSender<MotionEvent>>>,
}

impl Default for InMemoryMotion {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMotion {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            registrations: Mutex::new(Vec::new()),
            subscribe_calls: Mutex::new(HashMap::new()),
            unsubscribe_calls: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
            query_delay: Mutex::new(None),
            last_interval: Mutex::new(None),
            gate,
            sink: Mutex::new(None),
        }
    }

    /// Route delivered samples and transitions into `tx`.
    pub fn connect(&self, tx: mpsc::UnboundedSender<MotionEvent>) {
        if let Ok(mut sink) = self.sink.lock() {
            *sink = Some(tx);
        }
    }

    /// Make the next subscribe call for `kind` fail with `error`.
    pub fn fail_next_subscribe(&self, kind: ApiKind, error: SubscriptionError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.entry(kind).or_default().push_back(error);
        }
    }

    pub fn set_current(&self, sample: Option<ActivitySample>) {
        if let Ok(mut current) = self.current.lock() {
            *current = sample;
        }
    }

    pub fn set_query_delay(&self, delay: Option<Duration>) {
        if let Ok(mut slot) = self.query_delay.lock() {
            *slot = delay;
        }
    }

    /// Park subscribe calls until `release_subscribes`.
    pub fn hold_subscribes(&self) {
        self.gate.send_replace(false);
    }

    pub fn release_subscribes(&self) {
        self.gate.send_replace(true);
    }

    /// Resolves once `count` subscribe calls for `kind` have started.
    pub async fn wait_for_subscribe_calls(&self, kind: ApiKind, count: usize) {
        while self.subscribe_calls(kind) < count {
            tokio::task::yield_now().await;
        }
    }

    pub fn registrations(&self) -> Vec<Registration> {
        self.registrations
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn active(&self, kind: ApiKind) -> usize {
        self.registrations().iter().filter(|r| r.kind == kind).count()
    }

    pub fn subscribe_calls(&self, kind: ApiKind) -> usize {
        count(&self.subscribe_calls, kind)
    }

    pub fn unsubscribe_calls(&self, kind: ApiKind) -> usize {
        count(&self.unsubscribe_calls, kind)
    }

    pub fn last_interval(&self) -> Option<Duration> {
        self.last_interval.lock().ok().and_then(|i| *i)
    }

    /// Deliver a sample if a classification registration is live.
    pub fn deliver_sample(&self, sample: ActivitySample) -> bool {
        self.active(ApiKind::Classification) > 0 && self.deliver(MotionEvent::Sample(sample))
    }

    /// Deliver a transition if a transition registration is live.
    pub fn deliver_transition(&self, raw: RawTransition) -> bool {
        self.active(ApiKind::Transitions) > 0 && self.deliver(MotionEvent::Transition(raw))
    }

    fn deliver(&self, event: MotionEvent) -> bool {
        match self.sink.lock() {
            Ok(sink) => sink.as_ref().is_some_and(|tx| tx.send(event).is_ok()),
            Err(_) => false,
        }
    }

    async fn register(&self, handle: &SubscriptionHandle) -> Result<(), SubscriptionError> {
        let kind = handle.kind();
        bump(&self.subscribe_calls, kind);

        let mut gate = self.gate.subscribe();
        // Sender lives in self, so this only errors if self is gone.
        let _ = gate.wait_for(|open| *open).await;

        let failure = self
            .failures
            .lock()
            .ok()
            .and_then(|mut f| f.get_mut(&kind).and_then(|q| q.pop_front()));
        if let Some(error) = failure {
            return Err(error);
        }

        if let Ok(mut registrations) = self.registrations.lock() {
            registrations.push(Registration {
                kind,
                request_code: handle.request_code(),
                generation: handle.generation(),
            });
        }
        Ok(())
    }

    fn unregister(&self, handle: &SubscriptionHandle) {
        bump(&self.unsubscribe_calls, handle.kind());
        if let Ok(mut registrations) = self.registrations.lock() {
            registrations.retain(|r| r.request_code != handle.request_code());
        }
    }
}

fn bump(counter: &Mutex<HashMap<ApiKind, usize>>, kind: ApiKind) {
    if let Ok(mut counts) = counter.lock() {
        *counts.entry(kind).or_default() += 1;
    }
}

fn count(counter: &Mutex<HashMap<ApiKind, usize>>, kind: ApiKind) -> usize {
    counter
        .lock()
        .ok()
        .and_then(|c| c.get(&kind).copied())
        .unwrap_or(0)
}

#[async_trait]
impl ClassificationApi for InMemoryMotion {
    async fn subscribe(
        &self,
        handle: &SubscriptionHandle,
        interval: Duration,
    ) -> Result<(), SubscriptionError> {
        if let Ok(mut last) = self.last_interval.lock() {
            *last = Some(interval);
        }
        self.register(handle).await
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), SubscriptionError> {
        self.unregister(handle);
        Ok(())
    }

    async fn query_current(&self) -> Result<ActivitySample, SubscriptionError> {
        let delay = self.query_delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.current
            .lock()
            .ok()
            .and_then(|c| *c)
            .ok_or(SubscriptionError::Unavailable)
    }
}

#[async_trait]
impl TransitionApi for InMemoryMotion {
    async fn subscribe(
        &self,
        handle: &SubscriptionHandle,
        _labels: &[ActivityLabel],
    ) -> Result<(), SubscriptionError> {
        self.register(handle).await
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), SubscriptionError> {
        self.unregister(handle);
        Ok(())
    }
}

/// Wake lock that counts acquire and release calls.
#[derive(Default)]
pub struct InMemoryWakeLock {
    held: AtomicBool,
    acquires: AtomicUsize,
    releases: AtomicUsize,
    fail_acquire: AtomicBool,
    fail_release: AtomicBool,
    last_timeout: Mutex<Option<Duration>>,
}

impl InMemoryWakeLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquires(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn last_timeout(&self) -> Option<Duration> {
        self.last_timeout.lock().ok().and_then(|t| *t)
    }

    pub fn set_fail_acquire(&self, fail: bool) {
        self.fail_acquire.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_release(&self, fail: bool) {
        self.fail_release.store(fail, Ordering::SeqCst);
    }
}

impl WakeLock for InMemoryWakeLock {
    fn acquire(&self, timeout: Duration) -> Result<(), WakeLockError> {
        if self.fail_acquire.load(Ordering::SeqCst) {
            return Err(WakeLockError::AcquireFailed("scripted failure".into()));
        }
        self.acquires.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_timeout.lock() {
            *last = Some(timeout);
        }
        self.held.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self) -> Result<(), WakeLockError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.held.store(false, Ordering::SeqCst);
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(WakeLockError::ReleaseFailed("scripted failure".into()));
        }
        Ok(())
    }

    fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

/// An alarm as recorded by `ManualAlarmScheduler`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledAlarm {
    pub mode: ScheduleMode,
    pub delay: Duration,
}

/// Alarm scheduler that records requests and never fires on its own.
pub struct ManualAlarmScheduler {
    exact_allowed: AtomicBool,
    refuse_exact: AtomicBool,
    pending: Mutex<HashMap<AlarmKind, ScheduledAlarm>>,
    history: Mutex<Vec<(AlarmKind, ScheduleMode)>>,
}

impl Default for ManualAlarmScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualAlarmScheduler {
    pub fn new() -> Self {
        Self {
            exact_allowed: AtomicBool::new(true),
            refuse_exact: AtomicBool::new(false),
            pending: Mutex::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
        }
    }

    /// What `can_schedule_exact` reports.
    pub fn set_exact_allowed(&self, allowed: bool) {
        self.exact_allowed.store(allowed, Ordering::SeqCst);
    }

    /// Refuse exact requests even though `can_schedule_exact` says yes.
    pub fn set_refuse_exact(&self, refuse: bool) {
        self.refuse_exact.store(refuse, Ordering::SeqCst);
    }

    pub fn pending(&self, kind: AlarmKind) -> Option<ScheduledAlarm> {
        self.pending.lock().ok().and_then(|p| p.get(&kind).copied())
    }

    pub fn history(&self) -> Vec<(AlarmKind, ScheduleMode)> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    pub fn schedules_of(&self, kind: AlarmKind) -> usize {
        self.history().iter().filter(|(k, _)| *k == kind).count()
    }

    fn record(&self, kind: AlarmKind, mode: ScheduleMode, delay: Duration) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(kind, ScheduledAlarm { mode, delay });
        }
        if let Ok(mut history) = self.history.lock() {
            history.push((kind, mode));
        }
    }
}

impl AlarmScheduler for ManualAlarmScheduler {
    fn can_schedule_exact(&self) -> bool {
        self.exact_allowed.load(Ordering::SeqCst)
    }

    fn schedule_exact(&self, kind: AlarmKind, delay: Duration) -> Result<(), ScheduleError> {
        if self.refuse_exact.load(Ordering::SeqCst) {
            return Err(ScheduleError::ExactRefused);
        }
        self.record(kind, ScheduleMode::Exact, delay);
        Ok(())
    }

    fn schedule_inexact_repeating(
        &self,
        kind: AlarmKind,
        delay: Duration,
        _interval: Duration,
    ) -> Result<(), ScheduleError> {
        self.record(kind, ScheduleMode::InexactRepeating, delay);
        Ok(())
    }

    fn cancel(&self, kind: AlarmKind) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&kind);
        }
    }
}

/// Alarm scheduler backed by tokio timers.
///
/// Fires are sent on the channel returned by `new`; the runtime loop turns
/// them into watchdog ticks. Scheduling replaces any pending alarm of the
/// same kind.
pub struct TokioAlarmScheduler {
    tx: mpsc::UnboundedSender<AlarmKind>,
    timers: Mutex<HashMap<AlarmKind, CancellationToken>>,
    exact_allowed: AtomicBool,
}

impl TokioAlarmScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AlarmKind>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            tx,
            timers: Mutex::new(HashMap::new()),
            exact_allowed: AtomicBool::new(true),
        };
        (scheduler, rx)
    }

    pub fn set_exact_allowed(&self, allowed: bool) {
        self.exact_allowed.store(allowed, Ordering::SeqCst);
    }

    pub fn is_pending(&self, kind: AlarmKind) -> bool {
        self.timers
            .lock()
            .map(|t| t.get(&kind).is_some_and(|token| !token.is_cancelled()))
            .unwrap_or(false)
    }

    fn replace(&self, kind: AlarmKind) -> Result<CancellationToken, ScheduleError> {
        let token = CancellationToken::new();
        let mut timers = self
            .timers
            .lock()
            .map_err(|_| ScheduleError::Unavailable("timer table poisoned".into()))?;
        if let Some(previous) = timers.insert(kind, token.clone()) {
            previous.cancel();
        }
        Ok(token)
    }

    fn spawn(
        &self,
        kind: AlarmKind,
        delay: Duration,
        repeat: Option<Duration>,
    ) -> Result<(), ScheduleError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ScheduleError::Unavailable(e.to_string()))?;
        let token = self.replace(kind)?;
        let tx = self.tx.clone();

        runtime.spawn(async move {
            let mut wait = delay;
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(wait) => {}
                }
                if tx.send(kind).is_err() {
                    return;
                }
                match repeat {
                    Some(interval) => wait = interval,
                    None => return,
                }
            }
        });
        Ok(())
    }
}

impl AlarmScheduler for TokioAlarmScheduler {
    fn can_schedule_exact(&self) -> bool {
        self.exact_allowed.load(Ordering::SeqCst)
    }

    fn schedule_exact(&self, kind: AlarmKind, delay: Duration) -> Result<(), ScheduleError> {
        if !self.can_schedule_exact() {
            return Err(ScheduleError::ExactRefused);
        }
        self.spawn(kind, delay, None)
    }

    fn schedule_inexact_repeating(
        &self,
        kind: AlarmKind,
        delay: Duration,
        interval: Duration,
    ) -> Result<(), ScheduleError> {
        self.spawn(kind, delay, Some(interval))
    }

    fn cancel(&self, kind: AlarmKind) {
        if let Ok(mut timers) = self.timers.lock() {
            if let Some(token) = timers.remove(&kind) {
                token.cancel();
            }
        }
    }
}

/// Foreground host and notification surface that records what it showed.
#[derive(Default)]
pub struct InMemoryForeground {
    in_foreground: AtomicBool,
    refuse: AtomicBool,
    enters: AtomicUsize,
    shown: Mutex<Vec<NotificationContent>>,
    visible: AtomicBool,
}

impl InMemoryForeground {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn is_foreground(&self) -> bool {
        self.in_foreground.load(Ordering::SeqCst)
    }

    pub fn enters(&self) -> usize {
        self.enters.load(Ordering::SeqCst)
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    pub fn shown(&self) -> Vec<NotificationContent> {
        self.shown.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn last_shown(&self) -> Option<NotificationContent> {
        self.shown().pop()
    }
}

impl ForegroundHost for InMemoryForeground {
    fn enter_foreground(&self, content: &NotificationContent) -> Result<(), ForegroundError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ForegroundError::Refused("scripted refusal".into()));
        }
        self.enters.fetch_add(1, Ordering::SeqCst);
        self.in_foreground.store(true, Ordering::SeqCst);
        self.show(content);
        Ok(())
    }

    fn leave_foreground(&self) {
        self.in_foreground.store(false, Ordering::SeqCst);
    }
}

impl NotificationSurface for InMemoryForeground {
    fn show(&self, content: &NotificationContent) {
        self.visible.store(true, Ordering::SeqCst);
        if let Ok(mut shown) = self.shown.lock() {
            shown.push(content.clone());
        }
    }

    fn cancel(&self) {
        self.visible.store(false, Ordering::SeqCst);
    }
}

/// Liveness evidence flipped by hand.
pub struct StaticLiveness {
    owner_alive: AtomicBool,
    sibling_active: AtomicBool,
}

impl Default for StaticLiveness {
    fn default() -> Self {
        Self {
            owner_alive: AtomicBool::new(true),
            sibling_active: AtomicBool::new(true),
        }
    }
}

impl StaticLiveness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_owner_alive(&self, alive: bool) {
        self.owner_alive.store(alive, Ordering::SeqCst);
    }

    pub fn set_sibling_active(&self, active: bool) {
        self.sibling_active.store(active, Ordering::SeqCst);
    }
}

impl LivenessProbe for StaticLiveness {
    fn owner_process_alive(&self) -> bool {
        self.owner_alive.load(Ordering::SeqCst)
    }

    fn sibling_component_active(&self) -> bool {
        self.sibling_active.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StaticDevice {
    pub step_counter: bool,
    pub step_detector: bool,
    pub idle: bool,
    pub battery_exempt: bool,
}

impl StaticDevice {
    pub fn with_step_sensors() -> Self {
        Self {
            step_counter: true,
            step_detector: true,
            ..Self::default()
        }
    }
}

impl DeviceFeatures for StaticDevice {
    fn has_step_counter(&self) -> bool {
        self.step_counter
    }

    fn has_step_detector(&self) -> bool {
        self.step_detector
    }

    fn is_device_idle(&self) -> bool {
        self.idle
    }

    fn is_ignoring_battery_optimizations(&self) -> bool {
        self.battery_exempt
    }
}

/// Clock advanced by hand.
pub struct ManualClock {
    now: AtomicI64,
    uptime: AtomicI64,
}

impl ManualClock {
    pub fn new(now_epoch_millis: i64, uptime_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(now_epoch_millis),
            uptime: AtomicI64::new(uptime_millis),
        }
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
        self.uptime.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_epoch_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    fn uptime_millis(&self) -> i64 {
        self.uptime.load(Ordering::SeqCst)
    }
}
