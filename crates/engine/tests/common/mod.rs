//! Controller wired to in-memory platform services.

#![allow(dead_code)]

use sentinel_engine::platform::memory::{
    InMemoryForeground, InMemoryMotion, InMemoryWakeLock, ManualAlarmScheduler, ManualClock,
    StaticDevice, StaticLiveness,
};
use sentinel_engine::{EngineConfig, Platform, ServiceController};
use sentinel_permissions::{PermissionGate, PlatformVersion, StaticGrants};
use sentinel_storage::MemoryStore;
use std::sync::Arc;
use std::time::Duration;

pub const NOW: i64 = 1_700_000_000_000;
pub const UPTIME: i64 = 3_600_000;

/// Everything the OS keeps across a process death, plus one controller.
pub struct Harness {
    pub controller: ServiceController,
    pub config: EngineConfig,
    pub motion: Arc<InMemoryMotion>,
    pub wake_lock: Arc<InMemoryWakeLock>,
    pub health_lock: Arc<InMemoryWakeLock>,
    pub alarms: Arc<ManualAlarmScheduler>,
    pub foreground: Arc<InMemoryForeground>,
    pub liveness: Arc<StaticLiveness>,
    pub grants: Arc<StaticGrants>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub device: StaticDevice,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::assemble(
            config,
            Arc::new(InMemoryMotion::new()),
            Arc::new(InMemoryWakeLock::new()),
            Arc::new(InMemoryWakeLock::new()),
            Arc::new(ManualAlarmScheduler::new()),
            Arc::new(InMemoryForeground::new()),
            Arc::new(StaticLiveness::new()),
            Arc::new(StaticGrants::all_granted()),
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(NOW, UPTIME)),
            StaticDevice::with_step_sensors(),
        )
    }

    /// A fresh process: new controller, same OS-side state.
    pub fn restart(&self) -> Harness {
        Self::assemble(
            self.config.clone(),
            self.motion.clone(),
            self.wake_lock.clone(),
            self.health_lock.clone(),
            self.alarms.clone(),
            Arc::new(InMemoryForeground::new()),
            self.liveness.clone(),
            self.grants.clone(),
            self.store.clone(),
            self.clock.clone(),
            self.device,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        config: EngineConfig,
        motion: Arc<InMemoryMotion>,
        wake_lock: Arc<InMemoryWakeLock>,
        health_lock: Arc<InMemoryWakeLock>,
        alarms: Arc<ManualAlarmScheduler>,
        foreground: Arc<InMemoryForeground>,
        liveness: Arc<StaticLiveness>,
        grants: Arc<StaticGrants>,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        device: StaticDevice,
    ) -> Self {
        let platform = Platform {
            classification: motion.clone(),
            transitions: motion.clone(),
            wake_lock: wake_lock.clone(),
            health_wake_lock: health_lock.clone(),
            alarms: alarms.clone(),
            foreground: foreground.clone(),
            notifications: foreground.clone(),
            liveness: liveness.clone(),
            device: Arc::new(device),
            clock: clock.clone(),
        };
        let gate = PermissionGate::new(PlatformVersion::TIRAMISU, grants.clone(), store.clone());
        let controller = ServiceController::new(config.clone(), platform, gate, store.clone());

        Self {
            controller,
            config,
            motion,
            wake_lock,
            health_lock,
            alarms,
            foreground,
            liveness,
            grants,
            store,
            clock,
            device,
        }
    }

    /// Let delayed wake-lock releases run.
    pub async fn settle(&self) {
        tokio::time::sleep(self.config.wake_grace() + Duration::from_millis(1)).await;
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
