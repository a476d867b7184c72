//! Example: run the engine headless against simulated motion.
//!
//! Run with: cargo run -p sentinel-engine --example simulate
//!
//! Watchdog periods are shortened so ticks are visible. Set RUST_LOG to
//! see the engine's own logging, e.g. RUST_LOG=sentinel_engine=debug.

use sentinel_engine::platform::memory::{
    InMemoryForeground, InMemoryMotion, InMemoryWakeLock, StaticDevice, TokioAlarmScheduler,
};
use sentinel_engine::{
    start_runtime, EngineConfig, NullPlatform, Platform, RuntimeHandle, ServiceController,
    SystemClock,
};
use sentinel_events::{ActivityLabel, ActivitySample, EventBus, TrackingConfig};
use sentinel_permissions::{PermissionGate, PlatformVersion, StaticGrants};
use sentinel_storage::Database;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Prints every activity change.
struct PrintBus;

impl EventBus for PrintBus {
    fn emit(&self, topic: &str, payload: serde_json::Value) {
        println!(
            "[{}] {} {}",
            chrono::Local::now().format("%H:%M:%S"),
            topic,
            payload
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,sentinel_engine=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("=== Activity Engine Simulation ===");

    let config = EngineConfig {
        liveness_period_ms: 2_000,
        health_check_period_ms: 5_000,
        ..EngineConfig::default()
    };

    let motion = Arc::new(InMemoryMotion::new());
    let (motion_tx, motion_rx) = mpsc::unbounded_channel();
    motion.connect(motion_tx);
    let (alarms, alarm_rx) = TokioAlarmScheduler::new();
    let foreground = Arc::new(InMemoryForeground::new());
    let store = Arc::new(Database::open_in_memory()?);

    let platform = Platform {
        classification: motion.clone(),
        transitions: motion.clone(),
        wake_lock: Arc::new(InMemoryWakeLock::new()),
        health_wake_lock: Arc::new(InMemoryWakeLock::new()),
        alarms: Arc::new(alarms),
        foreground: foreground.clone(),
        notifications: foreground.clone(),
        // No owning app to watch in a headless run.
        liveness: Arc::new(NullPlatform),
        device: Arc::new(StaticDevice::with_step_sensors()),
        clock: Arc::new(SystemClock::new()),
    };
    let gate = PermissionGate::new(
        PlatformVersion::TIRAMISU,
        Arc::new(StaticGrants::all_granted()),
        store.clone(),
    );
    let controller = ServiceController::new(config, platform, gate, store);

    let handle = RuntimeHandle::new();
    let runtime = start_runtime(controller.clone(), alarm_rx, motion_rx, &handle);

    println!("Available: {}", controller.is_available());
    println!("Permissions: {:?}", controller.check_permission_status());

    controller.start(TrackingConfig::default()).await?;
    controller.attach(Arc::new(PrintBus)).await;

    let script = [
        (ActivityLabel::Still, 90),
        (ActivityLabel::Still, 95),
        (ActivityLabel::Tilting, 100),
        (ActivityLabel::Walking, 40),
        (ActivityLabel::Walking, 75),
        (ActivityLabel::Running, 88),
        (ActivityLabel::InVehicle, 97),
    ];
    for (label, confidence) in script {
        let now = chrono::Utc::now().timestamp_millis();
        motion.deliver_sample(ActivitySample::new(label, confidence, now));
        tokio::time::sleep(Duration::from_millis(1_500)).await;
    }

    if let Some(content) = foreground.last_shown() {
        println!("Notification: {:?}", content.text);
    }

    println!("Stopping...");
    controller.stop().await;
    handle.stop();
    let _ = runtime.await;
    println!("Done.");
    Ok(())
}
