//! Watchdog ticks, health checks and cold-process resurrection.

mod common;

use common::Harness;
use sentinel_engine::{
    AlarmKind, ApiKind, EngineConfig, LivenessFailure, ScheduleMode, ServiceLifecycleState,
    SubscriptionError, SubsystemState, TickOutcome, WakeLock,
};
use sentinel_events::TrackingConfig;
use sentinel_permissions::Capability;
use sentinel_storage::IntentStore;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_tick_retries_failed_subsystem() {
    let h = Harness::new();
    h.motion
        .fail_next_subscribe(ApiKind::Classification, SubscriptionError::Unavailable);
    h.controller.start(TrackingConfig::default()).await.unwrap();
    assert_eq!(
        h.controller.subsystem_state(ApiKind::Classification).await,
        SubsystemState::NotConfigured
    );

    assert_eq!(h.controller.on_liveness_tick().await, TickOutcome::Verified);
    assert_eq!(
        h.controller.subsystem_state(ApiKind::Classification).await,
        SubsystemState::Configured
    );
    assert_eq!(h.motion.active(ApiKind::Classification), 1);
}

#[tokio::test(start_paused = true)]
async fn test_tick_skips_configured_subsystems_and_rearms() {
    let h = Harness::new();
    h.controller.start(TrackingConfig::default()).await.unwrap();
    let scheduled = h.alarms.schedules_of(AlarmKind::Liveness);

    assert_eq!(h.controller.on_liveness_tick().await, TickOutcome::Verified);
    assert_eq!(h.motion.subscribe_calls(ApiKind::Classification), 1);
    assert_eq!(h.motion.subscribe_calls(ApiKind::Transitions), 1);
    assert_eq!(h.alarms.schedules_of(AlarmKind::Liveness), scheduled + 1);
}

#[tokio::test(start_paused = true)]
async fn test_tick_rearms_even_when_setup_fails() {
    let h = Harness::new();
    h.controller.start(TrackingConfig::default()).await.unwrap();
    let cold = h.restart();
    cold.motion
        .fail_next_subscribe(ApiKind::Transitions, SubscriptionError::PermissionRevoked);
    let before = cold.alarms.schedules_of(AlarmKind::Liveness);

    assert_eq!(cold.controller.on_liveness_tick().await, TickOutcome::Resurrected);
    assert_eq!(
        cold.controller.subsystem_state(ApiKind::Transitions).await,
        SubsystemState::NotConfigured
    );
    assert!(cold.alarms.schedules_of(AlarmKind::Liveness) > before);

    let before = cold.alarms.schedules_of(AlarmKind::Liveness);
    assert_eq!(cold.controller.on_liveness_tick().await, TickOutcome::Verified);
    assert_eq!(
        cold.controller.subsystem_state(ApiKind::Transitions).await,
        SubsystemState::Configured
    );
    assert_eq!(cold.alarms.schedules_of(AlarmKind::Liveness), before + 1);
}

#[tokio::test(start_paused = true)]
async fn test_exact_refused_falls_back_to_inexact() {
    let h = Harness::new();
    h.alarms.set_exact_allowed(false);
    h.controller.start(TrackingConfig::default()).await.unwrap();
    assert_eq!(
        h.alarms.pending(AlarmKind::Liveness).map(|a| a.mode),
        Some(ScheduleMode::InexactRepeating)
    );
    assert_eq!(
        h.alarms.pending(AlarmKind::HealthCheck).map(|a| a.delay),
        Some(Duration::from_secs(30 * 60))
    );
}

#[tokio::test(start_paused = true)]
async fn test_exact_alarm_capability_is_advisory() {
    let h = Harness::new();
    assert!(h.controller.missing_advisory_capabilities().is_empty());

    h.grants.set(Capability::ExactAlarm, false);
    h.alarms.set_exact_allowed(false);
    assert_eq!(
        h.controller.missing_advisory_capabilities(),
        vec![Capability::ExactAlarm]
    );
    assert!(!h.controller.gate().can_schedule_exact_alarms());

    assert!(h.controller.start(TrackingConfig::default()).await.unwrap());
    assert_eq!(h.controller.lifecycle(), ServiceLifecycleState::Running);
    assert_eq!(
        h.alarms.pending(AlarmKind::Liveness).map(|a| a.mode),
        Some(ScheduleMode::InexactRepeating)
    );
}

#[tokio::test(start_paused = true)]
async fn test_owner_gone_aborts_and_stops() {
    let h = Harness::new();
    h.controller.start(TrackingConfig::default()).await.unwrap();
    h.liveness.set_owner_alive(false);

    assert_eq!(
        h.controller.on_liveness_tick().await,
        TickOutcome::Aborted(LivenessFailure::OwnerProcessGone)
    );
    assert_eq!(h.controller.lifecycle(), ServiceLifecycleState::Stopped);
    assert!(h.motion.registrations().is_empty());
    assert!(h.alarms.pending(AlarmKind::Liveness).is_none());
    assert!(h.alarms.pending(AlarmKind::HealthCheck).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_no_sibling_aborts_resurrection() {
    let h = Harness::new();
    h.controller.start(TrackingConfig::default()).await.unwrap();
    let cold = h.restart();
    cold.liveness.set_sibling_active(false);

    assert_eq!(
        cold.controller.on_liveness_tick().await,
        TickOutcome::Aborted(LivenessFailure::NoSiblingComponent)
    );
    assert_eq!(cold.controller.lifecycle(), ServiceLifecycleState::Stopped);
    // The orphaned registrations from the dead process are cleaned up too.
    assert!(cold.motion.registrations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_relaxed_liveness_ignores_probe() {
    let config = EngineConfig {
        strict_liveness: false,
        ..EngineConfig::default()
    };
    let h = Harness::with_config(config);
    h.controller.start(TrackingConfig::default()).await.unwrap();
    h.liveness.set_owner_alive(false);

    assert_eq!(h.controller.on_liveness_tick().await, TickOutcome::Verified);
    assert_eq!(h.controller.lifecycle(), ServiceLifecycleState::Running);
}

#[tokio::test(start_paused = true)]
async fn test_cold_process_resurrects_with_persisted_config() {
    let h = Harness::new();
    let config = TrackingConfig {
        sample_interval_millis: 5_000,
        confidence_threshold: 80,
        ..TrackingConfig::default()
    };
    h.controller.start(config).await.unwrap();

    let cold = h.restart();
    assert_eq!(cold.controller.lifecycle(), ServiceLifecycleState::Stopped);

    assert_eq!(
        cold.controller.on_alarm(AlarmKind::Liveness).await,
        TickOutcome::Resurrected
    );
    assert_eq!(cold.controller.lifecycle(), ServiceLifecycleState::Running);
    assert_eq!(cold.controller.tracking_config().await, Some(config));
    assert_eq!(cold.motion.last_interval(), Some(Duration::from_millis(5_000)));
    // Stale registrations were torn down before re-registering.
    assert_eq!(cold.motion.active(ApiKind::Classification), 1);
    assert_eq!(cold.motion.active(ApiKind::Transitions), 1);
    assert!(cold.foreground.is_foreground());
}

#[tokio::test(start_paused = true)]
async fn test_stopped_tracking_is_not_resurrected() {
    let h = Harness::new();
    h.controller.start(TrackingConfig::default()).await.unwrap();
    h.controller.stop().await;

    let cold = h.restart();
    assert_eq!(
        cold.controller.on_liveness_tick().await,
        TickOutcome::Aborted(LivenessFailure::NoTrackingIntent)
    );
    assert_eq!(cold.controller.lifecycle(), ServiceLifecycleState::Stopped);
    assert!(cold.alarms.pending(AlarmKind::Liveness).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_health_check_resurrects_and_reschedules() {
    let h = Harness::new();
    h.controller.start(TrackingConfig::default()).await.unwrap();
    let cold = h.restart();
    let scheduled = cold.alarms.schedules_of(AlarmKind::HealthCheck);

    assert_eq!(
        cold.controller.on_alarm(AlarmKind::HealthCheck).await,
        TickOutcome::Resurrected
    );
    assert_eq!(cold.controller.lifecycle(), ServiceLifecycleState::Running);
    assert!(cold.alarms.schedules_of(AlarmKind::HealthCheck) > scheduled);

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(!cold.health_lock.is_held());
    assert_eq!(cold.health_lock.acquires(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_health_check_on_running_service_verifies() {
    let h = Harness::new();
    h.controller.start(TrackingConfig::default()).await.unwrap();
    let scheduled = h.alarms.schedules_of(AlarmKind::HealthCheck);

    assert_eq!(
        h.controller.on_alarm(AlarmKind::HealthCheck).await,
        TickOutcome::Verified
    );
    assert_eq!(h.alarms.schedules_of(AlarmKind::HealthCheck), scheduled + 1);
    assert_eq!(h.foreground.enters(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_resurrection_keeps_retrying() {
    let h = Harness::new();
    h.controller.start(TrackingConfig::default()).await.unwrap();
    let cold = h.restart();
    cold.grants.set(Capability::FineLocation, false);
    cold.grants.set(Capability::CoarseLocation, false);
    let before = cold.alarms.schedules_of(AlarmKind::Liveness);

    assert_eq!(cold.controller.on_liveness_tick().await, TickOutcome::Failed);
    assert_eq!(cold.controller.lifecycle(), ServiceLifecycleState::Stopped);
    assert!(cold.store.tracking_intent().unwrap());
    assert_eq!(cold.alarms.schedules_of(AlarmKind::Liveness), before + 1);
}

#[tokio::test(start_paused = true)]
async fn test_task_removed_rearms_timers() {
    let h = Harness::new();
    h.controller.start(TrackingConfig::default()).await.unwrap();
    let before = h.alarms.schedules_of(AlarmKind::Liveness);

    h.controller.on_task_removed();
    assert_eq!(h.alarms.schedules_of(AlarmKind::Liveness), before + 1);
    assert!(h.alarms.pending(AlarmKind::HealthCheck).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_task_removed_after_stop_does_nothing() {
    let h = Harness::new();
    h.controller.start(TrackingConfig::default()).await.unwrap();
    h.controller.stop().await;

    h.controller.on_task_removed();
    assert!(h.alarms.pending(AlarmKind::Liveness).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_tick_holds_wake_lock_only_briefly() {
    let h = Harness::new();
    h.controller.start(TrackingConfig::default()).await.unwrap();
    h.settle().await;
    assert!(!h.wake_lock.is_held());

    h.controller.on_liveness_tick().await;
    h.settle().await;
    assert!(!h.wake_lock.is_held());
    assert_eq!(h.wake_lock.acquires(), h.wake_lock.releases());
}
