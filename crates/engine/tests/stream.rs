//! Activity stream from platform callbacks to the attached consumer.

mod common;

use common::{Harness, NOW, UPTIME};
use sentinel_engine::{EngineConfig, NotificationChannel};
use sentinel_events::{
    ActivityChangedPayload, ActivityLabel, ActivitySample, InMemoryEventBus,
    RawTransition, TrackingConfig, TransitionKind,
};
use std::sync::Arc;
use std::time::Duration;

fn payloads(bus: &InMemoryEventBus) -> Vec<ActivityChangedPayload> {
    bus.activity_changes()
}

fn sample(label: ActivityLabel, confidence: u8, at: i64) -> ActivitySample {
    ActivitySample::new(label, confidence, at)
}

fn enter(label: ActivityLabel, elapsed_millis: i64) -> RawTransition {
    RawTransition {
        activity_code: label.code(),
        kind: TransitionKind::Enter,
        elapsed_realtime_nanos: elapsed_millis * 1_000_000,
    }
}

#[tokio::test(start_paused = true)]
async fn test_samples_filtered_before_delivery() {
    let h = Harness::new();
    h.motion.set_current(Some(sample(ActivityLabel::Still, 90, NOW)));
    h.controller.start(TrackingConfig::default()).await.unwrap();

    let bus = Arc::new(InMemoryEventBus::new());
    h.controller.attach(bus.clone()).await;
    bus.clear();

    for s in [
        sample(ActivityLabel::Still, 90, NOW + 1),
        sample(ActivityLabel::Still, 95, NOW + 2),
        sample(ActivityLabel::Walking, 40, NOW + 3),
        sample(ActivityLabel::Walking, 70, NOW + 4),
    ] {
        h.controller.on_sample(s);
    }

    let delivered = payloads(&bus);
    let labels: Vec<_> = delivered.iter().map(|p| p.activity.as_str()).collect();
    assert_eq!(labels, vec!["STILL", "WALKING"]);
    assert!(delivered[0].is_initial_state);
    assert!(!delivered[1].is_initial_state);
    assert_eq!(delivered[1].timestamp, NOW + 4);
}

#[tokio::test(start_paused = true)]
async fn test_transitions_deduplicated_with_wall_clock_time() {
    let h = Harness::new();
    h.controller.start(TrackingConfig::default()).await.unwrap();
    let bus = Arc::new(InMemoryEventBus::new());
    h.controller.attach(bus.clone()).await;
    bus.clear();

    h.controller.on_transition(enter(ActivityLabel::InVehicle, UPTIME - 60_000));
    h.controller.on_transition(enter(ActivityLabel::InVehicle, UPTIME - 30_000));
    h.controller.on_transition(enter(ActivityLabel::Still, UPTIME - 1_000));

    let delivered = payloads(&bus);
    let labels: Vec<_> = delivered.iter().map(|p| p.activity.as_str()).collect();
    assert_eq!(labels, vec!["IN_VEHICLE", "STILL"]);
    assert_eq!(delivered[0].timestamp, NOW - 60_000);
    assert_eq!(delivered[1].timestamp, NOW - 1_000);
}

#[tokio::test(start_paused = true)]
async fn test_exit_transitions_and_tilting_never_delivered() {
    let h = Harness::new();
    h.controller.start(TrackingConfig::default()).await.unwrap();

    let exit = RawTransition {
        kind: TransitionKind::Exit,
        ..enter(ActivityLabel::Walking, UPTIME)
    };
    assert!(h.controller.on_transition(exit).is_none());
    assert!(h
        .controller
        .on_sample(sample(ActivityLabel::Tilting, 100, NOW))
        .is_none());
    assert!(h.controller.last_event().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_tilting_transition_never_delivered() {
    let h = Harness::new();
    h.controller.start(TrackingConfig::default()).await.unwrap();
    let bus = Arc::new(InMemoryEventBus::new());
    h.controller.attach(bus.clone()).await;
    bus.clear();

    assert!(h
        .controller
        .on_transition(enter(ActivityLabel::Tilting, UPTIME))
        .is_none());
    assert!(payloads(&bus).is_empty());
    assert!(h.controller.stream_state().last_forwarded_label.is_none());

    let still = h
        .controller
        .on_transition(enter(ActivityLabel::Still, UPTIME))
        .unwrap();
    assert_eq!(still.label, ActivityLabel::Still);
    assert!(still.is_initial_delivery);
}

#[tokio::test(start_paused = true)]
async fn test_events_dropped_while_stopped() {
    let h = Harness::new();
    assert!(h
        .controller
        .on_sample(sample(ActivityLabel::Running, 99, NOW))
        .is_none());

    h.controller.start(TrackingConfig::default()).await.unwrap();
    h.controller.stop().await;
    assert!(h
        .controller
        .on_sample(sample(ActivityLabel::Running, 99, NOW))
        .is_none());
    assert!(h.controller.stream_state().last_forwarded_label.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_threshold_from_config_applies() {
    let h = Harness::new();
    let strict = TrackingConfig {
        confidence_threshold: 90,
        ..TrackingConfig::default()
    };
    h.controller.start(strict).await.unwrap();
    assert!(h
        .controller
        .on_sample(sample(ActivityLabel::Walking, 85, NOW))
        .is_none());
    assert!(h
        .controller
        .on_sample(sample(ActivityLabel::Walking, 90, NOW))
        .is_some());
}

#[tokio::test(start_paused = true)]
async fn test_attach_replays_last_event() {
    let h = Harness::new();
    h.controller.start(TrackingConfig::default()).await.unwrap();
    h.controller
        .on_sample(sample(ActivityLabel::Running, 80, NOW));
    h.controller
        .on_sample(sample(ActivityLabel::OnBicycle, 80, NOW + 10));

    let bus = Arc::new(InMemoryEventBus::new());
    h.controller.attach(bus.clone()).await;

    let delivered = payloads(&bus);
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].activity, "ON_BICYCLE");
    assert_eq!(delivered[0].timestamp, NOW + 10);
    assert!(delivered[0].is_initial_state);
}

#[tokio::test(start_paused = true)]
async fn test_cold_attach_queries_current_activity() {
    let h = Harness::new();
    h.motion.set_current(Some(sample(ActivityLabel::Walking, 55, NOW - 500)));

    let bus = Arc::new(InMemoryEventBus::new());
    h.controller.attach(bus.clone()).await;

    let delivered = payloads(&bus);
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].activity, "WALKING");
    assert_eq!(delivered[0].timestamp, NOW - 500);
    assert!(delivered[0].is_initial_state);
    assert_eq!(
        h.controller.last_event().map(|e| e.label),
        Some(ActivityLabel::Walking)
    );
}

#[tokio::test(start_paused = true)]
async fn test_cold_attach_result_counts_as_delivered() {
    let h = Harness::new();
    h.controller.start(TrackingConfig::default()).await.unwrap();
    h.motion.set_current(Some(sample(ActivityLabel::Still, 90, NOW)));

    let bus = Arc::new(InMemoryEventBus::new());
    h.controller.attach(bus.clone()).await;
    assert!(h
        .controller
        .on_sample(sample(ActivityLabel::Still, 90, NOW + 1_000))
        .is_none());
    let walking = h
        .controller
        .on_sample(sample(ActivityLabel::Walking, 90, NOW + 2_000))
        .unwrap();

    let delivered: Vec<_> = payloads(&bus)
        .into_iter()
        .map(|p| (p.activity, p.is_initial_state))
        .collect();
    assert_eq!(
        delivered,
        vec![("STILL".to_string(), true), ("WALKING".to_string(), false)]
    );
    assert!(!walking.is_initial_delivery);
}

#[tokio::test(start_paused = true)]
async fn test_cold_attach_unknown_does_not_suppress_first_sample() {
    let h = Harness::new();
    h.controller.start(TrackingConfig::default()).await.unwrap();
    let bus = Arc::new(InMemoryEventBus::new());
    h.controller.attach(bus.clone()).await;

    let first = h
        .controller
        .on_sample(sample(ActivityLabel::Still, 90, NOW + 1_000))
        .unwrap();
    assert!(first.is_initial_delivery);
    assert_eq!(payloads(&bus).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cold_attach_falls_back_to_unknown() {
    let h = Harness::new();
    let bus = Arc::new(InMemoryEventBus::new());
    h.controller.attach(bus.clone()).await;

    let delivered = payloads(&bus);
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].activity, "UNKNOWN");
    assert_eq!(delivered[0].timestamp, NOW);
    assert!(h.controller.last_event().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_slow_initial_query_times_out() {
    let config = EngineConfig {
        initial_query_timeout_ms: 2_000,
        ..EngineConfig::default()
    };
    let h = Harness::with_config(config);
    h.motion.set_current(Some(sample(ActivityLabel::Still, 99, NOW)));
    h.motion.set_query_delay(Some(Duration::from_secs(60)));

    let bus = Arc::new(InMemoryEventBus::new());
    h.controller.attach(bus.clone()).await;
    assert_eq!(payloads(&bus)[0].activity, "UNKNOWN");
}

#[tokio::test(start_paused = true)]
async fn test_tilting_query_result_reported_as_unknown() {
    let h = Harness::new();
    h.motion.set_current(Some(sample(ActivityLabel::Tilting, 99, NOW)));
    let bus = Arc::new(InMemoryEventBus::new());
    h.controller.attach(bus.clone()).await;
    assert_eq!(payloads(&bus)[0].activity, "UNKNOWN");
}

#[tokio::test(start_paused = true)]
async fn test_detached_consumer_receives_nothing() {
    let h = Harness::new();
    h.controller.start(TrackingConfig::default()).await.unwrap();
    let bus = Arc::new(InMemoryEventBus::new());
    h.controller.attach(bus.clone()).await;
    bus.clear();
    h.controller.detach();

    assert!(h
        .controller
        .on_sample(sample(ActivityLabel::Running, 90, NOW))
        .is_some());
    assert!(bus.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_notification_tracks_current_activity() {
    let h = Harness::new();
    h.controller.start(TrackingConfig::default()).await.unwrap();
    h.controller
        .on_sample(sample(ActivityLabel::Running, 90, NOW));

    let shown = h.foreground.last_shown().unwrap();
    assert_eq!(shown.channel, NotificationChannel::Standard);
    assert!(shown.text.unwrap().starts_with("RUNNING ("));
    assert_eq!(h.controller.display_state().label, ActivityLabel::Running);
}

#[tokio::test(start_paused = true)]
async fn test_silent_notification_carries_no_activity() {
    let h = Harness::new();
    let silent = TrackingConfig {
        emit_notification: false,
        ..TrackingConfig::default()
    };
    h.controller.start(silent).await.unwrap();
    h.controller
        .on_sample(sample(ActivityLabel::Running, 90, NOW));

    let shown = h.foreground.last_shown().unwrap();
    assert_eq!(shown.channel, NotificationChannel::Silent);
    assert!(shown.title.is_none());
}
