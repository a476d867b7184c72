//! Shared contracts for the activity stream.
//!
//! Defines the labels, samples, transitions and tracking configuration that
//! flow between the engine, storage and the plugin surface, plus the
//! `EventBus` trait used to reach the single downstream consumer.

mod bus;
mod config;
mod label;
mod sample;

pub use bus::{EmittedEvent, EventBus, EventBusRef, InMemoryEventBus, NullEventBus};
pub use config::{
    ConfigError, TrackingConfig, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_SAMPLE_INTERVAL_MILLIS,
};
pub use label::{ActivityLabel, TRANSITION_LABELS};
pub use sample::{
    ActivityChangedPayload, ActivitySample, ForwardedEvent, RawTransition, TransitionEvent,
    TransitionKind,
};

/// Event names as constants to prevent typos.
pub mod event_names {
    /// Activity change delivered to the embedding application.
    pub const ACTIVITY_CHANGED: &str = "activity:changed";
}
