//! Delivery of forwarded events to the single downstream consumer.

use sentinel_events::{
    event_names, ActivityChangedPayload, ActivityLabel, EventBusRef, ForwardedEvent,
};
use std::sync::Mutex;

/// What `attach` did for the new consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// The last forwarded event was replayed as the initial state.
    Replayed(ForwardedEvent),
    /// Nothing forwarded yet; the caller should query for the current state
    /// and hand it to `publish_initial`.
    NeedsInitialState,
}

/// Single-subscriber event channel.
///
/// Never blocks and never buffers more than the last event. Publishing with
/// no consumer attached drops the event but still records it for replay.
#[derive(Default)]
pub struct EventSink {
    consumer: Mutex<Option<EventBusRef>>,
    last: Mutex<Option<ForwardedEvent>>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `consumer`, replacing any previous one.
    pub fn attach(&self, consumer: EventBusRef) -> AttachOutcome {
        if let Ok(mut slot) = self.consumer.lock() {
            *slot = Some(consumer.clone());
        }

        match self.last_event() {
            Some(last) => {
                let initial = last.as_initial();
                emit(&consumer, &initial);
                AttachOutcome::Replayed(initial)
            }
            None => AttachOutcome::NeedsInitialState,
        }
    }

    pub fn detach(&self) {
        if let Ok(mut slot) = self.consumer.lock() {
            *slot = None;
        }
    }

    pub fn has_consumer(&self) -> bool {
        self.consumer.lock().map(|c| c.is_some()).unwrap_or(false)
    }

    pub fn last_event(&self) -> Option<ForwardedEvent> {
        self.last.lock().ok().and_then(|l| *l)
    }

    pub fn publish(&self, event: ForwardedEvent) {
        if let Ok(mut last) = self.last.lock() {
            *last = Some(event);
        }
        match self.current_consumer() {
            Some(consumer) => emit(&consumer, &event),
            None => tracing::debug!(label = %event.label, "No consumer attached, event dropped"),
        }
    }

    /// Deliver the state found by an on-demand query to a fresh consumer.
    ///
    /// Skipped when a real event was published in the meantime, since that
    /// consumer has already seen something newer. UNKNOWN is delivered but
    /// not remembered for later replay.
    pub fn publish_initial(&self, label: ActivityLabel, timestamp: i64) -> bool {
        let event = ForwardedEvent {
            label,
            timestamp,
            is_initial_delivery: true,
        };
        {
            let Ok(mut last) = self.last.lock() else {
                return false;
            };
            if last.is_some() {
                return false;
            }
            if label != ActivityLabel::Unknown {
                *last = Some(event);
            }
        }
        match self.current_consumer() {
            Some(consumer) => {
                emit(&consumer, &event);
                true
            }
            None => false,
        }
    }

    fn current_consumer(&self) -> Option<EventBusRef> {
        self.consumer.lock().ok().and_then(|c| c.clone())
    }
}

fn emit(consumer: &EventBusRef, event: &ForwardedEvent) {
    let payload = ActivityChangedPayload::from(event);
    match serde_json::to_value(&payload) {
        Ok(value) => consumer.emit(event_names::ACTIVITY_CHANGED, value),
        Err(e) => tracing::warn!(error = %e, "Failed to encode activity payload"),
    }
}
