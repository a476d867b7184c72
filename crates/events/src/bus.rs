//! Outbound channel to the single downstream consumer.
//!
//! The engine only ever talks to an [`EventBus`]; the plugin plugs a Tauri
//! emitter in, tests and headless runs use the recording or null bus.

use crate::event_names;
use crate::sample::ActivityChangedPayload;
use std::sync::{Arc, Mutex};

pub trait EventBus: Send + Sync {
    /// Deliver `payload` under `topic` (e.g. "activity:changed").
    fn emit(&self, topic: &str, payload: serde_json::Value);
}

pub type EventBusRef = Arc<dyn EventBus>;

/// One recorded emission.
#[derive(Debug, Clone)]
pub struct EmittedEvent {
    pub topic: String,
    pub payload: serde_json::Value,
}

/// Bus that records every emission in order.
#[derive(Default)]
pub struct InMemoryEventBus {
    log: Mutex<Vec<EmittedEvent>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EmittedEvent> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    pub fn events_for(&self, topic: &str) -> Vec<EmittedEvent> {
        self.log
            .lock()
            .map(|log| log.iter().filter(|e| e.topic == topic).cloned().collect())
            .unwrap_or_default()
    }

    /// Activity changes in delivery order. Payloads that do not decode are
    /// skipped.
    pub fn activity_changes(&self) -> Vec<ActivityChangedPayload> {
        self.events_for(event_names::ACTIVITY_CHANGED)
            .into_iter()
            .filter_map(|e| serde_json::from_value(e.payload).ok())
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut log) = self.log.lock() {
            log.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.log.lock().map(|log| log.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventBus for InMemoryEventBus {
    fn emit(&self, topic: &str, payload: serde_json::Value) {
        if let Ok(mut log) = self.log.lock() {
            log.push(EmittedEvent {
                topic: topic.to_string(),
                payload,
            });
        }
    }
}

/// Discards everything.
pub struct NullEventBus;

impl EventBus for NullEventBus {
    fn emit(&self, _topic: &str, _payload: serde_json::Value) {}
}
