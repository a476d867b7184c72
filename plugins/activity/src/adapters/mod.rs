//! Adapters from engine traits to Tauri.

mod event_bus;

pub use event_bus::TauriEventBus;
