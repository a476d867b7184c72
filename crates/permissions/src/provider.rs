//! Provider traits for grant state and request bookkeeping.
//!
//! Platform code implements these; the gate itself stays pure.

use crate::capability::Capability;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Current grant state as reported by the OS.
pub trait GrantSource: Send + Sync {
    /// `None` when the platform has no such capability.
    fn is_granted(&self, capability: Capability) -> Option<bool>;

    /// Whether the OS would show a rationale before asking again.
    fn should_show_rationale(&self, capability: Capability) -> bool;
}

/// Durable record of which capabilities were requested before.
pub trait PermissionLedger: Send + Sync {
    fn has_requested(&self, capability: Capability) -> bool;
    fn mark_requested(&self, capability: Capability);
}

/// The OS permission dialog, treated as a black box.
#[async_trait]
pub trait PermissionRequester: Send + Sync {
    /// Ask for the given capabilities, returning the grant per capability.
    async fn request(&self, capabilities: &[Capability]) -> HashMap<Capability, bool>;
}

/// Grant source with fixed answers, for tests and headless runs.
#[derive(Default)]
pub struct StaticGrants {
    granted: Mutex<HashMap<Capability, bool>>,
    rationale: Mutex<HashSet<Capability>>,
}

impl StaticGrants {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every capability granted.
    pub fn all_granted() -> Self {
        let grants = Self::new();
        for capability in Capability::ALL {
            grants.set(capability, true);
        }
        grants
    }

    pub fn set(&self, capability: Capability, granted: bool) {
        if let Ok(mut map) = self.granted.lock() {
            map.insert(capability, granted);
        }
    }

    pub fn set_rationale(&self, capability: Capability, show: bool) {
        if let Ok(mut set) = self.rationale.lock() {
            if show {
                set.insert(capability);
            } else {
                set.remove(&capability);
            }
        }
    }
}

impl GrantSource for StaticGrants {
    fn is_granted(&self, capability: Capability) -> Option<bool> {
        self.granted
            .lock()
            .ok()
            .map(|map| map.get(&capability).copied().unwrap_or(false))
    }

    fn should_show_rationale(&self, capability: Capability) -> bool {
        self.rationale
            .lock()
            .map(|set| set.contains(&capability))
            .unwrap_or(false)
    }
}

/// Ledger kept in memory only; forgotten on restart.
#[derive(Default)]
pub struct InMemoryLedger {
    requested: Mutex<HashSet<&'static str>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PermissionLedger for InMemoryLedger {
    fn has_requested(&self, capability: Capability) -> bool {
        self.requested
            .lock()
            .map(|set| set.contains(capability.ledger_key()))
            .unwrap_or(false)
    }

    fn mark_requested(&self, capability: Capability) {
        if let Ok(mut set) = self.requested.lock() {
            set.insert(capability.ledger_key());
        }
    }
}
