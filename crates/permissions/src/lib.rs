//! Permission gate for activity recognition.
//!
//! Evaluates the capability grants required on the running platform
//! version (motion, location, background location, notifications, exact
//! alarms) and aggregates them into the status reported to the embedding
//! application. Reading status has no side effects; only the request flow
//! writes to the ledger.

mod capability;
mod gate;
mod provider;

pub use capability::{Capability, PermissionStatus, PlatformVersion};
pub use gate::PermissionGate;
pub use provider::{
    GrantSource, InMemoryLedger, PermissionLedger, PermissionRequester, StaticGrants,
};
