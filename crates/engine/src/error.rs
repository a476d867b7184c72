//! Error types for the engine.
//!
//! Only `EngineError` crosses the public API. The others are absorbed
//! inside the component that owns the resource and logged there once.

use sentinel_events::ConfigError;
use sentinel_storage::StorageError;
use std::time::Duration;
use thiserror::Error;

/// Failure talking to the classification or transition service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    #[error("request rejected by the recognition service: {0}")]
    Rejected(String),

    #[error("permission revoked while the request was in flight")]
    PermissionRevoked,

    #[error("recognition service did not answer within {0:?}")]
    TimedOut(Duration),

    #[error("recognition service unavailable")]
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WakeLockError {
    #[error("failed to acquire wake lock: {0}")]
    AcquireFailed(String),

    #[error("failed to release wake lock: {0}")]
    ReleaseFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// Exact alarms refused by power policy; callers fall back to inexact.
    #[error("exact alarm scheduling refused by platform policy")]
    ExactRefused,

    #[error("alarm scheduling unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForegroundError {
    #[error("foreground presentation refused: {0}")]
    Refused(String),

    #[error("missing permission for foreground presentation")]
    PermissionMissing,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid tracking config: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("subscription error: {0}")]
    Subscription(#[from] SubscriptionError),

    #[error("foreground error: {0}")]
    Foreground(#[from] ForegroundError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
