//! Stateless receiver for the slow health-check timer.
//!
//! Runs whether or not the service is resident: restarts it when it is
//! gone and re-verifies it when it is not. The launcher re-arms the next
//! check under its own serialization, so a concurrent stop can always
//! cancel it.

use crate::platform::{AlarmKind, WakeLock};
use crate::wake::WakeGuard;
use crate::watchdog::TickOutcome;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Whatever can report on and (re)start the tracking service.
#[async_trait]
pub trait ServiceLauncher: Send + Sync {
    fn is_running(&self) -> bool;

    /// Re-verify a running service, then re-arm `next`.
    async fn verify(&self, next: AlarmKind) -> TickOutcome;

    /// Start a stopped service from persisted intent and config. `next` is
    /// re-armed if the attempt failed but should be retried.
    async fn launch(&self, next: AlarmKind) -> TickOutcome;
}

pub struct HealthCheckReceiver {
    wake: WakeGuard,
}

impl HealthCheckReceiver {
    /// `wake_timeout` bounds the hold; release is immediate on completion.
    pub fn new(wake_lock: Arc<dyn WakeLock>, wake_timeout: Duration) -> Self {
        Self {
            wake: WakeGuard::new(wake_lock, Duration::ZERO, wake_timeout),
        }
    }

    pub async fn on_receive(&self, launcher: &dyn ServiceLauncher) -> TickOutcome {
        let outcome = self
            .wake
            .with_wake(async {
                if launcher.is_running() {
                    tracing::debug!("Health check: service running");
                    launcher.verify(AlarmKind::HealthCheck).await
                } else {
                    tracing::info!("Health check: service not running, restarting");
                    launcher.launch(AlarmKind::HealthCheck).await
                }
            })
            .await;

        if let TickOutcome::Aborted(reason) = outcome {
            tracing::info!(%reason, "Health check aborted");
        }
        outcome
    }
}
