//! Registration with the classification and transition services.
//!
//! At most one registration per API exists at a time. Arming always tears
//! down the previous registration first, including one left behind by an
//! earlier process, and every external call runs under the wake guard.

use crate::error::SubscriptionError;
use crate::platform::{ApiKind, ClassificationApi, SubscriptionHandle, TransitionApi};
use crate::wake::WakeGuard;
use sentinel_events::{TrackingConfig, TRANSITION_LABELS};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubsystemState {
    #[default]
    NotConfigured,
    Configured,
}

#[derive(Debug, Default)]
struct Slot {
    handle: Option<SubscriptionHandle>,
    state: SubsystemState,
}

pub struct SubscriptionManager {
    classification_api: Arc<dyn ClassificationApi>,
    transition_api: Arc<dyn TransitionApi>,
    wake: WakeGuard,
    call_timeout: Duration,
    classification: Slot,
    transitions: Slot,
    generation: u64,
}

impl SubscriptionManager {
    pub fn new(
        classification_api: Arc<dyn ClassificationApi>,
        transition_api: Arc<dyn TransitionApi>,
        wake: WakeGuard,
        call_timeout: Duration,
    ) -> Self {
        Self {
            classification_api,
            transition_api,
            wake,
            call_timeout,
            classification: Slot::default(),
            transitions: Slot::default(),
            generation: 0,
        }
    }

    pub fn state(&self, kind: ApiKind) -> SubsystemState {
        self.slot(kind).state
    }

    pub fn handle(&self, kind: ApiKind) -> Option<&SubscriptionHandle> {
        self.slot(kind).handle.as_ref()
    }

    /// Arm every enabled subsystem that is not yet configured.
    pub async fn arm(&mut self, config: &TrackingConfig) -> Result<(), SubscriptionError> {
        self.arm_while(config, || true).await
    }

    /// Like `arm`, but checks `keep_going` before each subsystem so a
    /// concurrent stop can cut the sequence short.
    ///
    /// Both subsystems are attempted; the first error is returned. A failed
    /// subsystem stays unconfigured so the next watchdog tick retries it.
    pub async fn arm_while<F>(
        &mut self,
        config: &TrackingConfig,
        keep_going: F,
    ) -> Result<(), SubscriptionError>
    where
        F: Fn() -> bool,
    {
        let mut first_error = None;

        if config.use_transitions && self.transitions.state == SubsystemState::NotConfigured {
            if !keep_going() {
                return Ok(());
            }
            if let Err(e) = self.arm_transitions().await {
                first_error.get_or_insert(e);
            }
        }

        if config.use_classification && self.classification.state == SubsystemState::NotConfigured
        {
            if !keep_going() {
                return first_error.map_or(Ok(()), Err);
            }
            let interval = Duration::from_millis(config.sample_interval_millis);
            if let Err(e) = self.arm_classification(interval).await {
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    pub async fn arm_transitions(&mut self) -> Result<(), SubscriptionError> {
        let previous = self.take_or_stale(ApiKind::Transitions);
        let handle = self.next_handle(ApiKind::Transitions);
        let api = self.transition_api.clone();
        let timeout = self.call_timeout;

        let result = self
            .wake
            .with_wake(async {
                if let Err(e) = bounded(timeout, api.unsubscribe(&previous)).await {
                    tracing::debug!(error = %e, "Transition teardown before arm failed");
                }
                bounded(timeout, api.subscribe(&handle, TRANSITION_LABELS)).await
            })
            .await;

        self.settle(ApiKind::Transitions, handle, result)
    }

    pub async fn arm_classification(&mut self, interval: Duration) -> Result<(), SubscriptionError> {
        let previous = self.take_or_stale(ApiKind::Classification);
        let handle = self.next_handle(ApiKind::Classification);
        let api = self.classification_api.clone();
        let timeout = self.call_timeout;

        let result = self
            .wake
            .with_wake(async {
                if let Err(e) = bounded(timeout, api.unsubscribe(&previous)).await {
                    tracing::debug!(error = %e, "Classification teardown before arm failed");
                }
                bounded(timeout, api.subscribe(&handle, interval)).await
            })
            .await;

        self.settle(ApiKind::Classification, handle, result)
    }

    /// Tear down both registrations and mark both subsystems unconfigured.
    pub async fn disarm(&mut self) {
        let transitions = self.take_or_stale(ApiKind::Transitions);
        let classification = self.take_or_stale(ApiKind::Classification);
        self.transitions.state = SubsystemState::NotConfigured;
        self.classification.state = SubsystemState::NotConfigured;

        let transition_api = self.transition_api.clone();
        let classification_api = self.classification_api.clone();
        let timeout = self.call_timeout;

        self.wake
            .with_wake(async {
                if let Err(e) = bounded(timeout, transition_api.unsubscribe(&transitions)).await {
                    tracing::warn!(error = %e, "Failed to remove transition updates");
                }
                if let Err(e) =
                    bounded(timeout, classification_api.unsubscribe(&classification)).await
                {
                    tracing::warn!(error = %e, "Failed to remove activity updates");
                }
            })
            .await;

        tracing::debug!("Recognition subscriptions disarmed");
    }

    fn settle(
        &mut self,
        kind: ApiKind,
        handle: SubscriptionHandle,
        result: Result<(), SubscriptionError>,
    ) -> Result<(), SubscriptionError> {
        let slot = self.slot_mut(kind);
        match result {
            Ok(()) => {
                tracing::info!(api = kind.as_str(), generation = handle.generation(), "Subscription armed");
                slot.handle = Some(handle);
                slot.state = SubsystemState::Configured;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(api = kind.as_str(), error = %e, "Subscription arm failed");
                slot.handle = None;
                slot.state = SubsystemState::NotConfigured;
                Err(e)
            }
        }
    }

    /// Current handle, or a fresh token that matches whatever an earlier
    /// process may have registered.
    fn take_or_stale(&mut self, kind: ApiKind) -> SubscriptionHandle {
        match self.slot_mut(kind).handle.take() {
            Some(handle) => handle,
            None => SubscriptionHandle::new(kind, 0),
        }
    }

    fn next_handle(&mut self, kind: ApiKind) -> SubscriptionHandle {
        self.generation += 1;
        SubscriptionHandle::new(kind, self.generation)
    }

    fn slot(&self, kind: ApiKind) -> &Slot {
        match kind {
            ApiKind::Classification => &self.classification,
            ApiKind::Transitions => &self.transitions,
        }
    }

    fn slot_mut(&mut self, kind: ApiKind) -> &mut Slot {
        match kind {
            ApiKind::Classification => &mut self.classification,
            ApiKind::Transitions => &mut self.transitions,
        }
    }
}

async fn bounded<F>(timeout: Duration, call: F) -> Result<(), SubscriptionError>
where
    F: Future<Output = Result<(), SubscriptionError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(SubscriptionError::TimedOut(timeout)),
    }
}
