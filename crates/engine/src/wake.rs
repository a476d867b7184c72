//! Scoped wake-lock holds around asynchronous external calls.
//!
//! The OS lock is binary, so holds are tracked by epoch instead of a
//! reference count: every acquire bumps the epoch and only the release
//! scheduled by the newest holder takes effect. Each hold is released a
//! short grace period after its action completes, and a hard ceiling
//! forces release if the action never does.

use crate::platform::WakeLock;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct WakeGuard {
    inner: Arc<Inner>,
}

struct Inner {
    lock: Arc<dyn WakeLock>,
    grace: Duration,
    ceiling: Duration,
    epoch: AtomicU64,
    ceiling_timer: Mutex<Option<CancellationToken>>,
}

/// A live hold. Dropping it schedules the grace-period release.
#[must_use = "dropping the ticket starts the release countdown"]
pub struct WakeTicket {
    inner: Arc<Inner>,
    epoch: u64,
}

impl Drop for WakeTicket {
    fn drop(&mut self) {
        let inner = self.inner.clone();
        let epoch = self.epoch;
        let grace = inner.grace;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    tokio::time::sleep(grace).await;
                    inner.release_if_current(epoch);
                });
            }
            Err(_) => inner.release_if_current(epoch),
        }
    }
}

impl WakeGuard {
    pub fn new(lock: Arc<dyn WakeLock>, grace: Duration, ceiling: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                lock,
                grace,
                ceiling,
                epoch: AtomicU64::new(0),
                ceiling_timer: Mutex::new(None),
            }),
        }
    }

    /// Run `action` with the wake lock held.
    ///
    /// The release is scheduled whether the action succeeds, fails, or is
    /// dropped before completion.
    pub async fn with_wake<F>(&self, action: F) -> F::Output
    where
        F: Future,
    {
        let ticket = self.acquire();
        let output = action.await;
        drop(ticket);
        output
    }

    pub fn acquire(&self) -> WakeTicket {
        let inner = &self.inner;
        let epoch = inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        if !inner.lock.is_held() {
            if let Err(e) = inner.lock.acquire(inner.ceiling) {
                // Proceed without the lock; the action may still complete.
                tracing::warn!(error = %e, "Wake lock acquire failed");
            }
        }
        self.arm_ceiling(epoch);

        WakeTicket {
            inner: inner.clone(),
            epoch,
        }
    }

    /// Release immediately if held. Safe to call at any time.
    pub fn release_now(&self) {
        self.inner.cancel_ceiling();
        self.inner.release_guarded();
    }

    pub fn is_held(&self) -> bool {
        self.inner.lock.is_held()
    }

    fn arm_ceiling(&self, epoch: u64) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let token = CancellationToken::new();
        if let Ok(mut slot) = self.inner.ceiling_timer.lock() {
            if let Some(previous) = slot.replace(token.clone()) {
                previous.cancel();
            }
        }

        let inner = self.inner.clone();
        runtime.spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(inner.ceiling) => {
                    if inner.epoch.load(Ordering::SeqCst) == epoch && inner.lock.is_held() {
                        tracing::warn!(ceiling = ?inner.ceiling, "Wake lock ceiling reached, forcing release");
                    }
                    inner.release_if_current(epoch);
                }
            }
        });
    }
}

impl Inner {
    fn release_if_current(&self, epoch: u64) {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }
        self.cancel_ceiling();
        self.release_guarded();
    }

    fn cancel_ceiling(&self) {
        if let Ok(mut slot) = self.ceiling_timer.lock() {
            if let Some(token) = slot.take() {
                token.cancel();
            }
        }
    }

    fn release_guarded(&self) {
        if !self.lock.is_held() {
            return;
        }
        if let Err(e) = self.lock.release() {
            tracing::warn!(error = %e, "Wake lock release failed");
        }
    }
}
