//! Dispatch loop feeding platform callbacks into the controller.
//!
//! Alarm fires and recognition results arrive on channels. Motion events
//! are handled inline since they never block; alarm ticks run on their own
//! task so a slow subscribe call does not hold up the event stream.

use crate::controller::ServiceController;
use crate::platform::{AlarmKind, MotionEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Controls the dispatch task.
///
/// Each `start` creates a fresh token, so stop + start works.
pub struct RuntimeHandle {
    running: Arc<AtomicBool>,
    cancel_token: Mutex<CancellationToken>,
}

impl RuntimeHandle {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            cancel_token: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        if let Ok(token) = self.cancel_token.lock() {
            token.cancel();
        }
        self.running.store(false, Ordering::Release);
    }

    fn start(&self) -> (CancellationToken, Arc<AtomicBool>) {
        let token = CancellationToken::new();
        let child = token.child_token();
        if let Ok(mut slot) = self.cancel_token.lock() {
            slot.cancel();
            *slot = token;
        }
        self.running.store(true, Ordering::Release);
        (child, Arc::clone(&self.running))
    }
}

impl Default for RuntimeHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn the dispatch loop on the current tokio runtime.
pub fn start_runtime(
    controller: ServiceController,
    mut alarms: mpsc::UnboundedReceiver<AlarmKind>,
    mut motion: mpsc::UnboundedReceiver<MotionEvent>,
    handle: &RuntimeHandle,
) -> tokio::task::JoinHandle<()> {
    let (cancel_token, running_flag) = handle.start();

    tokio::spawn(async move {
        tracing::info!("Service runtime started");
        let mut events_handled = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    tracing::info!("Service runtime cancelled");
                    break;
                }
                Some(kind) = alarms.recv() => {
                    let controller = controller.clone();
                    tokio::spawn(async move {
                        let outcome = controller.on_alarm(kind).await;
                        tracing::debug!(alarm = kind.as_str(), ?outcome, "Alarm handled");
                    });
                }
                Some(event) = motion.recv() => {
                    controller.on_motion(event);
                    events_handled += 1;
                }
                else => {
                    tracing::info!("Platform channels closed, stopping runtime");
                    break;
                }
            }
        }

        running_flag.store(false, Ordering::Release);
        tracing::info!(events_handled, "Service runtime stopped");
    })
}
