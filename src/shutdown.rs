//! Graceful shutdown coordination.
//!
//! Tracks in-flight pipeline requests and drains them before the worker
//! pool and cache are torn down.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

/// Pipeline lifecycle: `Running -> Draining -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
}

impl ShutdownState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Running,
            1 => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

/// How a drain ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownResult {
    /// Every tracked request finished.
    Complete,
    /// The grace period ran out with `remaining` requests still running.
    Timeout { remaining: u32 },
}

/// Counts in-flight requests and refuses new ones once draining starts.
pub struct ShutdownCoordinator {
    state: AtomicU8,
    requests: Arc<AtomicU32>,
    drained: Arc<Notify>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ShutdownState::Running as u8),
            requests: Arc::new(AtomicU32::new(0)),
            drained: Arc::new(Notify::new()),
        }
    }

    pub fn state(&self) -> ShutdownState {
        ShutdownState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_accepting(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    /// Register a request. `None` once shutdown has begun.
    pub fn track(&self) -> Option<ShutdownGuard> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let guard = ShutdownGuard {
            requests: self.requests.clone(),
            drained: self.drained.clone(),
        };
        // Checked after the increment so a concurrent drain never misses us.
        if !self.is_accepting() {
            drop(guard);
            return None;
        }
        Some(guard)
    }

    pub fn in_flight_count(&self) -> u32 {
        self.requests.load(Ordering::SeqCst)
    }

    /// Stop accepting and wait up to `grace` for tracked requests to finish.
    pub async fn initiate(&self, grace: Duration) -> ShutdownResult {
        let first = self
            .state
            .compare_exchange(
                ShutdownState::Running as u8,
                ShutdownState::Draining as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if first {
            tracing::info!(
                in_flight = self.in_flight_count(),
                grace_ms = grace.as_millis() as u64,
                "draining requests"
            );
        }

        let result = self.drain(tokio::time::Instant::now() + grace).await;
        self.state.store(ShutdownState::Stopped as u8, Ordering::SeqCst);
        result
    }

    async fn drain(&self, deadline: tokio::time::Instant) -> ShutdownResult {
        loop {
            // Registered before the check so a guard dropped in between still wakes us.
            let woken = self.drained.notified();
            if self.in_flight_count() == 0 {
                return ShutdownResult::Complete;
            }

            tokio::select! {
                _ = woken => {}
                _ = tokio::time::sleep_until(deadline) => {
                    return match self.in_flight_count() {
                        0 => ShutdownResult::Complete,
                        remaining => ShutdownResult::Timeout { remaining },
                    };
                }
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Held by a request for its whole lifetime.
pub struct ShutdownGuard {
    requests: Arc<AtomicU32>,
    drained: Arc<Notify>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        if self.requests.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }
}
