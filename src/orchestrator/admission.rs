//! Admission control.
//!
//! Pending requests wait in a FIFO queue. A single ticker task admits up to
//! `min(batch_size, max_concurrent - active)` of them per tick, and also
//! runs whenever a permit is released. Only the ticker increments the active
//! count, so it never exceeds `max_concurrent`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::telemetry;

const MIN_TICK: Duration = Duration::from_millis(1);

/// Admission limits.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionConfig {
    /// Maximum concurrently active requests.
    pub max_concurrent: usize,
    /// Maximum requests admitted per tick.
    pub batch_size: usize,
    pub tick_interval: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            batch_size: 5,
            tick_interval: Duration::from_millis(10),
        }
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("admission queue closed")]
pub struct AdmissionClosed;

struct Shared {
    pending: Mutex<VecDeque<oneshot::Sender<AdmissionPermit>>>,
    active: AtomicUsize,
    peak: AtomicUsize,
    admitted: AtomicUsize,
    wake: Notify,
}

/// Held for the duration of an active request. Dropping it frees the slot.
pub struct AdmissionPermit {
    shared: Arc<Shared>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        let active = self.shared.active.fetch_sub(1, Ordering::SeqCst) - 1;
        telemetry::record_active_requests(active);
        self.shared.wake.notify_one();
    }
}

/// FIFO admission gate bounded by a concurrency ceiling.
pub struct AdmissionController {
    config: AdmissionConfig,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl AdmissionController {
    /// Create the controller and start its ticker. Requires a tokio runtime.
    pub fn start(config: AdmissionConfig) -> Self {
        let config = AdmissionConfig {
            max_concurrent: config.max_concurrent.max(1),
            batch_size: config.batch_size.max(1),
            tick_interval: config.tick_interval.max(MIN_TICK),
        };
        let shared = Arc::new(Shared {
            pending: Mutex::new(VecDeque::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            admitted: AtomicUsize::new(0),
            wake: Notify::new(),
        });
        let shutdown = CancellationToken::new();
        let ticker = tokio::spawn(run_ticker(
            shared.clone(),
            config.clone(),
            shutdown.child_token(),
        ));
        Self {
            config,
            shared,
            shutdown,
            ticker: Mutex::new(Some(ticker)),
        }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Wait in line for an active slot.
    pub async fn acquire(&self) -> Result<AdmissionPermit, AdmissionClosed> {
        let (tx, rx) = oneshot::channel();
        {
            // Checked under the queue lock: `close` cancels before draining,
            // so a waiter is either refused here or drained there.
            let mut pending = self.shared.pending.lock();
            if self.shutdown.is_cancelled() {
                return Err(AdmissionClosed);
            }
            pending.push_back(tx);
        }
        rx.await.map_err(|_| AdmissionClosed)
    }

    pub fn queued(&self) -> usize {
        self.shared.pending.lock().len()
    }

    pub fn active(&self) -> usize {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Highest active count observed.
    pub fn peak_active(&self) -> usize {
        self.shared.peak.load(Ordering::SeqCst)
    }

    pub fn admitted(&self) -> usize {
        self.shared.admitted.load(Ordering::Relaxed)
    }

    /// Stop admitting. Requests still queued are refused.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let ticker = self.ticker.lock().take();
        if let Some(ticker) = ticker {
            let _ = ticker.await;
        }
        let refused: Vec<_> = self.shared.pending.lock().drain(..).collect();
        if !refused.is_empty() {
            tracing::info!(refused = refused.len(), "admission closed with requests still queued");
        }
    }
}

impl Drop for AdmissionController {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_ticker(shared: Arc<Shared>, config: AdmissionConfig, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(config.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
            () = shared.wake.notified() => {}
        }
        admit_batch(&shared, &config);
    }
}

fn admit_batch(shared: &Arc<Shared>, config: &AdmissionConfig) {
    let mut pending = shared.pending.lock();
    let mut admitted = 0;

    while admitted < config.batch_size {
        let active = shared.active.load(Ordering::SeqCst);
        if active >= config.max_concurrent {
            break;
        }
        let Some(waiter) = pending.pop_front() else { break };

        let now_active = shared.active.fetch_add(1, Ordering::SeqCst) + 1;
        shared.peak.fetch_max(now_active, Ordering::SeqCst);
        let permit = AdmissionPermit { shared: shared.clone() };
        // A requester that went away hands the permit straight back.
        if waiter.send(permit).is_ok() {
            admitted += 1;
            shared.admitted.fetch_add(1, Ordering::Relaxed);
        }
    }

    if admitted > 0 {
        telemetry::record_active_requests(shared.active.load(Ordering::SeqCst));
        tracing::trace!(admitted, queued = pending.len(), "admitted requests");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn active_never_exceeds_ceiling() {
        let controller = Arc::new(AdmissionController::start(AdmissionConfig {
            max_concurrent: 3,
            batch_size: 2,
            tick_interval: Duration::from_millis(2),
        }));

        let tasks: Vec<_> = (0..12)
            .map(|_| {
                let c = controller.clone();
                tokio::spawn(async move {
                    let _permit = c.acquire().await.unwrap();
                    assert!(c.active() <= 3);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert!(controller.peak_active() <= 3);
        assert_eq!(controller.admitted(), 12);
        assert_eq!(controller.active(), 0);
    }

    #[tokio::test]
    async fn admission_is_fifo() {
        let controller = Arc::new(AdmissionController::start(AdmissionConfig {
            max_concurrent: 1,
            batch_size: 1,
            tick_interval: Duration::from_millis(1),
        }));
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = controller.acquire().await.unwrap();
        let mut tasks = Vec::new();
        for i in 0..4 {
            let c = controller.clone();
            let order = order.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = c.acquire().await.unwrap();
                order.lock().push(i);
            }));
            // Make enqueue order deterministic.
            while controller.queued() < i + 1 {
                tokio::task::yield_now().await;
            }
        }
        drop(first);
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn close_refuses_queued_and_new_requests() {
        let controller = Arc::new(AdmissionController::start(AdmissionConfig {
            max_concurrent: 1,
            batch_size: 1,
            tick_interval: Duration::from_millis(1),
        }));
        let held = controller.acquire().await.unwrap();

        let c = controller.clone();
        let waiting = tokio::spawn(async move { c.acquire().await });
        while controller.queued() == 0 {
            tokio::task::yield_now().await;
        }

        controller.close().await;
        assert_eq!(waiting.await.unwrap().err(), Some(AdmissionClosed));
        assert!(controller.acquire().await.is_err());
        drop(held);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn acquire_racing_close_always_resolves() {
        for _ in 0..50 {
            let controller = Arc::new(AdmissionController::start(AdmissionConfig {
                max_concurrent: 1,
                batch_size: 1,
                tick_interval: Duration::from_millis(1),
            }));
            let held = controller.acquire().await.unwrap();

            let racers: Vec<_> = (0..4)
                .map(|_| {
                    let c = controller.clone();
                    tokio::spawn(async move { c.acquire().await })
                })
                .collect();
            controller.close().await;

            for racer in racers {
                let resolved = tokio::time::timeout(Duration::from_secs(2), racer).await;
                let outcome = resolved.expect("acquire hung after close").unwrap();
                assert_eq!(outcome.err(), Some(AdmissionClosed));
            }
            drop(held);
        }
    }
}
