//! Fixed-size enhancement worker pool.
//!
//! Jobs wait in a priority queue (higher first, FIFO among equals) and are
//! handed to idle workers one at a time. A supervisor task consumes worker
//! events, resolves job futures and restarts crashed workers after
//! `restart_delay`. All bookkeeping lives under one short mutex.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::job::{Job, JobHandle, JobId, JobOutput, JobResult, PoolError};
use super::priority::PriorityQueue;
use super::worker::{
    spawn_worker_thread, WorkerEvent, WorkerId, WorkerReport, WorkerSlot, WorkerState,
};
use crate::backend::{EnhanceOptions, EnhancementBackend};
use crate::telemetry;

/// Upper bound on explicitly configured workers.
pub const MAX_WORKERS: usize = 64;

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of workers (0 = available parallelism).
    pub workers: usize,
    /// Delay before a crashed worker is replaced.
    pub restart_delay: Duration,
    pub thread_name_prefix: String,
    /// Thread stack size in bytes (0 = platform default).
    pub stack_size: usize,
    /// Buffer of the pool event broadcast channel.
    pub event_capacity: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            restart_delay: Duration::from_secs(1),
            thread_name_prefix: "refine-worker".to_string(),
            stack_size: 0,
            event_capacity: 256,
        }
    }
}

impl WorkerPoolConfig {
    pub fn with_workers(workers: usize) -> Self {
        Self { workers, ..Default::default() }
    }

    /// Worker count after auto-detection and clamping to `[1, MAX_WORKERS]`.
    pub fn effective_workers(&self) -> usize {
        let requested = if self.workers == 0 { num_cpus::get() } else { self.workers };
        requested.clamp(1, MAX_WORKERS)
    }
}

/// Pool notifications for observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PoolEvent {
    JobQueued { job: JobId, priority: i32 },
    JobStarted { job: JobId, worker: WorkerId },
    JobCompleted { job: JobId, worker: WorkerId, elapsed_ms: u64 },
    JobFailed { job: JobId, worker: Option<WorkerId>, error: String },
    WorkerReady { worker: WorkerId, generation: u64 },
    WorkerCrashed { worker: WorkerId, job: Option<JobId> },
    WorkerRestarted { worker: WorkerId, generation: u64 },
    ShuttingDown,
}

/// Point-in-time pool statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolStats {
    pub workers: Vec<WorkerReport>,
    pub queued: usize,
    pub active: usize,
    pub idle_workers: usize,
    pub busy_workers: usize,
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub crashed: u64,
    pub restarted: u64,
    /// Jobs rejected at shutdown.
    pub rejected: u64,
    /// Rolling average of backend time per job.
    pub avg_processing_ms: f64,
}

/// Pool component health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolHealth {
    pub healthy: bool,
    pub accepting: bool,
    pub total_workers: usize,
    pub alive_workers: usize,
    pub queued: usize,
    pub active: usize,
}

struct ActiveJob {
    worker: WorkerId,
    responder: oneshot::Sender<JobResult>,
}

#[derive(Default)]
struct Totals {
    submitted: u64,
    completed: u64,
    failed: u64,
    crashed: u64,
    restarted: u64,
    rejected: u64,
    avg_processing_ms: f64,
}

impl Totals {
    fn record_processing(&mut self, elapsed: Duration) {
        let sample = elapsed.as_secs_f64() * 1000.0;
        self.avg_processing_ms = if self.completed + self.failed <= 1 {
            sample
        } else {
            (self.avg_processing_ms * 9.0 + sample) / 10.0
        };
    }
}

struct PoolState {
    queue: PriorityQueue<Job>,
    active: HashMap<JobId, ActiveJob>,
    workers: Vec<WorkerSlot>,
    totals: Totals,
}

struct PoolInner {
    config: WorkerPoolConfig,
    backend: Arc<dyn EnhancementBackend>,
    state: Mutex<PoolState>,
    worker_events: UnboundedSender<WorkerEvent>,
    observers: broadcast::Sender<PoolEvent>,
    next_job_id: AtomicU64,
    accepting: AtomicBool,
    shutdown: CancellationToken,
}

/// Bounded pool of enhancement worker threads.
pub struct WorkerPool {
    inner: Arc<PoolInner>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn the workers and the supervisor task. Requires a tokio runtime.
    pub fn start(
        config: WorkerPoolConfig,
        backend: Arc<dyn EnhancementBackend>,
    ) -> Result<Self, PoolError> {
        let size = config.effective_workers();
        let (events_tx, events_rx) = unbounded_channel();
        let (observers, _) = broadcast::channel(config.event_capacity.max(1));

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let mut slot = WorkerSlot::new(WorkerId(id));
            let spawned = spawn_worker_thread(
                WorkerId(id),
                1,
                &config.thread_name_prefix,
                config.stack_size,
                backend.clone(),
                events_tx.clone(),
            );
            match spawned {
                Ok(spawned) => slot.attach(spawned),
                Err(e) => {
                    for slot in workers.iter_mut() {
                        let _ = WorkerSlot::terminate(slot);
                    }
                    return Err(e);
                }
            }
            workers.push(slot);
        }

        let inner = Arc::new(PoolInner {
            config,
            backend,
            state: Mutex::new(PoolState {
                queue: PriorityQueue::new(),
                active: HashMap::new(),
                workers,
                totals: Totals::default(),
            }),
            worker_events: events_tx,
            observers,
            next_job_id: AtomicU64::new(1),
            accepting: AtomicBool::new(true),
            shutdown: CancellationToken::new(),
        });

        let supervisor = tokio::spawn(supervise(
            Arc::downgrade(&inner),
            events_rx,
            inner.shutdown.child_token(),
        ));
        tracing::info!(workers = size, backend = inner.backend.name(), "worker pool started");

        Ok(Self { inner, supervisor: Mutex::new(Some(supervisor)) })
    }

    /// Queue a job. Higher `priority` runs sooner; 0 is the default.
    pub fn submit(
        &self,
        payload: impl Into<String>,
        options: EnhanceOptions,
        priority: i32,
    ) -> Result<JobHandle, PoolError> {
        let mut handles = self.submit_batch(vec![(payload.into(), options, priority)])?;
        handles.pop().ok_or(PoolError::Dropped)
    }

    /// Queue several jobs before any of them is dispatched.
    pub fn submit_batch(
        &self,
        jobs: Vec<(String, EnhanceOptions, i32)>,
    ) -> Result<Vec<JobHandle>, PoolError> {
        let mut state = self.inner.state.lock();
        if !self.inner.accepting.load(Ordering::SeqCst) {
            return Err(PoolError::ShuttingDown);
        }

        let mut handles = Vec::with_capacity(jobs.len());
        for (payload, options, priority) in jobs {
            let id = JobId(self.inner.next_job_id.fetch_add(1, Ordering::Relaxed));
            let (job, handle) = Job::new(id, payload, options, priority);
            state.queue.push(job, priority);
            state.totals.submitted += 1;
            self.inner.emit(PoolEvent::JobQueued { job: id, priority });
            handles.push(handle);
        }

        self.inner.dispatch_locked(&mut state);
        telemetry::record_queue_depth(state.queue.len());
        Ok(handles)
    }

    /// Receive pool events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.inner.observers.subscribe()
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::SeqCst)
    }

    pub fn worker_count(&self) -> usize {
        self.inner.state.lock().workers.len()
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        let workers: Vec<WorkerReport> = state.workers.iter().map(WorkerSlot::report).collect();
        let idle_workers = workers.iter().filter(|w| w.state == WorkerState::Idle).count();
        let busy_workers = workers.iter().filter(|w| w.state == WorkerState::Busy).count();
        let t = &state.totals;
        PoolStats {
            queued: state.queue.len(),
            active: state.active.len(),
            idle_workers,
            busy_workers,
            submitted: t.submitted,
            completed: t.completed,
            failed: t.failed,
            crashed: t.crashed,
            restarted: t.restarted,
            rejected: t.rejected,
            avg_processing_ms: t.avg_processing_ms,
            workers,
        }
    }

    /// Healthy while accepting jobs with at least one live worker.
    pub fn health(&self) -> PoolHealth {
        let state = self.inner.state.lock();
        let alive_workers = state.workers.iter().filter(|w| w.state().is_alive()).count();
        let accepting = self.is_accepting();
        PoolHealth {
            healthy: accepting && alive_workers > 0,
            accepting,
            total_workers: state.workers.len(),
            alive_workers,
            queued: state.queue.len(),
            active: state.active.len(),
        }
    }

    /// Reject queued and running jobs, stop all workers and refuse new work.
    ///
    /// Waits up to `grace` for worker threads to exit; threads still inside
    /// the backend after that are detached.
    pub async fn shutdown(&self, grace: Duration) {
        let threads = {
            let mut state = self.inner.state.lock();
            if !self.inner.accepting.swap(false, Ordering::SeqCst) {
                return;
            }

            let queued = state.queue.drain();
            let active: Vec<ActiveJob> = state.active.drain().map(|(_, a)| a).collect();
            state.totals.rejected += (queued.len() + active.len()) as u64;
            tracing::info!(
                queued = queued.len(),
                active = active.len(),
                "worker pool shutting down, rejecting outstanding jobs"
            );
            for job in queued {
                job.reject(PoolError::ShuttingDown);
            }
            for job in active {
                let _ = job.responder.send(Err(PoolError::ShuttingDown));
            }

            state
                .workers
                .iter_mut()
                .filter_map(WorkerSlot::terminate)
                .collect::<Vec<_>>()
        };
        self.inner.emit(PoolEvent::ShuttingDown);

        let join = tokio::task::spawn_blocking(move || {
            for thread in threads {
                let _ = thread.join();
            }
        });
        if tokio::time::timeout(grace, join).await.is_err() {
            tracing::warn!(
                grace_ms = grace.as_millis() as u64,
                "worker threads still busy after grace period, detaching"
            );
        }

        {
            let mut state = self.inner.state.lock();
            for slot in state.workers.iter_mut() {
                slot.set_state(WorkerState::Gone);
            }
        }

        self.inner.shutdown.cancel();
        let supervisor = self.supervisor.lock().take();
        if let Some(supervisor) = supervisor {
            let _ = supervisor.await;
        }
        tracing::info!("worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.inner.accepting.store(false, Ordering::SeqCst);
        self.inner.shutdown.cancel();
        let mut state = self.inner.state.lock();
        for slot in state.workers.iter_mut() {
            // Dropping the handle detaches the thread; it exits once idle.
            let _ = slot.terminate();
        }
    }
}

impl PoolInner {
    fn emit(&self, event: PoolEvent) {
        // No receivers is fine.
        let _ = self.observers.send(event);
    }

    /// Hand queued jobs to idle workers until either runs out.
    fn dispatch_locked(&self, state: &mut PoolState) {
        while !state.queue.is_empty() {
            let Some(idx) = state.workers.iter().position(WorkerSlot::can_accept) else {
                break;
            };
            let Some(job) = state.queue.pop() else { break };
            let Job { id, payload, options, submitted_at, responder, .. } = job;
            let worker = state.workers[idx].id();

            match state.workers[idx].dispatch(id, payload, options) {
                Ok(()) => {
                    telemetry::record_queue_wait(submitted_at.elapsed());
                    state.active.insert(id, ActiveJob { worker, responder });
                    self.emit(PoolEvent::JobStarted { job: id, worker });
                }
                Err(_) => {
                    // Receiver gone: the thread died and its crash event is on the way.
                    state.workers[idx].set_state(WorkerState::Crashed);
                    state.totals.failed += 1;
                    let error = PoolError::WorkerCrash { worker, job: id };
                    self.emit(PoolEvent::JobFailed {
                        job: id,
                        worker: Some(worker),
                        error: error.to_string(),
                    });
                    let _ = responder.send(Err(error));
                }
            }
        }
    }

    fn handle_event(self: &Arc<Self>, event: WorkerEvent) {
        match event {
            WorkerEvent::Ready { worker, generation } => self.on_ready(worker, generation),
            WorkerEvent::Completed { worker, generation, job_id, result, elapsed } => {
                let mut state = self.state.lock();
                if let Some(slot) = state.workers.get_mut(worker.0) {
                    if slot.generation() == generation {
                        slot.record_completion(elapsed, result.is_err());
                        if slot.state() == WorkerState::Busy {
                            slot.set_state(WorkerState::Idle);
                        }
                    }
                }

                let active = state.active.remove(&job_id);
                if result.is_ok() {
                    state.totals.completed += 1;
                } else {
                    state.totals.failed += 1;
                }
                state.totals.record_processing(elapsed);
                telemetry::record_job_finished(elapsed, result.is_ok());

                let (event, outcome) = match result {
                    Ok(text) => (
                        PoolEvent::JobCompleted {
                            job: job_id,
                            worker,
                            elapsed_ms: elapsed.as_millis() as u64,
                        },
                        Ok(JobOutput { job_id, text, worker, elapsed }),
                    ),
                    Err(e) => {
                        tracing::debug!(job = %job_id, %worker, error = %e, "enhancement failed");
                        (
                            PoolEvent::JobFailed {
                                job: job_id,
                                worker: Some(worker),
                                error: e.to_string(),
                            },
                            Err(PoolError::Enhancement(e)),
                        )
                    }
                };
                if let Some(active) = active {
                    // Caller may have timed out and dropped the handle.
                    let _ = active.responder.send(outcome);
                }
                self.emit(event);
                self.dispatch_locked(&mut state);
            }
            WorkerEvent::Crashed { worker, generation, job_id } => {
                self.on_crash(worker, generation, job_id)
            }
        }
    }

    fn on_ready(&self, worker: WorkerId, generation: u64) {
        let mut state = self.state.lock();
        let Some(slot) = state.workers.get_mut(worker.0) else { return };
        if slot.generation() != generation || slot.state() != WorkerState::Starting {
            return;
        }
        slot.set_state(WorkerState::Idle);
        self.emit(PoolEvent::WorkerReady { worker, generation });
        self.dispatch_locked(&mut state);
    }

    fn on_crash(self: &Arc<Self>, worker: WorkerId, generation: u64, job_id: Option<JobId>) {
        let mut state = self.state.lock();
        let running = match state.workers.get_mut(worker.0) {
            Some(slot) if slot.generation() == generation => slot.record_crash().or(job_id),
            _ => return,
        };
        state.totals.crashed += 1;
        tracing::error!(%worker, generation, job = ?running, "worker crashed");
        telemetry::record_worker_crash();

        if let Some(job) = running {
            if let Some(active) = state.active.remove(&job) {
                state.totals.failed += 1;
                let error = PoolError::WorkerCrash { worker: active.worker, job };
                self.emit(PoolEvent::JobFailed {
                    job,
                    worker: Some(worker),
                    error: error.to_string(),
                });
                let _ = active.responder.send(Err(error));
            }
        }
        self.emit(PoolEvent::WorkerCrashed { worker, job: running });

        let restart = self.accepting.load(Ordering::SeqCst);
        if let Some(slot) = state.workers.get_mut(worker.0) {
            slot.set_state(if restart { WorkerState::Restarting } else { WorkerState::Gone });
        }
        // Other idle workers can pick up whatever is queued.
        self.dispatch_locked(&mut state);
        drop(state);

        if restart {
            self.schedule_restart(worker);
        }
    }

    fn schedule_restart(self: &Arc<Self>, worker: WorkerId) {
        let pool = Arc::downgrade(self);
        let delay = self.config.restart_delay;
        let shutdown = self.shutdown.child_token();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
            if let Some(pool) = pool.upgrade() {
                pool.restart_worker(worker);
            }
        });
    }

    fn restart_worker(&self, worker: WorkerId) {
        let mut state = self.state.lock();
        if !self.accepting.load(Ordering::SeqCst) {
            return;
        }
        let Some(slot) = state.workers.get_mut(worker.0) else { return };
        if slot.state() != WorkerState::Restarting {
            return;
        }

        let generation = slot.generation() + 1;
        match spawn_worker_thread(
            worker,
            generation,
            &self.config.thread_name_prefix,
            self.config.stack_size,
            self.backend.clone(),
            self.worker_events.clone(),
        ) {
            Ok(spawned) => {
                slot.attach(spawned);
                state.totals.restarted += 1;
                tracing::info!(%worker, generation, "worker restarted");
                self.emit(PoolEvent::WorkerRestarted { worker, generation });
            }
            Err(e) => {
                slot.set_state(WorkerState::Gone);
                tracing::error!(%worker, error = %e, "failed to restart worker");
            }
        }
    }
}

/// Consume worker events until shutdown or until the pool is dropped.
async fn supervise(
    pool: Weak<PoolInner>,
    mut events: UnboundedReceiver<WorkerEvent>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        let Some(pool) = pool.upgrade() else { break };
        pool.handle_event(event);
    }
    tracing::debug!("worker pool supervisor stopped");
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
