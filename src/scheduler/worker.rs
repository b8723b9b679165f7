//! Worker threads and their bookkeeping.
//!
//! Each worker is a named OS thread that receives commands over a
//! `std::sync::mpsc` channel and reports back over a tokio unbounded channel
//! so the async supervisor can await events. A panic inside the backend
//! unwinds the thread; a drop guard reports the crash before it exits.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use super::job::{JobId, PoolError};
use crate::backend::{EnhanceOptions, EnhancementBackend, EnhancementError};

/// Stable worker slot identifier. A restarted worker keeps its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(pub usize);

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Starting,
    Idle,
    Busy,
    Crashed,
    Restarting,
    Terminating,
    Gone,
}

impl WorkerState {
    /// States in which the slot counts toward serving capacity.
    pub fn is_alive(self) -> bool {
        matches!(self, Self::Starting | Self::Idle | Self::Busy)
    }
}

/// Per-worker counters.
#[derive(Debug, Clone, Default)]
pub struct WorkerStats {
    pub jobs_completed: u64,
    pub errors: u64,
    pub crashes: u64,
    pub total_processing: Duration,
    pub last_used: Option<Instant>,
}

/// Serializable view of one worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerReport {
    pub id: WorkerId,
    pub generation: u64,
    pub state: WorkerState,
    pub current_job: Option<JobId>,
    pub jobs_completed: u64,
    pub errors: u64,
    pub crashes: u64,
    pub total_processing_ms: u64,
    /// Milliseconds since the worker last finished a job.
    pub idle_for_ms: Option<u64>,
}

/// Pool-side record of one worker thread.
pub struct WorkerSlot {
    id: WorkerId,
    generation: u64,
    state: WorkerState,
    current_job: Option<JobId>,
    stats: WorkerStats,
    sender: Option<mpsc::Sender<WorkerCommand>>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerSlot {
    pub(crate) fn new(id: WorkerId) -> Self {
        Self {
            id,
            generation: 0,
            state: WorkerState::Starting,
            current_job: None,
            stats: WorkerStats::default(),
            sender: None,
            thread: None,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn current_job(&self) -> Option<JobId> {
        self.current_job
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Idle with a live command channel.
    pub(crate) fn can_accept(&self) -> bool {
        self.state == WorkerState::Idle && self.sender.is_some()
    }

    pub(crate) fn set_state(&mut self, state: WorkerState) {
        self.state = state;
    }

    /// Attach a freshly spawned thread, bumping the generation.
    pub(crate) fn attach(&mut self, spawned: SpawnedWorker) {
        self.generation = spawned.generation;
        self.sender = Some(spawned.sender);
        self.thread = Some(spawned.thread);
        self.state = WorkerState::Starting;
        self.current_job = None;
    }

    /// Send a job to the thread. On failure the command is returned.
    pub(crate) fn dispatch(
        &mut self,
        job_id: JobId,
        payload: String,
        options: EnhanceOptions,
    ) -> Result<(), WorkerCommand> {
        let Some(sender) = &self.sender else {
            return Err(WorkerCommand::Run { job_id, payload, options });
        };
        sender
            .send(WorkerCommand::Run { job_id, payload, options })
            .map_err(|e| e.0)?;
        self.state = WorkerState::Busy;
        self.current_job = Some(job_id);
        Ok(())
    }

    pub(crate) fn record_completion(&mut self, elapsed: Duration, failed: bool) {
        self.stats.total_processing += elapsed;
        self.stats.last_used = Some(Instant::now());
        if failed {
            self.stats.errors += 1;
        } else {
            self.stats.jobs_completed += 1;
        }
        self.current_job = None;
    }

    /// Record a crash and drop the dead thread's channel. Returns the job it was running.
    pub(crate) fn record_crash(&mut self) -> Option<JobId> {
        self.stats.crashes += 1;
        self.stats.errors += 1;
        self.state = WorkerState::Crashed;
        self.sender = None;
        // The thread has already unwound; detach it.
        self.thread = None;
        self.current_job.take()
    }

    /// Ask the thread to exit and hand back its join handle.
    pub(crate) fn terminate(&mut self) -> Option<JoinHandle<()>> {
        self.state = WorkerState::Terminating;
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(WorkerCommand::Stop);
        }
        self.current_job = None;
        self.thread.take()
    }

    pub fn report(&self) -> WorkerReport {
        WorkerReport {
            id: self.id,
            generation: self.generation,
            state: self.state,
            current_job: self.current_job,
            jobs_completed: self.stats.jobs_completed,
            errors: self.stats.errors,
            crashes: self.stats.crashes,
            total_processing_ms: self.stats.total_processing.as_millis() as u64,
            idle_for_ms: self
                .stats
                .last_used
                .map(|t| t.elapsed().as_millis() as u64),
        }
    }
}

/// Commands sent to a worker thread.
#[derive(Debug)]
pub(crate) enum WorkerCommand {
    Run {
        job_id: JobId,
        payload: String,
        options: EnhanceOptions,
    },
    Stop,
}

/// Events reported by worker threads.
#[derive(Debug)]
pub(crate) enum WorkerEvent {
    Ready {
        worker: WorkerId,
        generation: u64,
    },
    Completed {
        worker: WorkerId,
        generation: u64,
        job_id: JobId,
        result: Result<String, EnhancementError>,
        elapsed: Duration,
    },
    Crashed {
        worker: WorkerId,
        generation: u64,
        job_id: Option<JobId>,
    },
}

pub(crate) struct SpawnedWorker {
    pub generation: u64,
    pub sender: mpsc::Sender<WorkerCommand>,
    pub thread: JoinHandle<()>,
}

/// Reports a crash if the worker thread unwinds.
struct CrashGuard {
    worker: WorkerId,
    generation: u64,
    current: Option<JobId>,
    events: UnboundedSender<WorkerEvent>,
}

impl Drop for CrashGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            let _ = self.events.send(WorkerEvent::Crashed {
                worker: self.worker,
                generation: self.generation,
                job_id: self.current,
            });
        }
    }
}

/// Spawn a worker thread for `worker` at the given generation.
pub(crate) fn spawn_worker_thread(
    worker: WorkerId,
    generation: u64,
    name_prefix: &str,
    stack_size: usize,
    backend: Arc<dyn EnhancementBackend>,
    events: UnboundedSender<WorkerEvent>,
) -> Result<SpawnedWorker, PoolError> {
    let (tx, rx) = mpsc::channel::<WorkerCommand>();

    let mut builder = thread::Builder::new().name(format!("{}-{}", name_prefix, worker.0));
    if stack_size > 0 {
        builder = builder.stack_size(stack_size);
    }

    let thread = builder
        .spawn(move || worker_loop(worker, generation, &*backend, rx, events))
        .map_err(|e| PoolError::Spawn(e.to_string()))?;

    Ok(SpawnedWorker { generation, sender: tx, thread })
}

fn worker_loop(
    worker: WorkerId,
    generation: u64,
    backend: &dyn EnhancementBackend,
    commands: mpsc::Receiver<WorkerCommand>,
    events: UnboundedSender<WorkerEvent>,
) {
    let mut guard = CrashGuard {
        worker,
        generation,
        current: None,
        events: events.clone(),
    };
    if events.send(WorkerEvent::Ready { worker, generation }).is_err() {
        return;
    }

    while let Ok(command) = commands.recv() {
        let (job_id, payload, options) = match command {
            WorkerCommand::Run { job_id, payload, options } => (job_id, payload, options),
            WorkerCommand::Stop => break,
        };

        guard.current = Some(job_id);
        let start = Instant::now();
        let result = backend.enhance(&payload, &options);
        let elapsed = start.elapsed();
        guard.current = None;

        let event = WorkerEvent::Completed { worker, generation, job_id, result, elapsed };
        if events.send(event).is_err() {
            break;
        }
    }
    tracing::trace!(%worker, generation, "worker thread exiting");
}
