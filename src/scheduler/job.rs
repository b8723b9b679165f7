//! Jobs, job handles and pool errors.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;

use super::worker::WorkerId;
use crate::backend::{EnhanceOptions, EnhancementError};

/// Unique job identifier within one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Errors delivered through a [`JobHandle`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PoolError {
    #[error("Worker pool is shutting down")]
    ShuttingDown,

    #[error("Worker {worker} crashed while running {job}")]
    WorkerCrash { worker: WorkerId, job: JobId },

    #[error("Enhancement failed: {0}")]
    Enhancement(#[from] EnhancementError),

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(String),

    #[error("Job was dropped before completion")]
    Dropped,
}

/// Successful job result.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutput {
    pub job_id: JobId,
    pub text: String,
    pub worker: WorkerId,
    /// Time spent inside the backend.
    pub elapsed: Duration,
}

pub type JobResult = Result<JobOutput, PoolError>;

/// A unit of enhancement work waiting in the pool queue.
pub(crate) struct Job {
    pub id: JobId,
    pub payload: String,
    pub options: EnhanceOptions,
    pub priority: i32,
    pub submitted_at: Instant,
    pub responder: oneshot::Sender<JobResult>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

impl Job {
    pub fn new(
        id: JobId,
        payload: String,
        options: EnhanceOptions,
        priority: i32,
    ) -> (Self, JobHandle) {
        let (tx, rx) = oneshot::channel();
        let job = Self {
            id,
            payload,
            options,
            priority,
            submitted_at: Instant::now(),
            responder: tx,
        };
        (job, JobHandle { id, rx })
    }

    /// Resolve without running. The caller may already have gone away.
    pub fn reject(self, error: PoolError) {
        let _ = self.responder.send(Err(error));
    }
}

/// Future resolving to the job's result.
///
/// Dropping the handle does not cancel the job; the pool still runs it and
/// records its statistics.
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    rx: oneshot::Receiver<JobResult>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }
}

impl Future for JobHandle {
    type Output = JobResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(PoolError::Dropped)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejected_job_resolves_with_error() {
        let (job, handle) = Job::new(JobId(7), "text".into(), EnhanceOptions::default(), 0);
        assert_eq!(handle.id(), JobId(7));
        job.reject(PoolError::ShuttingDown);
        assert_eq!(handle.await, Err(PoolError::ShuttingDown));
    }

    #[tokio::test]
    async fn dropped_job_resolves_as_dropped() {
        let (job, handle) = Job::new(JobId(1), "text".into(), EnhanceOptions::default(), 0);
        drop(job);
        assert_eq!(handle.await, Err(PoolError::Dropped));
    }

    #[test]
    fn handle_stays_pending_until_resolved() {
        let (job, handle) = Job::new(JobId(2), "text".into(), EnhanceOptions::default(), 3);
        let mut task = tokio_test::task::spawn(handle);
        tokio_test::assert_pending!(task.poll());

        let output = JobOutput {
            job_id: job.id,
            text: "TEXT".into(),
            worker: WorkerId(0),
            elapsed: Duration::from_millis(1),
        };
        let _ = job.responder.send(Ok(output.clone()));
        assert!(task.is_woken());
        assert_eq!(tokio_test::assert_ready!(task.poll()), Ok(output));
    }
}
