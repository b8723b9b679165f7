//! Enhancement job scheduling.
//!
//! A fixed set of worker threads pulls jobs from a shared priority queue.
//! Crashed workers are replaced after a configurable delay.

mod job;
mod pool;
mod priority;
mod worker;

pub use job::{JobHandle, JobId, JobOutput, JobResult, PoolError};
pub use pool::{PoolEvent, PoolHealth, PoolStats, WorkerPool, WorkerPoolConfig, MAX_WORKERS};
pub use priority::PriorityQueue;
pub use worker::{WorkerId, WorkerReport, WorkerSlot, WorkerState, WorkerStats};
