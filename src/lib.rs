//! Refine Core
//!
//! A concurrent enhancement pipeline: a bounded pool of worker threads runs
//! CPU-heavy text enhancement for many concurrent callers, behind a two-tier
//! cache and a request orchestrator with admission control.
//!
//! # Components
//!
//! - **Cache**: in-process L1 with TTL and oldest-first eviction, plus any
//!   shared [`cache::RemoteStore`] as L2. Records are LZ4 compressed above a
//!   size threshold.
//! - **Scheduler**: fixed-size [`scheduler::WorkerPool`] with a priority
//!   queue and crash recovery.
//! - **Orchestrator**: admission, cache-aside lookup, artifact acquisition,
//!   enhancement with fallback, and quality-based cache lifetimes.
//!
//! # Boundaries
//!
//! - Artifact providers, the enhancement engine, the remote cache and the
//!   durable store are injected through traits.
//! - Enhancement failure never fails a request; the artifact is served
//!   unenhanced instead.

pub mod backend;
pub mod cache;
pub mod config;
pub mod health;
pub mod orchestrator;
pub mod scheduler;
pub mod shutdown;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use backend::EnhancementBackend;
use cache::{CacheConfig, CacheStatsSnapshot, RemoteStore, TieredCache};
use health::{HealthChecker, HealthConfig, HealthReport};
use orchestrator::{
    ArtifactProvider, DurableStore, Orchestrator, OrchestratorConfig, OrchestratorStats,
    RequestError, RequestIdentity, RequestOptions, RequestOutcome,
};
use scheduler::{PoolError, PoolEvent, PoolStats, WorkerPool, WorkerPoolConfig};
use shutdown::ShutdownResult;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub cache: CacheConfig,
    pub pool: WorkerPoolConfig,
    pub orchestrator: OrchestratorConfig,
    pub health: HealthConfig,
    /// Default grace period for [`Pipeline::shutdown`].
    pub shutdown_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            pool: WorkerPoolConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            health: HealthConfig::default(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// External collaborators wired into a pipeline.
#[derive(Clone)]
pub struct PipelineDeps {
    pub backend: Arc<dyn EnhancementBackend>,
    pub provider: Arc<dyn ArtifactProvider>,
    pub remote: Option<Arc<dyn RemoteStore>>,
    pub durable: Option<Arc<dyn DurableStore>>,
}

impl PipelineDeps {
    pub fn new(backend: Arc<dyn EnhancementBackend>, provider: Arc<dyn ArtifactProvider>) -> Self {
        Self {
            backend,
            provider,
            remote: None,
            durable: None,
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_durable(mut self, durable: Arc<dyn DurableStore>) -> Self {
        self.durable = Some(durable);
        self
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to start worker pool: {0}")]
    Pool(#[from] PoolError),
}

/// Combined statistics of all pipeline components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStats {
    pub cache: CacheStatsSnapshot,
    pub pool: PoolStats,
    pub requests: OrchestratorStats,
}

/// The pipeline instance. Owns the cache, the worker pool and the
/// orchestrator, and tears them down in that dependency order.
pub struct Pipeline {
    config: PipelineConfig,
    cache: Arc<TieredCache>,
    pool: Arc<WorkerPool>,
    orchestrator: Arc<Orchestrator>,
    health: HealthChecker,
}

impl Pipeline {
    /// Start all components. Requires a tokio runtime.
    pub fn start(config: PipelineConfig, deps: PipelineDeps) -> Result<Self, PipelineError> {
        let cache = TieredCache::start(config.cache.clone(), deps.remote);
        let pool = Arc::new(WorkerPool::start(config.pool.clone(), deps.backend)?);
        let orchestrator = Orchestrator::start(
            config.orchestrator.clone(),
            cache.clone(),
            pool.clone(),
            deps.provider,
            deps.durable,
        );
        let health = HealthChecker::new(config.health.clone());
        tracing::info!(workers = pool.worker_count(), "pipeline started");

        Ok(Self {
            config,
            cache,
            pool,
            orchestrator,
            health,
        })
    }

    pub async fn submit_request(
        &self,
        identity: RequestIdentity,
        options: RequestOptions,
    ) -> Result<RequestOutcome, RequestError> {
        self.orchestrator.submit_request(identity, options).await
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            cache: self.cache.stats(),
            pool: self.pool.stats(),
            requests: self.orchestrator.stats(),
        }
    }

    pub async fn health_check(&self) -> HealthReport {
        let cache = self.cache.health_check().await;
        self.health.report(
            self.orchestrator.shutdown_coordinator().state(),
            cache,
            self.pool.health(),
            self.orchestrator.admission_load(),
        )
    }

    /// Worker pool notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.pool.subscribe()
    }

    /// Drain in-flight requests within `grace`, then stop the pool and the
    /// cache. Jobs still running after the drain are rejected.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownResult {
        let deadline = tokio::time::Instant::now() + grace;
        let result = self.orchestrator.shutdown(grace).await;
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        self.pool.shutdown(remaining.max(Duration::from_millis(100))).await;
        self.cache.shutdown().await;
        tracing::info!(?result, "pipeline stopped");
        result
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }
}
