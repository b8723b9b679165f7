//! The request orchestrator.
//!
//! Every request walks the same path: validate, wait for admission, try the
//! cache, try the durable store, fetch the artifact, optionally enhance it on
//! the worker pool, then populate the cache and persist. Enhancement problems
//! never fail a request; the unenhanced artifact is served instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use super::admission::{AdmissionConfig, AdmissionController};
use super::collaborators::{Artifact, ArtifactProvider, DurableStore};
use super::request::{
    EnhancedResult, FallbackReason, RequestError, RequestIdentity, RequestOptions,
    RequestOutcome, RequestPhase, ServedFrom,
};
use super::ttl::TtlPolicy;
use crate::cache::{CacheOptions, TieredCache};
use crate::health::AdmissionLoad;
use crate::scheduler::{PoolError, WorkerPool};
use crate::shutdown::{ShutdownCoordinator, ShutdownResult};
use crate::telemetry::{self, RequestSpan, SpanExt};

/// Orchestrator tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub admission: AdmissionConfig,
    /// How long a request waits for its enhancement job.
    pub enhance_timeout: Duration,
    /// Artifacts shorter than this (in characters) are not enhanced.
    pub min_content_length: usize,
    /// Artifacts at or above this quality are not enhanced.
    pub quality_threshold: f64,
    /// Added to the quality score of an enhanced result, capped at 1.0.
    pub quality_boost: f64,
    pub default_locale: String,
    pub default_priority: i32,
    pub ttl: TtlPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            admission: AdmissionConfig::default(),
            enhance_timeout: Duration::from_secs(30),
            min_content_length: 20,
            quality_threshold: 0.9,
            quality_boost: 0.15,
            default_locale: "en".to_string(),
            default_priority: 0,
            ttl: TtlPolicy::default(),
        }
    }
}

/// Point-in-time orchestrator statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorStats {
    pub queued: usize,
    pub active: usize,
    pub peak_active: usize,
    pub completed: u64,
    pub failed: u64,
    /// Requests whose caller went away before they settled.
    pub cancelled: u64,
    pub cache_hits: u64,
    pub durable_hits: u64,
    pub enhanced: u64,
    pub fallbacks: u64,
    pub avg_latency_ms: f64,
}

#[derive(Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    cache_hits: AtomicU64,
    durable_hits: AtomicU64,
    enhanced: AtomicU64,
    fallbacks: AtomicU64,
    total_latency_ms: AtomicU64,
}

/// Coordinates admission, caching, acquisition and enhancement.
pub struct Orchestrator {
    config: OrchestratorConfig,
    cache: Arc<TieredCache>,
    pool: Arc<WorkerPool>,
    provider: Arc<dyn ArtifactProvider>,
    durable: Option<Arc<dyn DurableStore>>,
    admission: AdmissionController,
    shutdown: ShutdownCoordinator,
    phases: DashMap<u64, RequestPhase>,
    next_request_id: AtomicU64,
    counters: Counters,
}

impl Orchestrator {
    /// Build the orchestrator and start admission. Requires a tokio runtime.
    pub fn start(
        config: OrchestratorConfig,
        cache: Arc<TieredCache>,
        pool: Arc<WorkerPool>,
        provider: Arc<dyn ArtifactProvider>,
        durable: Option<Arc<dyn DurableStore>>,
    ) -> Arc<Self> {
        let admission = AdmissionController::start(config.admission.clone());
        tracing::info!(
            max_concurrent = admission.config().max_concurrent,
            batch_size = admission.config().batch_size,
            durable_store = durable.is_some(),
            "orchestrator started"
        );
        Arc::new(Self {
            config,
            cache,
            pool,
            provider,
            durable,
            admission,
            shutdown: ShutdownCoordinator::new(),
            phases: DashMap::new(),
            next_request_id: AtomicU64::new(1),
            counters: Counters::default(),
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn shutdown_coordinator(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// Run one request to completion.
    ///
    /// Fails only on invalid input, acquisition failure or shutdown.
    pub async fn submit_request(
        &self,
        identity: RequestIdentity,
        options: RequestOptions,
    ) -> Result<RequestOutcome, RequestError> {
        identity.validate()?;
        let _guard = self.shutdown.track().ok_or(RequestError::ShuttingDown)?;

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let key = identity.cache_key(&self.config.default_locale);
        let span = RequestSpan::new(request_id, &key);
        let started = Instant::now();

        let in_flight = InFlight::register(&self.phases, &self.counters.cancelled, request_id);
        let result = self
            .run(request_id, &key, &identity, options, started)
            .instrument(span.clone())
            .await;
        in_flight.settle(match &result {
            Ok(_) => RequestPhase::Complete,
            Err(_) => RequestPhase::Failed,
        });

        span.record_result(&result);
        match &result {
            Ok(outcome) => {
                let latency_ms = outcome.elapsed.as_millis() as u64;
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                self.counters.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
                span.record("served_from", outcome.served_from.as_str());
                span.record("enhanced", outcome.result.enhanced);
                span.record("latency_ms", latency_ms);
                telemetry::record_request_success(&identity.source, latency_ms, outcome.served_from.as_str());
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                telemetry::record_request_failure(&identity.source, e.kind());
                tracing::warn!(parent: &span, error = %e, "request failed");
            }
        }
        result
    }

    async fn run(
        &self,
        request_id: u64,
        key: &str,
        identity: &RequestIdentity,
        options: RequestOptions,
        started: Instant,
    ) -> Result<RequestOutcome, RequestError> {
        let _permit = self
            .admission
            .acquire()
            .await
            .map_err(|_| RequestError::ShuttingDown)?;
        self.set_phase(request_id, RequestPhase::Active);

        if !options.bypass_cache {
            if let Some(result) = self.cache.get::<EnhancedResult>(key, CacheOptions::default()).await {
                self.set_phase(request_id, RequestPhase::CacheHit);
                self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("served from cache");
                return Ok(self.outcome(result, ServedFrom::Cache, None, started));
            }

            if let Some(result) = self.lookup_durable(key).await {
                self.set_phase(request_id, RequestPhase::Caching);
                self.counters.durable_hits.fetch_add(1, Ordering::Relaxed);
                self.populate_cache(key, &result).await;
                tracing::debug!("served from durable store");
                return Ok(self.outcome(result, ServedFrom::DurableStore, None, started));
            }
        }

        self.set_phase(request_id, RequestPhase::Acquiring);
        let artifact = self.provider.fetch_artifact(identity).await?;

        let (result, fallback) = if self.should_enhance(&artifact, &options) {
            self.set_phase(request_id, RequestPhase::Enhancing);
            self.enhance(key, identity, artifact, &options).await
        } else {
            (EnhancedResult::from_artifact(key, artifact), None)
        };

        self.set_phase(request_id, RequestPhase::Caching);
        self.populate_cache(key, &result).await;
        self.persist(key, &result).await;

        self.set_phase(request_id, RequestPhase::Complete);
        Ok(self.outcome(result, ServedFrom::Fresh, fallback, started))
    }

    fn should_enhance(&self, artifact: &Artifact, options: &RequestOptions) -> bool {
        options.enhance
            && !artifact.enhanced
            && artifact.content.chars().count() >= self.config.min_content_length
            && artifact.quality_score < self.config.quality_threshold
    }

    async fn enhance(
        &self,
        key: &str,
        identity: &RequestIdentity,
        artifact: Artifact,
        options: &RequestOptions,
    ) -> (EnhancedResult, Option<FallbackReason>) {
        let mut enhance_options = options.enhance_options.clone();
        if enhance_options.locale.is_none() {
            enhance_options.locale = Some(identity.locale_or(&self.config.default_locale));
        }
        let priority = options.priority.unwrap_or(self.config.default_priority);

        let outcome = match self.pool.submit(artifact.content.clone(), enhance_options, priority) {
            Ok(handle) => match tokio::time::timeout(self.config.enhance_timeout, handle).await {
                Ok(Ok(output)) => Ok(output.text),
                Ok(Err(e)) => Err(fallback_for(e)),
                // The job keeps running; its late result is discarded.
                Err(_) => Err(FallbackReason::TimedOut),
            },
            Err(e) => Err(fallback_for(e)),
        };

        match outcome {
            Ok(text) => {
                self.counters.enhanced.fetch_add(1, Ordering::Relaxed);
                let mut result = EnhancedResult::from_artifact(key, artifact);
                result.content = text;
                result.enhanced = true;
                result.quality_score = (result.quality_score + self.config.quality_boost).min(1.0);
                (result, None)
            }
            Err(reason) => {
                self.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
                telemetry::record_enhancement_fallback(reason.as_str());
                tracing::warn!(reason = %reason, "enhancement skipped, serving unenhanced artifact");
                (EnhancedResult::from_artifact(key, artifact), Some(reason))
            }
        }
    }

    async fn lookup_durable(&self, key: &str) -> Option<EnhancedResult> {
        let store = self.durable.as_ref()?;
        match store.lookup(key).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "durable store lookup failed");
                None
            }
        }
    }

    async fn populate_cache(&self, key: &str, result: &EnhancedResult) {
        let ttl = self.config.ttl.ttl_for(result);
        self.cache.set(key, result, ttl, CacheOptions::default()).await;
    }

    async fn persist(&self, key: &str, result: &EnhancedResult) {
        if let Some(store) = &self.durable {
            if let Err(e) = store.persist(key, result).await {
                tracing::warn!(error = %e, "failed to persist result");
            }
        }
    }

    fn set_phase(&self, request_id: u64, phase: RequestPhase) {
        if let Some(mut entry) = self.phases.get_mut(&request_id) {
            *entry = phase;
        }
    }

    fn outcome(
        &self,
        result: EnhancedResult,
        served_from: ServedFrom,
        fallback: Option<FallbackReason>,
        started: Instant,
    ) -> RequestOutcome {
        RequestOutcome {
            result,
            served_from,
            fallback,
            elapsed: started.elapsed(),
        }
    }

    /// Phases of requests currently in flight, by request id.
    pub fn in_flight(&self) -> Vec<(u64, RequestPhase)> {
        let mut phases: Vec<_> = self.phases.iter().map(|e| (*e.key(), *e.value())).collect();
        phases.sort_unstable_by_key(|(id, _)| *id);
        phases
    }

    pub fn admission_load(&self) -> AdmissionLoad {
        AdmissionLoad {
            queued: self.admission.queued(),
            active: self.admission.active(),
        }
    }

    pub fn stats(&self) -> OrchestratorStats {
        let completed = self.counters.completed.load(Ordering::Relaxed);
        let total_latency = self.counters.total_latency_ms.load(Ordering::Relaxed);
        OrchestratorStats {
            queued: self.admission.queued(),
            active: self.admission.active(),
            peak_active: self.admission.peak_active(),
            completed,
            failed: self.counters.failed.load(Ordering::Relaxed),
            cancelled: self.counters.cancelled.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            durable_hits: self.counters.durable_hits.load(Ordering::Relaxed),
            enhanced: self.counters.enhanced.load(Ordering::Relaxed),
            fallbacks: self.counters.fallbacks.load(Ordering::Relaxed),
            avg_latency_ms: if completed == 0 {
                0.0
            } else {
                total_latency as f64 / completed as f64
            },
        }
    }

    /// Stop accepting requests and drain in-flight ones within `grace`.
    /// Requests still waiting for admission afterwards are refused.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownResult {
        let result = self.shutdown.initiate(grace).await;
        self.admission.close().await;
        match &result {
            ShutdownResult::Complete => tracing::info!("orchestrator drained"),
            ShutdownResult::Timeout { remaining } => {
                tracing::warn!(remaining, "orchestrator drain timed out")
            }
        }
        result
    }
}

/// Entry in the in-flight phase table, removed on drop.
///
/// A request whose future is dropped before it settles is counted as
/// cancelled.
struct InFlight<'a> {
    phases: &'a DashMap<u64, RequestPhase>,
    cancelled: &'a AtomicU64,
    request_id: u64,
    settled: bool,
}

impl<'a> InFlight<'a> {
    fn register(
        phases: &'a DashMap<u64, RequestPhase>,
        cancelled: &'a AtomicU64,
        request_id: u64,
    ) -> Self {
        phases.insert(request_id, RequestPhase::Queued);
        Self {
            phases,
            cancelled,
            request_id,
            settled: false,
        }
    }

    fn settle(mut self, phase: RequestPhase) {
        self.phases.insert(self.request_id, phase);
        self.settled = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let Some((_, last)) = self.phases.remove(&self.request_id) else {
            return;
        };
        if self.settled {
            tracing::trace!(request_id = self.request_id, phase = ?last, "request settled");
        } else {
            self.cancelled.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(request_id = self.request_id, phase = ?last, "request abandoned by caller");
        }
    }
}

fn fallback_for(error: PoolError) -> FallbackReason {
    match error {
        PoolError::Enhancement(e) => FallbackReason::Failed(e.to_string()),
        PoolError::WorkerCrash { .. } => FallbackReason::Crashed,
        PoolError::ShuttingDown | PoolError::Dropped | PoolError::Spawn(_) => {
            FallbackReason::PoolUnavailable
        }
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
