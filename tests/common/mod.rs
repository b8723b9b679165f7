//! Shared fixtures for pipeline integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use refine_core::backend::{EnhanceOptions, EnhancementError};
use refine_core::cache::{InMemoryRemoteStore, RemoteStore};
use refine_core::orchestrator::{
    AcquisitionError, AdmissionConfig, Artifact, ArtifactProvider, DurableStore,
    InMemoryDurableStore, RequestIdentity,
};
use refine_core::scheduler::WorkerPoolConfig;
use refine_core::{Pipeline, PipelineConfig, PipelineDeps};

pub const TEXT: &str = "i dont know what your talking about , lets go";

/// Provider serving the same artifact for every content id.
pub struct FixedProvider {
    pub quality: f64,
    pub fetches: AtomicUsize,
    pub missing: DashMap<String, ()>,
}

impl FixedProvider {
    pub fn new(quality: f64) -> Self {
        Self {
            quality,
            fetches: AtomicUsize::new(0),
            missing: DashMap::new(),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactProvider for FixedProvider {
    async fn fetch_artifact(&self, identity: &RequestIdentity) -> Result<Artifact, AcquisitionError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.missing.contains_key(&identity.content_id) {
            return Err(AcquisitionError::NotFound(identity.content_id.clone()));
        }
        Ok(Artifact::new(TEXT, self.quality, identity.source.clone()))
    }
}

pub fn capitalize(text: &str, _: &EnhanceOptions) -> Result<String, EnhancementError> {
    std::thread::sleep(Duration::from_millis(10));
    Ok(text.replace("dont", "don't").replace("your", "you're"))
}

pub struct Fixture {
    pub pipeline: Pipeline,
    pub provider: Arc<FixedProvider>,
    pub remote: Arc<InMemoryRemoteStore>,
    pub durable: Arc<InMemoryDurableStore>,
}

pub fn config(max_concurrent: usize) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.pool = WorkerPoolConfig {
        restart_delay: Duration::from_millis(20),
        ..WorkerPoolConfig::with_workers(2)
    };
    config.orchestrator.admission = AdmissionConfig {
        max_concurrent,
        batch_size: 2,
        tick_interval: Duration::from_millis(2),
    };
    config
}

pub fn start<F>(config: PipelineConfig, quality: f64, backend: F) -> Fixture
where
    F: Fn(&str, &EnhanceOptions) -> Result<String, EnhancementError> + Send + Sync + 'static,
{
    let provider = Arc::new(FixedProvider::new(quality));
    let remote = Arc::new(InMemoryRemoteStore::new());
    let durable = Arc::new(InMemoryDurableStore::new());
    let deps = PipelineDeps::new(Arc::new(backend), provider.clone())
        .with_remote(remote.clone() as Arc<dyn RemoteStore>)
        .with_durable(durable.clone() as Arc<dyn DurableStore>);
    let pipeline = Pipeline::start(config, deps).unwrap();
    Fixture { pipeline, provider, remote, durable }
}
