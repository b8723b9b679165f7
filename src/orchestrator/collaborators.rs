//! External collaborators consumed by the orchestrator.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::request::{EnhancedResult, RequestIdentity};

/// Raw content fetched from a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub content: String,
    /// Provider-assessed quality in `[0.0, 1.0]`.
    pub quality_score: f64,
    pub source_tag: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Content was already enhanced upstream.
    #[serde(default)]
    pub enhanced: bool,
}

impl Artifact {
    pub fn new(content: impl Into<String>, quality_score: f64, source_tag: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            quality_score,
            source_tag: source_tag.into(),
            metadata: BTreeMap::new(),
            enhanced: false,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AcquisitionError {
    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("Provider error: {0}")]
    Provider(String),
}

/// Source of artifacts for cache misses.
#[async_trait]
pub trait ArtifactProvider: Send + Sync {
    async fn fetch_artifact(&self, identity: &RequestIdentity) -> Result<Artifact, AcquisitionError>;
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("Durable store unavailable: {0}")]
    Unavailable(String),

    #[error("Durable store error: {0}")]
    Backend(String),
}

/// Long-lived result storage. Failures never fail a request.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn persist(&self, key: &str, result: &EnhancedResult) -> Result<(), StoreError>;

    async fn lookup(&self, key: &str) -> Result<Option<EnhancedResult>, StoreError>;
}

/// Process-local durable store, for tests and single-node setups.
pub struct InMemoryDurableStore {
    records: DashMap<String, EnhancedResult>,
    available: AtomicBool,
}

impl InMemoryDurableStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("store offline".into()))
        }
    }
}

impl Default for InMemoryDurableStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn persist(&self, key: &str, result: &EnhancedResult) -> Result<(), StoreError> {
        self.check()?;
        self.records.insert(key.to_string(), result.clone());
        Ok(())
    }

    async fn lookup(&self, key: &str) -> Result<Option<EnhancedResult>, StoreError> {
        self.check()?;
        Ok(self.records.get(key).map(|r| r.clone()))
    }
}
