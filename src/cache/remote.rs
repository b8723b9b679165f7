//! Shared remote cache tier (L2).
//!
//! Any key/value service with TTL support can back L2 by implementing
//! [`RemoteStore`]. The store is independent of this process: every call
//! may fail, and callers treat failures as misses.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::entry::Ttl;
use super::memory::{MemoryTier, MemoryTierConfig};
use super::pattern::KeyPattern;
use super::CacheError;

/// A record read from the remote tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRecord {
    pub bytes: Vec<u8>,
    /// Lifetime left on the stored key, as a `PTTL`-style query reports it.
    pub ttl: Ttl,
}

/// Remote key/value store contract. Last write wins per key.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<RemoteRecord>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Keys matching a glob pattern.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError>;

    /// Delete every key matching `pattern` (`None` = all). Returns the count removed.
    async fn clear(&self, pattern: Option<&str>) -> Result<usize, CacheError> {
        let keys = self.keys(pattern.unwrap_or("*")).await?;
        let mut removed = 0;
        for key in keys {
            if self.delete(&key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Reachability check used by health checks.
    async fn ping(&self) -> Result<(), CacheError>;
}

/// In-process stand-in for a remote store.
///
/// Unbounded, supports TTL and patterns, and can be switched offline to
/// exercise unavailability handling.
pub struct InMemoryRemoteStore {
    tier: MemoryTier,
    available: AtomicBool,
    latency: Option<Duration>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            tier: MemoryTier::new(MemoryTierConfig::unbounded()),
            available: AtomicBool::new(true),
            latency: None,
        }
    }

    /// Add simulated round-trip latency to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.tier.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tier.is_empty()
    }

    /// Raw stored record, bypassing availability (for inspection in tests).
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.tier.get(key)
    }

    async fn round_trip(&self) -> Result<(), CacheError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if !self.is_available() {
            return Err(CacheError::Unavailable("remote store offline".into()));
        }
        Ok(())
    }
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn get(&self, key: &str) -> Result<Option<RemoteRecord>, CacheError> {
        self.round_trip().await?;
        Ok(self
            .tier
            .get_with_ttl(key)
            .map(|(bytes, ttl)| RemoteRecord { bytes, ttl }))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> Result<(), CacheError> {
        self.round_trip().await?;
        self.tier.set(key, value, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.round_trip().await?;
        Ok(self.tier.delete(key))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        self.round_trip().await?;
        let pattern = KeyPattern::new(pattern)?;
        Ok(self.tier.keys(Some(&pattern)))
    }

    async fn clear(&self, pattern: Option<&str>) -> Result<usize, CacheError> {
        self.round_trip().await?;
        let pattern = pattern.map(KeyPattern::new).transpose()?;
        Ok(self.tier.clear(pattern.as_ref()))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.round_trip().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_store_errors() {
        let store = InMemoryRemoteStore::new();
        store.set("k", vec![0, 1], Ttl::Never).await.unwrap();
        store.set_available(false);
        let err = store.get("k").await.unwrap_err();
        assert!(err.is_unavailable());
        assert!(store.ping().await.is_err());
        store.set_available(true);
        let record = store.get("k").await.unwrap().unwrap();
        assert_eq!(record.bytes, vec![0, 1]);
        assert_eq!(record.ttl, Ttl::Never);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_ttl_expires() {
        let store = InMemoryRemoteStore::new();
        store.set("k", vec![0], Ttl::from_secs(5)).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        let record = store.get("k").await.unwrap().unwrap();
        assert_eq!(record.ttl, Ttl::After(Duration::from_secs(3)));
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn keys_and_clear_by_pattern() {
        let store = InMemoryRemoteStore::new();
        for key in ["refine:a:1", "refine:a:2", "refine:b:1"] {
            store.set(key, vec![0], Ttl::Never).await.unwrap();
        }
        let mut keys = store.keys("refine:a:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["refine:a:1", "refine:a:2"]);
        assert_eq!(store.clear(Some("refine:a:*")).await.unwrap(), 2);
        assert_eq!(store.clear(None).await.unwrap(), 1);
        assert!(store.is_empty());
    }
}
