//! Tiered cache manager.
//!
//! Presents one façade over the in-process L1 tier and the optional remote
//! L2 tier:
//!
//! - reads check L1, then L2; an L2 hit is promoted into L1 for the shorter of
//!   `promotion_ttl` and the remote key's remaining lifetime
//! - writes go to L1 synchronously and to L2 best-effort
//! - records above the compression threshold are stored LZ4-compressed
//! - L2 failures and corrupt records degrade to misses, never errors

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::codec::RecordCodec;
use super::entry::Ttl;
use super::memory::{MemoryTier, MemoryTierConfig};
use super::pattern::KeyPattern;
use super::remote::RemoteStore;
use super::stats::{CacheStats, CacheStatsSnapshot};
use super::CacheError;
use crate::telemetry;

/// Cache tier identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheTier {
    /// In-process, bounded.
    L1,
    /// Shared remote store.
    L2,
}

impl CacheTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTier::L1 => "l1",
            CacheTier::L2 => "l2",
        }
    }
}

impl std::fmt::Display for CacheTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheTier::L1 => write!(f, "L1 (memory)"),
            CacheTier::L2 => write!(f, "L2 (remote)"),
        }
    }
}

/// Per-call tier selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    pub use_l1: bool,
    pub use_l2: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self { use_l1: true, use_l2: true }
    }
}

impl CacheOptions {
    pub fn l1_only() -> Self {
        Self { use_l1: true, use_l2: false }
    }

    pub fn l2_only() -> Self {
        Self { use_l1: false, use_l2: true }
    }
}

/// Tiered cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub l1: MemoryTierConfig,
    /// Use the remote tier when one is supplied.
    pub l2_enabled: bool,
    /// TTL given to L2 hits copied into L1.
    pub promotion_ttl: Duration,
    /// Serialized size (bytes) above which records are compressed.
    pub compression_threshold: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1: MemoryTierConfig::default(),
            l2_enabled: true,
            promotion_ttl: Duration::from_secs(300),
            compression_threshold: 1024,
        }
    }
}

/// Outcome of a cache write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    pub compressed: bool,
    /// Size of the stored record in bytes.
    pub stored_bytes: usize,
    /// Size of the plain JSON serialization in bytes.
    pub raw_bytes: usize,
    pub l2_written: bool,
}

/// Reachability of the remote tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum L2Status {
    Disabled,
    Reachable,
    Unreachable,
}

/// Cache component health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheHealth {
    pub healthy: bool,
    pub l1_entries: usize,
    pub l1_capacity: usize,
    pub l1_below_capacity: bool,
    pub l2: L2Status,
}

impl CacheHealth {
    /// L1 alone can still serve traffic.
    pub fn can_serve(&self) -> bool {
        self.l1_capacity > 0
    }
}

/// Two-level cache façade.
pub struct TieredCache {
    l1: Arc<MemoryTier>,
    l2: Option<Arc<dyn RemoteStore>>,
    codec: RecordCodec,
    config: CacheConfig,
    stats: CacheStats,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl TieredCache {
    /// Build a cache without background tasks.
    pub fn new(config: CacheConfig, remote: Option<Arc<dyn RemoteStore>>) -> Self {
        Self {
            l1: Arc::new(MemoryTier::new(config.l1.clone())),
            l2: remote,
            codec: RecordCodec::new(config.compression_threshold),
            config,
            stats: CacheStats::default(),
            shutdown: CancellationToken::new(),
            sweeper: Mutex::new(None),
        }
    }

    /// Build a cache and start the L1 expiry sweep. Requires a tokio runtime.
    pub fn start(config: CacheConfig, remote: Option<Arc<dyn RemoteStore>>) -> Arc<Self> {
        let cache = Arc::new(Self::new(config, remote));
        let handle = cache.l1.spawn_sweeper(cache.shutdown.child_token());
        *cache.sweeper.lock() = Some(handle);
        cache
    }

    fn remote(&self) -> Option<&Arc<dyn RemoteStore>> {
        if self.config.l2_enabled {
            self.l2.as_ref()
        } else {
            None
        }
    }

    /// Look up a value, returning it with the tier that served it.
    pub async fn get_with_tier<T: DeserializeOwned>(
        &self,
        key: &str,
        options: CacheOptions,
    ) -> Option<(T, CacheTier)> {
        let start = Instant::now();
        let found = self.lookup(key, options).await;
        self.stats.record_response_time(start.elapsed());
        match &found {
            Some((_, tier)) => telemetry::record_cache_hit(tier.as_str()),
            None => telemetry::record_cache_miss(),
        }
        found
    }

    /// Look up a value in L1, then L2.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, options: CacheOptions) -> Option<T> {
        self.get_with_tier(key, options).await.map(|(v, _)| v)
    }

    async fn lookup<T: DeserializeOwned>(
        &self,
        key: &str,
        options: CacheOptions,
    ) -> Option<(T, CacheTier)> {
        self.stats.record_lookup();
        if options.use_l1 {
            if let Some(record) = self.l1.get(key) {
                match self.codec.decode(key, &record) {
                    Ok(value) => {
                        self.stats.record_l1_hit();
                        return Some((value, CacheTier::L1));
                    }
                    Err(e) => {
                        tracing::warn!(key, error = %e, "dropping corrupt l1 record");
                        self.stats.record_corrupt();
                        self.l1.delete(key);
                    }
                }
            }
            self.stats.record_l1_miss();
        }

        if !options.use_l2 {
            return None;
        }
        let remote = self.remote()?;

        match remote.get(key).await {
            Ok(Some(record)) => match self.codec.decode(key, &record.bytes) {
                Ok(value) => {
                    self.stats.record_l2_hit();
                    if options.use_l1 {
                        // The promoted copy must not outlive the remote key.
                        let ttl = Ttl::After(self.config.promotion_ttl).shorter(record.ttl);
                        self.l1.set(key, record.bytes, ttl);
                        self.stats.record_promotion();
                    }
                    Some((value, CacheTier::L2))
                }
                Err(e) => {
                    tracing::warn!(key, error = %e, "corrupt l2 record treated as miss");
                    self.stats.record_corrupt();
                    self.stats.record_l2_miss();
                    None
                }
            },
            Ok(None) => {
                self.stats.record_l2_miss();
                None
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "l2 read failed, treating as miss");
                self.stats.record_l2_error();
                self.stats.record_l2_miss();
                telemetry::record_l2_error();
                None
            }
        }
    }

    /// Store a value in the selected tiers.
    ///
    /// L1 receives `min(ttl, l1.max_ttl)`, L2 the full TTL. An L2 failure is
    /// logged and reported in the returned [`WriteReport`], never raised.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Ttl,
        options: CacheOptions,
    ) -> WriteReport {
        let start = Instant::now();
        let record = self.codec.encode(value);
        let mut report = WriteReport {
            compressed: record.compressed,
            stored_bytes: record.bytes.len(),
            raw_bytes: record.raw_len,
            l2_written: false,
        };

        if options.use_l1 {
            self.l1.set(key, record.bytes.clone(), ttl);
        }

        if options.use_l2 {
            if let Some(remote) = self.remote() {
                match remote.set(key, record.bytes, ttl).await {
                    Ok(()) => report.l2_written = true,
                    Err(e) => {
                        tracing::warn!(key, error = %e, "l2 write failed, continuing with l1 only");
                        self.stats.record_l2_error();
                        telemetry::record_l2_error();
                    }
                }
            }
        }

        self.stats.record_set(report.compressed);
        self.stats.record_response_time(start.elapsed());
        report
    }

    /// Remove a key from the selected tiers. True if any tier held it.
    pub async fn delete(&self, key: &str, options: CacheOptions) -> bool {
        let mut deleted = false;
        if options.use_l1 {
            deleted |= self.l1.delete(key);
        }
        if options.use_l2 {
            if let Some(remote) = self.remote() {
                match remote.delete(key).await {
                    Ok(found) => deleted |= found,
                    Err(e) => {
                        tracing::warn!(key, error = %e, "l2 delete failed");
                        self.stats.record_l2_error();
                    }
                }
            }
        }
        self.stats.record_delete();
        deleted
    }

    /// Clear all keys, or all keys matching a glob pattern, in both tiers.
    pub async fn clear(&self, pattern: Option<&str>) -> Result<usize, CacheError> {
        let compiled = pattern.map(KeyPattern::new).transpose()?;
        let mut removed = self.l1.clear(compiled.as_ref());
        if let Some(remote) = self.remote() {
            match remote.clear(pattern).await {
                Ok(n) => removed += n,
                Err(e) => {
                    tracing::warn!(pattern = pattern.unwrap_or("*"), error = %e, "l2 clear failed");
                    self.stats.record_l2_error();
                }
            }
        }
        Ok(removed)
    }

    /// Healthy only if L1 is below capacity and L2 is reachable or disabled.
    pub async fn health_check(&self) -> CacheHealth {
        let l2 = match self.remote() {
            None => L2Status::Disabled,
            Some(remote) => match remote.ping().await {
                Ok(()) => L2Status::Reachable,
                Err(e) => {
                    tracing::debug!(error = %e, "l2 ping failed");
                    L2Status::Unreachable
                }
            },
        };
        let l1_below_capacity = !self.l1.is_full();
        CacheHealth {
            healthy: l1_below_capacity && l2 != L2Status::Unreachable,
            l1_entries: self.l1.len(),
            l1_capacity: self.l1.capacity(),
            l1_below_capacity,
            l2,
        }
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats
            .snapshot(self.l1.evictions(), self.l1.len(), self.l1.capacity())
    }

    pub fn l1(&self) -> &MemoryTier {
        &self.l1
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Stop background tasks. Cached data stays readable.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Drop for TieredCache {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
