//! In-process cache tier (L1).
//!
//! Uses DashMap for lock-free concurrent reads. Writers serialize on a
//! short mutex so the capacity check, eviction and insert are atomic with
//! respect to each other; the entry count never exceeds `max_entries`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::codec::RecordCodec;
use super::entry::{CacheEntry, Ttl};
use super::pattern::KeyPattern;

/// Floor for the sweep period; `tokio::time::interval` rejects zero.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

/// Configuration for the in-process tier.
#[derive(Debug, Clone)]
pub struct MemoryTierConfig {
    /// Maximum number of live entries. `usize::MAX` disables the bound.
    pub max_entries: usize,
    /// Upper bound applied to every write TTL. Zero disables the bound.
    pub max_ttl: Duration,
    /// Period of the background expiry sweep.
    pub sweep_interval: Duration,
}

impl Default for MemoryTierConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            max_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl MemoryTierConfig {
    /// Unbounded configuration, used when the tier backs a simulated remote store.
    pub fn unbounded() -> Self {
        Self {
            max_entries: usize::MAX,
            max_ttl: Duration::ZERO,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Bounded in-process key/value tier with lazy and periodic expiry.
pub struct MemoryTier {
    entries: DashMap<String, CacheEntry>,
    write_lock: Mutex<()>,
    next_sequence: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    config: MemoryTierConfig,
}

impl MemoryTier {
    pub fn new(config: MemoryTierConfig) -> Self {
        let capacity = config.max_entries.min(4096);
        Self {
            entries: DashMap::with_capacity(capacity),
            write_lock: Mutex::new(()),
            next_sequence: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            config,
        }
    }

    pub fn config(&self) -> &MemoryTierConfig {
        &self.config
    }

    /// Read a record. Expired entries are removed and reported as absent.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.get_with_ttl(key).map(|(value, _)| value)
    }

    /// Read a record together with its remaining lifetime.
    pub fn get_with_ttl(&self, key: &str) -> Option<(Vec<u8>, Ttl)> {
        let now = tokio::time::Instant::now();
        let entry = self.entries.get(key)?;
        if entry.is_expired_at(now) {
            drop(entry);
            if self.entries.remove_if(key, |_, e| e.is_expired()).is_some() {
                self.expirations.fetch_add(1, Ordering::Relaxed);
            }
            return None;
        }
        entry.record_access();
        Some((entry.value.clone(), entry.remaining_at(now)))
    }

    /// Write a record. The TTL is bounded by `max_ttl`.
    ///
    /// Overwriting an existing key keeps its insertion position.
    pub fn set(&self, key: &str, value: Vec<u8>, ttl: Ttl) {
        let ttl = ttl.bounded_by(self.config.max_ttl);
        let compressed = RecordCodec::is_compressed(&value);
        let _writer = self.write_lock.lock();

        if let Some(mut existing) = self.entries.get_mut(key) {
            let now = tokio::time::Instant::now();
            existing.value = value;
            existing.compressed = compressed;
            existing.expires_at = ttl.expires_at(now);
            return;
        }

        if self.entries.len() >= self.config.max_entries {
            self.evict_oldest_locked();
        }

        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            key.to_string(),
            CacheEntry::new(key.to_string(), value, compressed, ttl, sequence),
        );
    }

    pub fn delete(&self, key: &str) -> bool {
        let _writer = self.write_lock.lock();
        self.entries.remove(key).is_some()
    }

    /// Remove every key, or every key matching `pattern`. Returns the count removed.
    pub fn clear(&self, pattern: Option<&KeyPattern>) -> usize {
        let _writer = self.write_lock.lock();
        let before = self.entries.len();
        match pattern {
            Some(p) if !p.is_match_all() => self.entries.retain(|k, _| !p.matches(k)),
            _ => self.entries.clear(),
        }
        before.saturating_sub(self.entries.len())
    }

    /// Live (non-expired) keys, optionally filtered by pattern.
    pub fn keys(&self, pattern: Option<&KeyPattern>) -> Vec<String> {
        let now = tokio::time::Instant::now();
        self.entries
            .iter()
            .filter(|e| !e.is_expired_at(now))
            .filter(|e| pattern.map_or(true, |p| p.matches(e.key())))
            .map(|e| e.key().clone())
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.get(key).map_or(false, |e| !e.is_expired())
    }

    /// Remove all expired entries. Returns the number purged.
    pub fn purge_expired(&self) -> usize {
        let _writer = self.write_lock.lock();
        let now = tokio::time::Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired_at(now));
        let purged = before.saturating_sub(self.entries.len());
        self.expirations.fetch_add(purged as u64, Ordering::Relaxed);
        purged
    }

    /// Evict the oldest 10% of entries (at least one) by insertion order.
    fn evict_oldest_locked(&self) {
        let len = self.entries.len();
        if len == 0 {
            return;
        }
        let count = ((len + 9) / 10).max(1);
        let mut order: Vec<(u64, String)> = self
            .entries
            .iter()
            .map(|e| (e.sequence, e.key().clone()))
            .collect();
        order.sort_unstable_by_key(|(seq, _)| *seq);

        for (_, key) in order.into_iter().take(count) {
            self.entries.remove(&key);
        }
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
        tracing::debug!(evicted = count, "l1 capacity reached, evicted oldest entries");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.config.max_entries
    }

    /// True when the next new key would trigger eviction.
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.config.max_entries
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    /// Spawn the periodic expiry sweep. Stops on cancellation or when the
    /// tier is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let tier = Arc::downgrade(self);
        let period = self.config.sweep_interval.max(MIN_SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(tier) = tier.upgrade() else { break };
                let purged = tier.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "l1 sweep removed expired entries");
                }
            }
        })
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
