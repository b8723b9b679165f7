//! Running counters for the tiered cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Point-in-time copy of cache counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStatsSnapshot {
    /// Reads through the tiered cache, whichever tiers they consulted.
    pub lookups: u64,
    pub l1_hits: u64,
    pub l1_misses: u64,
    pub l2_hits: u64,
    pub l2_misses: u64,
    pub l2_errors: u64,
    pub sets: u64,
    pub deletes: u64,
    pub evictions: u64,
    pub promotions: u64,
    pub compressed_writes: u64,
    pub corrupt_records: u64,
    pub avg_response_time_us: u64,
    pub l1_entries: usize,
    pub l1_capacity: usize,
}

impl CacheStatsSnapshot {
    /// Hit ratio across both tiers, 0.0 when nothing was read.
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.l1_hits + self.l2_hits;
        if self.lookups == 0 {
            0.0
        } else {
            hits as f64 / self.lookups as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct CacheStats {
    lookups: AtomicU64,
    l1_hits: AtomicU64,
    l1_misses: AtomicU64,
    l2_hits: AtomicU64,
    l2_misses: AtomicU64,
    l2_errors: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    promotions: AtomicU64,
    compressed_writes: AtomicU64,
    corrupt_records: AtomicU64,
    avg_response_time_us: AtomicU64,
}

impl CacheStats {
    pub fn record_lookup(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l1_hit(&self) {
        self.l1_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l1_miss(&self) {
        self.l1_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l2_hit(&self) {
        self.l2_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l2_miss(&self) {
        self.l2_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l2_error(&self) {
        self.l2_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self, compressed: bool) {
        self.sets.fetch_add(1, Ordering::Relaxed);
        if compressed {
            self.compressed_writes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_corrupt(&self) {
        self.corrupt_records.fetch_add(1, Ordering::Relaxed);
    }

    /// Rolling average: new = (old * 9 + sample) / 10.
    pub fn record_response_time(&self, elapsed: Duration) {
        let sample = elapsed.as_micros() as u64;
        let _ = self
            .avg_response_time_us
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |avg| {
                Some(if avg == 0 { sample } else { (avg * 9 + sample) / 10 })
            });
    }

    pub fn snapshot(&self, evictions: u64, l1_entries: usize, l1_capacity: usize) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            lookups: self.lookups.load(Ordering::Relaxed),
            l1_hits: self.l1_hits.load(Ordering::Relaxed),
            l1_misses: self.l1_misses.load(Ordering::Relaxed),
            l2_hits: self.l2_hits.load(Ordering::Relaxed),
            l2_misses: self.l2_misses.load(Ordering::Relaxed),
            l2_errors: self.l2_errors.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            evictions,
            promotions: self.promotions.load(Ordering::Relaxed),
            compressed_writes: self.compressed_writes.load(Ordering::Relaxed),
            corrupt_records: self.corrupt_records.load(Ordering::Relaxed),
            avg_response_time_us: self.avg_response_time_us.load(Ordering::Relaxed),
            l1_entries,
            l1_capacity,
        }
    }
}
