//! Cache entry and TTL types shared by both tiers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

/// Time-to-live for a cache write.
///
/// A non-positive number of seconds means the entry never expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    Never,
    After(Duration),
}

impl Ttl {
    /// Build a TTL from signed seconds; `secs <= 0` maps to [`Ttl::Never`].
    pub fn from_secs(secs: i64) -> Self {
        if secs <= 0 {
            Self::Never
        } else {
            Self::After(Duration::from_secs(secs as u64))
        }
    }

    /// Bound this TTL by `max`. A never-expiring TTL becomes `max`.
    pub fn bounded_by(self, max: Duration) -> Self {
        if max.is_zero() {
            return self;
        }
        match self {
            Self::Never => Self::After(max),
            Self::After(d) => Self::After(d.min(max)),
        }
    }

    /// The sooner-expiring of two TTLs.
    pub fn shorter(self, other: Self) -> Self {
        match (self, other) {
            (Self::Never, t) | (t, Self::Never) => t,
            (Self::After(a), Self::After(b)) => Self::After(a.min(b)),
        }
    }

    /// Absolute expiry instant for an entry written at `now`.
    pub fn expires_at(self, now: Instant) -> Option<Instant> {
        match self {
            Self::Never => None,
            Self::After(d) => Some(now + d),
        }
    }

    /// TTL in whole seconds, `0` for never.
    pub fn as_secs(self) -> u64 {
        match self {
            Self::Never => 0,
            Self::After(d) => d.as_secs(),
        }
    }
}

impl Default for Ttl {
    fn default() -> Self {
        Self::Never
    }
}

/// One stored record in a cache tier.
#[derive(Debug)]
pub struct CacheEntry {
    pub key: String,
    /// Encoded record bytes (tag byte + payload).
    pub value: Vec<u8>,
    pub compressed: bool,
    pub created_at: Instant,
    pub expires_at: Option<Instant>,
    /// Insertion order; kept across in-place overwrites.
    pub sequence: u64,
    access_count: AtomicU64,
}

impl CacheEntry {
    pub fn new(
        key: String,
        value: Vec<u8>,
        compressed: bool,
        ttl: Ttl,
        sequence: u64,
    ) -> Self {
        let now = Instant::now();
        Self {
            key,
            value,
            compressed,
            created_at: now,
            expires_at: ttl.expires_at(now),
            sequence,
            access_count: AtomicU64::new(0),
        }
    }

    /// Check expiry against the current instant.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |at| now >= at)
    }

    /// Lifetime left at `now`; [`Ttl::Never`] for entries without expiry.
    pub fn remaining_at(&self, now: Instant) -> Ttl {
        match self.expires_at {
            None => Ttl::Never,
            Some(at) => Ttl::After(at.saturating_duration_since(now)),
        }
    }

    pub fn record_access(&self) {
        self.access_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn access_count(&self) -> u64 {
        self.access_count.load(Ordering::Relaxed)
    }

    /// Stored size in bytes.
    pub fn size(&self) -> usize {
        self.value.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_ttl_never_expires() {
        assert_eq!(Ttl::from_secs(0), Ttl::Never);
        assert_eq!(Ttl::from_secs(-5), Ttl::Never);
        assert_eq!(Ttl::from_secs(5), Ttl::After(Duration::from_secs(5)));
    }

    #[test]
    fn bounded_ttl_takes_minimum() {
        let max = Duration::from_secs(60);
        assert_eq!(Ttl::from_secs(3600).bounded_by(max), Ttl::After(max));
        assert_eq!(
            Ttl::from_secs(10).bounded_by(max),
            Ttl::After(Duration::from_secs(10))
        );
        assert_eq!(Ttl::Never.bounded_by(max), Ttl::After(max));
        assert_eq!(Ttl::Never.bounded_by(Duration::ZERO), Ttl::Never);
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_after_ttl() {
        let entry = CacheEntry::new("k".into(), vec![1], false, Ttl::from_secs(2), 0);
        assert!(!entry.is_expired());
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(entry.is_expired());
    }

    #[test]
    fn shorter_ttl_prefers_finite() {
        let ten = Ttl::from_secs(10);
        assert_eq!(Ttl::Never.shorter(ten), ten);
        assert_eq!(ten.shorter(Ttl::Never), ten);
        assert_eq!(Ttl::from_secs(300).shorter(ten), ten);
        assert_eq!(Ttl::Never.shorter(Ttl::Never), Ttl::Never);
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_lifetime_shrinks() {
        let entry = CacheEntry::new("k".into(), vec![1], false, Ttl::from_secs(10), 0);
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(
            entry.remaining_at(Instant::now()),
            Ttl::After(Duration::from_secs(6))
        );
        let forever = CacheEntry::new("k".into(), vec![1], false, Ttl::Never, 1);
        assert_eq!(forever.remaining_at(Instant::now()), Ttl::Never);
    }

    #[test]
    fn access_counter_increments() {
        let entry = CacheEntry::new("k".into(), vec![], false, Ttl::Never, 0);
        entry.record_access();
        entry.record_access();
        assert_eq!(entry.access_count(), 2);
    }
}
