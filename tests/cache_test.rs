//! Tiered cache tests through the public API.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use refine_core::cache::{
    CacheConfig, CacheOptions, CacheTier, InMemoryRemoteStore, L2Status, MemoryTier,
    MemoryTierConfig, RecordCodec, RemoteStore, TieredCache, Ttl,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Subtitle {
    id: u32,
    lines: Vec<String>,
    quality: f64,
}

fn subtitle(id: u32, lines: usize) -> Subtitle {
    Subtitle {
        id,
        lines: (0..lines).map(|i| format!("{i}: and then the ship sailed on into the night")).collect(),
        quality: 0.5,
    }
}

fn cache_with_remote() -> (TieredCache, Arc<InMemoryRemoteStore>) {
    let remote = Arc::new(InMemoryRemoteStore::new());
    let cache = TieredCache::new(CacheConfig::default(), Some(remote.clone() as Arc<dyn RemoteStore>));
    (cache, remote)
}

// ============================================================================
// Round trips and expiry
// ============================================================================

#[tokio::test]
async fn test_set_then_get_returns_value_for_any_ttl() {
    let (cache, _) = cache_with_remote();
    for (i, secs) in [-5i64, 0, 1, 60, 86_400].into_iter().enumerate() {
        let key = format!("refine:p1:{i}");
        let value = subtitle(i as u32, i + 1);
        cache.set(&key, &value, Ttl::from_secs(secs), CacheOptions::default()).await;
        let got: Option<Subtitle> = cache.get(&key, CacheOptions::default()).await;
        assert_eq!(got, Some(value), "ttl {secs}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_entry_is_absent_after_ttl_elapses() {
    let (cache, _) = cache_with_remote();
    cache.set("x", &json!({"a": 1}), Ttl::from_secs(5), CacheOptions::default()).await;

    tokio::time::advance(Duration::from_secs(6)).await;

    let got: Option<serde_json::Value> = cache.get("x", CacheOptions::default()).await;
    assert!(got.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_no_expiry_request_is_bounded_in_l1_but_not_l2() {
    let config = CacheConfig {
        l1: MemoryTierConfig {
            max_ttl: Duration::from_secs(10),
            ..MemoryTierConfig::default()
        },
        ..CacheConfig::default()
    };
    let remote = Arc::new(InMemoryRemoteStore::new());
    let cache = TieredCache::new(config, Some(remote.clone() as Arc<dyn RemoteStore>));
    cache.set("k", "forever", Ttl::Never, CacheOptions::default()).await;

    tokio::time::advance(Duration::from_secs(11)).await;

    assert!(!cache.l1().contains("k"));
    let (value, tier) = cache
        .get_with_tier::<String>("k", CacheOptions::default())
        .await
        .unwrap();
    assert_eq!(value, "forever");
    assert_eq!(tier, CacheTier::L2);
}

// ============================================================================
// L1 capacity
// ============================================================================

#[test]
fn test_l1_never_exceeds_capacity_and_evicts_oldest_first() {
    let tier = MemoryTier::new(MemoryTierConfig {
        max_entries: 20,
        ..MemoryTierConfig::default()
    });
    for i in 0..21 {
        tier.set(&format!("k{i:02}"), vec![i as u8], Ttl::Never);
        assert!(tier.len() <= 20);
    }
    // ceil(10% of 20) = 2 oldest gone
    assert!(!tier.contains("k00"));
    assert!(!tier.contains("k01"));
    assert!(tier.contains("k02"));
    assert!(tier.contains("k20"));
    assert_eq!(tier.evictions(), 2);
}

// ============================================================================
// Compression
// ============================================================================

#[tokio::test]
async fn test_large_values_round_trip_compressed() {
    let (cache, remote) = cache_with_remote();
    let value = subtitle(7, 200);

    let report = cache.set("big", &value, Ttl::from_secs(60), CacheOptions::default()).await;
    assert!(report.compressed);
    assert!(report.stored_bytes < report.raw_bytes);
    assert!(RecordCodec::is_compressed(&remote.raw("big").unwrap()));

    let got: Option<Subtitle> = cache.get("big", CacheOptions::l2_only()).await;
    assert_eq!(got, Some(value));
}

// ============================================================================
// Remote outage
// ============================================================================

#[tokio::test]
async fn test_remote_outage_is_a_miss_and_l1_still_serves() {
    let (cache, remote) = cache_with_remote();
    cache.set("warm", &1u32, Ttl::from_secs(60), CacheOptions::default()).await;
    remote.set_available(false);

    let cold: Option<u32> = cache.get("cold", CacheOptions::default()).await;
    assert!(cold.is_none());
    let warm: Option<u32> = cache.get("warm", CacheOptions::default()).await;
    assert_eq!(warm, Some(1));

    let health = cache.health_check().await;
    assert_eq!(health.l2, L2Status::Unreachable);
    assert!(!health.healthy);
    assert!(health.can_serve());
    assert!(cache.stats().l2_errors >= 1);
}

#[tokio::test]
async fn test_clear_by_pattern_spans_both_tiers() {
    let (cache, remote) = cache_with_remote();
    for key in ["refine:a:1", "refine:a:2", "refine:b:1"] {
        cache.set(key, "v", Ttl::from_secs(60), CacheOptions::default()).await;
    }
    cache.clear(Some("refine:a:*")).await.unwrap();

    assert!(!cache.l1().contains("refine:a:1"));
    assert!(remote.raw("refine:a:2").is_none());
    let kept: Option<String> = cache.get("refine:b:1", CacheOptions::default()).await;
    assert_eq!(kept.as_deref(), Some("v"));
}
