//! Tests for the in-process tier: expiry, capacity eviction, sweeping.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::*;

fn tier(max_entries: usize) -> MemoryTier {
    MemoryTier::new(MemoryTierConfig {
        max_entries,
        max_ttl: Duration::from_secs(3600),
        sweep_interval: Duration::from_secs(1),
    })
}

#[test]
fn set_then_get_returns_value() {
    let t = tier(10);
    t.set("a", b"\x00{}".to_vec(), Ttl::from_secs(60));
    assert_eq!(t.get("a"), Some(b"\x00{}".to_vec()));
    assert_eq!(t.get("missing"), None);
}

#[test]
fn overwrite_replaces_in_place() {
    let t = tier(10);
    t.set("a", vec![0, 1], Ttl::Never);
    t.set("b", vec![0, 2], Ttl::Never);
    t.set("a", vec![0, 3], Ttl::Never);
    assert_eq!(t.len(), 2);
    assert_eq!(t.get("a"), Some(vec![0, 3]));
}

#[test]
fn capacity_evicts_oldest_tenth() {
    let t = tier(10);
    for i in 0..11 {
        t.set(&format!("k{i}"), vec![0], Ttl::Never);
        assert!(t.len() <= 10);
    }
    assert_eq!(t.len(), 10);
    assert!(!t.contains("k0"), "oldest entry should be evicted first");
    assert!(t.contains("k1"));
    assert!(t.contains("k10"));
    assert_eq!(t.evictions(), 1);
}

#[test]
fn capacity_evicts_ten_percent_of_large_tier() {
    let t = tier(100);
    for i in 0..101 {
        t.set(&format!("k{i:03}"), vec![0], Ttl::Never);
    }
    // Ten oldest evicted, then the new key inserted.
    assert_eq!(t.len(), 91);
    for i in 0..10 {
        assert!(!t.contains(&format!("k{i:03}")));
    }
    assert!(t.contains("k010"));
    assert!(t.contains("k100"));
}

#[test]
fn overwrite_keeps_insertion_position_for_eviction() {
    let t = tier(3);
    t.set("first", vec![0], Ttl::Never);
    t.set("second", vec![0], Ttl::Never);
    t.set("third", vec![0], Ttl::Never);
    // Rewriting "first" does not make it newer.
    t.set("first", vec![0, 9], Ttl::Never);
    t.set("fourth", vec![0], Ttl::Never);
    assert!(!t.contains("first"));
    assert!(t.contains("second"));
}

#[tokio::test(start_paused = true)]
async fn expired_entry_reads_as_absent() {
    let t = tier(10);
    t.set("x", vec![0, 1], Ttl::from_secs(5));
    assert!(t.get("x").is_some());
    tokio::time::advance(Duration::from_secs(6)).await;
    assert_eq!(t.get("x"), None);
    assert_eq!(t.len(), 0, "lazy read removes the expired entry");
}

#[tokio::test(start_paused = true)]
async fn ttl_is_bounded_by_max_ttl() {
    let t = MemoryTier::new(MemoryTierConfig {
        max_entries: 10,
        max_ttl: Duration::from_secs(10),
        sweep_interval: Duration::from_secs(1),
    });
    t.set("never", vec![0], Ttl::Never);
    t.set("long", vec![0], Ttl::from_secs(3600));
    tokio::time::advance(Duration::from_secs(11)).await;
    assert!(t.get("never").is_none());
    assert!(t.get("long").is_none());
}

#[tokio::test(start_paused = true)]
async fn sweeper_purges_without_reads() {
    let t = Arc::new(tier(10));
    let token = CancellationToken::new();
    let handle = t.spawn_sweeper(token.clone());

    t.set("short", vec![0], Ttl::from_secs(2));
    t.set("long", vec![0], Ttl::from_secs(100));
    tokio::time::sleep(Duration::from_secs(4)).await;

    assert_eq!(t.len(), 1);
    assert!(t.expirations() >= 1);

    token.cancel();
    handle.await.unwrap();
}

#[test]
fn clear_by_pattern() {
    let t = tier(10);
    t.set("refine:a:1", vec![0], Ttl::Never);
    t.set("refine:a:2", vec![0], Ttl::Never);
    t.set("refine:b:1", vec![0], Ttl::Never);
    let p = KeyPattern::new("refine:a:*").unwrap();
    assert_eq!(t.clear(Some(&p)), 2);
    assert_eq!(t.keys(None), vec!["refine:b:1".to_string()]);
    assert_eq!(t.clear(None), 1);
    assert!(t.is_empty());
}

#[test]
fn star_pattern_clears_everything() {
    let t = tier(10);
    t.set("refine:a:1", vec![0], Ttl::Never);
    t.set("other", vec![0], Ttl::Never);
    let all = KeyPattern::new("*").unwrap();
    assert_eq!(t.clear(Some(&all)), 2);
    assert!(t.is_empty());
}

#[test]
fn delete_removes_key() {
    let t = tier(10);
    t.set("a", vec![0], Ttl::Never);
    assert!(t.delete("a"));
    assert!(!t.delete("a"));
}

#[test]
fn compressed_flag_follows_record_tag() {
    let t = tier(10);
    t.set("lz", vec![0x01, 0, 0], Ttl::Never);
    let entry = t.entries.get("lz").unwrap();
    assert!(entry.compressed);
}
