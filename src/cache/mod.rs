//! Two-level result cache.
//!
//! L1 is a bounded in-process map with per-entry TTL and oldest-first
//! eviction. L2 is any shared [`RemoteStore`]. [`TieredCache`] hides the
//! split: callers see a single get/set/delete/clear surface.

mod codec;
mod entry;
mod error;
mod manager;
mod memory;
mod pattern;
mod remote;
mod stats;

pub use codec::{EncodedRecord, RecordCodec};
pub use entry::{CacheEntry, Ttl};
pub use error::CacheError;
pub use manager::{
    CacheConfig, CacheHealth, CacheOptions, CacheTier, L2Status, TieredCache, WriteReport,
};
pub use memory::{MemoryTier, MemoryTierConfig};
pub use pattern::KeyPattern;
pub use remote::{InMemoryRemoteStore, RemoteRecord, RemoteStore};
pub use stats::CacheStatsSnapshot;
