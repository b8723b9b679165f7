//! Pipeline configuration loading from environment variables.
//!
//! All configuration values are loaded from `REFINE_*` environment variables
//! with sensible defaults. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `REFINE_L1_MAX_ENTRIES` | 1000 | L1 entry bound |
//! | `REFINE_L1_MAX_TTL` | 3600 | Upper bound on L1 TTLs (secs) |
//! | `REFINE_L1_SWEEP_INTERVAL` | 60 | L1 expiry sweep period (secs) |
//! | `REFINE_PROMOTION_TTL` | 300 | TTL of L2 hits copied into L1 (secs) |
//! | `REFINE_COMPRESSION_THRESHOLD` | 1024 | Records above this size are LZ4 compressed (bytes) |
//! | `REFINE_L2_ENABLED` | true | Use the remote tier |
//! | `REFINE_WORKERS` | 0 | Worker threads (0 = auto) |
//! | `REFINE_RESTART_DELAY_MS` | 1000 | Delay before a crashed worker is replaced |
//! | `REFINE_MAX_CONCURRENT` | 10 | Max concurrently active requests |
//! | `REFINE_BATCH_SIZE` | 5 | Max requests admitted per tick |
//! | `REFINE_TICK_INTERVAL_MS` | 10 | Admission tick period |
//! | `REFINE_ENHANCE_TIMEOUT` | 30 | Enhancement wait (secs) |
//! | `REFINE_MIN_CONTENT_LENGTH` | 20 | Shorter artifacts are not enhanced (chars) |
//! | `REFINE_QUALITY_THRESHOLD` | 0.9 | Artifacts at or above this are not enhanced |
//! | `REFINE_QUALITY_BOOST` | 0.15 | Quality added by enhancement |
//! | `REFINE_DEFAULT_LOCALE` | en | Locale when the request names none |
//! | `REFINE_TTL_ENHANCED` | 86400 | Cache TTL of enhanced results (secs) |
//! | `REFINE_TTL_HIGH_QUALITY` | 43200 | Cache TTL of high-quality results (secs) |
//! | `REFINE_TTL_DEFAULT` | 3600 | Cache TTL of other results (secs) |
//! | `REFINE_TTL_LOW_QUALITY` | 900 | Cache TTL of low-quality results (secs) |
//! | `REFINE_MAX_QUEUE_DEPTH` | 1000 | Admission backlog reported as degraded |
//! | `REFINE_SHUTDOWN_TIMEOUT` | 30 | Graceful shutdown timeout (secs) |
//! | `REFINE_LOG_LEVEL` | info | Log filter directive |
//! | `REFINE_LOG_FORMAT` | json | `json` or `pretty` |
//! | `REFINE_LOG_FILE` | unset | Log to this file instead of stderr |

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::cache::{CacheConfig, MemoryTierConfig};
use crate::health::HealthConfig;
use crate::orchestrator::{AdmissionConfig, OrchestratorConfig, TtlPolicy};
use crate::scheduler::{WorkerPoolConfig, MAX_WORKERS};
use crate::telemetry::{LogConfig, LogFormat};
use crate::PipelineConfig;

/// Effective configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub l1_max_entries: usize,
    pub l1_max_ttl_secs: u64,
    pub l1_sweep_interval_secs: u64,
    pub promotion_ttl_secs: u64,
    pub compression_threshold: usize,
    pub l2_enabled: bool,
    pub workers: usize,
    pub effective_workers: usize,
    pub restart_delay_ms: u64,
    pub max_concurrent: usize,
    pub batch_size: usize,
    pub tick_interval_ms: u64,
    pub enhance_timeout_secs: u64,
    pub min_content_length: usize,
    pub quality_threshold: f64,
    pub quality_boost: f64,
    pub default_locale: String,
    pub ttl_enhanced_secs: u64,
    pub ttl_high_quality_secs: u64,
    pub ttl_default_secs: u64,
    pub ttl_low_quality_secs: u64,
    pub max_queue_depth: usize,
    pub shutdown_timeout_secs: u64,
    pub log_level: String,
    pub log_format: LogFormat,
    pub log_file: Option<PathBuf>,
}

/// All pipeline configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub cache: CacheConfig,
    pub pool: WorkerPoolConfig,
    pub orchestrator: OrchestratorConfig,
    pub health: HealthConfig,
    pub shutdown_timeout: Duration,
    pub log: LogConfig,
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse an `f64` env var, returning `default` on missing, invalid or non-finite.
fn parse_f64(key: &str, default: f64) -> f64 {
    match std::env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a boolean env var (`true/false/1/0/yes/no/on/off`).
fn parse_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Parse a non-empty string env var.
fn parse_string(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => val.trim().to_string(),
        _ => default.to_string(),
    }
}

/// Load cache configuration from environment.
fn load_cache_config() -> CacheConfig {
    let max_entries = parse_usize("REFINE_L1_MAX_ENTRIES", 1000).max(1);
    let max_ttl = parse_u64("REFINE_L1_MAX_TTL", 3600).max(1);
    let sweep = parse_u64("REFINE_L1_SWEEP_INTERVAL", 60).max(1);
    let promotion = parse_u64("REFINE_PROMOTION_TTL", 300).max(1);
    let threshold = parse_usize("REFINE_COMPRESSION_THRESHOLD", 1024).max(64); // floor: 64 bytes
    CacheConfig {
        l1: MemoryTierConfig {
            max_entries,
            max_ttl: Duration::from_secs(max_ttl),
            sweep_interval: Duration::from_secs(sweep),
        },
        l2_enabled: parse_bool("REFINE_L2_ENABLED", true),
        promotion_ttl: Duration::from_secs(promotion),
        compression_threshold: threshold,
    }
}

/// Load worker pool configuration from environment.
fn load_pool_config() -> WorkerPoolConfig {
    let workers = parse_usize("REFINE_WORKERS", 0).min(MAX_WORKERS);
    let restart_delay = parse_u64("REFINE_RESTART_DELAY_MS", 1000);
    WorkerPoolConfig {
        workers,
        restart_delay: Duration::from_millis(restart_delay),
        ..WorkerPoolConfig::default()
    }
}

/// Load admission configuration from environment.
fn load_admission_config() -> AdmissionConfig {
    let max_concurrent = parse_usize("REFINE_MAX_CONCURRENT", 10).max(1);
    let batch_size = parse_usize("REFINE_BATCH_SIZE", 5).max(1);
    let tick = parse_u64("REFINE_TICK_INTERVAL_MS", 10).max(1);
    AdmissionConfig {
        max_concurrent,
        batch_size,
        tick_interval: Duration::from_millis(tick),
    }
}

/// Load the cache TTL policy from environment.
fn load_ttl_policy() -> TtlPolicy {
    let defaults = TtlPolicy::default();
    let secs = |key: &str, default: Duration| Duration::from_secs(parse_u64(key, default.as_secs()).max(1));
    TtlPolicy {
        enhanced: secs("REFINE_TTL_ENHANCED", defaults.enhanced),
        high_quality: secs("REFINE_TTL_HIGH_QUALITY", defaults.high_quality),
        default: secs("REFINE_TTL_DEFAULT", defaults.default),
        low_quality: secs("REFINE_TTL_LOW_QUALITY", defaults.low_quality),
        ..defaults
    }
}

/// Load orchestrator configuration from environment.
fn load_orchestrator_config() -> OrchestratorConfig {
    let enhance_timeout = parse_u64("REFINE_ENHANCE_TIMEOUT", 30).max(1);
    OrchestratorConfig {
        admission: load_admission_config(),
        enhance_timeout: Duration::from_secs(enhance_timeout),
        min_content_length: parse_usize("REFINE_MIN_CONTENT_LENGTH", 20),
        quality_threshold: parse_f64("REFINE_QUALITY_THRESHOLD", 0.9).clamp(0.0, 1.0),
        quality_boost: parse_f64("REFINE_QUALITY_BOOST", 0.15).clamp(0.0, 1.0),
        default_locale: parse_string("REFINE_DEFAULT_LOCALE", "en").to_ascii_lowercase(),
        default_priority: 0,
        ttl: load_ttl_policy(),
    }
}

/// Load logging configuration from environment.
fn load_log_config() -> LogConfig {
    let format = std::env::var("REFINE_LOG_FORMAT")
        .ok()
        .and_then(|v| v.parse::<LogFormat>().ok())
        .unwrap_or_default();
    LogConfig {
        format,
        level: parse_string("REFINE_LOG_LEVEL", "info"),
        output_path: std::env::var("REFINE_LOG_FILE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from),
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    let shutdown_secs = parse_u64("REFINE_SHUTDOWN_TIMEOUT", 30).max(1);
    let max_queue_depth = parse_usize("REFINE_MAX_QUEUE_DEPTH", 1000).max(1);

    EnvConfig {
        cache: load_cache_config(),
        pool: load_pool_config(),
        orchestrator: load_orchestrator_config(),
        health: HealthConfig { max_queue_depth },
        shutdown_timeout: Duration::from_secs(shutdown_secs),
        log: load_log_config(),
    }
}

impl EnvConfig {
    /// Pipeline configuration built from the loaded values.
    pub fn into_pipeline_config(self) -> PipelineConfig {
        PipelineConfig {
            cache: self.cache,
            pool: self.pool,
            orchestrator: self.orchestrator,
            health: self.health,
            shutdown_timeout: self.shutdown_timeout,
        }
    }

    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        let orch = &self.orchestrator;
        EffectiveConfig {
            l1_max_entries: self.cache.l1.max_entries,
            l1_max_ttl_secs: self.cache.l1.max_ttl.as_secs(),
            l1_sweep_interval_secs: self.cache.l1.sweep_interval.as_secs(),
            promotion_ttl_secs: self.cache.promotion_ttl.as_secs(),
            compression_threshold: self.cache.compression_threshold,
            l2_enabled: self.cache.l2_enabled,
            workers: self.pool.workers,
            effective_workers: self.pool.effective_workers(),
            restart_delay_ms: self.pool.restart_delay.as_millis() as u64,
            max_concurrent: orch.admission.max_concurrent,
            batch_size: orch.admission.batch_size,
            tick_interval_ms: orch.admission.tick_interval.as_millis() as u64,
            enhance_timeout_secs: orch.enhance_timeout.as_secs(),
            min_content_length: orch.min_content_length,
            quality_threshold: orch.quality_threshold,
            quality_boost: orch.quality_boost,
            default_locale: orch.default_locale.clone(),
            ttl_enhanced_secs: orch.ttl.enhanced.as_secs(),
            ttl_high_quality_secs: orch.ttl.high_quality.as_secs(),
            ttl_default_secs: orch.ttl.default.as_secs(),
            ttl_low_quality_secs: orch.ttl.low_quality.as_secs(),
            max_queue_depth: self.health.max_queue_depth,
            shutdown_timeout_secs: self.shutdown_timeout.as_secs(),
            log_level: self.log.level.clone(),
            log_format: self.log.format,
            log_file: self.log.output_path.clone(),
        }
    }
}
