//! Metrics emitted through the `metrics` facade.
//!
//! Nothing is exported unless the host installs a recorder.

use std::sync::Once;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

static DESCRIBE: Once = Once::new();

/// Register metric descriptions with the installed recorder.
pub fn init_metrics() {
    DESCRIBE.call_once(|| {
        describe_counter!("refine_requests_total", Unit::Count, "Completed pipeline requests.");
        describe_counter!("refine_request_failures_total", Unit::Count, "Failed pipeline requests.");
        describe_histogram!("refine_request_latency_ms", Unit::Milliseconds, "End-to-end request latency.");
        describe_gauge!("refine_requests_active", Unit::Count, "Requests holding an admission slot.");
        describe_counter!("refine_enhancement_fallbacks_total", Unit::Count, "Requests served unenhanced after a failed enhancement.");
        describe_counter!("refine_cache_hits_total", Unit::Count, "Cache hits by tier.");
        describe_counter!("refine_cache_misses_total", Unit::Count, "Lookups missing both tiers.");
        describe_counter!("refine_cache_l2_errors_total", Unit::Count, "Remote tier failures.");
        describe_gauge!("refine_pool_queue_depth", Unit::Count, "Jobs waiting for a worker.");
        describe_histogram!("refine_pool_queue_wait_ms", Unit::Milliseconds, "Time jobs spend queued.");
        describe_histogram!("refine_job_duration_ms", Unit::Milliseconds, "Backend time per job.");
        describe_counter!("refine_worker_crashes_total", Unit::Count, "Worker threads lost to a panic.");
    });
}

pub fn record_request_success(source: &str, latency_ms: u64, served_from: &'static str) {
    counter!("refine_requests_total", "source" => source.to_string(), "served_from" => served_from)
        .increment(1);
    histogram!("refine_request_latency_ms", "source" => source.to_string()).record(latency_ms as f64);
}

pub fn record_request_failure(source: &str, error: &'static str) {
    counter!("refine_request_failures_total", "source" => source.to_string(), "error" => error)
        .increment(1);
}

pub fn record_active_requests(active: usize) {
    gauge!("refine_requests_active").set(active as f64);
}

pub fn record_enhancement_fallback(reason: &'static str) {
    counter!("refine_enhancement_fallbacks_total", "reason" => reason).increment(1);
}

pub fn record_cache_hit(tier: &'static str) {
    counter!("refine_cache_hits_total", "tier" => tier).increment(1);
}

pub fn record_cache_miss() {
    counter!("refine_cache_misses_total").increment(1);
}

pub fn record_l2_error() {
    counter!("refine_cache_l2_errors_total").increment(1);
}

pub fn record_queue_depth(depth: usize) {
    gauge!("refine_pool_queue_depth").set(depth as f64);
}

pub fn record_queue_wait(waited: Duration) {
    histogram!("refine_pool_queue_wait_ms").record(waited.as_secs_f64() * 1000.0);
}

pub fn record_job_finished(elapsed: Duration, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    histogram!("refine_job_duration_ms", "outcome" => outcome).record(elapsed.as_secs_f64() * 1000.0);
}

pub fn record_worker_crash() {
    counter!("refine_worker_crashes_total").increment(1);
}
