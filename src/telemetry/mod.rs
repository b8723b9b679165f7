//! Telemetry: structured logging, request spans and metrics.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{
    init_metrics, record_active_requests, record_cache_hit, record_cache_miss,
    record_enhancement_fallback, record_job_finished, record_l2_error, record_queue_depth,
    record_queue_wait, record_request_failure, record_request_success, record_worker_crash,
};
pub use spans::{RequestSpan, SpanExt};
