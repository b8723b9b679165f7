//! Span utilities and extension traits for pipeline tracing.

use tracing::{info_span, Span};

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for creating standardized request spans.
pub struct RequestSpan;

impl RequestSpan {
    /// Create a span for one pipeline request.
    ///
    /// `status`, `error.message`, `served_from`, `enhanced` and `latency_ms`
    /// are filled in as the request progresses.
    pub fn new(request_id: u64, cache_key: &str) -> Span {
        info_span!(
            "pipeline_request",
            request_id,
            cache_key = %cache_key,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            served_from = tracing::field::Empty,
            enhanced = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    }
}
