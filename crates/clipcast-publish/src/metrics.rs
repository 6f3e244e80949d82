//! Publish metrics.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Remote API requests by service, operation and outcome.
    pub const REQUESTS_TOTAL: &str = "clipcast_publish_requests_total";

    /// Retry attempts by operation.
    pub const RETRIES_TOTAL: &str = "clipcast_publish_retries_total";

    /// Request latency in seconds by service and operation.
    pub const LATENCY_SECONDS: &str = "clipcast_publish_latency_seconds";

    /// Status checks needed before a container became ready.
    pub const POLL_ATTEMPTS: &str = "clipcast_publish_poll_attempts";
}

/// Record metrics for a completed remote request.
pub fn record_request(service: &'static str, operation: &'static str, ok: bool, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "service" => service,
        "operation" => operation,
        "outcome" => if ok { "ok" } else { "error" }
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "service" => service,
        "operation" => operation
    )
    .record(latency_ms / 1000.0);
}

/// Record a retry attempt.
pub fn record_retry(operation: &str) {
    counter!(names::RETRIES_TOTAL, "operation" => operation.to_string()).increment(1);
}

/// Record how many status checks a container needed.
pub fn record_poll_attempts(attempts: u32) {
    histogram!(names::POLL_ATTEMPTS).record(attempts as f64);
}
