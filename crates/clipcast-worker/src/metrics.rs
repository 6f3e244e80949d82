//! Worker metrics.
//!
//! Provides standardized metrics for monitoring the scheduler:
//! - Published clip counter
//! - Failed cycle counter by failure kind
//! - Cycle latency histogram
//! - Progress cursor gauge

use metrics::{counter, gauge, histogram};

use crate::error::FailureKind;

/// Metric name constants for consistency.
pub mod names {
    /// Clips confirmed published.
    pub const CLIPS_PUBLISHED_TOTAL: &str = "clipcast_clips_published_total";

    /// Failed cycles by failure kind.
    pub const CYCLE_FAILURES_TOTAL: &str = "clipcast_cycle_failures_total";

    /// Wall-clock duration of a cycle in seconds.
    pub const CYCLE_DURATION_SECONDS: &str = "clipcast_cycle_duration_seconds";

    /// Persisted cursor position in seconds.
    pub const PROGRESS_CURSOR_SECONDS: &str = "clipcast_progress_cursor_seconds";
}

/// Record a published clip.
pub fn record_clip_published() {
    counter!(names::CLIPS_PUBLISHED_TOTAL).increment(1);
}

/// Record a failed cycle.
pub fn record_cycle_failure(kind: FailureKind) {
    counter!(names::CYCLE_FAILURES_TOTAL, "kind" => kind.as_str()).increment(1);
}

/// Record how long a cycle took.
pub fn record_cycle_duration(seconds: f64) {
    histogram!(names::CYCLE_DURATION_SECONDS).record(seconds);
}

/// Record the persisted cursor.
pub fn record_progress_cursor(cursor: f64) {
    gauge!(names::PROGRESS_CURSOR_SECONDS).set(cursor);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert_eq!(names::CLIPS_PUBLISHED_TOTAL, "clipcast_clips_published_total");
        assert!(names::CYCLE_FAILURES_TOTAL.ends_with("_total"));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_clip_published();
        record_cycle_failure(FailureKind::Extraction);
        record_cycle_duration(1.5);
        record_progress_cursor(120.0);
    }
}
