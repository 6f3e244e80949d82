//! Structured cycle logging.
//!
//! Every scheduler cycle logs with the same contextual fields (clip
//! sequence and segment bounds), so a failed attempt can be matched with
//! its retry in the logs.

use clipcast_models::Segment;
use tracing::{error, info, warn, Span};

use crate::error::FailureKind;

/// Logger for one scheduler cycle.
#[derive(Debug, Clone)]
pub struct CycleLogger {
    sequence: u32,
    start: f64,
    end: f64,
}

impl CycleLogger {
    /// Create a logger for clip `sequence` covering `segment`.
    pub fn new(sequence: u32, segment: &Segment) -> Self {
        Self {
            sequence,
            start: segment.start,
            end: segment.end,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            sequence = self.sequence,
            start = self.start,
            end = self.end,
            "Cycle started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            sequence = self.sequence,
            start = self.start,
            end = self.end,
            "Cycle progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            sequence = self.sequence,
            start = self.start,
            end = self.end,
            "Cycle warning: {}", message
        );
    }

    /// Log a failed cycle with its failure kind.
    pub fn log_failure(&self, kind: FailureKind, message: &str) {
        error!(
            sequence = self.sequence,
            start = self.start,
            end = self.end,
            kind = %kind,
            "Cycle failed: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            sequence = self.sequence,
            start = self.start,
            end = self.end,
            "Cycle completed: {}", message
        );
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Tracing span carrying the cycle context.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "cycle",
            sequence = self.sequence,
            start = self.start,
            end = self.end
        )
    }
}
