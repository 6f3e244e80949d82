//! Segment planning for sequential clips.

use serde::{Deserialize, Serialize};

/// A `[start, end)` range of the source video selected for one clip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds (exclusive)
    pub end: f64,
    /// Whether content remains after this segment
    pub has_more: bool,
}

impl Segment {
    /// Segment length in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:.3}s, {:.3}s)", self.start, self.end)
    }
}

/// Compute the segment that starts at `cursor`.
///
/// Returns `None` when nothing is left before `video_end` or when
/// `clip_duration` is not a positive, finite length. Short trailing
/// segments are returned as they are.
pub fn plan_next(cursor: f64, clip_duration: f64, video_end: f64) -> Option<Segment> {
    if !(clip_duration.is_finite() && clip_duration > 0.0) {
        return None;
    }
    let start = cursor.max(0.0);
    if start >= video_end {
        return None;
    }

    let end = (start + clip_duration).min(video_end);
    Some(Segment {
        start,
        end,
        has_more: end < video_end,
    })
}

/// Planner bound to a configured start offset and clip length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentPlanner {
    start_time: f64,
    clip_duration: f64,
}

impl SegmentPlanner {
    /// Create a planner. `clip_duration` must be positive.
    pub fn new(start_time: f64, clip_duration: f64) -> Self {
        debug_assert!(clip_duration > 0.0, "clip duration must be positive");
        Self {
            start_time: start_time.max(0.0),
            clip_duration,
        }
    }

    /// The position processing resumes from: the cursor, but never before the
    /// configured start offset.
    pub fn current_position(&self, cursor: f64) -> f64 {
        cursor.max(self.start_time)
    }

    /// Whether nothing remains to process for this cursor.
    pub fn is_complete(&self, cursor: f64, video_end: f64) -> bool {
        self.current_position(cursor) >= video_end
    }

    /// Plan the next segment from the persisted cursor.
    pub fn plan_next(&self, cursor: f64, video_end: f64) -> Option<Segment> {
        plan_next(self.current_position(cursor), self.clip_duration, video_end)
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn clip_duration(&self) -> f64 {
        self.clip_duration
    }
}
