//! Extracted clip and publish result models.

use std::path::PathBuf;

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

/// Hashtags appended to every caption unless configured otherwise.
pub const DEFAULT_CAPTION_TAGS: &str = "#video #content";

/// A clip written to local disk, ready to publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedClip {
    /// Local clip file
    pub path: PathBuf,
    /// 1-based clip sequence number
    pub sequence: u32,
    /// Actual start time in seconds
    pub start: f64,
    /// Actual end time in seconds, after clamping to the source duration
    pub end: f64,
}

impl ExtractedClip {
    /// Clip length in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Definitive confirmation that a clip was published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    /// Remote media identifier assigned by the platform
    pub media_id: String,
    /// Hosted URL the platform ingested, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
}

/// File name for a clip: `clip_<seq>_<timestamp>_<start>s-<end>s.mp4`.
///
/// Times are truncated to whole seconds.
pub fn clip_file_name<Tz>(sequence: u32, start: f64, end: f64, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!(
        "clip_{:03}_{}_{}s-{}s.mp4",
        sequence,
        at.format("%Y%m%d_%H%M%S"),
        start as i64,
        end as i64
    )
}

/// Caption published alongside a clip.
pub fn caption(sequence: u32, start: f64, end: f64, tags: &str) -> String {
    let base = format!("Video clip {} ({}s - {}s)", sequence, start as i64, end as i64);
    let tags = tags.trim();
    if tags.is_empty() {
        base
    } else {
        format!("{} {}", base, tags)
    }
}
