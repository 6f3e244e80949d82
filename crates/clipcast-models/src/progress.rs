//! Durable processing progress.
//!
//! The on-disk record keeps exactly three fields (`current_position`,
//! `clip_count`, `last_processed`) so existing state files stay readable.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Progress through the source video.
///
/// `cursor` is the watermark between published and unpublished content. It
/// only moves forward, and only after a clip has been confirmed published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProcessingProgress {
    /// Seconds of source video already extracted and published.
    #[serde(rename = "current_position")]
    pub cursor: f64,

    /// Number of clips published so far.
    pub clip_count: u32,

    /// Time of the last successful publish (informational).
    #[serde(
        rename = "last_processed",
        default,
        deserialize_with = "deserialize_lenient_timestamp"
    )]
    pub last_processed_at: Option<DateTime<Utc>>,
}

impl ProcessingProgress {
    /// Progress starting at an explicit offset.
    pub fn starting_at(cursor: f64) -> Self {
        Self {
            cursor,
            ..Default::default()
        }
    }

    /// The record written after publishing the clip ending at `end`.
    pub fn advanced_to(&self, end: f64, at: DateTime<Utc>) -> Self {
        Self {
            cursor: end,
            clip_count: self.clip_count.saturating_add(1),
            last_processed_at: Some(at),
        }
    }

    /// Sequence number of the next clip (1-based).
    pub fn next_sequence(&self) -> u32 {
        self.clip_count.saturating_add(1)
    }

    /// A record with a negative or non-finite cursor cannot be trusted.
    pub fn is_valid(&self) -> bool {
        self.cursor.is_finite() && self.cursor >= 0.0
    }
}

/// Accept RFC 3339 as well as offset-less ISO-8601 timestamps (read as UTC).
///
/// Anything else maps to `None`: the field is informational and must not make
/// an otherwise good record unreadable.
fn deserialize_lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
