//! Source video model.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// The locally cached source video for a run.
///
/// `duration` is probed once when the run starts and stays fixed until
/// the process restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceVideo {
    /// Local path of the source file
    pub path: PathBuf,
    /// Probed duration in seconds
    pub duration: f64,
    /// Effective upper bound for clip planning in seconds
    pub video_end: f64,
}

impl SourceVideo {
    /// Bind a probed source to the configured end time.
    ///
    /// The effective end is the configured end time, capped at the actual
    /// duration, or the duration itself when no end time is configured.
    pub fn new(path: impl AsRef<Path>, duration: f64, configured_end: Option<f64>) -> Self {
        let video_end = configured_end.map_or(duration, |end| end.min(duration));
        Self {
            path: path.as_ref().to_path_buf(),
            duration,
            video_end,
        }
    }
}
