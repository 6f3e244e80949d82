//! Worker configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clipcast_models::DEFAULT_CAPTION_TAGS;

use crate::error::{WorkerError, WorkerResult};

/// What the scheduler does once it runs out of segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Keep cycling on the interval until stopped, even after the end of the
    /// video has been reached.
    #[default]
    Continuous,
    /// Exit once every segment has been published.
    UntilDone,
}

impl FromStr for RunMode {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continuous" => Ok(Self::Continuous),
            "until_done" | "until-done" | "once" => Ok(Self::UntilDone),
            other => Err(WorkerError::config_error(format!(
                "unknown run mode '{}' (expected continuous or until_done)",
                other
            ))),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continuous => f.write_str("continuous"),
            Self::UntilDone => f.write_str("until_done"),
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Where to fetch the source video from
    pub source_locator: String,
    /// Length of each clip in seconds
    pub clip_duration: f64,
    /// Wait between cycles
    pub inter_cycle_interval: Duration,
    /// Offset into the source where clipping begins
    pub video_start_time: f64,
    /// Optional offset where clipping stops
    pub video_end_time: Option<f64>,
    /// Directory holding the downloaded source
    pub download_dir: PathBuf,
    /// File name of the downloaded source
    pub source_file_name: String,
    /// Directory for extracted clips
    pub clips_dir: PathBuf,
    /// Progress record
    pub state_file: PathBuf,
    pub run_mode: RunMode,
    /// Hashtags appended to captions
    pub caption_tags: String,
    /// Grace period for an in-flight cycle on shutdown
    pub shutdown_timeout: Duration,
    /// Kill ffmpeg after this long
    pub extract_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            source_locator: String::new(),
            clip_duration: 60.0,
            inter_cycle_interval: Duration::from_secs(3600), // 1 hour
            video_start_time: 0.0,
            video_end_time: None,
            download_dir: PathBuf::from("downloads"),
            source_file_name: "main_video.mp4".to_string(),
            clips_dir: PathBuf::from("clips"),
            state_file: PathBuf::from("processing_state.json"),
            run_mode: RunMode::Continuous,
            caption_tags: DEFAULT_CAPTION_TAGS.to_string(),
            shutdown_timeout: Duration::from_secs(30),
            extract_timeout: Duration::from_secs(1800), // 30 minutes
        }
    }
}

impl SchedulerConfig {
    /// Create config from environment variables and validate it.
    pub fn from_env() -> WorkerResult<Self> {
        let defaults = Self::default();

        let run_mode = match std::env::var("CLIPCAST_RUN_MODE") {
            Ok(v) if !v.trim().is_empty() => v.parse()?,
            _ => defaults.run_mode,
        };

        let config = Self {
            source_locator: std::env::var("CLIPCAST_SOURCE_URL").unwrap_or_default(),
            clip_duration: env_parse("CLIPCAST_CLIP_DURATION_SECS")?
                .unwrap_or(defaults.clip_duration),
            inter_cycle_interval: env_parse::<u64>("CLIPCAST_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.inter_cycle_interval),
            video_start_time: env_parse("CLIPCAST_VIDEO_START_SECS")?
                .unwrap_or(defaults.video_start_time),
            video_end_time: env_parse("CLIPCAST_VIDEO_END_SECS")?,
            download_dir: std::env::var("CLIPCAST_DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.download_dir),
            source_file_name: std::env::var("CLIPCAST_SOURCE_FILE")
                .unwrap_or(defaults.source_file_name),
            clips_dir: std::env::var("CLIPCAST_CLIPS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.clips_dir),
            state_file: std::env::var("CLIPCAST_STATE_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_file),
            run_mode,
            caption_tags: std::env::var("CLIPCAST_CAPTION_TAGS")
                .unwrap_or(defaults.caption_tags),
            shutdown_timeout: env_parse::<u64>("CLIPCAST_SHUTDOWN_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            extract_timeout: env_parse::<u64>("CLIPCAST_EXTRACT_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.extract_timeout),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler cannot work with.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.source_locator.trim().is_empty() {
            return Err(WorkerError::config_error("CLIPCAST_SOURCE_URL not set"));
        }
        if !(self.clip_duration.is_finite() && self.clip_duration > 0.0) {
            return Err(WorkerError::config_error(format!(
                "clip duration must be positive, got {}",
                self.clip_duration
            )));
        }
        if !(self.video_start_time.is_finite() && self.video_start_time >= 0.0) {
            return Err(WorkerError::config_error(format!(
                "video start time must be >= 0, got {}",
                self.video_start_time
            )));
        }
        if let Some(end) = self.video_end_time {
            if !end.is_finite() || end <= self.video_start_time {
                return Err(WorkerError::config_error(format!(
                    "video end time {} must be after start time {}",
                    end, self.video_start_time
                )));
            }
        }
        if self.source_file_name.trim().is_empty() {
            return Err(WorkerError::config_error("source file name is empty"));
        }
        Ok(())
    }

    /// Local path of the downloaded source video.
    pub fn source_path(&self) -> PathBuf {
        self.download_dir.join(&self.source_file_name)
    }
}

/// Parse an optional environment variable, failing on malformed values.
fn env_parse<T: FromStr>(name: &str) -> WorkerResult<Option<T>> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| WorkerError::config_error(format!("{} has invalid value '{}'", name, raw))),
        _ => Ok(None),
    }
}
