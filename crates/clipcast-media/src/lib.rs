//! FFmpeg CLI wrapper and source download for clip extraction.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Timeout support via tokio
//! - FFprobe duration discovery
//! - Range-clamped clip extraction
//! - Idempotent source video download (Google Drive or direct HTTP)

pub mod clip;
pub mod command;
pub mod download;
pub mod error;
pub mod probe;

pub use clip::{extract_clip, ClipRange, EncodingConfig};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use download::{SourceDownloader, SourceLocator};
pub use error::{MediaError, MediaResult};
pub use probe::{get_duration, probe_video, VideoInfo};
