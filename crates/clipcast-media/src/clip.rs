//! Clip extraction.
//!
//! Clips are re-encoded to H.264/AAC with the moov atom up front, which is
//! what social platforms expect for ingestion. The requested range is
//! clamped to the true source duration before cutting.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::get_duration;

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "fast";
/// Default CRF (Constant Rate Factor)
pub const DEFAULT_CRF: u8 = 20;
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";

/// Video encoding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingConfig {
    /// Video codec (e.g., "libx264")
    pub codec: String,
    /// Encoding preset (e.g., "fast", "medium")
    pub preset: String,
    /// Constant Rate Factor (0-51, lower is better)
    pub crf: u8,
    /// Audio codec
    pub audio_codec: String,
    /// Audio bitrate
    pub audio_bitrate: String,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            preset: DEFAULT_PRESET.to_string(),
            crf: DEFAULT_CRF,
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
        }
    }
}

/// The range that was actually written to the clip file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipRange {
    pub start: f64,
    pub end: f64,
}

/// Clamp a requested range to the source duration.
///
/// Fails when nothing of the requested range lies inside the source.
pub fn clamp_range(start: f64, end: f64, source_duration: f64) -> MediaResult<ClipRange> {
    if !(start.is_finite() && end.is_finite()) || start < 0.0 {
        return Err(MediaError::invalid_range(format!("{}s - {}s", start, end)));
    }

    let actual_end = end.min(source_duration);
    if start >= actual_end {
        return Err(MediaError::invalid_range(format!(
            "start {}s is beyond video duration {}s",
            start, source_duration
        )));
    }

    Ok(ClipRange {
        start,
        end: actual_end,
    })
}

/// Cut `[start, end)` out of `input` into `output`.
///
/// Probes the source first so a range running past the real end of the file
/// is clamped instead of failing. Returns the range actually extracted.
pub async fn extract_clip(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    start: f64,
    end: f64,
    encoding: &EncodingConfig,
    runner: &FfmpegRunner,
) -> MediaResult<ClipRange> {
    let input = input.as_ref();
    let output = output.as_ref();

    let source_duration = get_duration(input).await?;
    let range = clamp_range(start, end, source_duration)?;

    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    info!(
        "Extracting clip: {} -> {} ({:.2}s - {:.2}s)",
        input.display(),
        output.display(),
        range.start,
        range.end
    );

    render_clip(input, output, range, encoding, runner).await?;
    Ok(range)
}

/// Encode an already clamped range. Nothing is left at `output` on failure.
async fn render_clip(
    input: &Path,
    output: &Path,
    range: ClipRange,
    encoding: &EncodingConfig,
    runner: &FfmpegRunner,
) -> MediaResult<u64> {
    let cmd = build_clip_command(input, output, range, encoding);
    let result = match runner.run(&cmd).await {
        Ok(()) => output_size(output).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(written) => {
            info!("Clip created: {} ({} bytes)", output.display(), written);
            Ok(written)
        }
        Err(e) => {
            discard_partial(output).await;
            Err(e)
        }
    }
}

async fn output_size(output: &Path) -> MediaResult<u64> {
    let written = tokio::fs::metadata(output)
        .await
        .map(|m| m.len())
        .unwrap_or(0);
    if written == 0 {
        return Err(MediaError::ffmpeg_failed(
            format!("FFmpeg produced no output at {}", output.display()),
            None,
            None,
        ));
    }
    Ok(written)
}

async fn discard_partial(output: &Path) {
    match tokio::fs::remove_file(output).await {
        Ok(()) => debug!("Removed partial clip {}", output.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove partial clip {}: {}", output.display(), e),
    }
}

fn build_clip_command(
    input: &Path,
    output: &Path,
    range: ClipRange,
    encoding: &EncodingConfig,
) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .seek(range.start)
        .duration(range.end - range.start)
        .video_codec(&encoding.codec)
        .preset(&encoding.preset)
        .crf(encoding.crf)
        .pixel_format("yuv420p")
        .audio_codec(&encoding.audio_codec)
        .audio_bitrate(&encoding.audio_bitrate)
        .faststart()
}
