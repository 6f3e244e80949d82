//! Clip pipeline adapters.
//!
//! The scheduler only talks to these traits. Production implementations
//! download the source over HTTP, cut clips with ffmpeg and publish through
//! Cloudinary and Instagram; tests substitute in-memory fakes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use clipcast_media::{
    extract_clip, probe_video, EncodingConfig, FfmpegRunner, MediaResult, SourceDownloader,
};
use clipcast_models::{clip_file_name, ExtractedClip, PublishReceipt, Segment};
use clipcast_publish::{CloudinaryUploader, InstagramPublisher, PublishResult};
use tracing::{info, warn};

/// Resolves the source video to a local file.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Make the source available at `dest`. Idempotent.
    async fn fetch(&self, locator: &str, dest: &Path) -> MediaResult<PathBuf>;

    /// Duration of the local source in seconds.
    async fn probe_duration(&self, source: &Path) -> MediaResult<f64>;
}

/// Cuts a segment of the source into a standalone clip file.
#[async_trait]
pub trait ClipExtractor: Send + Sync {
    /// Extract `segment` as clip number `sequence`.
    ///
    /// The returned clip carries the range actually extracted, which may end
    /// earlier than requested if the source is shorter.
    async fn extract(
        &self,
        source: &Path,
        segment: &Segment,
        sequence: u32,
    ) -> MediaResult<ExtractedClip>;
}

/// Publishes a clip to the remote platform.
#[async_trait]
pub trait ClipPublisher: Send + Sync {
    /// Publish and wait for a definitive result.
    async fn publish(&self, clip: &ExtractedClip, caption: &str) -> PublishResult<PublishReceipt>;
}

/// HTTP download plus ffprobe.
#[derive(Debug, Clone)]
pub struct MediaSourceFetcher {
    downloader: SourceDownloader,
}

impl MediaSourceFetcher {
    pub fn new(downloader: SourceDownloader) -> Self {
        Self { downloader }
    }
}

#[async_trait]
impl SourceFetcher for MediaSourceFetcher {
    async fn fetch(&self, locator: &str, dest: &Path) -> MediaResult<PathBuf> {
        self.downloader.fetch(locator, dest).await
    }

    async fn probe_duration(&self, source: &Path) -> MediaResult<f64> {
        let info = probe_video(source).await?;
        info!(
            duration = info.duration,
            width = info.width,
            height = info.height,
            codec = %info.codec,
            "Probed source {}",
            source.display()
        );
        if !info.has_audio {
            warn!("Source {} has no audio stream, clips will be silent", source.display());
        }
        Ok(info.duration)
    }
}

/// ffmpeg-backed extractor writing into a clips directory.
#[derive(Debug, Clone)]
pub struct FfmpegExtractor {
    clips_dir: PathBuf,
    encoding: EncodingConfig,
    runner: FfmpegRunner,
}

impl FfmpegExtractor {
    pub fn new(clips_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            clips_dir: clips_dir.into(),
            encoding: EncodingConfig::default(),
            runner: FfmpegRunner::new().with_timeout(timeout),
        }
    }

    /// Path the clip for `segment` will be written to.
    pub fn clip_path(&self, segment: &Segment, sequence: u32) -> PathBuf {
        let name = clip_file_name(sequence, segment.start, segment.end, &chrono::Local::now());
        self.clips_dir.join(name)
    }
}

#[async_trait]
impl ClipExtractor for FfmpegExtractor {
    async fn extract(
        &self,
        source: &Path,
        segment: &Segment,
        sequence: u32,
    ) -> MediaResult<ExtractedClip> {
        let output = self.clip_path(segment, sequence);
        let range = extract_clip(
            source,
            &output,
            segment.start,
            segment.end,
            &self.encoding,
            &self.runner,
        )
        .await?;

        Ok(ExtractedClip {
            path: output,
            sequence,
            start: range.start,
            end: range.end,
        })
    }
}

/// Cloudinary hosting followed by an Instagram Reel.
#[derive(Debug, Clone)]
pub struct SocialPublisher {
    cloudinary: CloudinaryUploader,
    instagram: InstagramPublisher,
}

impl SocialPublisher {
    pub fn new(cloudinary: CloudinaryUploader, instagram: InstagramPublisher) -> Self {
        Self {
            cloudinary,
            instagram,
        }
    }

    /// Build both clients from environment variables.
    pub fn from_env() -> PublishResult<Self> {
        Ok(Self::new(
            CloudinaryUploader::from_env()?,
            InstagramPublisher::from_env()?,
        ))
    }

    /// Cloudinary asset id for a clip; stable so re-uploads overwrite.
    pub fn public_id(sequence: u32) -> String {
        format!("video_clip_{}", sequence)
    }
}

#[async_trait]
impl ClipPublisher for SocialPublisher {
    async fn publish(&self, clip: &ExtractedClip, caption: &str) -> PublishResult<PublishReceipt> {
        let upload = self
            .cloudinary
            .upload_video(&clip.path, &Self::public_id(clip.sequence))
            .await?;

        let media_id = self
            .instagram
            .publish_video(&upload.secure_url, caption)
            .await?;

        info!(sequence = clip.sequence, media_id = %media_id, "Clip published");
        Ok(PublishReceipt {
            media_id,
            media_url: Some(upload.secure_url),
        })
    }
}
