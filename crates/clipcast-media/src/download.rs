//! Source video download.
//!
//! Downloads the single source video once and caches it on local disk.
//! Google Drive share links are converted to direct downloads; any other
//! HTTP(S) URL is fetched as-is. A response that turns out to be an HTML or
//! text page is rejected instead of being saved as video.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{MediaError, MediaResult};

/// Direct-download host for Google Drive files.
pub const DRIVE_DOWNLOAD_BASE: &str = "https://drive.usercontent.google.com";

/// Where the source video lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocator {
    /// A Google Drive shared file
    GoogleDrive { file_id: String },
    /// Any other HTTP(S) URL
    Http(Url),
}

impl SourceLocator {
    /// Parse a locator string.
    ///
    /// Accepts Drive links of the form `.../file/d/<id>/...` or `...?id=<id>`
    /// and plain `http`/`https` URLs.
    pub fn parse(locator: &str) -> MediaResult<Self> {
        let url = Url::parse(locator.trim())
            .map_err(|e| MediaError::invalid_source(format!("{}: {}", locator, e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(MediaError::invalid_source(format!(
                "unsupported scheme '{}' in {}",
                url.scheme(),
                locator
            )));
        }

        let is_drive = matches!(
            url.host_str(),
            Some("drive.google.com") | Some("docs.google.com")
        );
        if !is_drive {
            return Ok(Self::Http(url));
        }

        drive_file_id(&url)
            .map(|file_id| Self::GoogleDrive { file_id })
            .ok_or_else(|| {
                MediaError::invalid_source(format!("Invalid Google Drive URL format: {}", locator))
            })
    }
}

fn drive_file_id(url: &Url) -> Option<String> {
    let mut segments = url.path_segments()?;
    while let Some(segment) = segments.next() {
        if segment == "d" {
            return segments.next().filter(|id| !id.is_empty()).map(str::to_string);
        }
    }

    url.query_pairs()
        .find(|(key, _)| key == "id")
        .map(|(_, value)| value.into_owned())
        .filter(|id| !id.is_empty())
}

/// Idempotent downloader for the source video.
#[derive(Debug, Clone)]
pub struct SourceDownloader {
    http: Client,
    drive_base_url: String,
}

impl SourceDownloader {
    /// Create a downloader with default HTTP settings.
    pub fn new() -> MediaResult<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("clipcast-media/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            drive_base_url: DRIVE_DOWNLOAD_BASE.to_string(),
        })
    }

    /// Override the Google Drive download host.
    pub fn with_drive_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.drive_base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Make sure the source video exists at `dest`, downloading it if needed.
    ///
    /// If `dest` already holds a non-empty file it is returned unchanged and
    /// no request is made. Otherwise the body is streamed to `<dest>.part` and
    /// renamed into place once complete.
    pub async fn fetch(&self, locator: &str, dest: impl AsRef<Path>) -> MediaResult<PathBuf> {
        let dest = dest.as_ref();

        if let Ok(metadata) = tokio::fs::metadata(dest).await {
            if metadata.is_file() && metadata.len() > 0 {
                info!("Video already exists: {}", dest.display());
                return Ok(dest.to_path_buf());
            }
        }

        let locator = SourceLocator::parse(locator)?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!("Downloading source video to {}", dest.display());
        let response = self.request(&locator).await?;

        let part = part_path(dest);
        if let Err(e) = stream_to_file(response, &part).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(e);
        }
        tokio::fs::rename(&part, dest).await?;

        info!("Video downloaded successfully: {}", dest.display());
        Ok(dest.to_path_buf())
    }

    async fn request(&self, locator: &SourceLocator) -> MediaResult<Response> {
        match locator {
            SourceLocator::Http(url) => {
                let response = self.get(url.as_str()).await?;
                if is_text_response(&response) {
                    return Err(MediaError::invalid_source(format!(
                        "{} returned a web page instead of a video",
                        url
                    )));
                }
                Ok(response)
            }
            SourceLocator::GoogleDrive { file_id } => {
                let url = format!(
                    "{}/download?id={}&export=download",
                    self.drive_base_url,
                    urlencoding::encode(file_id)
                );
                let response = self.get(&url).await?;
                if !is_text_response(&response) {
                    return Ok(response);
                }

                // Large files get a virus-scan interstitial; confirm once
                let page = response.text().await?;
                let mut confirm_url = format!("{}&confirm=t", url);
                if let Some(uuid) = hidden_input_value(&page, "uuid") {
                    confirm_url.push_str("&uuid=");
                    confirm_url.push_str(&urlencoding::encode(&uuid));
                }
                debug!("Drive returned an interstitial page, retrying with confirmation");

                let response = self.get(&confirm_url).await?;
                if is_text_response(&response) {
                    return Err(MediaError::invalid_source(format!(
                        "Google Drive file {} is not publicly downloadable",
                        file_id
                    )));
                }
                Ok(response)
            }
        }
    }

    async fn get(&self, url: &str) -> MediaResult<Response> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::download_failed(format!(
                "GET {} returned HTTP {}",
                url, status
            )));
        }
        Ok(response)
    }
}

/// HTML and plain-text bodies are error pages, never media.
fn is_text_response(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| {
            let ct = ct.to_ascii_lowercase();
            ct.starts_with("text/") || ct.starts_with("application/xhtml")
        })
        .unwrap_or(false)
}

/// Sniff the first bytes of an untyped body for markup.
fn looks_like_markup(chunk: &[u8]) -> bool {
    let head = String::from_utf8_lossy(&chunk[..chunk.len().min(512)]).to_ascii_lowercase();
    let head = head.trim_start();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

fn hidden_input_value(page: &str, name: &str) -> Option<String> {
    let marker = format!("name=\"{}\" value=\"", name);
    let start = page.find(&marker)? + marker.len();
    let len = page[start..].find('"')?;
    Some(page[start..start + len].to_string())
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name: OsString = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

async fn stream_to_file(response: Response, path: &Path) -> MediaResult<()> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if written == 0 && looks_like_markup(&chunk) {
            return Err(MediaError::invalid_source(
                "download returned an HTML page instead of a video",
            ));
        }
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    file.sync_all().await?;

    if written == 0 {
        warn!("Download produced an empty body");
        return Err(MediaError::download_failed("empty response body"));
    }

    debug!("Wrote {} bytes to {}", written, path.display());
    Ok(())
}
