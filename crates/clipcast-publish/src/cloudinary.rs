//! Cloudinary video hosting.
//!
//! Instagram only ingests videos by URL, so clips are first uploaded to
//! Cloudinary with a signed upload request. Uploads use a fixed
//! `public_id` per clip sequence and `overwrite=true`, so retrying the same
//! clip replaces the earlier asset instead of creating a new one.

use std::path::Path;
use std::time::{Duration, Instant};

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{PublishError, PublishResult};
use crate::metrics::record_request;
use crate::retry::{with_retry, RetryConfig};

/// Default Cloudinary API host.
pub const CLOUDINARY_API_BASE: &str = "https://api.cloudinary.com";

/// Configuration for the Cloudinary uploader.
#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// API host, overridable for tests
    pub api_base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl CloudinaryConfig {
    pub fn new(
        cloud_name: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            cloud_name: cloud_name.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            api_base_url: CLOUDINARY_API_BASE.to_string(),
            timeout: Duration::from_secs(600),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> PublishResult<Self> {
        let var = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| PublishError::config(format!("{} not set", name)))
        };

        Ok(Self::new(
            var("CLOUDINARY_CLOUD_NAME")?,
            var("CLOUDINARY_API_KEY")?,
            var("CLOUDINARY_API_SECRET")?,
        ))
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn upload_url(&self) -> String {
        format!("{}/v1_1/{}/video/upload", self.api_base_url, self.cloud_name)
    }
}

/// A hosted video.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CloudinaryUpload {
    pub public_id: String,
    pub secure_url: String,
}

/// Signed video uploader.
#[derive(Debug, Clone)]
pub struct CloudinaryUploader {
    http: Client,
    config: CloudinaryConfig,
    retry: RetryConfig,
}

impl CloudinaryUploader {
    pub fn new(config: CloudinaryConfig) -> PublishResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            config,
            retry: RetryConfig::default(),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> PublishResult<Self> {
        Self::new(CloudinaryConfig::from_env()?)
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Upload a local video under `public_id`, replacing any existing asset.
    pub async fn upload_video(
        &self,
        path: impl AsRef<Path>,
        public_id: &str,
    ) -> PublishResult<CloudinaryUpload> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        if bytes.is_empty() {
            return Err(PublishError::upload_failed(format!(
                "{} is empty",
                path.display()
            )));
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.mp4", public_id));

        debug!("Uploading {} to Cloudinary as {}", path.display(), public_id);

        let upload = with_retry(&self.retry, "cloudinary_upload", || {
            self.send_upload(bytes.clone(), &file_name, public_id)
        })
        .await?;

        info!("Video uploaded to Cloudinary: {}", upload.secure_url);
        Ok(upload)
    }

    async fn send_upload(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        public_id: &str,
    ) -> PublishResult<CloudinaryUpload> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let params = [
            ("overwrite", "true"),
            ("public_id", public_id),
            ("timestamp", timestamp.as_str()),
        ];
        let signature = sign(&params, &self.config.api_secret);

        let file = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("video/mp4")?;

        let mut form = Form::new()
            .part("file", file)
            .text("api_key", self.config.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");
        for (key, value) in params {
            form = form.text(key.to_string(), value.to_string());
        }

        let start = Instant::now();
        let response = self
            .http
            .post(self.config.upload_url())
            .multipart(form)
            .send()
            .await;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                record_request("cloudinary", "upload", false, latency_ms);
                return Err(e.into());
            }
        };

        let status = response.status();
        let body = response.text().await?;
        record_request("cloudinary", "upload", status.is_success(), latency_ms);

        if !status.is_success() {
            return Err(PublishError::from_http_status(status.as_u16(), &body));
        }

        serde_json::from_str::<CloudinaryUpload>(&body).map_err(|e| {
            PublishError::invalid_response(format!("Cloudinary upload response: {}", e))
        })
    }
}

/// Cloudinary request signature.
///
/// Parameters are sorted by key, joined as `k=v&k=v`, suffixed with the API
/// secret and hashed with SHA-256.
pub fn sign(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted: Vec<_> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let digest = Sha256::digest(format!("{}{}", to_sign, api_secret).as_bytes());
    format!("{:x}", digest)
}
