//! Instagram Graph API publishing.
//!
//! Publishing a Reel is three calls: create a media container pointing at
//! the hosted video, wait until Instagram has finished ingesting it, then
//! publish the container. The publisher only returns once the media is
//! live or has definitively failed.

use std::time::{Duration, Instant};

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{PublishError, PublishResult};
use crate::metrics::record_request;
use crate::retry::{poll_until, with_retry, PollConfig, PollStatus, RetryConfig};

/// Default Graph API host.
pub const GRAPH_API_BASE: &str = "https://graph.facebook.com";
/// Default Graph API version.
pub const DEFAULT_GRAPH_VERSION: &str = "v18.0";

/// Configuration for the Instagram publisher.
#[derive(Debug, Clone)]
pub struct InstagramConfig {
    pub access_token: String,
    /// Instagram business account id
    pub user_id: String,
    pub graph_version: String,
    /// Graph API host, overridable for tests
    pub api_base_url: String,
    /// Container status polling
    pub poll: PollConfig,
}

impl InstagramConfig {
    pub fn new(access_token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            user_id: user_id.into(),
            graph_version: DEFAULT_GRAPH_VERSION.to_string(),
            api_base_url: GRAPH_API_BASE.to_string(),
            poll: PollConfig::default(),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> PublishResult<Self> {
        let access_token = std::env::var("INSTAGRAM_ACCESS_TOKEN")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| PublishError::config("INSTAGRAM_ACCESS_TOKEN not set"))?;
        let user_id = std::env::var("INSTAGRAM_USER_ID")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| PublishError::config("INSTAGRAM_USER_ID not set"))?;

        let mut config = Self::new(access_token, user_id);

        if let Ok(version) = std::env::var("INSTAGRAM_GRAPH_VERSION") {
            if !version.trim().is_empty() {
                config.graph_version = version.trim().to_string();
            }
        }

        config.poll.max_attempts = std::env::var("INSTAGRAM_POLL_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.poll.max_attempts);

        let interval_secs: u64 = std::env::var("INSTAGRAM_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.poll.interval.as_secs());
        config.poll.interval = Duration::from_secs(interval_secs);

        if config.poll.max_attempts == 0 {
            return Err(PublishError::config(
                "INSTAGRAM_POLL_ATTEMPTS must be at least 1",
            ));
        }

        Ok(config)
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}/{}", self.api_base_url, self.graph_version, path)
    }
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status_code: Option<String>,
}

/// Container status as reported by the Graph API.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ContainerStatus {
    Finished,
    Failed(String),
    InProgress(String),
}

impl ContainerStatus {
    fn parse(status_code: Option<&str>) -> Self {
        match status_code {
            Some("FINISHED") | Some("PUBLISHED") => Self::Finished,
            Some(s @ "ERROR") | Some(s @ "EXPIRED") => Self::Failed(s.to_string()),
            Some(other) => Self::InProgress(other.to_string()),
            None => Self::InProgress("UNKNOWN".to_string()),
        }
    }
}

/// Reels publisher for one Instagram business account.
#[derive(Debug, Clone)]
pub struct InstagramPublisher {
    http: Client,
    config: InstagramConfig,
    retry: RetryConfig,
}

impl InstagramPublisher {
    pub fn new(config: InstagramConfig) -> PublishResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
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
        Self::new(InstagramConfig::from_env()?)
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Publish a hosted video as a Reel and return the published media id.
    pub async fn publish_video(&self, video_url: &str, caption: &str) -> PublishResult<String> {
        let creation_id = self.create_container(video_url, caption).await?;
        info!("Media container created: {}", creation_id);

        let checks = poll_until(&self.config.poll, || self.check_container(&creation_id)).await?;
        info!(checks, "Video processing completed");

        let media_id = self.publish_container(&creation_id).await?;
        info!("Video published successfully: {}", media_id);
        Ok(media_id)
    }

    async fn create_container(&self, video_url: &str, caption: &str) -> PublishResult<String> {
        let url = self.config.endpoint(&format!("{}/media", self.config.user_id));
        let form = [
            ("media_type", "REELS"),
            ("video_url", video_url),
            ("caption", caption),
            ("access_token", self.config.access_token.as_str()),
        ];

        // Not retried: a repeated POST could create a second container
        let response = self.timed("create_container", self.http.post(&url).form(&form).send()).await?;
        let body: IdResponse = read_json(response).await?;
        body.id
            .ok_or_else(|| PublishError::invalid_response("container response has no id"))
    }

    async fn check_container(&self, creation_id: &str) -> PublishResult<PollStatus> {
        let url = self.config.endpoint(creation_id);

        let body: StatusResponse = with_retry(&self.retry, "container_status", || async {
            let response = self
                .timed(
                    "container_status",
                    self.http
                        .get(&url)
                        .query(&[
                            ("fields", "status_code"),
                            ("access_token", self.config.access_token.as_str()),
                        ])
                        .send(),
                )
                .await?;
            read_json(response).await
        })
        .await?;

        match ContainerStatus::parse(body.status_code.as_deref()) {
            ContainerStatus::Finished => Ok(PollStatus::Ready),
            ContainerStatus::Failed(status) => {
                warn!("Video processing failed: {}", status);
                Err(PublishError::ProcessingFailed(status))
            }
            ContainerStatus::InProgress(status) => Ok(PollStatus::Pending(status)),
        }
    }

    async fn publish_container(&self, creation_id: &str) -> PublishResult<String> {
        let url = self
            .config
            .endpoint(&format!("{}/media_publish", self.config.user_id));
        let form = [
            ("creation_id", creation_id),
            ("access_token", self.config.access_token.as_str()),
        ];

        let response = self.timed("media_publish", self.http.post(&url).form(&form).send()).await?;
        let body: IdResponse = read_json(response).await?;
        body.id
            .ok_or_else(|| PublishError::invalid_response("publish response has no id"))
    }

    async fn timed(
        &self,
        operation: &'static str,
        request: impl std::future::Future<Output = reqwest::Result<Response>>,
    ) -> PublishResult<Response> {
        let start = Instant::now();
        let result = request.await;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let ok = matches!(&result, Ok(r) if r.status().is_success());
        record_request("instagram", operation, ok, latency_ms);

        Ok(result?)
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> PublishResult<T> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(PublishError::from_http_status(status.as_u16(), &body));
    }
    serde_json::from_str(&body).map_err(|e| PublishError::invalid_response(e.to_string()))
}
