//! Publish error types.

use thiserror::Error;

/// Result type for publish operations.
pub type PublishResult<T> = Result<T, PublishError>;

/// Errors that can occur while hosting or publishing a clip.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Publish configuration error: {0}")]
    Config(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("API request rejected with HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Remote processing failed with status {0}")]
    ProcessingFailed(String),

    #[error("Remote processing not finished after {attempts} status checks")]
    ProcessingTimeout { attempts: u32 },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PublishError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Build an API error from an HTTP status and response body.
    ///
    /// Graph and Cloudinary both report errors as `{"error": {"message": ...}}`;
    /// the raw body is used when it has another shape.
    pub fn from_http_status(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                v.pointer("/error/message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| body.trim().to_string());

        Self::Api { status, message }
    }

    /// Check if error is transient and the request may be repeated.
    pub fn is_retryable(&self) -> bool {
        match self {
            PublishError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            PublishError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
