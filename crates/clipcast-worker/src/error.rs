//! Worker error types.

use std::fmt;

use clipcast_media::MediaError;
use clipcast_publish::PublishError;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Where in the pipeline a failure happened, which decides recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Source could not be fetched or probed. Fatal at startup.
    Fetch,
    /// Clip extraction failed. The same segment is retried next cycle.
    Extraction,
    /// Publishing failed. The same segment is retried next cycle.
    Publish,
    /// Progress could not be persisted. Fatal.
    Io,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Extraction => "extraction",
            Self::Publish => "publish",
            Self::Io => "io",
        }
    }

    /// Whether the run must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fetch | Self::Io)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source fetch failed: {0}")]
    Fetch(#[source] MediaError),

    #[error("Clip extraction failed: {0}")]
    Extraction(#[source] MediaError),

    #[error("Publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error("Failed to persist progress: {0}")]
    ProgressPersist(#[source] std::io::Error),

    #[error("Cycle task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn fetch(err: MediaError) -> Self {
        Self::Fetch(err)
    }

    pub fn extraction(err: MediaError) -> Self {
        Self::Extraction(err)
    }

    /// Failure classification, if the error belongs to the pipeline.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            WorkerError::Fetch(_) => Some(FailureKind::Fetch),
            WorkerError::Extraction(_) => Some(FailureKind::Extraction),
            WorkerError::Publish(_) => Some(FailureKind::Publish),
            WorkerError::ProgressPersist(_) => Some(FailureKind::Io),
            WorkerError::Config(_) | WorkerError::Task(_) | WorkerError::Io(_) => None,
        }
    }

    /// Check if the error must abort the run rather than fail one cycle.
    pub fn is_fatal(&self) -> bool {
        match self.kind() {
            Some(kind) => kind.is_fatal(),
            None => true,
        }
    }
}
