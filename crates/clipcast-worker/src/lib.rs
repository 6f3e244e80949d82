//! Scheduled clip worker.
//!
//! This crate provides:
//! - Durable progress tracking with atomic file replacement
//! - Adapter traits for source fetch, clip extraction and publishing
//! - Production adapters backed by ffmpeg, Cloudinary and Instagram
//! - The clip scheduler: plan, extract, publish, commit, wait, repeat
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod progress_store;
pub mod scheduler;

pub use config::{RunMode, SchedulerConfig};
pub use error::{FailureKind, WorkerError, WorkerResult};
pub use logging::CycleLogger;
pub use pipeline::{
    ClipExtractor, ClipPublisher, FfmpegExtractor, MediaSourceFetcher, SocialPublisher,
    SourceFetcher,
};
pub use progress_store::{JsonProgressStore, ProgressStore};
pub use scheduler::{ClipScheduler, CycleOutcome, RunSummary, ShutdownHandle};
