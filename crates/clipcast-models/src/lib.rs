//! Shared data models for the clipcast scheduler.
//!
//! This crate provides Serde-serializable types for:
//! - Durable processing progress (the cursor record)
//! - Segment planning for sequential clips
//! - Source video, extracted clip and publish receipt values
//! - Clip file naming and caption generation

pub mod clip;
pub mod progress;
pub mod segment;
pub mod video;

// Re-export common types
pub use clip::{caption, clip_file_name, ExtractedClip, PublishReceipt, DEFAULT_CAPTION_TAGS};
pub use progress::ProcessingProgress;
pub use segment::{plan_next, Segment, SegmentPlanner};
pub use video::SourceVideo;
