//! Remote publishing for extracted clips.
//!
//! A clip is first uploaded to Cloudinary, which hosts it at a public URL,
//! and then handed to the Instagram Graph API as a Reel. Instagram ingests
//! the video asynchronously, so the publisher polls the media container
//! until it is ready before publishing.
//!
//! Both clients accept an overridable base URL so they can be pointed at a
//! mock server in tests.

pub mod cloudinary;
pub mod error;
pub mod instagram;
pub mod metrics;
pub mod retry;

pub use cloudinary::{CloudinaryConfig, CloudinaryUpload, CloudinaryUploader};
pub use error::{PublishError, PublishResult};
pub use instagram::{InstagramConfig, InstagramPublisher};
pub use retry::{with_retry, PollConfig, RetryConfig};
