//! Cloudflare R2 object storage client for render artifacts.

pub mod client;
pub mod error;
pub mod keys;

pub use client::{R2Client, R2Config, UploadOptions};
pub use error::{StorageError, StorageResult};
pub use keys::{artifact_key, attachment_disposition};
