//! Firestore REST API client for render job records.
//!
//! Production concerns live in `client`: token caching with a refresh
//! margin, retry with exponential backoff and jitter, tracing spans and
//! request metrics. Typed access goes through the repositories.

pub mod client;
pub mod error;
pub mod job_repo;
pub mod metrics;
pub mod preset_repo;
pub mod retry;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use job_repo::{RenderJobRepository, StatusWatchHandle};
pub use preset_repo::PresetRepository;
pub use retry::RetryConfig;
