//! Collaborator seams for the render pipeline.
//!
//! The runner talks to the job record store, the artifact store, the input
//! fetcher and the encoder through these traits so the whole flow can be
//! exercised against in-memory fakes. The production implementations wrap
//! the Firestore repositories, the R2 client and the FFmpeg encoder.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use mixtape_firestore::{PresetRepository, RenderJobRepository, StatusWatchHandle};
use mixtape_media::{fetch_url, DiagnosticFn, EncodeSpec, MixtapeEncoder, PercentFn};
use mixtape_models::{ClaimOutcome, CompletionFields, JobId, JobStatus, PresetRecord};
use mixtape_storage::{R2Client, UploadOptions};

use crate::error::WorkerResult;

// =============================================================================
// Status Subscription
// =============================================================================

/// Something that stops a live status feed when asked.
pub trait Unsubscribe: Send {
    fn stop(self: Box<Self>);
}

impl Unsubscribe for StatusWatchHandle {
    fn stop(self: Box<Self>) {
        (*self).unsubscribe();
    }
}

/// A live job status feed plus the handle that tears it down.
///
/// Dropping the subscription stops the feed; `unsubscribe` does the same
/// explicitly.
pub struct StatusSubscription {
    pub receiver: watch::Receiver<JobStatus>,
    guard: Option<Box<dyn Unsubscribe>>,
}

impl StatusSubscription {
    pub fn new(receiver: watch::Receiver<JobStatus>, guard: impl Unsubscribe + 'static) -> Self {
        Self {
            receiver,
            guard: Some(Box::new(guard)),
        }
    }

    /// A subscription with no teardown work (used by fakes).
    pub fn unguarded(receiver: watch::Receiver<JobStatus>) -> Self {
        Self {
            receiver,
            guard: None,
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(guard) = self.guard.take() {
            guard.stop();
        }
    }
}

// =============================================================================
// Traits
// =============================================================================

/// Access to the job record.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn status(&self, owner_id: &str, job_id: &JobId) -> WorkerResult<Option<JobStatus>>;

    async fn claim(&self, owner_id: &str, job_id: &JobId) -> WorkerResult<ClaimOutcome>;

    async fn update_stage(&self, owner_id: &str, job_id: &JobId, stage: &str) -> WorkerResult<()>;

    async fn update_progress(
        &self,
        owner_id: &str,
        job_id: &JobId,
        percent: u8,
    ) -> WorkerResult<()>;

    async fn mark_complete(
        &self,
        owner_id: &str,
        job_id: &JobId,
        completion: &CompletionFields,
    ) -> WorkerResult<()>;

    async fn mark_failed(&self, owner_id: &str, job_id: &JobId, error: &str) -> WorkerResult<()>;

    async fn subscribe_status(
        &self,
        owner_id: &str,
        job_id: &JobId,
        poll_interval: Duration,
    ) -> WorkerResult<StatusSubscription>;
}

/// Access to saved preset snapshots.
#[async_trait]
pub trait PresetStore: Send + Sync {
    async fn save(&self, record: &PresetRecord) -> WorkerResult<()>;

    /// Delete all but the `keep` newest snapshots, returning the number
    /// removed.
    async fn prune(&self, owner_id: &str, scope_id: &str, keep: u32) -> WorkerResult<usize>;
}

/// Access to the artifact object store.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Size in bytes of the object at `key`, or `None` if absent.
    async fn object_size(&self, key: &str) -> WorkerResult<Option<u64>>;

    async fn upload_file(&self, path: &Path, key: &str, opts: &UploadOptions) -> WorkerResult<()>;

    async fn download_object(&self, key: &str, dest: &Path) -> WorkerResult<()>;

    async fn presign_get(&self, key: &str, ttl: Duration) -> WorkerResult<String>;
}

/// Fetches HTTP inputs to local files.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Download a URL to `dest`, returning the bytes written.
    async fn fetch_http(&self, url: &str, dest: &Path) -> WorkerResult<u64>;
}

/// Produces the artifact from an encode spec.
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(
        &self,
        spec: &EncodeSpec,
        cancel_rx: watch::Receiver<bool>,
        on_percent: PercentFn,
        on_diagnostic: DiagnosticFn,
    ) -> WorkerResult<()>;
}

// =============================================================================
// Production Implementations
// =============================================================================

#[async_trait]
impl JobStore for RenderJobRepository {
    async fn status(&self, owner_id: &str, job_id: &JobId) -> WorkerResult<Option<JobStatus>> {
        Ok(self.get_status(owner_id, job_id).await?)
    }

    async fn claim(&self, owner_id: &str, job_id: &JobId) -> WorkerResult<ClaimOutcome> {
        Ok(self.claim_for_render(owner_id, job_id).await?)
    }

    async fn update_stage(&self, owner_id: &str, job_id: &JobId, stage: &str) -> WorkerResult<()> {
        Ok(RenderJobRepository::update_stage(self, owner_id, job_id, stage).await?)
    }

    async fn update_progress(
        &self,
        owner_id: &str,
        job_id: &JobId,
        percent: u8,
    ) -> WorkerResult<()> {
        Ok(RenderJobRepository::update_progress(self, owner_id, job_id, percent).await?)
    }

    async fn mark_complete(
        &self,
        owner_id: &str,
        job_id: &JobId,
        completion: &CompletionFields,
    ) -> WorkerResult<()> {
        Ok(RenderJobRepository::mark_complete(self, owner_id, job_id, completion).await?)
    }

    async fn mark_failed(&self, owner_id: &str, job_id: &JobId, error: &str) -> WorkerResult<()> {
        Ok(RenderJobRepository::mark_failed(self, owner_id, job_id, error).await?)
    }

    async fn subscribe_status(
        &self,
        owner_id: &str,
        job_id: &JobId,
        poll_interval: Duration,
    ) -> WorkerResult<StatusSubscription> {
        let (receiver, handle) = self.watch_status(owner_id, job_id, poll_interval).await?;
        Ok(StatusSubscription::new(receiver, handle))
    }
}

#[async_trait]
impl PresetStore for PresetRepository {
    async fn save(&self, record: &PresetRecord) -> WorkerResult<()> {
        Ok(PresetRepository::save(self, record).await?)
    }

    async fn prune(&self, owner_id: &str, scope_id: &str, keep: u32) -> WorkerResult<usize> {
        Ok(self.prune_to_recent(owner_id, scope_id, keep).await?)
    }
}

#[async_trait]
impl ArtifactStore for R2Client {
    async fn object_size(&self, key: &str) -> WorkerResult<Option<u64>> {
        Ok(R2Client::object_size(self, key).await?)
    }

    async fn upload_file(&self, path: &Path, key: &str, opts: &UploadOptions) -> WorkerResult<()> {
        Ok(R2Client::upload_file(self, path, key, opts).await?)
    }

    async fn download_object(&self, key: &str, dest: &Path) -> WorkerResult<()> {
        Ok(self.download_file(key, dest).await?)
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> WorkerResult<String> {
        Ok(R2Client::presign_get(self, key, ttl).await?)
    }
}

/// Plain HTTP fetcher backed by the media crate.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher;

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch_http(&self, url: &str, dest: &Path) -> WorkerResult<u64> {
        Ok(fetch_url(url, dest).await?)
    }
}

#[async_trait]
impl Encoder for MixtapeEncoder {
    async fn encode(
        &self,
        spec: &EncodeSpec,
        cancel_rx: watch::Receiver<bool>,
        on_percent: PercentFn,
        on_diagnostic: DiagnosticFn,
    ) -> WorkerResult<()> {
        Ok(MixtapeEncoder::encode(self, spec, cancel_rx, on_percent, on_diagnostic).await?)
    }
}
