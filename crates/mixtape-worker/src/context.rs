//! Service wiring for a worker invocation.

use std::sync::Arc;

use mixtape_firestore::{FirestoreClient, PresetRepository, RenderJobRepository};
use mixtape_media::{check_ffmpeg, MixtapeEncoder};
use mixtape_storage::R2Client;

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::services::{ArtifactStore, Encoder, HttpFetcher, JobStore, PresetStore, SourceFetcher};

/// Everything the runner needs, constructed once per invocation.
pub struct ServiceContext {
    pub jobs: Arc<dyn JobStore>,
    pub presets: Arc<dyn PresetStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub fetcher: Arc<dyn SourceFetcher>,
    pub encoder: Arc<dyn Encoder>,
    pub config: WorkerConfig,
}

impl ServiceContext {
    /// Build the production wiring from environment configuration.
    pub async fn from_env(config: WorkerConfig) -> WorkerResult<Self> {
        let ffmpeg = check_ffmpeg()?;
        tracing::debug!(path = %ffmpeg.display(), "Found ffmpeg");

        let firestore = FirestoreClient::from_env().await?;
        let r2 = R2Client::from_env().await?;

        Ok(Self {
            jobs: Arc::new(RenderJobRepository::new(firestore.clone())),
            presets: Arc::new(PresetRepository::new(firestore)),
            artifacts: Arc::new(r2),
            fetcher: Arc::new(HttpFetcher),
            encoder: Arc::new(MixtapeEncoder::new()),
            config,
        })
    }
}
