//! Artifact finalization.
//!
//! Presigns the artifact, writes the completion fields, then saves a
//! preset snapshot and prunes old ones. The preset work is best-effort:
//! the job is already complete by then and stays complete.

use chrono::Utc;
use tracing::{info, warn};

use mixtape_models::{CompletionFields, PresetRecord, RenderRequest};

use crate::config::JobEnv;
use crate::context::ServiceContext;
use crate::error::WorkerResult;
use crate::monitor::CancelSignal;

/// Finalizes one job's artifact and record.
pub struct Finalizer<'a> {
    ctx: &'a ServiceContext,
    env: &'a JobEnv,
}

impl<'a> Finalizer<'a> {
    pub fn new(ctx: &'a ServiceContext, env: &'a JobEnv) -> Self {
        Self { ctx, env }
    }

    /// Presign the artifact and mark the job complete.
    ///
    /// Used both after a fresh render and on the idempotent short-circuit
    /// path when the artifact already exists; the short-circuit path runs
    /// before any cancellation monitor exists and passes no signal.
    pub async fn finalize(
        &self,
        request: &RenderRequest,
        artifact_key: &str,
        file_size_bytes: u64,
        cancel: Option<&CancelSignal>,
    ) -> WorkerResult<CompletionFields> {
        let ttl = self.ctx.config.url_ttl;
        let download_url = self.ctx.artifacts.presign_get(artifact_key, ttl).await?;

        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(7));

        let completion = CompletionFields {
            download_url,
            file_size_bytes,
            expires_at,
        };

        self.ctx
            .jobs
            .mark_complete(&self.env.owner_id, &self.env.job_id, &completion)
            .await?;

        info!(
            job_id = %self.env.job_id,
            size_bytes = file_size_bytes,
            "Job marked complete"
        );

        // Cancellation observed after the completion write skips the
        // preset snapshot; no further writes happen for this job.
        if cancel.is_some_and(|c| c.is_cancelled()) {
            info!(job_id = %self.env.job_id, "Cancellation observed, skipping preset snapshot");
            return Ok(completion);
        }

        self.save_preset(request).await;

        Ok(completion)
    }

    /// Snapshot the request as a preset and enforce retention.
    async fn save_preset(&self, request: &RenderRequest) {
        let record = PresetRecord::from_request(
            &self.env.job_id,
            &self.env.owner_id,
            &self.env.scope_id,
            &self.env.target_id,
            request,
        );

        if let Err(e) = self.ctx.presets.save(&record).await {
            warn!(job_id = %self.env.job_id, "Preset save failed: {}", e);
            return;
        }

        match self
            .ctx
            .presets
            .prune(
                &self.env.owner_id,
                &self.env.scope_id,
                self.ctx.config.preset_retention,
            )
            .await
        {
            Ok(0) => {}
            Ok(removed) => {
                info!(
                    job_id = %self.env.job_id,
                    removed,
                    "Pruned old presets"
                );
            }
            Err(e) => {
                warn!(job_id = %self.env.job_id, "Preset pruning failed: {}", e);
            }
        }
    }
}
