//! Phase executor: download, encode, upload.
//!
//! Phases run in strict order. The shared cancel signal is checked at every
//! phase boundary; the encoder additionally observes it mid-flight. Stage
//! labels are written best-effort and never fail the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, warn};

use mixtape_media::{EncodeSpec, EncodeTrack};
use mixtape_models::RenderRequest;
use mixtape_storage::{keys, UploadOptions};

use crate::config::JobEnv;
use crate::context::ServiceContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::monitor::CancelSignal;
use crate::progress::ProgressSink;
use crate::workspace::ScratchDir;

/// Pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Download,
    Encode,
    Upload,
    Finalize,
}

impl Phase {
    /// Stage label written to the job record.
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Download => "downloading",
            Phase::Encode => "encoding",
            Phase::Upload => "uploading",
            Phase::Finalize => "finalizing",
        }
    }
}

/// How a pipeline run ended.
#[derive(Debug)]
pub enum PipelineOutput {
    /// Artifact uploaded to the deterministic key.
    Rendered { file_size_bytes: u64 },
    /// Cancellation observed at a boundary or inside the encoder.
    Cancelled,
}

/// A source locator from the render request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocator {
    /// Fetch over HTTP.
    Url(String),
    /// Read from the artifact object store.
    Key(String),
}

impl SourceLocator {
    pub fn parse(source: &str) -> Self {
        if source.starts_with("http://") || source.starts_with("https://") {
            Self::Url(source.to_string())
        } else {
            Self::Key(source.to_string())
        }
    }
}

struct DownloadedInputs {
    cover: PathBuf,
    tracks: Vec<PathBuf>,
}

/// Runs the download, encode and upload phases for one job.
pub struct RenderPipeline<'a> {
    ctx: &'a ServiceContext,
    env: &'a JobEnv,
    request: &'a RenderRequest,
    cancel: CancelSignal,
    sink: ProgressSink,
    logger: JobLogger,
}

impl<'a> RenderPipeline<'a> {
    pub fn new(
        ctx: &'a ServiceContext,
        env: &'a JobEnv,
        request: &'a RenderRequest,
        cancel: CancelSignal,
        sink: ProgressSink,
    ) -> Self {
        let logger = JobLogger::new(&env.job_id, "render_pipeline");
        Self {
            ctx,
            env,
            request,
            cancel,
            sink,
            logger,
        }
    }

    /// Execute the phases, uploading the artifact to `artifact_key`.
    pub async fn run(
        &self,
        scratch: &ScratchDir,
        artifact_key: &str,
    ) -> WorkerResult<PipelineOutput> {
        if self.cancel.is_cancelled() {
            return Ok(PipelineOutput::Cancelled);
        }
        self.enter_phase(Phase::Download).await;
        let inputs = self.download_inputs(scratch).await?;

        if self.cancel.is_cancelled() {
            return Ok(PipelineOutput::Cancelled);
        }
        self.enter_phase(Phase::Encode).await;
        let output = scratch.file("output.mp4");
        match self.encode(&inputs, &output).await {
            Ok(()) => {}
            Err(e) if e.is_cancellation() => return Ok(PipelineOutput::Cancelled),
            Err(e) => return Err(e),
        }

        if self.cancel.is_cancelled() {
            return Ok(PipelineOutput::Cancelled);
        }
        self.enter_phase(Phase::Upload).await;
        let file_size_bytes = tokio::fs::metadata(&output).await?.len();
        let opts = UploadOptions {
            content_type: "video/mp4".to_string(),
            content_disposition: Some(keys::attachment_disposition(&self.request.title)),
            content_length: file_size_bytes,
        };
        self.ctx
            .artifacts
            .upload_file(&output, artifact_key, &opts)
            .await
            .map_err(|e| WorkerError::upload_failed(e.to_string()))?;

        Ok(PipelineOutput::Rendered { file_size_bytes })
    }

    /// Fetch the cover image and all tracks concurrently.
    ///
    /// The first failure tears down the fan-out and fails the phase.
    async fn download_inputs(&self, scratch: &ScratchDir) -> WorkerResult<DownloadedInputs> {
        let cover = scratch.file(&input_filename("cover", &self.request.cover_image));
        let tracks: Vec<PathBuf> = self
            .request
            .tracks
            .iter()
            .enumerate()
            .map(|(i, t)| scratch.file(&input_filename(&format!("track_{:02}", i), &t.source)))
            .collect();

        let mut fetches = Vec::with_capacity(tracks.len() + 1);
        fetches.push(self.fetch_input(&self.request.cover_image, cover.clone()));
        for (track, dest) in self.request.tracks.iter().zip(tracks.iter()) {
            fetches.push(self.fetch_input(&track.source, dest.clone()));
        }

        try_join_all(fetches).await?;

        self.logger.log_progress(&format!(
            "Fetched {} inputs",
            self.request.tracks.len() + 1
        ));
        Ok(DownloadedInputs { cover, tracks })
    }

    async fn fetch_input(&self, source: &str, dest: PathBuf) -> WorkerResult<()> {
        match SourceLocator::parse(source) {
            SourceLocator::Url(url) => {
                self.ctx
                    .fetcher
                    .fetch_http(&url, &dest)
                    .await
                    .map_err(|e| WorkerError::download_failed(format!("{}: {}", url, e)))?;
            }
            SourceLocator::Key(key) => {
                self.ctx
                    .artifacts
                    .download_object(&key, &dest)
                    .await
                    .map_err(|e| WorkerError::download_failed(format!("{}: {}", key, e)))?;
            }
        }
        Ok(())
    }

    async fn encode(&self, inputs: &DownloadedInputs, output: &Path) -> WorkerResult<()> {
        let profile = self
            .request
            .resolution_profile()
            .ok_or_else(|| WorkerError::job_failed("resolution profile missing after validation"))?;

        let spec = EncodeSpec {
            cover_image: inputs.cover.clone(),
            tracks: self
                .request
                .tracks
                .iter()
                .zip(inputs.tracks.iter())
                .map(|(t, path)| EncodeTrack {
                    path: path.clone(),
                    volume: t.volume,
                    trim_start: t.trim_start,
                    trim_end: t.trim_end,
                    duration_secs: t.duration_secs,
                })
                .collect(),
            width: profile.width,
            height: profile.height,
            bitrate_kbps: profile.bitrate_kbps,
            loop_count: self.request.loop_count,
            master_volume: self.request.master_volume,
            output: output.to_path_buf(),
            total_duration_secs: self.request.total_duration_secs(),
        };

        let sink = self.sink.clone();
        let job_id = self.env.job_id.to_string();

        self.ctx
            .encoder
            .encode(
                &spec,
                self.cancel.subscribe(),
                Arc::new(move |percent| sink.report(percent)),
                Arc::new(move |line| debug!(job_id = %job_id, "ffmpeg: {}", line)),
            )
            .await
    }

    /// Write the stage label. Best-effort: a failed write only logs.
    async fn enter_phase(&self, phase: Phase) {
        self.logger.log_progress(&format!("Entering {} phase", phase.label()));
        if let Err(e) = self
            .ctx
            .jobs
            .update_stage(&self.env.owner_id, &self.env.job_id, phase.label())
            .await
        {
            warn!(job_id = %self.env.job_id, stage = phase.label(), "Stage write failed: {}", e);
        }
    }
}

/// Scratch filename for an input, keeping a plausible extension so format
/// probing has something to go on.
fn input_filename(prefix: &str, source: &str) -> String {
    let ext = source
        .rsplit('.')
        .next()
        .filter(|ext| ext.len() <= 4 && ext.chars().all(|c| c.is_ascii_alphanumeric()));

    match ext {
        Some(ext) => format!("{}.{}", prefix, ext.to_lowercase()),
        None => prefix.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_parse() {
        assert_eq!(
            SourceLocator::parse("https://cdn.example.com/a.mp3"),
            SourceLocator::Url("https://cdn.example.com/a.mp3".to_string())
        );
        assert_eq!(
            SourceLocator::parse("uploads/user-1/a.mp3"),
            SourceLocator::Key("uploads/user-1/a.mp3".to_string())
        );
    }

    #[test]
    fn test_phase_labels() {
        assert_eq!(Phase::Download.label(), "downloading");
        assert_eq!(Phase::Finalize.label(), "finalizing");
    }

    #[test]
    fn test_input_filename_keeps_extension() {
        assert_eq!(input_filename("track_00", "a/b/song.MP3"), "track_00.mp3");
        assert_eq!(input_filename("cover", "covers/art.jpeg"), "cover.jpeg");
        // Query strings and long suffixes are not extensions
        assert_eq!(
            input_filename("track_01", "https://x/y?token=abc123456"),
            "track_01"
        );
    }
}
