//! In-memory fakes for exercising the runner end to end.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use mixtape_media::{DiagnosticFn, EncodeSpec, MediaError, PercentFn};
use mixtape_models::{ClaimOutcome, CompletionFields, JobId, JobStatus, PresetRecord};
use mixtape_storage::UploadOptions;
use mixtape_worker::error::{WorkerError, WorkerResult};
use mixtape_worker::services::{
    ArtifactStore, Encoder, JobStore, PresetStore, SourceFetcher, StatusSubscription,
};
use mixtape_worker::{JobEnv, ServiceContext, WorkerConfig};

// =============================================================================
// Job store fake
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct JobState {
    pub status: JobStatus,
    pub stages: Vec<String>,
    pub progress_writes: Vec<u8>,
    pub completion: Option<CompletionFields>,
    pub failure: Option<String>,
    pub claims: u32,
}

pub struct InMemoryJobStore {
    state: Mutex<JobState>,
    status_tx: watch::Sender<JobStatus>,
    /// When set, the claim reports the record as already cancelled,
    /// simulating a cancellation landing between pre-flight and claim.
    pub refuse_claim_as_cancelled: AtomicBool,
    /// When set, the record flips to cancelled right after the completion
    /// write, simulating a cancellation landing before preset creation.
    pub cancel_after_complete: AtomicBool,
}

impl InMemoryJobStore {
    pub fn with_status(status: JobStatus) -> Arc<Self> {
        let (status_tx, _) = watch::channel(status);
        Arc::new(Self {
            state: Mutex::new(JobState {
                status,
                ..JobState::default()
            }),
            status_tx,
            refuse_claim_as_cancelled: AtomicBool::new(false),
            cancel_after_complete: AtomicBool::new(false),
        })
    }

    /// Flip the status externally, as the cancelling actor would.
    pub fn set_status(&self, status: JobStatus) {
        self.state.lock().unwrap().status = status;
        self.status_tx.send_replace(status);
    }

    pub fn snapshot(&self) -> JobState {
        self.state.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn status(&self, _owner: &str, _job: &JobId) -> WorkerResult<Option<JobStatus>> {
        Ok(Some(self.state.lock().unwrap().status))
    }

    async fn claim(&self, _owner: &str, _job: &JobId) -> WorkerResult<ClaimOutcome> {
        if self.refuse_claim_as_cancelled.load(Ordering::SeqCst) {
            return Ok(ClaimOutcome::AlreadyCancelled);
        }
        let mut state = self.state.lock().unwrap();
        match state.status {
            JobStatus::Cancelled => Ok(ClaimOutcome::AlreadyCancelled),
            JobStatus::Complete => Ok(ClaimOutcome::AlreadyComplete),
            _ => {
                state.status = JobStatus::Rendering;
                state.claims += 1;
                drop(state);
                self.status_tx.send_replace(JobStatus::Rendering);
                Ok(ClaimOutcome::Claimed)
            }
        }
    }

    async fn update_stage(&self, _owner: &str, _job: &JobId, stage: &str) -> WorkerResult<()> {
        self.state.lock().unwrap().stages.push(stage.to_string());
        Ok(())
    }

    async fn update_progress(&self, _owner: &str, _job: &JobId, percent: u8) -> WorkerResult<()> {
        self.state.lock().unwrap().progress_writes.push(percent);
        Ok(())
    }

    async fn mark_complete(
        &self,
        _owner: &str,
        _job: &JobId,
        completion: &CompletionFields,
    ) -> WorkerResult<()> {
        {
            let mut state = self.state.lock().unwrap();
            state.status = JobStatus::Complete;
            state.completion = Some(completion.clone());
        }
        if self.cancel_after_complete.load(Ordering::SeqCst) {
            self.set_status(JobStatus::Cancelled);
            // Give the monitor time to forward the change.
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Ok(())
    }

    async fn mark_failed(&self, _owner: &str, _job: &JobId, error: &str) -> WorkerResult<()> {
        let mut state = self.state.lock().unwrap();
        state.status = JobStatus::RenderFailed;
        state.failure = Some(error.to_string());
        Ok(())
    }

    async fn subscribe_status(
        &self,
        _owner: &str,
        _job: &JobId,
        _poll_interval: Duration,
    ) -> WorkerResult<StatusSubscription> {
        Ok(StatusSubscription::unguarded(self.status_tx.subscribe()))
    }
}

// =============================================================================
// Preset store fake
// =============================================================================

#[derive(Default)]
pub struct InMemoryPresetStore {
    pub saved: Mutex<Vec<PresetRecord>>,
    pub prune_calls: Mutex<Vec<u32>>,
}

#[async_trait]
impl PresetStore for InMemoryPresetStore {
    async fn save(&self, record: &PresetRecord) -> WorkerResult<()> {
        self.saved.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn prune(&self, _owner: &str, _scope: &str, keep: u32) -> WorkerResult<usize> {
        self.prune_calls.lock().unwrap().push(keep);
        Ok(0)
    }
}

// =============================================================================
// Artifact store fake
// =============================================================================

#[derive(Default)]
pub struct InMemoryArtifactStore {
    /// key -> size
    pub objects: Mutex<HashMap<String, u64>>,
    pub presigned: Mutex<Vec<String>>,
    /// When set, the linked job store flips to cancelled during the
    /// upload, simulating a cancellation landing mid-upload.
    pub cancel_on_upload: Mutex<Option<Arc<InMemoryJobStore>>>,
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn object_size(&self, key: &str) -> WorkerResult<Option<u64>> {
        Ok(self.objects.lock().unwrap().get(key).copied())
    }

    async fn upload_file(&self, _path: &Path, key: &str, opts: &UploadOptions) -> WorkerResult<()> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), opts.content_length);
        let jobs = self.cancel_on_upload.lock().unwrap().clone();
        if let Some(jobs) = jobs {
            jobs.set_status(JobStatus::Cancelled);
            // Give the monitor time to forward the change.
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Ok(())
    }

    async fn download_object(&self, _key: &str, dest: &Path) -> WorkerResult<()> {
        tokio::fs::write(dest, b"object-bytes").await?;
        Ok(())
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> WorkerResult<String> {
        let url = format!("https://signed.example.com/{}?ttl={}", key, ttl.as_secs());
        self.presigned.lock().unwrap().push(url.clone());
        Ok(url)
    }
}

// =============================================================================
// Fetcher fake
// =============================================================================

#[derive(Default)]
pub struct FakeFetcher {
    /// URLs containing this substring fail.
    pub fail_matching: Option<String>,
    pub fetched: Mutex<Vec<String>>,
}

#[async_trait]
impl SourceFetcher for FakeFetcher {
    async fn fetch_http(&self, url: &str, dest: &Path) -> WorkerResult<u64> {
        if let Some(pattern) = &self.fail_matching {
            if url.contains(pattern) {
                return Err(WorkerError::download_failed(format!(
                    "{} returned HTTP 404",
                    url
                )));
            }
        }
        tokio::fs::write(dest, b"http-bytes").await?;
        self.fetched.lock().unwrap().push(url.to_string());
        Ok(10)
    }
}

// =============================================================================
// Encoder fake
// =============================================================================

pub enum EncoderMode {
    /// Report some progress (including an out-of-range value) and write
    /// the output file.
    Succeed,
    Fail,
    /// Block until the cancel flag flips, then surface cancellation.
    WaitForCancel,
}

pub struct FakeEncoder {
    pub mode: EncoderMode,
    pub invoked: AtomicBool,
}

impl FakeEncoder {
    pub fn new(mode: EncoderMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            invoked: AtomicBool::new(false),
        })
    }

    pub fn was_invoked(&self) -> bool {
        self.invoked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Encoder for FakeEncoder {
    async fn encode(
        &self,
        spec: &EncodeSpec,
        mut cancel_rx: watch::Receiver<bool>,
        on_percent: PercentFn,
        _on_diagnostic: DiagnosticFn,
    ) -> WorkerResult<()> {
        self.invoked.store(true, Ordering::SeqCst);

        match self.mode {
            EncoderMode::Succeed => {
                on_percent(25.0);
                on_percent(60.0);
                on_percent(150.0);
                tokio::fs::write(&spec.output, vec![0u8; 2048]).await?;
                Ok(())
            }
            EncoderMode::Fail => Err(WorkerError::Media(MediaError::ffmpeg_failed(
                "encoder exploded",
                Some("stderr tail".to_string()),
                Some(1),
            ))),
            EncoderMode::WaitForCancel => loop {
                if *cancel_rx.borrow_and_update() {
                    return Err(WorkerError::Media(MediaError::Cancelled));
                }
                if cancel_rx.changed().await.is_err() {
                    return Err(WorkerError::Media(MediaError::Cancelled));
                }
            },
        }
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub ctx: ServiceContext,
    pub jobs: Arc<InMemoryJobStore>,
    pub presets: Arc<InMemoryPresetStore>,
    pub artifacts: Arc<InMemoryArtifactStore>,
    pub fetcher: Arc<FakeFetcher>,
    pub encoder: Arc<FakeEncoder>,
    pub env: JobEnv,
    _work_dir: tempfile::TempDir,
}

pub fn request_json() -> String {
    r#"{
        "resolution": "720p",
        "loopCount": 1,
        "masterVolume": 1.0,
        "title": "Test Mix",
        "tracks": [
            {"source": "https://cdn.example.com/a.mp3", "durationSecs": 120.0},
            {"source": "uploads/user-1/b.mp3", "durationSecs": 60.0}
        ],
        "coverImage": "uploads/user-1/cover.jpg"
    }"#
    .to_string()
}

pub fn harness(initial_status: JobStatus, mode: EncoderMode) -> Harness {
    harness_with(initial_status, mode, FakeFetcher::default())
}

pub fn harness_with(initial_status: JobStatus, mode: EncoderMode, fetcher: FakeFetcher) -> Harness {
    let work_dir = tempfile::tempdir().expect("tempdir");

    let jobs = InMemoryJobStore::with_status(initial_status);
    let presets = Arc::new(InMemoryPresetStore::default());
    let artifacts = Arc::new(InMemoryArtifactStore::default());
    let fetcher = Arc::new(fetcher);
    let encoder = FakeEncoder::new(mode);

    let config = WorkerConfig {
        work_dir: work_dir.path().to_path_buf(),
        progress_interval: Duration::from_millis(10),
        status_poll_interval: Duration::from_millis(10),
        preset_retention: 3,
        url_ttl: Duration::from_secs(7 * 24 * 3600),
    };

    let ctx = ServiceContext {
        jobs: jobs.clone() as Arc<dyn JobStore>,
        presets: presets.clone() as Arc<dyn PresetStore>,
        artifacts: artifacts.clone() as Arc<dyn ArtifactStore>,
        fetcher: fetcher.clone() as Arc<dyn SourceFetcher>,
        encoder: encoder.clone() as Arc<dyn Encoder>,
        config,
    };

    let env = JobEnv {
        job_id: JobId::from_string("job-test-1"),
        owner_id: "user-1".to_string(),
        scope_id: "scope-1".to_string(),
        target_id: "mix-1".to_string(),
        request_json: request_json(),
    };

    Harness {
        ctx,
        jobs,
        presets,
        artifacts,
        fetcher,
        encoder,
        env,
        _work_dir: work_dir,
    }
}
