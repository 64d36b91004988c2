//! Worker configuration and the per-invocation job environment.

use std::path::PathBuf;
use std::time::Duration;

use mixtape_models::JobId;

use crate::error::{WorkerError, WorkerResult};

/// Job parameters handed to this invocation by the dispatcher.
#[derive(Debug, Clone)]
pub struct JobEnv {
    pub job_id: JobId,
    pub owner_id: String,
    pub scope_id: String,
    pub target_id: String,
    /// Raw render request payload, validated later.
    pub request_json: String,
}

impl JobEnv {
    /// Read the job contract from the environment.
    ///
    /// All five variables are required; a missing one is a configuration
    /// error, not a job failure, since no record can be updated without
    /// knowing which job this is.
    pub fn from_env() -> WorkerResult<Self> {
        Ok(Self {
            job_id: JobId::from_string(require_env("RENDER_JOB_ID")?),
            owner_id: require_env("RENDER_OWNER_ID")?,
            scope_id: require_env("RENDER_SCOPE_ID")?,
            target_id: require_env("RENDER_TARGET_ID")?,
            request_json: require_env("RENDER_REQUEST")?,
        })
    }
}

fn require_env(name: &str) -> WorkerResult<String> {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(WorkerError::config_error(format!("{} not set", name))),
    }
}

/// Tunable worker knobs.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root directory for per-job scratch space.
    pub work_dir: PathBuf,
    /// Minimum interval between persisted progress writes.
    pub progress_interval: Duration,
    /// Poll interval for the job status subscription.
    pub status_poll_interval: Duration,
    /// How many preset snapshots to keep per scope.
    pub preset_retention: u32,
    /// Lifetime of the presigned artifact URL.
    pub url_ttl: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/mixtape"),
            progress_interval: Duration::from_millis(500),
            status_poll_interval: Duration::from_secs(2),
            preset_retention: 10,
            url_ttl: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            work_dir: std::env::var("RENDER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            progress_interval: Duration::from_millis(
                std::env::var("RENDER_PROGRESS_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
            ),
            status_poll_interval: Duration::from_millis(
                std::env::var("RENDER_STATUS_POLL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2000),
            ),
            preset_retention: std::env::var("RENDER_PRESET_RETENTION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            url_ttl: Duration::from_secs(
                std::env::var("RENDER_URL_TTL_DAYS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(7)
                    * 24
                    * 3600,
            ),
        }
    }
}
