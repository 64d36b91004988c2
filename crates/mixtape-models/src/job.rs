//! Render job record as stored in Firestore.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a render job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a render job.
///
/// Transitions are monotonic toward a terminal state. The worker never
/// mutates a record again once it observes `Complete`, `Cancelled` or
/// `RenderFailed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting for a worker
    #[default]
    Queued,
    /// Job is actively being rendered
    Rendering,
    /// Job completed successfully
    Complete,
    /// Job was cancelled by an external actor
    Cancelled,
    /// Job failed during rendering
    RenderFailed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Rendering => "rendering",
            JobStatus::Complete => "complete",
            JobStatus::Cancelled => "cancelled",
            JobStatus::RenderFailed => "render_failed",
        }
    }

    /// Parse the status string stored in Firestore.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "rendering" => Some(JobStatus::Rendering),
            "complete" => Some(JobStatus::Complete),
            "cancelled" => Some(JobStatus::Cancelled),
            "render_failed" => Some(JobStatus::RenderFailed),
            _ => None,
        }
    }

    /// Check if this is a terminal state (no more writes expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Complete | JobStatus::Cancelled | JobStatus::RenderFailed
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of the transactional claim on a job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The record was moved to `rendering`.
    Claimed,
    /// A cancellation landed before (or during) the claim; nothing written.
    AlreadyCancelled,
    /// The record is already `complete`; nothing written.
    AlreadyComplete,
}

/// A render job record.
///
/// Owned by the dispatcher (created before the worker runs) and writable
/// by the cancelling actor at any time; the worker has write access but
/// must re-verify `status` before claiming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderJob {
    /// Unique job ID
    pub job_id: JobId,

    /// Owner (user) ID
    pub owner_id: String,

    /// Scope the job's presets belong to
    pub scope_id: String,

    /// Target entity being rendered (the mixtape document)
    pub target_id: String,

    /// Current status
    #[serde(default)]
    pub status: JobStatus,

    /// Free-form phase label ("downloading", "encoding", ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,

    /// Progress 0-100
    #[serde(default)]
    pub progress: u8,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,

    /// Time-limited access URL for the finished artifact
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<u64>,

    /// Expiry of `download_url`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Terminal completion fields written by the finalizer.
#[derive(Debug, Clone)]
pub struct CompletionFields {
    pub download_url: String,
    pub file_size_bytes: u64,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            JobStatus::Queued,
            JobStatus::Rendering,
            JobStatus::Complete,
            JobStatus::Cancelled,
            JobStatus::RenderFailed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("bogus"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Rendering.is_terminal());
        assert!(JobStatus::Complete.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(JobStatus::RenderFailed.is_terminal());
    }

    #[test]
    fn test_status_serde_snake_case() {
        let json = serde_json::to_string(&JobStatus::RenderFailed).unwrap();
        assert_eq!(json, "\"render_failed\"");
    }
}
