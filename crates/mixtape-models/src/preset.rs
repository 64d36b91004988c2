//! Reusable preset snapshots of completed renders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::JobId;
use crate::request::RenderRequest;

/// A durable snapshot of a completed render request.
///
/// Keyed by job id. Created once by the finalizer, never mutated,
/// deleted only by the retention sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetRecord {
    pub job_id: JobId,
    pub owner_id: String,
    pub scope_id: String,
    pub target_id: String,
    pub request: RenderRequest,
    pub created_at: DateTime<Utc>,
}

impl PresetRecord {
    /// Snapshot a request at completion time.
    pub fn from_request(
        job_id: &JobId,
        owner_id: &str,
        scope_id: &str,
        target_id: &str,
        request: &RenderRequest,
    ) -> Self {
        Self {
            job_id: job_id.clone(),
            owner_id: owner_id.to_string(),
            scope_id: scope_id.to_string(),
            target_id: target_id.to_string(),
            request: request.clone(),
            created_at: Utc::now(),
        }
    }
}
