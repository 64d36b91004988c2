//! Idempotency guard.
//!
//! Artifact keys are deterministic per job, so a re-delivered job whose
//! artifact already exists can finalize the record and exit without
//! rendering anything.

use std::sync::Arc;

use crate::error::WorkerResult;
use crate::services::ArtifactStore;

/// Probe the artifact store for an already-rendered artifact.
///
/// Returns its size when present. A probe failure propagates; the caller
/// decides whether to treat it as fatal or fall through to a fresh render.
pub async fn existing_artifact(
    artifacts: &Arc<dyn ArtifactStore>,
    key: &str,
) -> WorkerResult<Option<u64>> {
    artifacts.object_size(key).await
}
