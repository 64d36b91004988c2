//! Typed repository for render job records.
//!
//! Job records live at `users/{owner}/render_jobs/{job}`. The dispatcher
//! creates them; the worker claims and advances them; the cancelling actor
//! may flip `status` to `cancelled` at any time. All writes here go through
//! the client's retry policy except the claim, which handles precondition
//! contention itself.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use mixtape_models::{ClaimOutcome, CompletionFields, JobId, JobStatus, RenderJob};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::types::{Document, ToFirestoreValue, Value};

/// Attempts at the claim write before giving up on contention.
const CLAIM_ATTEMPTS: u32 = 5;

/// Stage label written by the claim; the executor rewrites it as phases
/// advance.
const INITIAL_STAGE: &str = "downloading";

/// Repository for render job documents.
#[derive(Clone)]
pub struct RenderJobRepository {
    client: FirestoreClient,
}

impl RenderJobRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    fn collection(owner_id: &str) -> String {
        format!("users/{}/render_jobs", owner_id)
    }

    /// Fetch a job record.
    pub async fn get(&self, owner_id: &str, job_id: &JobId) -> FirestoreResult<Option<RenderJob>> {
        let collection = Self::collection(owner_id);
        let doc = self
            .client
            .with_retry("get_render_job", || {
                self.client.get_document(&collection, job_id.as_str())
            })
            .await?;

        doc.map(|d| doc_to_job(&d)).transpose()
    }

    /// Current status of a job record. `None` if the record is missing.
    pub async fn get_status(
        &self,
        owner_id: &str,
        job_id: &JobId,
    ) -> FirestoreResult<Option<JobStatus>> {
        let collection = Self::collection(owner_id);
        let doc = self
            .client
            .with_retry("get_render_job_status", || {
                self.client.get_document(&collection, job_id.as_str())
            })
            .await?;

        Ok(doc.and_then(|d| {
            d.get::<String>("status")
                .as_deref()
                .and_then(JobStatus::parse)
        }))
    }

    /// Transactionally claim a job for rendering.
    ///
    /// Reads the record with its `updateTime`, refuses terminal states, then
    /// writes `status = rendering` conditioned on that `updateTime`. A
    /// concurrent write (a cancellation landing between read and write)
    /// fails the precondition and the loop re-reads. After `CLAIM_ATTEMPTS`
    /// losses the contention is surfaced as an error.
    pub async fn claim_for_render(
        &self,
        owner_id: &str,
        job_id: &JobId,
    ) -> FirestoreResult<ClaimOutcome> {
        let collection = Self::collection(owner_id);

        for attempt in 0..CLAIM_ATTEMPTS {
            let doc = self
                .client
                .with_retry("read_for_claim", || {
                    self.client.get_document(&collection, job_id.as_str())
                })
                .await?
                .ok_or_else(|| {
                    FirestoreError::not_found(format!("{}/{}", collection, job_id))
                })?;

            let status = doc
                .get::<String>("status")
                .as_deref()
                .and_then(JobStatus::parse)
                .unwrap_or_default();

            match status {
                JobStatus::Cancelled => return Ok(ClaimOutcome::AlreadyCancelled),
                JobStatus::Complete => return Ok(ClaimOutcome::AlreadyComplete),
                _ => {}
            }

            let update_time = doc.update_time.clone();

            let result = self
                .client
                .update_document_with_precondition(
                    &collection,
                    job_id.as_str(),
                    claim_fields(),
                    Some(claim_mask()),
                    update_time.as_deref(),
                )
                .await;

            match result {
                Ok(_) => return Ok(ClaimOutcome::Claimed),
                Err(e) if e.is_precondition_failed() => {
                    debug!(
                        job_id = %job_id,
                        attempt = attempt + 1,
                        "Claim lost a concurrent write, re-reading"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Err(FirestoreError::request_failed(format!(
            "Claim contention persisted after {} attempts for {}/{}",
            CLAIM_ATTEMPTS, collection, job_id
        )))
    }

    /// Write the current phase label.
    pub async fn update_stage(
        &self,
        owner_id: &str,
        job_id: &JobId,
        stage: &str,
    ) -> FirestoreResult<()> {
        let collection = Self::collection(owner_id);
        let mut fields = HashMap::new();
        fields.insert("stage".to_string(), stage.to_firestore_value());

        self.client
            .with_retry("update_render_stage", || {
                self.client.update_document(
                    &collection,
                    job_id.as_str(),
                    fields.clone(),
                    Some(vec!["stage".to_string()]),
                )
            })
            .await?;
        Ok(())
    }

    /// Write a progress percentage (already clamped to 0-100 by the caller).
    pub async fn update_progress(
        &self,
        owner_id: &str,
        job_id: &JobId,
        percent: u8,
    ) -> FirestoreResult<()> {
        let collection = Self::collection(owner_id);
        let mut fields = HashMap::new();
        fields.insert("progress".to_string(), percent.to_firestore_value());

        self.client
            .with_retry("update_render_progress", || {
                self.client.update_document(
                    &collection,
                    job_id.as_str(),
                    fields.clone(),
                    Some(vec!["progress".to_string()]),
                )
            })
            .await?;
        Ok(())
    }

    /// Mark the job complete with artifact access fields.
    pub async fn mark_complete(
        &self,
        owner_id: &str,
        job_id: &JobId,
        completion: &CompletionFields,
    ) -> FirestoreResult<()> {
        let collection = Self::collection(owner_id);
        let mut fields = HashMap::new();
        fields.insert(
            "status".to_string(),
            JobStatus::Complete.as_str().to_firestore_value(),
        );
        fields.insert("progress".to_string(), 100u8.to_firestore_value());
        fields.insert("completedAt".to_string(), Utc::now().to_firestore_value());
        fields.insert(
            "downloadUrl".to_string(),
            completion.download_url.to_firestore_value(),
        );
        fields.insert(
            "fileSizeBytes".to_string(),
            completion.file_size_bytes.to_firestore_value(),
        );
        fields.insert(
            "expiresAt".to_string(),
            completion.expires_at.to_firestore_value(),
        );

        self.client
            .with_retry("mark_render_complete", || {
                self.client.update_document(
                    &collection,
                    job_id.as_str(),
                    fields.clone(),
                    Some(vec![
                        "status".to_string(),
                        "progress".to_string(),
                        "completedAt".to_string(),
                        "downloadUrl".to_string(),
                        "fileSizeBytes".to_string(),
                        "expiresAt".to_string(),
                    ]),
                )
            })
            .await?;
        Ok(())
    }

    /// Mark the job failed with an error message.
    pub async fn mark_failed(
        &self,
        owner_id: &str,
        job_id: &JobId,
        error: &str,
    ) -> FirestoreResult<()> {
        let collection = Self::collection(owner_id);
        let mut fields = HashMap::new();
        fields.insert(
            "status".to_string(),
            JobStatus::RenderFailed.as_str().to_firestore_value(),
        );
        fields.insert("failedAt".to_string(), Utc::now().to_firestore_value());
        fields.insert("error".to_string(), error.to_firestore_value());

        self.client
            .with_retry("mark_render_failed", || {
                self.client.update_document(
                    &collection,
                    job_id.as_str(),
                    fields.clone(),
                    Some(vec![
                        "status".to_string(),
                        "failedAt".to_string(),
                        "error".to_string(),
                    ]),
                )
            })
            .await?;
        Ok(())
    }

    /// Subscribe to status changes for a job.
    ///
    /// Returns the current status receiver and a handle that stops the
    /// polling task when dropped or explicitly unsubscribed. The receiver
    /// is seeded with the status observed at subscribe time.
    pub async fn watch_status(
        &self,
        owner_id: &str,
        job_id: &JobId,
        poll_interval: Duration,
    ) -> FirestoreResult<(watch::Receiver<JobStatus>, StatusWatchHandle)> {
        let initial = self
            .get_status(owner_id, job_id)
            .await?
            .unwrap_or_default();

        let (tx, rx) = watch::channel(initial);

        let repo = self.clone();
        let owner = owner_id.to_string();
        let job = job_id.clone();

        let task = tokio::spawn(async move {
            let mut last = initial;
            let mut interval = tokio::time::interval(poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;

                match repo.get_status(&owner, &job).await {
                    Ok(Some(status)) => {
                        if status != last {
                            debug!(job_id = %job, from = %last, to = %status, "Job status changed");
                            last = status;
                            if tx.send(status).is_err() {
                                break;
                            }
                            // Terminal states never change again.
                            if status.is_terminal() {
                                break;
                            }
                        }
                    }
                    Ok(None) => {
                        warn!(job_id = %job, "Job record disappeared while watching");
                    }
                    Err(e) => {
                        // Transient poll failures are tolerated; the next
                        // tick retries.
                        warn!(job_id = %job, "Status poll failed: {}", e);
                    }
                }

                if tx.is_closed() {
                    break;
                }
            }
        });

        Ok((rx, StatusWatchHandle { task: Some(task) }))
    }
}

/// Handle for an active status subscription.
///
/// Dropping the handle stops the polling task.
pub struct StatusWatchHandle {
    task: Option<JoinHandle<()>>,
}

impl StatusWatchHandle {
    /// Stop the subscription.
    pub fn unsubscribe(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for StatusWatchHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Fields the claim writes: the rendering status plus the initial stage,
/// a zeroed progress bar, the start timestamp, and a cleared error.
fn claim_fields() -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert(
        "status".to_string(),
        JobStatus::Rendering.as_str().to_firestore_value(),
    );
    fields.insert("stage".to_string(), INITIAL_STAGE.to_firestore_value());
    fields.insert("startedAt".to_string(), Utc::now().to_firestore_value());
    fields.insert("progress".to_string(), 0u8.to_firestore_value());
    fields.insert("error".to_string(), Value::NullValue(()));
    fields
}

fn claim_mask() -> Vec<String> {
    ["status", "stage", "startedAt", "progress", "error"]
        .iter()
        .map(|f| f.to_string())
        .collect()
}

/// Map a Firestore document onto a job record.
fn doc_to_job(doc: &Document) -> FirestoreResult<RenderJob> {
    let job_id: String = doc
        .get("jobId")
        .ok_or_else(|| FirestoreError::invalid_document("missing jobId"))?;
    let owner_id: String = doc
        .get("ownerId")
        .ok_or_else(|| FirestoreError::invalid_document("missing ownerId"))?;
    let scope_id: String = doc
        .get("scopeId")
        .ok_or_else(|| FirestoreError::invalid_document("missing scopeId"))?;
    let target_id: String = doc
        .get("targetId")
        .ok_or_else(|| FirestoreError::invalid_document("missing targetId"))?;

    let status = doc
        .get::<String>("status")
        .as_deref()
        .and_then(JobStatus::parse)
        .unwrap_or_default();

    Ok(RenderJob {
        job_id: JobId::from_string(job_id),
        owner_id,
        scope_id,
        target_id,
        status,
        stage: doc.get("stage"),
        progress: doc.get("progress").unwrap_or(0),
        started_at: doc.get("startedAt"),
        completed_at: doc.get("completedAt"),
        failed_at: doc.get("failedAt"),
        download_url: doc.get("downloadUrl"),
        file_size_bytes: doc.get("fileSizeBytes"),
        expires_at: doc.get("expiresAt"),
        error: doc.get("error"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MapValue;

    fn job_doc(status: &str) -> Document {
        let mut fields = HashMap::new();
        fields.insert("jobId".to_string(), "job-1".to_firestore_value());
        fields.insert("ownerId".to_string(), "user-1".to_firestore_value());
        fields.insert("scopeId".to_string(), "scope-1".to_firestore_value());
        fields.insert("targetId".to_string(), "mix-1".to_firestore_value());
        fields.insert("status".to_string(), status.to_firestore_value());
        fields.insert("progress".to_string(), 40u8.to_firestore_value());
        Document {
            name: Some("projects/p/databases/(default)/documents/users/user-1/render_jobs/job-1".into()),
            fields: Some(fields),
            create_time: None,
            update_time: Some("2026-01-01T00:00:00Z".into()),
        }
    }

    #[test]
    fn test_doc_to_job_maps_fields() {
        let job = doc_to_job(&job_doc("rendering")).unwrap();
        assert_eq!(job.job_id.as_str(), "job-1");
        assert_eq!(job.owner_id, "user-1");
        assert_eq!(job.status, JobStatus::Rendering);
        assert_eq!(job.progress, 40);
        assert!(job.download_url.is_none());
    }

    #[test]
    fn test_doc_to_job_unknown_status_defaults_to_queued() {
        let job = doc_to_job(&job_doc("exploded")).unwrap();
        assert_eq!(job.status, JobStatus::Queued);
    }

    #[test]
    fn test_doc_to_job_rejects_missing_owner() {
        let mut doc = job_doc("queued");
        doc.fields.as_mut().unwrap().remove("ownerId");
        assert!(doc_to_job(&doc).is_err());
    }

    #[test]
    fn test_claim_initializes_stage_and_progress() {
        let fields = claim_fields();
        assert!(matches!(fields.get("status"), Some(Value::StringValue(s)) if s == "rendering"));
        assert!(matches!(fields.get("stage"), Some(Value::StringValue(s)) if s == "downloading"));
        assert!(matches!(fields.get("progress"), Some(Value::IntegerValue(p)) if p == "0"));
        assert!(matches!(fields.get("error"), Some(Value::NullValue(()))));

        let mask = claim_mask();
        for field in fields.keys() {
            assert!(mask.contains(field));
        }
    }

    #[test]
    fn test_collection_path() {
        assert_eq!(
            RenderJobRepository::collection("user-9"),
            "users/user-9/render_jobs"
        );
    }

    #[test]
    fn test_doc_to_job_ignores_nested_values() {
        let mut doc = job_doc("queued");
        doc.fields.as_mut().unwrap().insert(
            "stage".to_string(),
            Value::MapValue(MapValue { fields: None }),
        );
        let job = doc_to_job(&doc).unwrap();
        assert!(job.stage.is_none());
    }
}
