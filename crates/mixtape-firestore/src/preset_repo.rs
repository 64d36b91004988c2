//! Typed repository for saved render presets.
//!
//! Every completed render leaves a preset snapshot at
//! `users/{owner}/scopes/{scope}/render_presets/{job}` so the request can be
//! replayed later. Retention keeps only the most recent snapshots per scope;
//! older ones are deleted in a single batch write.

use mixtape_models::PresetRecord;

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::types::{
    json_to_firestore_value, Direction, StructuredQuery, ToFirestoreValue, Value, Write,
};

/// Repository for render preset documents.
#[derive(Clone)]
pub struct PresetRepository {
    client: FirestoreClient,
}

impl PresetRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    fn parent_path(owner_id: &str, scope_id: &str) -> String {
        format!("users/{}/scopes/{}", owner_id, scope_id)
    }

    fn collection(owner_id: &str, scope_id: &str) -> String {
        format!("{}/render_presets", Self::parent_path(owner_id, scope_id))
    }

    /// Save a preset snapshot, keyed by job id.
    ///
    /// An existing snapshot for the same job (a re-delivered job that
    /// completed twice) is left in place.
    pub async fn save(&self, record: &PresetRecord) -> FirestoreResult<()> {
        let collection = Self::collection(&record.owner_id, &record.scope_id);
        let fields = preset_to_fields(record)?;

        let result = self
            .client
            .with_retry("save_preset", || {
                self.client
                    .create_document(&collection, record.job_id.as_str(), fields.clone())
            })
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(FirestoreError::AlreadyExists(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Delete all but the `keep` most recent presets in a scope.
    ///
    /// Returns how many snapshots were deleted.
    pub async fn prune_to_recent(
        &self,
        owner_id: &str,
        scope_id: &str,
        keep: u32,
    ) -> FirestoreResult<usize> {
        let parent = Self::parent_path(owner_id, scope_id);

        // Ordered newest-first with no limit; everything past `keep` goes.
        let query = StructuredQuery::ordered("render_presets", "createdAt", Direction::Descending);

        let docs = self
            .client
            .with_retry("list_presets_for_prune", || {
                self.client.run_query(&parent, query.clone())
            })
            .await?;

        let stale: Vec<Write> = docs
            .iter()
            .skip(keep as usize)
            .filter_map(|d| d.name.clone())
            .map(Write::delete)
            .collect();

        if stale.is_empty() {
            return Ok(0);
        }

        let count = stale.len();
        self.client
            .with_retry("prune_presets", || self.client.batch_write(stale.clone()))
            .await?;

        Ok(count)
    }
}

fn preset_to_fields(
    record: &PresetRecord,
) -> FirestoreResult<std::collections::HashMap<String, Value>> {
    let request_json = serde_json::to_value(&record.request)?;

    let mut fields = std::collections::HashMap::new();
    fields.insert("jobId".to_string(), record.job_id.as_str().to_firestore_value());
    fields.insert("ownerId".to_string(), record.owner_id.to_firestore_value());
    fields.insert("scopeId".to_string(), record.scope_id.to_firestore_value());
    fields.insert("targetId".to_string(), record.target_id.to_firestore_value());
    fields.insert("request".to_string(), json_to_firestore_value(&request_json));
    fields.insert("createdAt".to_string(), record.created_at.to_firestore_value());
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixtape_models::{JobId, RenderRequest};

    fn sample_record() -> PresetRecord {
        let request = RenderRequest::from_json(
            r#"{
                "resolution": "720p",
                "title": "Evening Mix",
                "tracks": [{"source": "https://cdn.example.com/a.mp3", "durationSecs": 180.0}],
                "coverImage": "uploads/user-1/cover.jpg"
            }"#,
        )
        .unwrap();

        PresetRecord::from_request(
            &JobId::from_string("job-1"),
            "user-1",
            "scope-1",
            "mix-1",
            &request,
        )
    }

    #[test]
    fn test_collection_path() {
        assert_eq!(
            PresetRepository::collection("u", "s"),
            "users/u/scopes/s/render_presets"
        );
    }

    #[test]
    fn test_preset_fields_include_request_map() {
        let fields = preset_to_fields(&sample_record()).unwrap();
        assert!(matches!(fields.get("request"), Some(Value::MapValue(_))));
        assert!(matches!(fields.get("createdAt"), Some(Value::TimestampValue(_))));
    }
}
