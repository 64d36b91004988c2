//! Deterministic artifact keys and content metadata.

use mixtape_models::JobId;

/// Deterministic object key for a job's artifact.
///
/// Every re-delivery of the same job resolves to the same key, which is
/// what makes the pre-render existence probe meaningful.
pub fn artifact_key(owner_id: &str, target_id: &str, job_id: &JobId) -> String {
    format!("renders/{}/{}/{}.mp4", owner_id, target_id, job_id)
}

/// `Content-Disposition` for an artifact, derived from the display title.
pub fn attachment_disposition(title: &str) -> String {
    format!("attachment; filename=\"{}.mp4\"", sanitize_filename(title))
}

/// Strip characters that break a quoted filename or a filesystem path.
fn sanitize_filename(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "mixtape".to_string()
    } else {
        trimmed.chars().take(100).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_key_is_deterministic() {
        let job = JobId::from_string("job-1");
        let a = artifact_key("user-1", "tape-9", &job);
        let b = artifact_key("user-1", "tape-9", &job);
        assert_eq!(a, b);
        assert_eq!(a, "renders/user-1/tape-9/job-1.mp4");
    }

    #[test]
    fn test_disposition_sanitizes_title() {
        let d = attachment_disposition("My \"Mix\" / Vol.1");
        assert!(!d.contains('/'));
        assert!(d.starts_with("attachment; filename=\""));
        assert!(d.ends_with(".mp4\""));
    }

    #[test]
    fn test_disposition_empty_title_falls_back() {
        let d = attachment_disposition("!!!");
        assert_eq!(d, "attachment; filename=\"___.mp4\"");
        let d = attachment_disposition("   ");
        assert_eq!(d, "attachment; filename=\"mixtape.mp4\"");
    }
}
