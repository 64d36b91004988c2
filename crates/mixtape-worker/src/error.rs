//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid render request: {0}")]
    InvalidRequest(#[from] mixtape_models::RequestError),

    #[error("Storage error: {0}")]
    Storage(#[from] mixtape_storage::StorageError),

    #[error("Firestore error: {0}")]
    Firestore(#[from] mixtape_firestore::FirestoreError),

    #[error("Media error: {0}")]
    Media(#[from] mixtape_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::DownloadFailed(msg.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// True when the underlying cause is a cooperative cancellation rather
    /// than a real failure. Callers map this to the cancelled outcome.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, WorkerError::Media(m) if m.is_cancelled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixtape_media::MediaError;

    #[test]
    fn test_cancellation_detection() {
        assert!(WorkerError::from(MediaError::Cancelled).is_cancellation());
        assert!(!WorkerError::job_failed("boom").is_cancellation());
    }
}
