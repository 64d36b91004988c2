//! Per-job scratch directory with RAII cleanup.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use mixtape_models::JobId;

use crate::error::WorkerResult;

/// Scratch space for one render, removed when the run ends.
///
/// `close` removes it asynchronously on the normal path; the `Drop` impl
/// is a synchronous backstop for early returns and panics.
pub struct ScratchDir {
    path: PathBuf,
    cleaned: bool,
}

impl ScratchDir {
    /// Create `root/<job-id>/`, including parents.
    pub async fn create(root: &Path, job_id: &JobId) -> WorkerResult<Self> {
        let path = root.join(job_id.as_str());
        tokio::fs::create_dir_all(&path).await?;
        debug!(path = %path.display(), "Created scratch dir");
        Ok(Self {
            path,
            cleaned: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a file inside the scratch dir.
    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Remove the directory and everything in it.
    pub async fn close(mut self) {
        self.cleaned = true;
        if let Err(e) = tokio::fs::remove_dir_all(&self.path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), "Scratch cleanup failed: {}", e);
            }
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if !self.cleaned {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), "Scratch cleanup failed in drop: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_close_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let job = JobId::from_string("job-1");

        let scratch = ScratchDir::create(root.path(), &job).await.unwrap();
        let path = scratch.path().to_path_buf();
        tokio::fs::write(scratch.file("out.mp4"), b"x").await.unwrap();
        assert!(path.exists());

        scratch.close().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let job = JobId::from_string("job-2");

        let path = {
            let scratch = ScratchDir::create(root.path(), &job).await.unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
