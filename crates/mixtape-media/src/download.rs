//! HTTP input fetching.

use std::path::Path;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Download a URL to a local file, streaming to disk.
///
/// Returns the number of bytes written. The destination filename is chosen
/// by the caller; remote names are never trusted.
pub async fn fetch_url(url: &str, dest: impl AsRef<Path>) -> MediaResult<u64> {
    let dest = dest.as_ref();
    debug!(url = %url, dest = %dest.display(), "Fetching input");

    let response = reqwest::get(url)
        .await
        .map_err(|e| MediaError::download_failed(format!("{}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(MediaError::download_failed(format!(
            "{} returned HTTP {}",
            url,
            response.status()
        )));
    }

    let expected = response.content_length();

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| MediaError::download_failed(format!("{}: {}", url, e)))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    if let Some(expected) = expected {
        if written != expected {
            return Err(MediaError::download_failed(format!(
                "{}: short read ({} of {} bytes)",
                url, written, expected
            )));
        }
    }

    Ok(written)
}
