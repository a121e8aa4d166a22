use crate::error::{Result, VaultError};
use futures_util::StreamExt;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Cooperative cancellation flag for an in-flight download.
///
/// Clones share the same flag, so the caller can hand one clone to the
/// install task and trip the other from anywhere (e.g. a UI navigating away).
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Rewrite known file-sharing provider URLs to their direct-download endpoint.
///
/// Pixeldrain share links (`https://pixeldrain.com/u/<id>`) serve an HTML
/// page; the file itself lives at `/api/file/<id>`.
#[must_use]
pub fn rewrite_provider_url(url: &Url) -> Url {
    if url.host_str() == Some("pixeldrain.com") {
        if let Some(file_id) = final_path_segment(url) {
            if let Ok(direct) =
                Url::parse(&format!("https://pixeldrain.com/api/file/{file_id}"))
            {
                return direct;
            }
        }
    }
    url.clone()
}

/// Download a model archive to `temp_root`, named after the URL's final path
/// segment.
///
/// The provider rewrite is applied before any request is issued. The cancel
/// token is checked between chunks; cancelling deletes the partial file.
pub async fn fetch_remote<F>(
    url: &str,
    temp_root: &Path,
    timeout: Duration,
    cancel: &CancelToken,
    mut progress: F,
) -> Result<PathBuf>
where
    F: FnMut(u64),
{
    let url = Url::parse(url).map_err(|e| VaultError::InvalidUrl(format!("{url}: {e}")))?;
    let archive_name = final_path_segment(&url)
        .ok_or_else(|| VaultError::InvalidUrl(format!("{url}: no file name in URL path")))?;
    let url = rewrite_provider_url(&url);

    std::fs::create_dir_all(temp_root)?;
    let dest = temp_root.join(&archive_name);

    if cancel.is_cancelled() {
        return Err(VaultError::Cancelled);
    }

    tracing::info!("Downloading voice model archive from {url}");

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| VaultError::Network(e.to_string()))?;

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                VaultError::Network(format!("Download of {url} timed out"))
            } else {
                VaultError::Network(e.to_string())
            }
        })?
        .error_for_status()
        .map_err(|e| VaultError::Network(e.to_string()))?;

    if let Err(e) = stream_to_file(response, &dest, cancel, &mut progress).await {
        let _ = std::fs::remove_file(&dest);
        return Err(e);
    }

    tracing::debug!("Saved archive to {}", dest.display());
    Ok(dest)
}

async fn stream_to_file<F>(
    response: reqwest::Response,
    dest: &Path,
    cancel: &CancelToken,
    progress: &mut F,
) -> Result<()>
where
    F: FnMut(u64),
{
    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut downloaded = 0u64;

    while let Some(chunk) = stream.next().await {
        if cancel.is_cancelled() {
            return Err(VaultError::Cancelled);
        }
        let chunk = chunk.map_err(|e| VaultError::Network(e.to_string()))?;
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
        progress(downloaded);
    }

    file.flush().await?;
    Ok(())
}

/// Validate a local archive path, passing it through unchanged
pub fn fetch_local(path: &Path) -> Result<PathBuf> {
    if !path.is_file() {
        return Err(VaultError::Filesystem(format!(
            "Archive not found: {}",
            path.display()
        )));
    }
    // Surface permission problems here rather than mid-extraction
    std::fs::File::open(path)
        .map_err(|e| VaultError::Filesystem(format!("Cannot read {}: {e}", path.display())))?;
    Ok(path.to_path_buf())
}

/// Format bytes as human-readable string
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Final path segment of a URL, ignoring query and fragment
fn final_path_segment(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.last()?.trim();
    if segment.is_empty() {
        None
    } else {
        Some(segment.to_string())
    }
}
