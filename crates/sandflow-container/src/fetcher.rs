//! Base image and package archive acquisition
//!
//! Downloads a compressed archive over HTTP and extracts it with the host
//! `tar`. Failures surface as [`ContainerError::FetchFailed`], the one
//! retryable error kind; [`fetch_with_retry`] wraps a fetch in the blind
//! bounded-retry policy used for base image staging.

use crate::error::{ContainerError, Result};
use crate::hostfs;
use crate::runner::CommandRunner;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Fetches an archive and makes its contents available under a directory.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Download the archive at `url` to `archive_path`, then extract it
    /// into `extract_dir`. On failure, partial files may remain at either
    /// path; the caller cleans them up before retrying.
    async fn fetch(&self, url: &str, archive_path: &Path, extract_dir: &Path) -> Result<()>;
}

/// Production fetcher: HTTP download plus `tar -xf` extraction.
pub struct HttpArtifactFetcher {
    client: reqwest::Client,
    runner: Arc<dyn CommandRunner>,
}

impl HttpArtifactFetcher {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            client: reqwest::Client::new(),
            runner,
        }
    }
}

#[async_trait]
impl ArtifactSource for HttpArtifactFetcher {
    async fn fetch(&self, url: &str, archive_path: &Path, extract_dir: &Path) -> Result<()> {
        tracing::debug!("Downloading {url} to {}", archive_path.display());

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ContainerError::FetchFailed(format!("GET {url}: {e}")))?;
        if !response.status().is_success() {
            return Err(ContainerError::FetchFailed(format!(
                "GET {url}: HTTP {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ContainerError::FetchFailed(format!("GET {url}: {e}")))?;

        // The archive destination may be root-owned; download to a scratch
        // path and move it into place through the runner.
        let file_name = archive_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("artifact");
        let scratch = std::env::temp_dir().join(format!(
            "sandflow-{}-{file_name}",
            std::process::id()
        ));
        std::fs::write(&scratch, &bytes)
            .map_err(|e| ContainerError::FetchFailed(format!("write archive: {e}")))?;
        hostfs::rename(self.runner.as_ref(), &scratch, archive_path)
            .await
            .map_err(|e| ContainerError::FetchFailed(format!("move archive: {e}")))?;

        let archive = archive_path.to_string_lossy();
        let dir = extract_dir.to_string_lossy();
        let output = self
            .runner
            .run("tar", &["-xf", &archive, "-C", &dir])
            .await?;
        if !output.success {
            return Err(ContainerError::FetchFailed(format!(
                "extract {archive}: {}",
                output.stderr
            )));
        }
        Ok(())
    }
}

/// Retry a fetch blindly at a fixed interval until it succeeds or the
/// wall-clock budget elapses. The archive destination is only ever written
/// by a completed move, so a failed attempt leaves no partial archive for
/// the next one to trip over.
pub async fn fetch_with_retry(
    source: &dyn ArtifactSource,
    url: &str,
    archive_path: &Path,
    extract_dir: &Path,
    budget: Duration,
    interval: Duration,
) -> Result<()> {
    let deadline = Instant::now() + budget;
    loop {
        match source.fetch(url, archive_path, extract_dir).await {
            Ok(()) => return Ok(()),
            Err(e @ ContainerError::FetchFailed(_)) if Instant::now() < deadline => {
                tracing::warn!("Fetch of {url} failed, retrying: {e}");
                tokio::time::sleep(interval).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeArtifacts;

    #[tokio::test]
    async fn test_fetch_with_retry_recovers() {
        let temp = tempfile::tempdir().unwrap();
        let artifacts = FakeArtifacts::base_image().fail_first(2);

        fetch_with_retry(
            &artifacts,
            "https://example.com/base.tar.xz",
            &temp.path().join("base.tar.xz"),
            temp.path(),
            Duration::from_secs(60),
            Duration::from_millis(0),
        )
        .await
        .unwrap();

        assert_eq!(artifacts.fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_fetch_with_retry_budget_exhausted() {
        let temp = tempfile::tempdir().unwrap();
        let artifacts = FakeArtifacts::base_image().fail_first(usize::MAX);

        let err = fetch_with_retry(
            &artifacts,
            "https://example.com/base.tar.xz",
            &temp.path().join("base.tar.xz"),
            temp.path(),
            Duration::from_secs(0),
            Duration::from_millis(0),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ContainerError::FetchFailed(_)));
        // Zero budget means the first failure is final.
        assert_eq!(artifacts.fetch_count(), 1);
    }
}
