use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{info, warn};
use tokio::fs;
use tokio::task::{AbortHandle, JoinHandle};

use crate::engine::models::{ChangeSet, DownloadReport};
use crate::error::{Result, UpdaterError};
use crate::networking::Fetcher;
use crate::util::{average_speed, format_grouped, format_speed};

/// Fetches change-set entries into the staging directory, one file at a time.
pub struct Downloader<F> {
    fetcher: Arc<F>,
    staging_root: PathBuf,
}

/// Running download task.
pub struct DownloadHandle {
    task: JoinHandle<DownloadReport>,
}

impl<F> Downloader<F>
where
    F: Fetcher + 'static,
{
    pub fn new(fetcher: Arc<F>, staging_root: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            staging_root: staging_root.into(),
        }
    }

    /// Start downloading on a dedicated background task.
    pub fn spawn(self, changes: ChangeSet) -> DownloadHandle {
        let task = tokio::spawn(async move { self.download_all(&changes).await });
        DownloadHandle { task }
    }

    pub async fn download_all(&self, changes: &ChangeSet) -> DownloadReport {
        let started = Instant::now();
        let mut report = DownloadReport::default();

        for (relative, remote) in changes {
            let dest = self.staging_root.join(relative);
            info!("download: fetching {remote}...");
            let file_started = Instant::now();

            match self.download_one(remote, &dest).await {
                Ok(bytes) => {
                    let elapsed = file_started.elapsed();
                    info!(
                        "download: ok, got {} bytes in {} ms ({})",
                        format_grouped(bytes),
                        format_grouped(elapsed.as_millis() as u64),
                        format_speed(average_speed(bytes, elapsed))
                    );
                    report.files_downloaded += 1;
                    report.total_bytes += bytes;
                }
                Err(err) => {
                    warn!("download: {relative} not updated this run: {err}");
                    report.files_failed.push(relative.clone());
                }
            }
        }

        report.elapsed = started.elapsed();
        info!(
            "download: {} of {} files, {} bytes in {} ms",
            report.files_downloaded,
            changes.len(),
            format_grouped(report.total_bytes),
            format_grouped(report.elapsed.as_millis() as u64)
        );
        report
    }

    /// Nothing is written unless the whole body was received.
    async fn download_one(&self, remote: &str, dest: &Path) -> Result<u64> {
        let bytes = self.fetcher.fetch_bytes(remote).await?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }
}

impl DownloadHandle {
    /// Wait for the batch; the task is aborted when `timeout` expires first.
    pub async fn wait(self, timeout: Duration) -> Result<DownloadReport> {
        let abort: AbortHandle = self.task.abort_handle();
        match tokio::time::timeout(timeout, self.task).await {
            Ok(joined) => Ok(joined?),
            Err(_) => {
                abort.abort();
                Err(UpdaterError::DownloadTimeout(timeout))
            }
        }
    }
}
