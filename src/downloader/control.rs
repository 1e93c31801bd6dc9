//! Download control: enqueue, pause, resume, cancel, delete, retry, queries.

use std::sync::atomic::Ordering;

use crate::db::DescriptorRow;
use crate::engine::FilePaths;
use crate::error::{DownloadError, Error, Result};
use crate::types::{DownloadDescriptor, DownloadInfo, DownloadState};

use super::UpdateDownloader;

impl UpdateDownloader {
    /// Enqueue a descriptor and start downloading it in the background
    ///
    /// If the same descriptor was seen before, its checkpoint is kept and the
    /// download resumes. If the descriptor changed (a new image under the same
    /// filename), partial state from the old one is discarded first.
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] once [`shutdown`](Self::shutdown) has started
    /// - [`DownloadError::AlreadyActive`] if a task for this filename is running
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use ota_dl::*;
    /// # async fn example(downloader: UpdateDownloader) -> Result<()> {
    /// downloader
    ///     .enqueue(DownloadDescriptor {
    ///         url: Some("https://updates.example.com/fw-2.1.zip".into()),
    ///         size_bytes: 734_003_200,
    ///         filename: "fw-2.1.zip".into(),
    ///         checksum: Some("9e107d9d372bb6826bd81d3542a419d6".into()),
    ///         version_label: "2.1".into(),
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn enqueue(&self, descriptor: DownloadDescriptor) -> Result<()> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let filename = descriptor.filename.clone();
        if self.executor.is_active(&filename).await {
            return Err(Error::Download(DownloadError::AlreadyActive { filename }));
        }

        if let Some(existing) = self.db.get_descriptor(&filename).await? {
            if existing.descriptor() != descriptor {
                tracing::info!(
                    filename = %filename,
                    old_version = %existing.version_label,
                    new_version = %descriptor.version_label,
                    "Descriptor changed, discarding previous partial download"
                );
                self.discard_artifacts(&filename, false).await?;
            }
        }

        self.db
            .upsert_descriptor(&descriptor, DownloadState::NotDownloading)
            .await?;

        tracing::info!(
            filename = %filename,
            version = %descriptor.version_label,
            size_bytes = descriptor.size_bytes,
            "Download enqueued"
        );

        self.start(descriptor).await
    }

    /// Pause a download
    ///
    /// The running task is cancelled between two chunk writes and the
    /// checkpoint is kept, so [`resume`](Self::resume) continues from there.
    /// Pausing an already paused download is a no-op.
    pub async fn pause(&self, filename: &str) -> Result<()> {
        let row = self.require(filename).await?;
        let current = row.download_state();

        match current {
            DownloadState::Paused => return Ok(()),
            DownloadState::Queued | DownloadState::Downloading => {}
            _ => return Err(invalid_state(filename, "pause", current)),
        }

        // The task reports Paused itself once it has stopped
        if !self.executor.stop(filename).await {
            // No task was running; it may have just finished, so look again
            let current = self.require(filename).await?.download_state();
            match current {
                DownloadState::Paused => return Ok(()),
                DownloadState::Queued | DownloadState::Downloading => {
                    self.set_state(filename, DownloadState::Paused, None).await?;
                }
                _ => return Err(invalid_state(filename, "pause", current)),
            }
        }

        tracing::info!(filename, "Download paused");
        Ok(())
    }

    /// Resume a paused download
    ///
    /// Resuming a download that is already queued, downloading or verifying
    /// is a no-op.
    pub async fn resume(&self, filename: &str) -> Result<()> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let row = self.require(filename).await?;
        let current = row.download_state();

        match current {
            DownloadState::Paused => {}
            state if state.is_active() => return Ok(()),
            _ => return Err(invalid_state(filename, "resume", current)),
        }

        tracing::info!(filename, "Resuming download");
        self.start(row.descriptor()).await
    }

    /// Retry a failed download or verification
    ///
    /// Always permitted from `Failed` and `VerificationFailed`. A resumable
    /// failure continues from its checkpoint; otherwise the download starts
    /// from zero.
    pub async fn retry(&self, filename: &str) -> Result<()> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let row = self.require(filename).await?;
        let current = row.download_state();
        if !current.is_failure() {
            return Err(invalid_state(filename, "retry", current));
        }

        tracing::info!(filename, previous = ?row.failure(), "Retrying download");
        self.start(row.descriptor()).await
    }

    /// Cancel a download and discard everything it produced
    ///
    /// Stops the task if one is running, removes the temp and the final file,
    /// clears the checkpoint and sets the state to `NotDownloading`. The
    /// descriptor stays known so it can be enqueued again.
    pub async fn cancel(&self, filename: &str) -> Result<()> {
        let row = self.require(filename).await?;

        self.executor.stop(filename).await;
        let had_install = row.download_state() == DownloadState::VerificationCompleted;
        self.discard_artifacts(filename, true).await?;
        if had_install {
            self.sink.on_install_revoked(filename);
        }
        self.set_state(filename, DownloadState::NotDownloading, None)
            .await?;

        tracing::info!(filename, "Download cancelled");
        Ok(())
    }

    /// Cancel a download and forget its descriptor
    pub async fn delete(&self, filename: &str) -> Result<()> {
        self.cancel(filename).await?;
        self.db.delete_descriptor(filename).await?;
        tracing::info!(filename, "Download deleted");
        Ok(())
    }

    /// Current persisted state
    pub async fn state(&self, filename: &str) -> Result<DownloadState> {
        Ok(self.require(filename).await?.download_state())
    }

    /// Snapshot of one download
    pub async fn info(&self, filename: &str) -> Result<DownloadInfo> {
        let row = self.require(filename).await?;
        self.to_info(row).await
    }

    /// Snapshots of every known download
    pub async fn list(&self) -> Result<Vec<DownloadInfo>> {
        let rows = self.db.list_descriptors().await?;
        let mut infos = Vec::with_capacity(rows.len());
        for row in rows {
            infos.push(self.to_info(row).await?);
        }
        Ok(infos)
    }

    async fn to_info(&self, row: DescriptorRow) -> Result<DownloadInfo> {
        let checkpoint = self.db.get_checkpoint(&row.filename).await?;
        Ok(DownloadInfo {
            descriptor: row.descriptor(),
            state: row.download_state(),
            failure_reason: row.failure(),
            checkpoint,
        })
    }

    pub(crate) async fn require(&self, filename: &str) -> Result<DescriptorRow> {
        self.db.get_descriptor(filename).await?.ok_or_else(|| {
            Error::Download(DownloadError::NotFound {
                filename: filename.to_string(),
            })
        })
    }

    /// Remove the checkpoint and the temp file, and optionally the final file
    async fn discard_artifacts(&self, filename: &str, include_final: bool) -> Result<()> {
        let paths = FilePaths::new(&self.config, filename);
        self.db.clear_checkpoint(filename).await?;
        remove_file_if_exists(&paths.temp).await?;
        if include_final {
            remove_file_if_exists(&paths.final_path).await?;
        }
        Ok(())
    }
}

fn invalid_state(filename: &str, operation: &str, current: DownloadState) -> Error {
    Error::Download(DownloadError::InvalidState {
        filename: filename.to_string(),
        operation: operation.to_string(),
        current_state: format!("{:?}", current),
    })
}

async fn remove_file_if_exists(path: &std::path::Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(e)),
    }
}
