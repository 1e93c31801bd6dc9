//! The background task behind every download: engine run, then verification.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::engine::{EngineFailure, EngineOutcome, FilePaths};
use crate::error::{DownloadError, Error, FailureReason, Result};
use crate::types::{DownloadDescriptor, DownloadState};

use super::UpdateDownloader;

impl UpdateDownloader {
    /// Mark the download as queued and spawn its task
    pub(crate) async fn start(&self, descriptor: DownloadDescriptor) -> Result<()> {
        let filename = descriptor.filename.clone();
        let this = self.clone();

        self.set_state(&filename, DownloadState::Queued, None).await?;

        let spawned = self
            .executor
            .spawn(&filename, move |cancel| async move {
                this.run_pipeline(descriptor, cancel).await;
            })
            .await;

        if let Err(e) = spawned {
            // Lost a race with another start for the same file
            tracing::warn!(filename = %filename, error = %e, "Task already running");
            return Err(Error::Download(e));
        }
        Ok(())
    }

    /// Re-run checksum verification of an already relocated file
    ///
    /// Allowed from `Completed`, `VerificationCompleted` and
    /// `VerificationFailed`; useful after a restart corrected a download to
    /// `Completed`.
    pub async fn reverify(&self, filename: &str) -> Result<()> {
        let row = self.require(filename).await?;
        let current = row.download_state();
        if !matches!(
            current,
            DownloadState::Completed
                | DownloadState::VerificationCompleted
                | DownloadState::VerificationFailed
        ) {
            return Err(Error::Download(DownloadError::InvalidState {
                filename: filename.to_string(),
                operation: "reverify".to_string(),
                current_state: format!("{:?}", current),
            }));
        }

        let path = FilePaths::new(&self.config, filename).final_path;
        let this = self.clone();
        let owned = filename.to_string();
        self.executor
            .spawn(filename, move |cancel| async move {
                this.verify_phase(&owned, path, cancel).await;
            })
            .await
            .map_err(Error::Download)
    }

    /// Full pipeline for one descriptor; every outcome ends in a state update
    async fn run_pipeline(&self, descriptor: DownloadDescriptor, cancel: CancellationToken) {
        let filename = descriptor.filename.as_str();

        self.report(filename, DownloadState::Downloading, None).await;

        match self.engine.run(&descriptor, &cancel).await {
            Ok(EngineOutcome::Completed { path }) => {
                self.report(filename, DownloadState::Completed, None).await;
                self.verify_phase(filename, path, cancel).await;
            }
            Ok(EngineOutcome::Cancelled { bytes_written }) => {
                tracing::debug!(filename, bytes_written, "Task stopped, marking paused");
                self.report(filename, DownloadState::Paused, None).await;
            }
            Err(EngineFailure { reason, resumable }) => {
                self.report(filename, DownloadState::Failed, Some(reason))
                    .await;
                self.sink.on_failure(filename, reason, resumable);
            }
        }
    }

    /// Verify the relocated file and publish the outcome
    ///
    /// Cancellation during verification leaves the state at `Completed`.
    async fn verify_phase(&self, filename: &str, path: PathBuf, cancel: CancellationToken) {
        self.report(filename, DownloadState::Verifying, None).await;

        let result = tokio::select! {
            _ = cancel.cancelled() => None,
            result = self.verify_file(filename, &path) => Some(result),
        };

        match result {
            None => {
                tracing::info!(filename, "Verification interrupted");
                self.report(filename, DownloadState::Completed, None).await;
            }
            Some(Ok(())) => {
                self.report(filename, DownloadState::VerificationCompleted, None)
                    .await;
                self.sink.on_install_ready(filename, &path);
            }
            Some(Err(reason)) => {
                self.report(filename, DownloadState::VerificationFailed, Some(reason))
                    .await;
                self.sink.on_install_revoked(filename);
                self.sink.on_failure(filename, reason, false);
            }
        }
    }

    async fn verify_file(
        &self,
        filename: &str,
        path: &Path,
    ) -> std::result::Result<(), FailureReason> {
        // Reload so a descriptor deleted mid-download is noticed
        let descriptor = match self.db.get_descriptor(filename).await {
            Ok(row) => row.map(|r| r.descriptor()),
            Err(e) => {
                tracing::error!(filename, error = %e, "Failed to load descriptor for verification");
                None
            }
        };
        self.verifier
            .verify_descriptor(descriptor.as_ref(), path)
            .await
    }

    /// [`set_state`](Self::set_state) for background tasks, which log instead of returning errors
    async fn report(
        &self,
        filename: &str,
        state: DownloadState,
        failure: Option<FailureReason>,
    ) {
        if let Err(e) = self.set_state(filename, state, failure).await {
            tracing::error!(filename, state = %state, error = %e, "Failed to persist state");
        }
    }
}
