//! Startup state correction and graceful shutdown.

use std::sync::atomic::Ordering;

use crate::engine::FilePaths;
use crate::error::Result;
use crate::types::{DownloadState, Event};

use super::UpdateDownloader;

/// Derive the state the files on disk actually support
///
/// A final file wins over everything: the download is `Completed`, unless
/// that very file was already verified, in which case the verification
/// outcome (`VerificationCompleted` or `VerificationFailed`) is kept. Otherwise a temp
/// file means the download can continue, so it is `Paused`. Without either
/// file a state that claims a download in progress or finished is reset to
/// `NotDownloading`; failure states and `NotDownloading` stay as they are.
pub fn corrected_state(
    stored: DownloadState,
    final_exists: bool,
    temp_exists: bool,
) -> DownloadState {
    if final_exists {
        return match stored {
            DownloadState::VerificationCompleted | DownloadState::VerificationFailed => stored,
            _ => DownloadState::Completed,
        };
    }
    if temp_exists {
        return DownloadState::Paused;
    }
    match stored {
        DownloadState::Queued
        | DownloadState::Downloading
        | DownloadState::Paused
        | DownloadState::Completed
        | DownloadState::Verifying
        | DownloadState::VerificationCompleted => DownloadState::NotDownloading,
        other => other,
    }
}

impl UpdateDownloader {
    /// Reconcile the stored state of `filename` with the files on disk
    ///
    /// While a task owns the files the stored state is returned unchanged.
    /// Otherwise the corrected state is persisted (and published if it
    /// differs) before being returned.
    pub async fn query_corrected_state(&self, filename: &str) -> Result<DownloadState> {
        let row = self.require(filename).await?;
        let stored = row.download_state();

        if self.executor.is_active(filename).await {
            return Ok(stored);
        }

        let paths = FilePaths::new(&self.config, filename);
        let final_exists = tokio::fs::try_exists(&paths.final_path).await?;
        let temp_exists = tokio::fs::try_exists(&paths.temp).await?;
        let corrected = corrected_state(stored, final_exists, temp_exists);

        if corrected != stored {
            tracing::info!(
                filename,
                stored = %stored,
                corrected = %corrected,
                final_exists,
                temp_exists,
                "Correcting download state from files on disk"
            );
            // Keep the failure reason only when the state itself is kept
            let failure = if corrected.is_failure() { row.failure() } else { None };
            self.set_state(filename, corrected, failure).await?;
        }

        Ok(corrected)
    }

    /// Run [`query_corrected_state`](Self::query_corrected_state) for every known download
    pub(crate) async fn correct_all_states(&self) -> Result<()> {
        let rows = self.db.list_descriptors().await?;
        let total = rows.len();
        let mut corrected = 0;

        for row in rows {
            let before = row.download_state();
            let after = self.query_corrected_state(&row.filename).await?;
            if before != after {
                corrected += 1;
            }
        }

        if corrected > 0 {
            tracing::info!(total, corrected, "Corrected download states on startup");
        } else {
            tracing::debug!(total, "All download states consistent with disk");
        }
        Ok(())
    }

    /// Gracefully shut down the downloader
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new downloads
    /// 2. Cancels all active tasks (they persist their checkpoint and end `Paused`)
    /// 3. Waits for them to finish with a timeout (30 seconds)
    /// 4. Marks a clean shutdown in the database
    ///
    /// # Errors
    ///
    /// Errors during the sequence are logged and the remaining steps still run.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new downloads");

        self.executor.cancel_all().await;
        tracing::info!("Signaled cancellation to all active downloads");

        let shutdown_timeout = std::time::Duration::from_secs(30);
        match tokio::time::timeout(shutdown_timeout, self.executor.wait_idle()).await {
            Ok(()) => tracing::info!("All active downloads stopped"),
            Err(_) => tracing::warn!(
                "Timeout waiting for downloads to stop, proceeding with shutdown"
            ),
        }

        if let Err(e) = self.db.set_clean_shutdown().await {
            tracing::error!(error = %e, "Failed to mark clean shutdown in database");
        } else {
            tracing::info!("Marked clean shutdown in database");
        }

        self.events.emit(Event::Shutdown);

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }
}
