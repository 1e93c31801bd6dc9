//! Resumable download engine
//!
//! [`DownloadEngine::run`] takes one descriptor from "maybe a partial temp
//! file" to "complete file at its final location", or to a classified
//! failure. It owns the temp and final file for the duration of the run.
//!
//! - [`transfer`] - One HTTP attempt: resume offset, streaming, checkpoints
//! - [`relocate`] - Moving the finished temp file into place
//!
//! Failures are split three ways. Network errors and local write errors are
//! retried up to `retry.max_attempts` attempts per run with backoff in
//! between; when the budget runs out a network failure keeps its partial state
//! (resumable) while a local write failure discards it. Everything else,
//! including non-2xx responses, ends the run immediately.

mod relocate;
mod transfer;


use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{FailureReason, TransferError};
use crate::fetcher::RangeFetcher;
use crate::progress::ProgressEstimator;
use crate::retry::{Backoff, IsRetryable};
use crate::sink::ProgressSink;
use crate::store::ResumeStateStore;
use crate::types::DownloadDescriptor;

use transfer::AttemptOutcome;

/// How a run ended when it did not fail
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineOutcome {
    /// File downloaded and relocated to `path`
    Completed {
        /// Final location of the file
        path: PathBuf,
    },
    /// Stopped through the cancellation token; the checkpoint is kept
    Cancelled {
        /// Bytes on disk (and in the checkpoint) when the run stopped
        bytes_written: u64,
    },
}

/// Terminal failure of a run
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{reason} (resumable: {resumable})")]
pub struct EngineFailure {
    /// Classified reason
    pub reason: FailureReason,
    /// True when the partial temp file and its checkpoint were kept
    pub resumable: bool,
}

impl EngineFailure {
    fn fatal(reason: FailureReason) -> Self {
        Self {
            reason,
            resumable: false,
        }
    }
}

/// Temp and final locations for a filename
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilePaths {
    /// In-flight file in the private temp directory
    pub temp: PathBuf,
    /// Relocated file in the shared download directory
    pub final_path: PathBuf,
}

impl FilePaths {
    /// Derive both paths from the configured directories
    pub fn new(config: &Config, filename: &str) -> Self {
        Self {
            temp: config.temp_dir().join(filename),
            final_path: config.download_dir().join(filename),
        }
    }
}

/// Drives a single download from checkpoint to final file
#[derive(Clone)]
pub struct DownloadEngine {
    fetcher: Arc<dyn RangeFetcher>,
    store: Arc<dyn ResumeStateStore>,
    sink: Arc<dyn ProgressSink>,
    config: Arc<Config>,
}

impl DownloadEngine {
    /// Create an engine from its collaborators
    pub fn new(
        fetcher: Arc<dyn RangeFetcher>,
        store: Arc<dyn ResumeStateStore>,
        sink: Arc<dyn ProgressSink>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            fetcher,
            store,
            sink,
            config,
        }
    }

    /// Download `descriptor`, resuming from its checkpoint when possible
    ///
    /// Never panics and never returns an I/O error directly: every problem is
    /// folded into an [`EngineFailure`]. The retry counter starts over on
    /// every call.
    pub async fn run(
        &self,
        descriptor: &DownloadDescriptor,
        cancel: &CancellationToken,
    ) -> Result<EngineOutcome, EngineFailure> {
        let url = validate(descriptor)?;
        let filename = descriptor.filename.as_str();
        let paths = FilePaths::new(&self.config, filename);

        let mut estimator = ProgressEstimator::new(&self.config.progress);
        let mut backoff = Backoff::new(&self.config.retry);
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut attempt: u32 = 0;

        let bytes_written = loop {
            attempt += 1;
            tracing::debug!(filename, attempt, "Starting transfer attempt");

            let err = match self
                .attempt(url, descriptor, &paths.temp, &mut estimator, cancel)
                .await
            {
                Ok(AttemptOutcome::Finished { bytes_written }) => break bytes_written,
                Ok(AttemptOutcome::Cancelled { bytes_written }) => {
                    tracing::info!(filename, bytes_written, "Download cancelled");
                    return Ok(EngineOutcome::Cancelled { bytes_written });
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err(self.fail_fatal(filename, url, &paths.temp, err).await);
            }

            if attempt >= max_attempts {
                return Err(self
                    .fail_exhausted(filename, &paths.temp, attempt, err)
                    .await);
            }

            let delay = backoff.next_delay();
            tracing::warn!(
                filename,
                error = %err,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Transfer failed, will retry after backoff"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    let bytes_written = self.store.load(filename).await.ok().flatten().unwrap_or(0);
                    tracing::info!(filename, bytes_written, "Download cancelled during backoff");
                    return Ok(EngineOutcome::Cancelled { bytes_written });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        };

        self.finish(filename, &paths, bytes_written, &mut estimator)
            .await
    }

    /// Publish the final event, drop the checkpoint and move the file into place
    async fn finish(
        &self,
        filename: &str,
        paths: &FilePaths,
        bytes_written: u64,
        estimator: &mut ProgressEstimator,
    ) -> Result<EngineOutcome, EngineFailure> {
        let event = estimator.finish(bytes_written, Instant::now());
        if let Err(e) = self.store.save(filename, bytes_written).await {
            tracing::warn!(filename, error = %e, "Failed to persist final checkpoint");
        }
        self.sink.on_progress(filename, event);

        if let Err(e) = self.store.clear(filename).await {
            tracing::warn!(filename, error = %e, "Failed to clear checkpoint");
        }

        if let Err(e) = relocate::relocate(&paths.temp, &paths.final_path).await {
            tracing::error!(
                filename,
                temp = %paths.temp.display(),
                target = %paths.final_path.display(),
                error = %e,
                "Could not relocate downloaded file"
            );
            remove_if_exists(&paths.temp).await;
            return Err(EngineFailure::fatal(FailureReason::CouldNotRelocateFile));
        }

        tracing::info!(
            filename,
            bytes_written,
            path = %paths.final_path.display(),
            "Download completed"
        );
        Ok(EngineOutcome::Completed {
            path: paths.final_path.clone(),
        })
    }

    /// Map a non-retryable error to a failure, cleaning up as required
    async fn fail_fatal(
        &self,
        filename: &str,
        url: &str,
        temp: &Path,
        err: TransferError,
    ) -> EngineFailure {
        match err {
            TransferError::HttpStatus { status, .. } => {
                // Server-side trouble keeps the partial file for a later resume
                let resumable = status >= 500;
                tracing::error!(filename, url, status, resumable, "Unsuccessful HTTP response");
                if !resumable {
                    self.discard_partial(filename, temp).await;
                }
                EngineFailure {
                    reason: FailureReason::UnsuccessfulHttpResponse,
                    resumable,
                }
            }
            other => {
                tracing::error!(filename, url, error = %other, "Download failed with unexpected error");
                self.discard_partial(filename, temp).await;
                EngineFailure::fatal(FailureReason::Unknown)
            }
        }
    }

    /// Map a retryable error whose budget ran out to a failure
    async fn fail_exhausted(
        &self,
        filename: &str,
        temp: &Path,
        attempts: u32,
        err: TransferError,
    ) -> EngineFailure {
        let resumable = matches!(err, TransferError::Network(_));
        tracing::error!(
            filename,
            attempts,
            resumable,
            error = %err,
            "Transfer failed after exhausting retries"
        );
        if !resumable {
            self.discard_partial(filename, temp).await;
        }
        EngineFailure {
            reason: FailureReason::ServerOrConnectionError,
            resumable,
        }
    }

    /// Forget the checkpoint and delete the temp file
    async fn discard_partial(&self, filename: &str, temp: &Path) {
        if let Err(e) = self.store.clear(filename).await {
            tracing::warn!(filename, error = %e, "Failed to clear checkpoint");
        }
        remove_if_exists(temp).await;
    }
}

/// Check the descriptor before touching the network or the disk
fn validate(descriptor: &DownloadDescriptor) -> Result<&str, EngineFailure> {
    let url = descriptor
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or(EngineFailure::fatal(FailureReason::MissingDescriptorOrUrl))?;

    if !is_plain_file_name(&descriptor.filename) {
        tracing::warn!(filename = %descriptor.filename, "Descriptor filename is not a plain file name");
        return Err(EngineFailure::fatal(FailureReason::MissingDescriptorOrUrl));
    }

    match url::Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(url),
        Ok(parsed) => {
            tracing::warn!(url, scheme = parsed.scheme(), "Refusing non-HTTP download URL");
            Err(EngineFailure::fatal(FailureReason::InvalidUrlScheme))
        }
        Err(e) => {
            tracing::warn!(url, error = %e, "Download URL does not parse");
            Err(EngineFailure::fatal(FailureReason::InvalidUrlScheme))
        }
    }
}

fn is_plain_file_name(filename: &str) -> bool {
    let path = Path::new(filename);
    !filename.trim().is_empty()
        && path.file_name().is_some_and(|name| name == path.as_os_str())
        && filename != "."
        && filename != ".."
}

async fn remove_if_exists(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove file"),
    }
}
