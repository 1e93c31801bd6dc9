//! A single transfer attempt: resume offset, request, stream to disk.

use std::io::SeekFrom;
use std::path::Path;
use std::time::Instant;

use futures::StreamExt;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::error::TransferError;
use crate::progress::ProgressEstimator;
use crate::types::DownloadDescriptor;

use super::DownloadEngine;

/// Result of an attempt that did not fail
#[derive(Debug, PartialEq, Eq)]
pub(super) enum AttemptOutcome {
    /// Body fully written
    Finished { bytes_written: u64 },
    /// Cancellation token fired; checkpoint persisted for `bytes_written`
    Cancelled { bytes_written: u64 },
}

impl DownloadEngine {
    /// Run one request/stream cycle starting from the persisted checkpoint
    pub(super) async fn attempt(
        &self,
        url: &str,
        descriptor: &DownloadDescriptor,
        temp: &Path,
        estimator: &mut ProgressEstimator,
        cancel: &CancellationToken,
    ) -> Result<AttemptOutcome, TransferError> {
        let filename = descriptor.filename.as_str();

        if cancel.is_cancelled() {
            let bytes_written = self.load_checkpoint(filename).await?.unwrap_or(0);
            return Ok(AttemptOutcome::Cancelled { bytes_written });
        }

        let offset = self.resume_offset(filename, temp).await?;
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let bytes_written = self.load_checkpoint(filename).await?.unwrap_or(0);
                return Ok(AttemptOutcome::Cancelled { bytes_written });
            }
            response = self.fetcher.fetch(url, offset) => response?,
        };

        if !response.is_success() {
            return Err(TransferError::HttpStatus {
                status: response.status,
                url: url.to_string(),
            });
        }

        // A plain 200 to a ranged request means the server sent the whole file
        let start = match offset {
            Some(offset) if response.status == 206 => offset,
            Some(offset) => {
                tracing::warn!(
                    filename,
                    offset,
                    status = response.status,
                    "Server ignored range request, restarting from zero"
                );
                self.clear_checkpoint(filename).await?;
                0
            }
            None => 0,
        };

        if let Some(content_length) = response.content_length {
            let advertised = start.saturating_add(content_length);
            let tolerance = self.config.retry.size_tolerance_bytes;
            if advertised.abs_diff(descriptor.size_bytes) > tolerance {
                tracing::warn!(
                    filename,
                    offset = start,
                    content_length,
                    expected = descriptor.size_bytes,
                    "Server size differs from descriptor size"
                );
            }
        }

        if let Some(parent) = temp.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(TransferError::LocalIo)?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(start == 0)
            .open(temp)
            .await
            .map_err(TransferError::LocalIo)?;
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(TransferError::LocalIo)?;

        tracing::info!(filename, offset = start, "Streaming download body");

        let mut body = response.body;
        let mut written = start;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    file.flush().await.map_err(TransferError::LocalIo)?;
                    self.save_checkpoint(filename, written).await?;
                    return Ok(AttemptOutcome::Cancelled { bytes_written: written });
                }
                next = body.next() => next,
            };

            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    // Everything written so far is valid; resume from there
                    if let TransferError::Network(_) = e {
                        if file.flush().await.is_ok() {
                            self.save_checkpoint(filename, written).await?;
                        }
                    }
                    return Err(e);
                }
                None => break,
            };

            file.write_all(&chunk)
                .await
                .map_err(TransferError::LocalIo)?;
            written += chunk.len() as u64;

            let total = descriptor.size_bytes.max(written);
            if let Some(event) = estimator.on_sample(written, total, Instant::now()) {
                file.flush().await.map_err(TransferError::LocalIo)?;
                self.save_checkpoint(filename, written).await?;
                self.sink.on_progress(filename, event);
            }
        }

        file.flush().await.map_err(TransferError::LocalIo)?;
        // Drop anything a longer stale temp file left past the end
        file.set_len(written).await.map_err(TransferError::LocalIo)?;
        file.sync_all().await.map_err(TransferError::LocalIo)?;

        Ok(AttemptOutcome::Finished {
            bytes_written: written,
        })
    }

    /// Checkpoint to resume from, after checking it against the temp file
    ///
    /// A checkpoint beyond the end of the temp file is stale and is cleared.
    /// A temp file longer than the checkpoint is fine: bytes past the
    /// checkpoint are simply overwritten.
    async fn resume_offset(
        &self,
        filename: &str,
        temp: &Path,
    ) -> Result<Option<u64>, TransferError> {
        let Some(checkpoint) = self.load_checkpoint(filename).await? else {
            return Ok(None);
        };
        if checkpoint == 0 {
            return Ok(None);
        }

        let temp_len = match tokio::fs::metadata(temp).await {
            Ok(meta) => Some(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(TransferError::LocalIo(e)),
        };

        match temp_len {
            Some(len) if len >= checkpoint => {
                if len > checkpoint {
                    tracing::warn!(
                        filename,
                        checkpoint,
                        temp_len = len,
                        "Temp file is longer than checkpoint, resuming from checkpoint"
                    );
                }
                Ok(Some(checkpoint))
            }
            temp_len => {
                tracing::warn!(
                    filename,
                    checkpoint,
                    temp_len = temp_len.unwrap_or(0),
                    "Stale checkpoint, restarting from zero"
                );
                self.clear_checkpoint(filename).await?;
                Ok(None)
            }
        }
    }

    async fn load_checkpoint(&self, filename: &str) -> Result<Option<u64>, TransferError> {
        self.store
            .load(filename)
            .await
            .map_err(|e| TransferError::Other(format!("failed to load checkpoint: {}", e)))
    }

    async fn save_checkpoint(&self, filename: &str, bytes: u64) -> Result<(), TransferError> {
        self.store
            .save(filename, bytes)
            .await
            .map_err(|e| TransferError::Other(format!("failed to save checkpoint: {}", e)))
    }

    async fn clear_checkpoint(&self, filename: &str) -> Result<(), TransferError> {
        self.store
            .clear(filename)
            .await
            .map_err(|e| TransferError::Other(format!("failed to clear checkpoint: {}", e)))
    }
}
