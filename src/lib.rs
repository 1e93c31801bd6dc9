//! # ota-dl
//!
//! Resumable firmware image downloads with integrity verification.
//!
//! A download is described by a [`DownloadDescriptor`] (URL, size, filename,
//! expected checksum, version label). The [`UpdateDownloader`] streams the
//! image into a temp file over HTTP range requests, persisting a byte
//! checkpoint as it goes, so interrupted transfers continue where they left
//! off after a pause, a dropped connection or a process restart. Once the
//! image is complete it is moved into the download directory and its
//! checksum is compared with the descriptor before the image is announced
//! as ready to install.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ota_dl::{Config, DownloadDescriptor, Event, UpdateDownloader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = UpdateDownloader::new(Config::default()).await?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             if let Event::InstallReady { path, .. } = &event {
//!                 println!("ready to install: {}", path.display());
//!             }
//!         }
//!     });
//!
//!     downloader
//!         .enqueue(DownloadDescriptor {
//!             url: Some("https://updates.example.com/fw-2.1.zip".into()),
//!             size_bytes: 734_003_200,
//!             filename: "fw-2.1.zip".into(),
//!             checksum: Some("9e107d9d372bb6826bd81d3542a419d6".into()),
//!             version_label: "2.1".into(),
//!         })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Public downloader facade (decomposed into focused submodules)
pub mod downloader;
/// Resumable transfer engine
pub mod engine;
/// Error types
pub mod error;
/// Per-download background task tracking
pub mod executor;
/// HTTP range requests
pub mod fetcher;
/// Throttled progress and ETA estimation
pub mod progress;
/// Retry logic with exponential backoff
pub mod retry;
/// Outbound notifications
pub mod sink;
/// Resume checkpoint storage
pub mod store;
/// Core types and events
pub mod types;
/// Checksum verification
pub mod verify;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use downloader::UpdateDownloader;
pub use engine::{DownloadEngine, EngineFailure, EngineOutcome};
pub use error::{DatabaseError, DownloadError, Error, FailureReason, Result, TransferError};
pub use fetcher::{HttpRangeFetcher, RangeFetcher};
pub use sink::{EventSink, ProgressSink};
pub use store::{MemoryStateStore, ResumeStateStore};
pub use types::{DownloadDescriptor, DownloadInfo, DownloadState, Eta, Event, ProgressEvent};
pub use verify::{ChecksumAlgorithm, IntegrityVerifier};

/// Run the downloader until a termination signal arrives, then shut it down.
///
/// On Unix this listens for SIGTERM and SIGINT; elsewhere for Ctrl+C.
///
/// # Example
///
/// ```no_run
/// use ota_dl::{Config, UpdateDownloader, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = UpdateDownloader::new(Config::default()).await?;
///     run_with_shutdown(downloader).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: UpdateDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal"),
            }
        }
        (Ok(mut only), Err(e)) | (Err(e), Ok(mut only)) => {
            tracing::warn!(error = %e, "Could not register one signal handler");
            only.recv().await;
            tracing::info!("Received termination signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
    }
}
