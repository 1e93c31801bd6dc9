//! Core downloader implementation split into focused submodules.
//!
//! The `UpdateDownloader` struct and its methods are organized by domain:
//! - [`control`] - Inbound control API (enqueue/pause/resume/cancel/delete/retry)
//! - [`lifecycle`] - Startup state correction and graceful shutdown
//! - [`pipeline`] - The background task: download, relocate, verify

mod control;
mod lifecycle;
mod pipeline;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use lifecycle::corrected_state;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::config::Config;
use crate::db::Database;
use crate::engine::DownloadEngine;
use crate::error::{Error, FailureReason, Result};
use crate::executor::TaskExecutor;
use crate::fetcher::{HttpRangeFetcher, RangeFetcher};
use crate::sink::{EventSink, FanoutSink, ProgressSink};
use crate::types::{DownloadState, Event};
use crate::verify::IntegrityVerifier;

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct UpdateDownloader {
    /// Database instance for persistence (wrapped in Arc for sharing across tasks)
    /// Public for integration tests to query download state
    pub db: Arc<Database>,
    /// Broadcast side of the event stream (multiple subscribers supported)
    pub(crate) events: EventSink,
    /// Every outbound notification goes through here (events plus extra sinks)
    pub(crate) sink: Arc<dyn ProgressSink>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Download engine shared by all tasks
    pub(crate) engine: DownloadEngine,
    /// Checksum verifier
    pub(crate) verifier: IntegrityVerifier,
    /// One background task per filename
    pub(crate) executor: TaskExecutor,
    /// Flag to indicate whether new downloads are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
}

impl UpdateDownloader {
    /// Create a new UpdateDownloader using plain HTTP(S) via reqwest
    ///
    /// This initializes all core components:
    /// - Creates the download and temp directories
    /// - Opens/creates the SQLite database and runs migrations
    /// - Sets up the event broadcast channel
    /// - Corrects persisted states against the files on disk
    pub async fn new(config: Config) -> Result<Self> {
        Self::with_components(config, Arc::new(HttpRangeFetcher::new()), Vec::new()).await
    }

    /// Create a downloader with a custom fetcher and additional sinks
    ///
    /// `sinks` receive every notification in addition to the broadcast
    /// channel returned by [`subscribe`](Self::subscribe).
    pub async fn with_components(
        config: Config,
        fetcher: Arc<dyn RangeFetcher>,
        sinks: Vec<Arc<dyn ProgressSink>>,
    ) -> Result<Self> {
        config.validate()?;

        // Ensure download and temp directories exist
        for (dir, what) in [
            (&config.download.download_dir, "download"),
            (&config.download.temp_dir, "temp"),
        ] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create {} directory '{}': {}", what, dir.display(), e),
                ))
            })?;
        }

        let db = Arc::new(Database::new(&config.persistence.database_path).await?);

        if db.was_unclean_shutdown().await? {
            tracing::warn!("Previous session did not shut down cleanly");
        }

        // Mark that we're starting up (for unclean shutdown detection)
        db.set_clean_start().await?;

        // Create broadcast channel with buffer size of 1000 events
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);
        let events = EventSink::new(event_tx);

        let mut all_sinks: Vec<Arc<dyn ProgressSink>> = vec![Arc::new(events.clone())];
        all_sinks.extend(sinks);
        let sink: Arc<dyn ProgressSink> = Arc::new(FanoutSink::new(all_sinks));

        let config = Arc::new(config);
        let engine = DownloadEngine::new(fetcher, db.clone(), sink.clone(), config.clone());
        let verifier = IntegrityVerifier::new(config.verify.clone());

        let downloader = Self {
            db,
            events,
            sink,
            config,
            engine,
            verifier,
            executor: TaskExecutor::new(),
            accepting_new: Arc::new(AtomicBool::new(true)),
        };

        downloader.correct_all_states().await?;

        Ok(downloader)
    }

    /// Subscribe to download events
    ///
    /// Returns a receiver that will receive all future events. Multiple
    /// subscribers are supported and each receives all events independently.
    ///
    /// If a subscriber falls behind by more than 1000 events, it will receive
    /// `RecvError::Lagged` and skip older events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Get a reference to the downloader's configuration
    pub fn get_config(&self) -> &Config {
        &self.config
    }

    /// Persist a state change and notify the sinks
    pub(crate) async fn set_state(
        &self,
        filename: &str,
        state: DownloadState,
        failure: Option<FailureReason>,
    ) -> Result<()> {
        self.db.update_state(filename, state, failure).await?;
        tracing::debug!(filename, state = %state, "State changed");
        self.sink.on_state(filename, state);
        Ok(())
    }
}
