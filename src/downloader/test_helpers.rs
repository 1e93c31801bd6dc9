//! Shared test helpers for creating UpdateDownloader instances in tests.

use crate::config::Config;
use crate::downloader::UpdateDownloader;
use crate::fetcher::RangeFetcher;
use crate::sink::ProgressSink;
use crate::test_helpers::{RecordingSink, ScriptedFetcher, test_config};
use crate::types::{DownloadState, Event};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

/// Test downloader plus the handles tests want to inspect
pub(crate) struct TestDownloader {
    pub downloader: UpdateDownloader,
    pub fetcher: Arc<ScriptedFetcher>,
    pub sink: Arc<RecordingSink>,
    pub config: Config,
    /// Must be kept alive for the duration of the test
    pub _temp_dir: tempfile::TempDir,
}

/// Helper to create a test UpdateDownloader backed by a scripted fetcher.
pub(crate) async fn create_test_downloader(fetcher: ScriptedFetcher) -> TestDownloader {
    let temp_dir = tempdir().unwrap();
    let config = test_config(temp_dir.path());
    create_test_downloader_with(fetcher, config, temp_dir).await
}

/// Same as [`create_test_downloader`] with a caller-provided config
pub(crate) async fn create_test_downloader_with(
    fetcher: ScriptedFetcher,
    config: Config,
    temp_dir: tempfile::TempDir,
) -> TestDownloader {
    let fetcher = Arc::new(fetcher);
    let sink = Arc::new(RecordingSink::new());

    let downloader = UpdateDownloader::with_components(
        config.clone(),
        fetcher.clone() as Arc<dyn RangeFetcher>,
        vec![sink.clone() as Arc<dyn ProgressSink>],
    )
    .await
    .unwrap();

    TestDownloader {
        downloader,
        fetcher,
        sink,
        config,
        _temp_dir: temp_dir,
    }
}

/// Wait until `filename` reaches `state`, failing the test after 5 seconds
pub(crate) async fn wait_for_state(
    downloader: &UpdateDownloader,
    filename: &str,
    state: DownloadState,
) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if downloader.state(filename).await.unwrap() == state
            && !downloader.executor.is_active(filename).await
        {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {filename} to reach {state}, current {}",
            downloader.state(filename).await.unwrap()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Drain every event currently buffered in `rx`
pub(crate) fn drain(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
