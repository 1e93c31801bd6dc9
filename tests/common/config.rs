//! Test configuration helpers

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use ota_dl::config::{
    DownloadConfig, PersistenceConfig, ProgressConfig, RetryConfig, VerifyConfig,
};
use ota_dl::{Config, RangeFetcher, UpdateDownloader};

/// Payload size used by most scenarios
pub const IMAGE_SIZE: usize = 1_000_000;

/// Config rooted in `dir` with fast retries and unthrottled progress
pub fn fast_config(dir: &TempDir) -> Config {
    Config {
        download: DownloadConfig {
            download_dir: dir.path().join("downloads"),
            temp_dir: dir.path().join("temp"),
        },
        retry: RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            jitter: false,
            ..Default::default()
        },
        progress: ProgressConfig {
            min_interval: Duration::ZERO,
            ..Default::default()
        },
        verify: VerifyConfig {
            poll_attempts: 2,
            poll_delay: Duration::from_millis(10),
            ..Default::default()
        },
        persistence: PersistenceConfig {
            database_path: dir.path().join("ota-dl.db"),
        },
    }
}

/// Downloader over `fetcher`, stored in a fresh temp dir
///
/// The returned [`TempDir`] must outlive the downloader.
pub async fn create_downloader(
    fetcher: Arc<dyn RangeFetcher>,
) -> (UpdateDownloader, Config, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = fast_config(&dir);
    let downloader = UpdateDownloader::with_components(config.clone(), fetcher, Vec::new())
        .await
        .unwrap();
    (downloader, config, dir)
}

/// Deterministic pseudo-random image contents
pub fn image(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Lowercase hex MD5 of `data`
pub fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}
