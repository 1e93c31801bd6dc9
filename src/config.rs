//! Configuration types for ota-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Where partial and finished files live
///
/// The temp directory is private to the application; the download directory
/// is the shared location an installer picks verified images up from.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Download directory for relocated, finished files (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Temporary directory for in-flight files (default: "./temp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            temp_dir: default_temp_dir(),
        }
    }
}

/// Retry configuration for transient transfer failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of transfer attempts per run, first attempt included (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before the first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,

    /// Allowed difference between `offset + Content-Length` and the
    /// descriptor's size before a warning is logged (default: 1 MiB)
    #[serde(default = "default_size_tolerance")]
    pub size_tolerance_bytes: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
            size_tolerance_bytes: default_size_tolerance(),
        }
    }
}

/// Progress throttling and ETA smoothing
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Minimum time between two emitted progress events (default: 1000 ms)
    #[serde(default = "default_min_interval", with = "duration_millis_serde")]
    pub min_interval: Duration,

    /// Number of throughput samples averaged for the ETA (default: 10)
    #[serde(default = "default_eta_history")]
    pub eta_history: usize,

    /// A zero-throughput sample younger than this is treated as a stall and
    /// ignored instead of resetting the ETA (default: 5 seconds)
    #[serde(default = "default_stall_window", with = "duration_serde")]
    pub stall_window: Duration,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            min_interval: default_min_interval(),
            eta_history: default_eta_history(),
            stall_window: default_stall_window(),
        }
    }
}

/// Checksum verification settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Hash algorithm name: "md5" or "sha256" (default: "md5")
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// How many times to look for the relocated file before giving up (default: 5)
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,

    /// Delay between two existence checks (default: 2 seconds)
    #[serde(default = "default_poll_delay", with = "duration_serde")]
    pub poll_delay: Duration,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            poll_attempts: default_poll_attempts(),
            poll_delay: default_poll_delay(),
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./ota-dl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Main configuration for [`UpdateDownloader`](crate::UpdateDownloader)
///
/// Every field has a default, so `Config::default()` works out of the box and
/// a JSON file only needs to name the settings it overrides.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// File locations
    #[serde(default)]
    pub download: DownloadConfig,

    /// Retry budget and backoff for transfer failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Progress throttle and ETA estimation
    #[serde(default)]
    pub progress: ProgressConfig,

    /// Checksum verification
    #[serde(default)]
    pub verify: VerifyConfig,

    /// Persistent state
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::Config {
                message: "max_attempts must be at least 1".to_string(),
                key: Some("retry.max_attempts".to_string()),
            });
        }
        let multiplier = self.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(Error::Config {
                message: format!("backoff_multiplier must be a finite number >= 1.0, got {multiplier}"),
                key: Some("retry.backoff_multiplier".to_string()),
            });
        }
        if self.retry.initial_delay > self.retry.max_delay {
            return Err(Error::Config {
                message: "initial_delay must not exceed max_delay".to_string(),
                key: Some("retry.initial_delay".to_string()),
            });
        }
        if self.progress.eta_history == 0 {
            return Err(Error::Config {
                message: "eta_history must be at least 1".to_string(),
                key: Some("progress.eta_history".to_string()),
            });
        }
        if self.verify.poll_attempts == 0 {
            return Err(Error::Config {
                message: "poll_attempts must be at least 1".to_string(),
                key: Some("verify.poll_attempts".to_string()),
            });
        }
        if self.download.temp_dir == self.download.download_dir {
            return Err(Error::Config {
                message: "temp_dir and download_dir must differ".to_string(),
                key: Some("download.temp_dir".to_string()),
            });
        }
        Ok(())
    }

    /// Temporary directory
    pub fn temp_dir(&self) -> &PathBuf {
        &self.download.temp_dir
    }

    /// Download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("./temp")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./ota-dl.db")
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_size_tolerance() -> u64 {
    1024 * 1024
}

fn default_min_interval() -> Duration {
    Duration::from_millis(1000)
}

fn default_eta_history() -> usize {
    10
}

fn default_stall_window() -> Duration {
    Duration::from_secs(5)
}

fn default_algorithm() -> String {
    "md5".to_string()
}

fn default_poll_attempts() -> u32 {
    5
}

fn default_poll_delay() -> Duration {
    Duration::from_secs(2)
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Millisecond-precision variant for sub-second settings
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
