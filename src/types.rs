//! Core types for ota-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::FailureReason;

/// What to download and how to recognise a correct result
///
/// Created once per update offer and never mutated; the pipeline receives it
/// by value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadDescriptor {
    /// Source URL (must be http or https)
    pub url: Option<String>,
    /// Expected total size in bytes
    pub size_bytes: u64,
    /// Target filename, used for both the temp and the final file
    pub filename: String,
    /// Expected checksum as hex, compared case-insensitively
    pub checksum: Option<String>,
    /// Human-readable version label shown next to the download
    pub version_label: String,
}

/// Download state for a single descriptor
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    /// Nothing downloaded, nothing scheduled
    #[default]
    NotDownloading,
    /// Scheduled, waiting for the task to start
    Queued,
    /// Bytes are being transferred
    Downloading,
    /// Stopped by the user or by shutdown; checkpoint retained
    Paused,
    /// File relocated to its final location, not verified yet
    Completed,
    /// Download failed (see the attached [`FailureReason`])
    Failed,
    /// Checksum is being computed
    Verifying,
    /// Checksum matched
    VerificationCompleted,
    /// Checksum did not match or could not be computed
    VerificationFailed,
}

impl DownloadState {
    /// Convert integer state code to DownloadState enum
    pub fn from_i32(state: i32) -> Self {
        match state {
            0 => DownloadState::NotDownloading,
            1 => DownloadState::Queued,
            2 => DownloadState::Downloading,
            3 => DownloadState::Paused,
            4 => DownloadState::Completed,
            5 => DownloadState::Failed,
            6 => DownloadState::Verifying,
            7 => DownloadState::VerificationCompleted,
            8 => DownloadState::VerificationFailed,
            _ => DownloadState::NotDownloading,
        }
    }

    /// Convert DownloadState enum to integer state code
    pub fn to_i32(&self) -> i32 {
        match self {
            DownloadState::NotDownloading => 0,
            DownloadState::Queued => 1,
            DownloadState::Downloading => 2,
            DownloadState::Paused => 3,
            DownloadState::Completed => 4,
            DownloadState::Failed => 5,
            DownloadState::Verifying => 6,
            DownloadState::VerificationCompleted => 7,
            DownloadState::VerificationFailed => 8,
        }
    }

    /// `Completed` or `VerificationCompleted`
    pub fn is_successful(&self) -> bool {
        matches!(
            self,
            DownloadState::Completed | DownloadState::VerificationCompleted
        )
    }

    /// `Failed` or `VerificationFailed`
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            DownloadState::Failed | DownloadState::VerificationFailed
        )
    }

    /// States in which a background task owns the files
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            DownloadState::Queued | DownloadState::Downloading | DownloadState::Verifying
        )
    }
}

impl std::fmt::Display for DownloadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Estimated time remaining
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Eta {
    seconds: u64,
}

impl Eta {
    /// Create an ETA from whole seconds
    pub fn from_secs(seconds: u64) -> Self {
        Self { seconds }
    }

    /// Total seconds remaining
    pub fn as_secs(&self) -> u64 {
        self.seconds
    }

    /// Whole hours
    pub fn hours(&self) -> u64 {
        self.seconds / 3600
    }

    /// Minutes past the hour
    pub fn minutes(&self) -> u64 {
        (self.seconds % 3600) / 60
    }

    /// Seconds past the minute
    pub fn seconds(&self) -> u64 {
        self.seconds % 60
    }
}

impl std::fmt::Display for Eta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.hours() > 0 {
            write!(f, "{}h {:02}m {:02}s", self.hours(), self.minutes(), self.seconds())
        } else if self.minutes() > 0 {
            write!(f, "{}m {:02}s", self.minutes(), self.seconds())
        } else {
            write!(f, "{}s", self.seconds())
        }
    }
}

/// Progress update produced by the [`ProgressEstimator`](crate::progress::ProgressEstimator)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Bytes written to the temp file so far, including any resumed prefix
    pub bytes_done: u64,
    /// Expected total size in bytes
    pub total_bytes: u64,
    /// Progress percentage (0.0 to 100.0)
    pub percent: f32,
    /// Estimated time remaining (None = unknown, which is not the same as zero)
    pub eta: Option<Eta>,
}

/// Event emitted during the download lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// State transition
    StateChanged {
        /// Download filename
        filename: String,
        /// New state
        state: DownloadState,
    },

    /// Download progress update
    Progress {
        /// Download filename
        filename: String,
        /// Progress details
        progress: ProgressEvent,
    },

    /// Terminal failure
    Failed {
        /// Download filename
        filename: String,
        /// Why it failed
        reason: FailureReason,
        /// Whether continuing from the checkpoint makes sense
        resumable: bool,
    },

    /// Verified file is ready for the installer
    InstallReady {
        /// Download filename
        filename: String,
        /// Final path of the verified file
        path: PathBuf,
    },

    /// A previously offered install affordance must be withdrawn
    InstallRevoked {
        /// Download filename
        filename: String,
    },

    /// Graceful shutdown initiated
    Shutdown,
}

/// Snapshot of a known download
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadInfo {
    /// Descriptor as enqueued
    pub descriptor: DownloadDescriptor,
    /// Current state
    pub state: DownloadState,
    /// Reason attached to the last failure state, if any
    pub failure_reason: Option<FailureReason>,
    /// Resume checkpoint, if one is stored
    pub checkpoint: Option<u64>,
}
