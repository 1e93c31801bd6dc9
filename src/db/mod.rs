//! Database layer for ota-dl
//!
//! Handles SQLite persistence for the few keys the pipeline owns.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`checkpoints`] - Resume checkpoints (bytes already written per file)
//! - [`descriptors`] - Cached descriptors and their last known state
//! - [`state`] - Runtime state (shutdown tracking)

use crate::error::FailureReason;
use crate::types::{DownloadDescriptor, DownloadState};
use sqlx::{FromRow, sqlite::SqlitePool};

mod checkpoints;
mod descriptors;
mod migrations;
mod state;

/// Descriptor record from database
#[derive(Debug, Clone, FromRow)]
pub struct DescriptorRow {
    /// Target filename (primary key)
    pub filename: String,
    /// Source URL
    pub url: Option<String>,
    /// Expected total size in bytes
    pub size_bytes: i64,
    /// Expected checksum (hex)
    pub checksum: Option<String>,
    /// Version label shown to the user
    pub version_label: String,
    /// Last known state (see [`DownloadState::to_i32`])
    pub state: i32,
    /// Failure reason code attached to a failure state
    pub failure_reason: Option<String>,
    /// Unix timestamp of the last update
    pub updated_at: i64,
}

impl DescriptorRow {
    /// Rebuild the descriptor this row was stored from
    pub fn descriptor(&self) -> DownloadDescriptor {
        DownloadDescriptor {
            url: self.url.clone(),
            size_bytes: self.size_bytes.max(0) as u64,
            filename: self.filename.clone(),
            checksum: self.checksum.clone(),
            version_label: self.version_label.clone(),
        }
    }

    /// Last known state
    pub fn download_state(&self) -> DownloadState {
        DownloadState::from_i32(self.state)
    }

    /// Parsed failure reason, if one is stored
    pub fn failure(&self) -> Option<FailureReason> {
        self.failure_reason
            .as_deref()
            .and_then(FailureReason::from_code)
    }
}

/// Database handle for ota-dl
pub struct Database {
    pool: SqlitePool,
}
