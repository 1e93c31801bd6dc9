//! Error types for ota-dl
//!
//! Three layers of errors live here:
//! - [`Error`] is the crate-wide error returned by the public API (persistence,
//!   configuration, state-machine misuse).
//! - [`FailureReason`] is the closed diagnostic taxonomy attached to terminal
//!   `Failed` / `VerificationFailed` states. It is what the engine and the
//!   verifier return and what consumers see through the progress sink.
//! - [`TransferError`] classifies what went wrong while streaming a body to
//!   disk, so the engine can decide between retrying and giving up.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for ota-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for ota-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "temp_dir")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Download control error (unknown download, invalid transition)
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shutdown in progress - not accepting new downloads
    #[error("shutdown in progress: not accepting new downloads")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Errors raised by the inbound control API
#[derive(Debug, Error)]
pub enum DownloadError {
    /// No descriptor is known for this filename
    #[error("download {filename} not found")]
    NotFound {
        /// The filename that was not found
        filename: String,
    },

    /// A task for this filename is already running
    #[error("download {filename} is already active")]
    AlreadyActive {
        /// The filename whose task is already running
        filename: String,
    },

    /// Cannot perform operation in current state
    #[error("cannot {operation} download {filename} in state {current_state}")]
    InvalidState {
        /// The filename of the download
        filename: String,
        /// The operation that was attempted (e.g., "pause", "resume", "retry")
        operation: String,
        /// The current state that prevents the operation
        current_state: String,
    },
}

/// Why a download or a verification ended in a failure state
///
/// Closed set: every terminal failure maps to exactly one of these and the
/// reason is persisted next to the failed state so it survives restarts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Descriptor has no URL (or no usable filename)
    #[error("download descriptor or URL is missing")]
    MissingDescriptorOrUrl,
    /// URL scheme is not http or https
    #[error("download URL must use http or https")]
    InvalidUrlScheme,
    /// Network failures exhausted the retry budget, or local writes kept failing
    #[error("server or connection error")]
    ServerOrConnectionError,
    /// Server answered with a non-2xx status
    #[error("server returned an unsuccessful HTTP response")]
    UnsuccessfulHttpResponse,
    /// The finished temp file could not be moved to its final location
    #[error("could not relocate the downloaded file")]
    CouldNotRelocateFile,
    /// Unclassified download failure
    #[error("unknown download error")]
    Unknown,
    /// Verification was requested without a descriptor
    #[error("no descriptor available for verification")]
    NullDescriptor,
    /// Descriptor carries no checksum to verify against
    #[error("expected checksum is missing")]
    MissingExpectedChecksum,
    /// Checksum could not be computed (file absent, hash unavailable, read error)
    #[error("could not compute checksum")]
    CouldNotComputeChecksum,
    /// Computed checksum differs from the expected one
    #[error("checksum mismatch")]
    ChecksumMismatch,
}

impl FailureReason {
    /// Stable machine-readable code, used for persistence
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::MissingDescriptorOrUrl => "missing_descriptor_or_url",
            FailureReason::InvalidUrlScheme => "invalid_url_scheme",
            FailureReason::ServerOrConnectionError => "server_or_connection_error",
            FailureReason::UnsuccessfulHttpResponse => "unsuccessful_http_response",
            FailureReason::CouldNotRelocateFile => "could_not_relocate_file",
            FailureReason::Unknown => "unknown",
            FailureReason::NullDescriptor => "null_descriptor",
            FailureReason::MissingExpectedChecksum => "missing_expected_checksum",
            FailureReason::CouldNotComputeChecksum => "could_not_compute_checksum",
            FailureReason::ChecksumMismatch => "checksum_mismatch",
        }
    }

    /// Parse a code produced by [`FailureReason::code`]
    pub fn from_code(code: &str) -> Option<Self> {
        let reason = match code {
            "missing_descriptor_or_url" => FailureReason::MissingDescriptorOrUrl,
            "invalid_url_scheme" => FailureReason::InvalidUrlScheme,
            "server_or_connection_error" => FailureReason::ServerOrConnectionError,
            "unsuccessful_http_response" => FailureReason::UnsuccessfulHttpResponse,
            "could_not_relocate_file" => FailureReason::CouldNotRelocateFile,
            "unknown" => FailureReason::Unknown,
            "null_descriptor" => FailureReason::NullDescriptor,
            "missing_expected_checksum" => FailureReason::MissingExpectedChecksum,
            "could_not_compute_checksum" => FailureReason::CouldNotComputeChecksum,
            "checksum_mismatch" => FailureReason::ChecksumMismatch,
            _ => return None,
        };
        Some(reason)
    }

    /// Whether this reason belongs to the verification phase
    pub fn is_verification(&self) -> bool {
        matches!(
            self,
            FailureReason::NullDescriptor
                | FailureReason::MissingExpectedChecksum
                | FailureReason::CouldNotComputeChecksum
                | FailureReason::ChecksumMismatch
        )
    }
}

/// Failure while transferring the response body to the temp file
#[derive(Debug, Error)]
pub enum TransferError {
    /// Transport-level failure (reset, timeout, TLS, DNS, truncated body)
    #[error("network error: {0}")]
    Network(String),

    /// Failure reading or writing the local temp file
    #[error("local I/O error: {0}")]
    LocalIo(#[source] std::io::Error),

    /// Server answered with a non-2xx status
    #[error("HTTP {status} for {url}")]
    HttpStatus {
        /// Response status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Anything that fits none of the above
    #[error("{0}")]
    Other(String),
}

impl TransferError {
    /// Classify an I/O error produced by the transport (not by the local file)
    ///
    /// Connection-flavoured kinds count as network errors, as does a
    /// "not found" whose message points at an HTTP resource.
    pub fn from_transport_io(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let network_kind = matches!(
            err.kind(),
            ErrorKind::TimedOut
                | ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::NotConnected
                | ErrorKind::BrokenPipe
                | ErrorKind::UnexpectedEof
                | ErrorKind::AddrNotAvailable
        );
        let http_not_found = err.kind() == ErrorKind::NotFound
            && err.to_string().to_ascii_lowercase().contains("http");

        if network_kind || http_not_found {
            TransferError::Network(err.to_string())
        } else {
            TransferError::Other(err.to_string())
        }
    }
}

/// First [`std::io::Error`] in the source chain of `err`, `err` included
pub(crate) fn io_cause<'a>(
    err: &'a (dyn std::error::Error + 'static),
) -> Option<&'a std::io::Error> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            return Some(io);
        }
        current = e.source();
    }
    None
}

impl From<reqwest::Error> for TransferError {
    fn from(err: reqwest::Error) -> Self {
        // Could not reach the server at all, whatever the underlying cause
        if err.is_timeout() || err.is_connect() {
            return TransferError::Network(err.to_string());
        }
        if let Some(io) = io_cause(&err) {
            let message = format!("{err}: {io}");
            return TransferError::from_transport_io(std::io::Error::new(io.kind(), message));
        }
        if err.is_request() || err.is_body() {
            return TransferError::Network(err.to_string());
        }
        if let Some(status) = err.status() {
            return TransferError::HttpStatus {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            };
        }
        TransferError::Other(err.to_string())
    }
}
