//! Checksum verification of relocated files
//!
//! The verifier waits (boundedly) for the file to become visible, streams it
//! through the configured digest on a blocking thread, and compares the lower
//! case hex rendering against the expected value without regard to case.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::config::VerifyConfig;
use crate::error::FailureReason;
use crate::types::DownloadDescriptor;

/// Buffer size for reading files during checksum calculation (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Digest algorithms the verifier can compute
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    /// MD5, 32 hex characters
    Md5,
    /// SHA-256, 64 hex characters
    Sha256,
}

impl ChecksumAlgorithm {
    /// Parse a configured algorithm name ("md5", "sha256", "sha-256")
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "md5" => Some(ChecksumAlgorithm::Md5),
            "sha256" | "sha-256" => Some(ChecksumAlgorithm::Sha256),
            _ => None,
        }
    }
}

enum Hasher {
    Md5(md5::Context),
    Sha256(Sha256),
}

impl Hasher {
    fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Md5 => Hasher::Md5(md5::Context::new()),
            ChecksumAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Md5(ctx) => ctx.consume(data),
            Hasher::Sha256(hasher) => hasher.update(data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Hasher::Md5(ctx) => format!("{:x}", ctx.compute()),
            Hasher::Sha256(hasher) => format!("{:x}", hasher.finalize()),
        }
    }
}

/// Compute the lowercase hex digest of a file (blocking)
pub fn file_checksum(path: &Path, algorithm: ChecksumAlgorithm) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize_hex())
}

/// Verifies finished downloads against their expected checksum
#[derive(Clone, Debug)]
pub struct IntegrityVerifier {
    config: VerifyConfig,
}

impl IntegrityVerifier {
    /// Create a verifier from configuration
    pub fn new(config: VerifyConfig) -> Self {
        Self { config }
    }

    /// Verify the file for a descriptor that may have disappeared meanwhile
    pub async fn verify_descriptor(
        &self,
        descriptor: Option<&DownloadDescriptor>,
        path: &Path,
    ) -> Result<(), FailureReason> {
        let Some(descriptor) = descriptor else {
            tracing::warn!(path = %path.display(), "No descriptor available for verification");
            return Err(FailureReason::NullDescriptor);
        };
        self.verify(path, descriptor.checksum.as_deref()).await
    }

    /// Verify `path` against `expected` (hex, any case)
    ///
    /// Calling this twice on an unchanged file yields the same result.
    pub async fn verify(&self, path: &Path, expected: Option<&str>) -> Result<(), FailureReason> {
        let expected = match expected.map(str::trim) {
            Some(e) if !e.is_empty() => e.to_string(),
            _ => return Err(FailureReason::MissingExpectedChecksum),
        };

        let Some(algorithm) = ChecksumAlgorithm::parse(&self.config.algorithm) else {
            tracing::error!(
                algorithm = %self.config.algorithm,
                "Checksum algorithm is not available"
            );
            return Err(FailureReason::CouldNotComputeChecksum);
        };

        if !self.wait_for_file(path).await {
            tracing::warn!(
                path = %path.display(),
                attempts = self.config.poll_attempts,
                "File not visible for verification"
            );
            return Err(FailureReason::CouldNotComputeChecksum);
        }

        let owned: PathBuf = path.to_path_buf();
        let actual = tokio::task::spawn_blocking(move || file_checksum(&owned, algorithm))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Checksum task panicked");
                FailureReason::CouldNotComputeChecksum
            })?
            .map_err(|e| {
                tracing::error!(path = %path.display(), error = %e, "Failed to read file for checksum");
                FailureReason::CouldNotComputeChecksum
            })?;

        if actual.eq_ignore_ascii_case(&expected) {
            tracing::info!(path = %path.display(), checksum = %actual, "Checksum verified");
            Ok(())
        } else {
            tracing::warn!(
                path = %path.display(),
                expected = %expected,
                actual = %actual,
                "Checksum mismatch"
            );
            Err(FailureReason::ChecksumMismatch)
        }
    }

    /// Poll for existence, sleeping between attempts but not after the last one
    async fn wait_for_file(&self, path: &Path) -> bool {
        for attempt in 1..=self.config.poll_attempts {
            if tokio::fs::try_exists(path).await.unwrap_or(false) {
                return true;
            }
            if attempt < self.config.poll_attempts {
                tracing::debug!(path = %path.display(), attempt, "Waiting for file to appear");
                tokio::time::sleep(self.config.poll_delay).await;
            }
        }
        false
    }
}
