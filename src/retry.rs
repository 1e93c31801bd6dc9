//! Retry classification and exponential backoff
//!
//! The engine keeps its own attempt counter because the two retryable error
//! classes (network and local I/O) end differently once the budget runs out.
//! This module supplies the shared pieces: which errors are worth retrying at
//! all, and how long to wait between attempts.
//!
//! # Example
//!
//! ```
//! use ota_dl::config::RetryConfig;
//! use ota_dl::retry::Backoff;
//! use std::time::Duration;
//!
//! let config = RetryConfig {
//!     initial_delay: Duration::from_millis(100),
//!     jitter: false,
//!     ..RetryConfig::default()
//! };
//! let mut backoff = Backoff::new(&config);
//! assert_eq!(backoff.next_delay(), Duration::from_millis(100));
//! assert_eq!(backoff.next_delay(), Duration::from_millis(200));
//! ```

use crate::config::RetryConfig;
use crate::error::TransferError;
use rand::Rng;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, connection reset, a flaky write) should return `true`.
/// Permanent failures (bad status, corrupt state, unknown errors) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for TransferError {
    fn is_retryable(&self) -> bool {
        match self {
            TransferError::Network(_) => true,
            TransferError::LocalIo(_) => true,
            // Status errors are surfaced to the caller, never retried here
            TransferError::HttpStatus { .. } => false,
            TransferError::Other(_) => false,
        }
    }
}

/// Exponential backoff schedule derived from a [`RetryConfig`]
#[derive(Debug, Clone)]
pub struct Backoff {
    delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: bool,
}

impl Backoff {
    /// Start a new schedule at the configured initial delay
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            delay: config.initial_delay,
            max_delay: config.max_delay,
            multiplier: config.backoff_multiplier,
            jitter: config.jitter,
        }
    }

    /// Delay to wait before the next attempt; advances the schedule
    pub fn next_delay(&mut self) -> Duration {
        let current = if self.jitter {
            add_jitter(self.delay)
        } else {
            self.delay
        };

        // Saturate at the cap instead of overflowing Duration
        let next = Duration::try_from_secs_f64(self.delay.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max_delay);
        self.delay = next.min(self.max_delay);

        current
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay.
/// This means the actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    let jittered_secs = delay.as_secs_f64() * (1.0 + jitter_factor);
    Duration::try_from_secs_f64(jittered_secs).unwrap_or(delay)
}
