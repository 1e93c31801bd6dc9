//! Throttled progress and ETA estimation
//!
//! [`ProgressEstimator`] turns the raw byte counter of a running transfer into
//! [`ProgressEvent`]s. It performs no I/O and takes the current instant as an
//! argument, so the whole thing is deterministic under test.
//!
//! Throughput is measured between two consecutive *emitted* events and kept in
//! a short history; the ETA divides the remaining bytes by the history average.
//! A zero-throughput sample right after an event is most likely a short stall
//! and is ignored. A zero-throughput sample after a longer gap clears the
//! history so consumers show "unknown" instead of a stale extrapolation.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::ProgressConfig;
use crate::types::{Eta, ProgressEvent};

/// Converts `(bytes_done, total_bytes, now)` samples into throttled events
#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    min_interval: Duration,
    stall_window: Duration,
    capacity: usize,
    /// Bytes per second, oldest first
    history: VecDeque<f64>,
    last_emitted: Option<(u64, Instant)>,
    last_eta: Option<Eta>,
}

impl ProgressEstimator {
    /// Create an estimator with the given throttle and history settings
    pub fn new(config: &ProgressConfig) -> Self {
        Self {
            min_interval: config.min_interval,
            stall_window: config.stall_window,
            capacity: config.eta_history.max(1),
            history: VecDeque::with_capacity(config.eta_history.max(1)),
            last_emitted: None,
            last_eta: None,
        }
    }

    /// Feed a sample; returns an event when the throttle allows one
    ///
    /// The first sample always produces an event (with an unknown ETA).
    /// Samples below the last emitted byte count never produce one, so
    /// emitted events are non-decreasing in `bytes_done`.
    pub fn on_sample(
        &mut self,
        bytes_done: u64,
        total_bytes: u64,
        now: Instant,
    ) -> Option<ProgressEvent> {
        let Some((last_bytes, last_at)) = self.last_emitted else {
            self.last_emitted = Some((bytes_done, now));
            return Some(make_event(bytes_done, total_bytes, None));
        };

        // A transfer restarted from zero stays silent until it catches up
        if bytes_done < last_bytes {
            return None;
        }

        let elapsed = now.saturating_duration_since(last_at);
        if elapsed < self.min_interval {
            return None;
        }

        let secs = elapsed.as_secs_f64();
        let delta = bytes_done.saturating_sub(last_bytes);
        let throughput = if secs > 0.0 { delta as f64 / secs } else { 0.0 };

        if throughput > 0.0 {
            if self.history.len() == self.capacity {
                self.history.pop_front();
            }
            self.history.push_back(throughput);
            self.last_eta = self.estimate(bytes_done, total_bytes);
        } else if elapsed >= self.stall_window {
            self.history.clear();
            self.last_eta = None;
        }
        // else: short stall, keep the previous ETA

        self.last_emitted = Some((bytes_done, now));
        Some(make_event(bytes_done, total_bytes, self.last_eta))
    }

    /// Final 100% event, emitted regardless of the throttle
    pub fn finish(&mut self, total_bytes: u64, now: Instant) -> ProgressEvent {
        self.last_emitted = Some((total_bytes, now));
        self.last_eta = Some(Eta::from_secs(0));
        make_event(total_bytes, total_bytes, self.last_eta)
    }

    fn estimate(&self, bytes_done: u64, total_bytes: u64) -> Option<Eta> {
        if self.history.is_empty() {
            return None;
        }
        let average = self.history.iter().sum::<f64>() / self.history.len() as f64;
        if average <= 0.0 {
            return None;
        }
        let remaining = total_bytes.saturating_sub(bytes_done) as f64;
        Some(Eta::from_secs((remaining / average).ceil() as u64))
    }
}

fn make_event(bytes_done: u64, total_bytes: u64, eta: Option<Eta>) -> ProgressEvent {
    let percent = if total_bytes > 0 {
        ((bytes_done as f64 / total_bytes as f64) * 100.0).min(100.0) as f32
    } else {
        0.0
    };
    ProgressEvent {
        bytes_done,
        total_bytes,
        percent,
        eta,
    }
}
