//! Outbound notifications
//!
//! The pipeline never renders anything itself. Everything a UI or an OS
//! notification needs flows through [`ProgressSink`]. [`EventSink`] is the
//! default implementation: it turns every callback into an [`Event`] on a
//! broadcast channel so any number of subscribers can listen.

use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::FailureReason;
use crate::types::{DownloadState, Event, ProgressEvent};

/// Receives state, progress and failure updates for a download
pub trait ProgressSink: Send + Sync {
    /// The download moved to a new state
    fn on_state(&self, filename: &str, state: DownloadState);

    /// New throttled progress sample
    fn on_progress(&self, filename: &str, progress: ProgressEvent);

    /// Terminal failure; `resumable` tells whether continuing from the
    /// checkpoint makes sense
    fn on_failure(&self, filename: &str, reason: FailureReason, resumable: bool);

    /// Verified file can be handed to the installer
    fn on_install_ready(&self, _filename: &str, _path: &Path) {}

    /// Any previously offered install affordance must be withdrawn
    fn on_install_revoked(&self, _filename: &str) {}
}

/// [`ProgressSink`] that forwards to a broadcast channel
///
/// If there are no active subscribers, events are silently dropped. This
/// allows the download to continue even if no one is listening.
#[derive(Clone)]
pub struct EventSink {
    tx: broadcast::Sender<Event>,
}

impl EventSink {
    /// Wrap an existing broadcast sender
    pub fn new(tx: broadcast::Sender<Event>) -> Self {
        Self { tx }
    }

    /// Subscribe to the forwarded events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Send an event that has no sink callback (e.g. shutdown)
    pub fn emit(&self, event: Event) {
        self.tx.send(event).ok();
    }
}

impl ProgressSink for EventSink {
    fn on_state(&self, filename: &str, state: DownloadState) {
        self.emit(Event::StateChanged {
            filename: filename.to_string(),
            state,
        });
    }

    fn on_progress(&self, filename: &str, progress: ProgressEvent) {
        self.emit(Event::Progress {
            filename: filename.to_string(),
            progress,
        });
    }

    fn on_failure(&self, filename: &str, reason: FailureReason, resumable: bool) {
        self.emit(Event::Failed {
            filename: filename.to_string(),
            reason,
            resumable,
        });
    }

    fn on_install_ready(&self, filename: &str, path: &Path) {
        self.emit(Event::InstallReady {
            filename: filename.to_string(),
            path: path.to_path_buf(),
        });
    }

    fn on_install_revoked(&self, filename: &str) {
        self.emit(Event::InstallRevoked {
            filename: filename.to_string(),
        });
    }
}

/// Forwards every callback to each sink in order
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl FanoutSink {
    /// Build from a list of sinks
    pub fn new(sinks: Vec<Arc<dyn ProgressSink>>) -> Self {
        Self { sinks }
    }
}

impl ProgressSink for FanoutSink {
    fn on_state(&self, filename: &str, state: DownloadState) {
        for sink in &self.sinks {
            sink.on_state(filename, state);
        }
    }

    fn on_progress(&self, filename: &str, progress: ProgressEvent) {
        for sink in &self.sinks {
            sink.on_progress(filename, progress);
        }
    }

    fn on_failure(&self, filename: &str, reason: FailureReason, resumable: bool) {
        for sink in &self.sinks {
            sink.on_failure(filename, reason, resumable);
        }
    }

    fn on_install_ready(&self, filename: &str, path: &Path) {
        for sink in &self.sinks {
            sink.on_install_ready(filename, path);
        }
    }

    fn on_install_revoked(&self, filename: &str) {
        for sink in &self.sinks {
            sink.on_install_revoked(filename);
        }
    }
}
