//! Shared fakes for unit tests: a scripted fetcher and a recording sink.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};

use crate::config::Config;
use crate::error::{FailureReason, TransferError};
use crate::fetcher::{FetchResponse, RangeFetcher};
use crate::sink::ProgressSink;
use crate::store::MemoryStateStore;
use crate::types::{DownloadDescriptor, DownloadState, ProgressEvent};

/// Chunk size used when the scripted fetcher serves a body
pub(crate) const CHUNK: usize = 16 * 1024;

/// What the scripted fetcher does for one request
#[derive(Clone, Debug)]
pub(crate) enum Step {
    /// Serve the payload from the requested offset; optionally drop the
    /// connection once the absolute position reaches `cut_at`
    Serve { cut_at: Option<u64> },
    /// Like `Serve`, but answer a ranged request with a full 200 body
    IgnoreRange,
    /// Serve up to `after`, then never yield again
    Stall { after: u64 },
    /// Respond with a status and no body
    Status(u16),
    /// Fail before any response, as a refused connection would
    Refuse,
    /// Fail with an unclassified error
    Unexpected,
    /// Never answer the request
    Hang,
}

/// Deterministic [`RangeFetcher`] driven by a list of [`Step`]s
pub(crate) struct ScriptedFetcher {
    payload: Bytes,
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    calls: Mutex<Vec<Option<u64>>>,
}

impl ScriptedFetcher {
    pub(crate) fn new(payload: Vec<u8>, script: Vec<Step>, fallback: Step) -> Self {
        Self {
            payload: Bytes::from(payload),
            script: Mutex::new(script.into()),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Serve the payload successfully on every request
    pub(crate) fn serving(payload: Vec<u8>) -> Self {
        Self::new(payload, vec![], Step::Serve { cut_at: None })
    }

    /// Offsets of all requests made so far (`None` = plain GET)
    pub(crate) fn calls(&self) -> Vec<Option<u64>> {
        self.calls.lock().unwrap().clone()
    }

    fn body(&self, from: u64, until: u64) -> Vec<Result<Bytes, TransferError>> {
        let mut chunks = Vec::new();
        let mut pos = from as usize;
        let until = until as usize;
        while pos < until {
            let end = (pos + CHUNK).min(until);
            chunks.push(Ok(self.payload.slice(pos..end)));
            pos = end;
        }
        chunks
    }
}

#[async_trait]
impl RangeFetcher for ScriptedFetcher {
    async fn fetch(&self, _url: &str, offset: Option<u64>) -> Result<FetchResponse, TransferError> {
        self.calls.lock().unwrap().push(offset);
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        let len = self.payload.len() as u64;
        let from = offset.unwrap_or(0).min(len);
        let ranged = offset.is_some();

        match step {
            Step::Serve { cut_at } => {
                let end = cut_at.unwrap_or(len).clamp(from, len);
                let mut items = self.body(from, end);
                if cut_at.is_some() {
                    items.push(Err(TransferError::Network("connection reset".into())));
                }
                Ok(FetchResponse {
                    status: if ranged { 206 } else { 200 },
                    content_length: Some(len - from),
                    body: stream::iter(items).boxed(),
                })
            }
            Step::IgnoreRange => Ok(FetchResponse {
                status: 200,
                content_length: Some(len),
                body: stream::iter(self.body(0, len)).boxed(),
            }),
            Step::Stall { after } => {
                let items = self.body(from, after.clamp(from, len));
                Ok(FetchResponse {
                    status: if ranged { 206 } else { 200 },
                    content_length: Some(len - from),
                    body: stream::iter(items).chain(stream::pending()).boxed(),
                })
            }
            Step::Status(status) => Ok(FetchResponse {
                status,
                content_length: Some(0),
                body: stream::empty().boxed(),
            }),
            Step::Refuse => Err(TransferError::Network("connection refused".into())),
            Step::Unexpected => Err(TransferError::Other("malformed response".into())),
            Step::Hang => futures::future::pending().await,
        }
    }
}

/// Everything a [`RecordingSink`] saw, in order
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Recorded {
    State(DownloadState),
    Progress(ProgressEvent),
    Failure(FailureReason, bool),
    InstallReady(PathBuf),
    InstallRevoked,
}

/// Sink that records calls and checks that each progress event is already
/// covered by the checkpoint in `store`
pub(crate) struct RecordingSink {
    store: Option<Arc<MemoryStateStore>>,
    records: Mutex<Vec<Recorded>>,
    unpersisted_events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub(crate) fn new() -> Self {
        Self {
            store: None,
            records: Mutex::new(Vec::new()),
            unpersisted_events: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn watching(store: Arc<MemoryStateStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::new()
        }
    }

    pub(crate) fn records(&self) -> Vec<Recorded> {
        self.records.lock().unwrap().clone()
    }

    pub(crate) fn progress(&self) -> Vec<ProgressEvent> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                Recorded::Progress(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn unpersisted_events(&self) -> Vec<ProgressEvent> {
        self.unpersisted_events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn on_state(&self, _filename: &str, state: DownloadState) {
        self.records.lock().unwrap().push(Recorded::State(state));
    }

    fn on_progress(&self, filename: &str, progress: ProgressEvent) {
        if let Some(store) = &self.store {
            if store.get(filename) != Some(progress.bytes_done) {
                self.unpersisted_events.lock().unwrap().push(progress);
            }
        }
        self.records.lock().unwrap().push(Recorded::Progress(progress));
    }

    fn on_failure(&self, _filename: &str, reason: FailureReason, resumable: bool) {
        self.records
            .lock()
            .unwrap()
            .push(Recorded::Failure(reason, resumable));
    }

    fn on_install_ready(&self, _filename: &str, path: &Path) {
        self.records
            .lock()
            .unwrap()
            .push(Recorded::InstallReady(path.to_path_buf()));
    }

    fn on_install_revoked(&self, _filename: &str) {
        self.records.lock().unwrap().push(Recorded::InstallRevoked);
    }
}

/// Config rooted in `root` with instant retries and no progress throttle
pub(crate) fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = root.join("downloads");
    config.download.temp_dir = root.join("temp");
    config.persistence.database_path = root.join("test.db");
    config.retry.initial_delay = Duration::ZERO;
    config.retry.max_delay = Duration::ZERO;
    config.retry.jitter = false;
    config.progress.min_interval = Duration::ZERO;
    config.verify.poll_attempts = 2;
    config.verify.poll_delay = Duration::from_millis(10);
    config
}

/// Deterministic, non-repeating test payload
pub(crate) fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

pub(crate) fn descriptor(filename: &str, size: u64, checksum: Option<&str>) -> DownloadDescriptor {
    DownloadDescriptor {
        url: Some(format!("https://updates.example.com/{}", filename)),
        size_bytes: size,
        filename: filename.to_string(),
        checksum: checksum.map(str::to_string),
        version_label: "1.2.3".to_string(),
    }
}
