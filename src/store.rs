//! Resume checkpoint persistence
//!
//! The checkpoint is the only state shared between a running download and a
//! restarted process, so the engine talks to it through this narrow trait.
//! [`Database`] is the durable implementation; [`MemoryStateStore`] keeps
//! everything in process and is handy for embedding and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::db::Database;
use crate::error::{Error, Result};

/// Persists the "bytes already written" checkpoint per filename
#[async_trait]
pub trait ResumeStateStore: Send + Sync {
    /// Stored checkpoint, or `None` when the download starts from zero
    async fn load(&self, filename: &str) -> Result<Option<u64>>;

    /// Store the checkpoint, replacing any previous value
    async fn save(&self, filename: &str, bytes_written: u64) -> Result<()>;

    /// Forget the checkpoint
    async fn clear(&self, filename: &str) -> Result<()>;
}

#[async_trait]
impl ResumeStateStore for Database {
    async fn load(&self, filename: &str) -> Result<Option<u64>> {
        self.get_checkpoint(filename).await
    }

    async fn save(&self, filename: &str, bytes_written: u64) -> Result<()> {
        self.set_checkpoint(filename, bytes_written).await
    }

    async fn clear(&self, filename: &str) -> Result<()> {
        self.clear_checkpoint(filename).await
    }
}

/// In-process checkpoint store
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    checkpoints: Mutex<HashMap<String, u64>>,
}

impl MemoryStateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a checkpoint without going through the async trait
    pub fn get(&self, filename: &str) -> Option<u64> {
        self.checkpoints
            .lock()
            .ok()
            .and_then(|map| map.get(filename).copied())
    }

    fn with_map<T>(&self, f: impl FnOnce(&mut HashMap<String, u64>) -> T) -> Result<T> {
        let mut map = self
            .checkpoints
            .lock()
            .map_err(|_| Error::Other("checkpoint store lock poisoned".to_string()))?;
        Ok(f(&mut map))
    }
}

#[async_trait]
impl ResumeStateStore for MemoryStateStore {
    async fn load(&self, filename: &str) -> Result<Option<u64>> {
        self.with_map(|map| map.get(filename).copied())
    }

    async fn save(&self, filename: &str, bytes_written: u64) -> Result<()> {
        self.with_map(|map| {
            map.insert(filename.to_string(), bytes_written);
        })
    }

    async fn clear(&self, filename: &str) -> Result<()> {
        self.with_map(|map| {
            map.remove(filename);
        })
    }
}
