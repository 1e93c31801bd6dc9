//! Background task executor with at most one running task per key
//!
//! Every task gets a [`CancellationToken`] it is expected to poll. Stopping
//! a task cancels the token and waits until the task has actually returned,
//! so the caller can touch the task's files afterwards without racing it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::DownloadError;

struct ActiveTask {
    generation: u64,
    /// Cancelled by the caller to ask the task to stop
    cancel: CancellationToken,
    /// Cancelled by the task wrapper once the task has returned
    finished: CancellationToken,
}

/// Spawns tokio tasks keyed by name, refusing a second task for a busy key
#[derive(Clone, Default)]
pub struct TaskExecutor {
    tasks: Arc<Mutex<HashMap<String, ActiveTask>>>,
    next_generation: Arc<AtomicU64>,
}

impl TaskExecutor {
    /// Create an executor with no tasks
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` under `key`
    ///
    /// Returns [`DownloadError::AlreadyActive`] if a task for `key` is still
    /// running. The entry is removed automatically when the task returns.
    pub async fn spawn<F, Fut>(&self, key: &str, task: F) -> Result<(), DownloadError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().await;
        if tasks.contains_key(key) {
            return Err(DownloadError::AlreadyActive {
                filename: key.to_string(),
            });
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let finished = CancellationToken::new();
        tasks.insert(
            key.to_string(),
            ActiveTask {
                generation,
                cancel: cancel.clone(),
                finished: finished.clone(),
            },
        );
        // Build the future while holding the lock so the entry exists first
        let fut = task(cancel);
        drop(tasks);

        let registry = self.tasks.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            // A panicking task still releases its key and wakes waiters
            if let Err(e) = tokio::spawn(fut).await {
                tracing::error!(key = %key, error = %e, "Task panicked");
            }

            let mut tasks = registry.lock().await;
            if tasks.get(&key).is_some_and(|t| t.generation == generation) {
                tasks.remove(&key);
            }
            drop(tasks);
            finished.cancel();
        });

        Ok(())
    }

    /// Whether a task for `key` is running
    pub async fn is_active(&self, key: &str) -> bool {
        self.tasks.lock().await.contains_key(key)
    }

    /// Number of running tasks
    pub async fn active_count(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Cancel the task for `key` and wait until it has returned
    ///
    /// Returns false when no task was running.
    pub async fn stop(&self, key: &str) -> bool {
        let finished = {
            let tasks = self.tasks.lock().await;
            match tasks.get(key) {
                Some(task) => {
                    task.cancel.cancel();
                    task.finished.clone()
                }
                None => return false,
            }
        };
        finished.cancelled().await;
        true
    }

    /// Signal every running task to stop without waiting
    pub async fn cancel_all(&self) {
        let tasks = self.tasks.lock().await;
        tracing::debug!(active_count = tasks.len(), "Cancelling all active tasks");
        for (key, task) in tasks.iter() {
            tracing::debug!(key = %key, "Signaling task cancellation");
            task.cancel.cancel();
        }
    }

    /// Wait until no task is running
    pub async fn wait_idle(&self) {
        loop {
            let pending: Vec<CancellationToken> = {
                let tasks = self.tasks.lock().await;
                tasks.values().map(|t| t.finished.clone()).collect()
            };
            if pending.is_empty() {
                return;
            }
            tracing::debug!(active_count = pending.len(), "Waiting for active tasks to finish");
            for finished in pending {
                finished.cancelled().await;
            }
        }
    }
}
