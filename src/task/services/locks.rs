//! Per-task serialization of mutations.

use crate::task::domain::TaskId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Lock map guaranteeing at most one in-flight mutation per task.
///
/// Concurrent approval and cancellation requests for the same task
/// serialize on its entry, preventing lost updates; reads stay lock-free
/// against the repository's snapshot.
#[derive(Debug, Default)]
pub struct TaskLockMap {
    inner: Mutex<HashMap<TaskId, Arc<AsyncMutex<()>>>>,
}

impl TaskLockMap {
    /// Creates an empty lock map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the mutation lock for a task, creating it on first use.
    pub async fn acquire(&self, task_id: TaskId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self
                .inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(map.entry(task_id).or_default())
        };
        lock.lock_owned().await
    }
}
