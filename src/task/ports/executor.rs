//! Executor port: external capabilities that carry out task payloads.

use crate::task::domain::{Task, TaskType};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

/// Result type for execution dispatch.
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// External capability that executes one task type against a target.
///
/// Implementations receive the resolved task and a cancellation signal;
/// honouring the signal is cooperative. The returned string is a result
/// detail recorded on the task run.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Executes the task to completion or cooperative abort.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] when execution fails; the detail is
    /// captured into the owning task run.
    async fn execute(&self, task: &Task, cancel: CancelSignal) -> ExecutorResult<String>;
}

/// Errors returned by execution capabilities.
#[derive(Debug, Clone, Error)]
pub enum ExecutorError {
    /// The execution collaborator could not be reached or crashed.
    #[error("execution dispatch failed: {0}")]
    Dispatch(Arc<dyn std::error::Error + Send + Sync>),

    /// The execution collaborator reported a failure.
    #[error("execution failed: {0}")]
    Failed(String),
}

impl ExecutorError {
    /// Wraps a dispatch failure.
    pub fn dispatch(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Dispatch(Arc::new(err))
    }
}

/// Controller half of a cancellation channel.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Requests cooperative abort of the paired execution.
    pub fn cancel(&self) {
        // Receivers observe the value; send failure means the execution
        // already finished and dropped its signal.
        self.tx.send_replace(true);
    }
}

/// Execution-side half of a cancellation channel.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Whether abort has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once abort is requested, or once the controlling half is
    /// dropped without ever requesting one.
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// A signal that never fires; for callers outside scheduler control.
    #[must_use]
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        Self { rx }
    }
}

/// Creates a linked cancellation handle/signal pair.
#[must_use]
pub fn cancellation_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

/// Registry mapping each task type to its execution capability.
///
/// Resolved once at startup rather than branching inside the state machine.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: BTreeMap<TaskType, Arc<dyn TaskExecutor>>,
}

impl ExecutorRegistry {
    /// Starts building a registry.
    #[must_use]
    pub fn builder() -> ExecutorRegistryBuilder {
        ExecutorRegistryBuilder {
            executors: BTreeMap::new(),
            duplicates: Vec::new(),
        }
    }

    /// Returns the executor registered for a task type.
    #[must_use]
    pub fn get(&self, task_type: TaskType) -> Option<Arc<dyn TaskExecutor>> {
        self.executors.get(&task_type).cloned()
    }
}

/// Builder for [`ExecutorRegistry`].
pub struct ExecutorRegistryBuilder {
    executors: BTreeMap<TaskType, Arc<dyn TaskExecutor>>,
    duplicates: Vec<TaskType>,
}

impl ExecutorRegistryBuilder {
    /// Registers an executor for a task type.
    #[must_use]
    pub fn register(mut self, task_type: TaskType, executor: Arc<dyn TaskExecutor>) -> Self {
        if self.executors.insert(task_type, executor).is_some() {
            self.duplicates.push(task_type);
        }
        self
    }

    /// Finalizes the registry.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorRegistryError::Duplicate`] when a task type was
    /// registered more than once.
    pub fn build(self) -> Result<ExecutorRegistry, ExecutorRegistryError> {
        if let Some(task_type) = self.duplicates.first() {
            return Err(ExecutorRegistryError::Duplicate(*task_type));
        }
        Ok(ExecutorRegistry {
            executors: self.executors,
        })
    }
}

/// Errors raised while building an executor registry.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ExecutorRegistryError {
    /// The same task type was registered twice.
    #[error("executor for {0} tasks registered more than once")]
    Duplicate(TaskType),
}
