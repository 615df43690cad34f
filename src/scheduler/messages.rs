//! Scheduler command and completion messages.

use crate::task::domain::{CheckKind, PrincipalId, TaskId};
use crate::task::ports::CancelHandle;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Operator commands accepted by a running scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Cancel a task, signalling its in-flight execution if one exists.
    CancelTask {
        /// Task to cancel.
        task_id: TaskId,
        /// Principal requesting the cancellation.
        actor: PrincipalId,
        /// Free-text comment for the audit trail.
        comment: Option<String>,
    },
    /// Stop the scheduler loop.
    Shutdown,
}

/// Cloneable command sender for a running scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    pub(crate) const fn new(commands: mpsc::Sender<SchedulerCommand>) -> Self {
        Self { commands }
    }

    /// Requests cancellation of a task.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerClosed`] when the scheduler has stopped.
    pub async fn cancel_task(
        &self,
        task_id: TaskId,
        actor: PrincipalId,
        comment: Option<String>,
    ) -> Result<(), SchedulerClosed> {
        self.commands
            .send(SchedulerCommand::CancelTask {
                task_id,
                actor,
                comment,
            })
            .await
            .map_err(|_| SchedulerClosed)
    }

    /// Requests a clean shutdown of the scheduler loop.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerClosed`] when the scheduler has already stopped.
    pub async fn shutdown(&self) -> Result<(), SchedulerClosed> {
        self.commands
            .send(SchedulerCommand::Shutdown)
            .await
            .map_err(|_| SchedulerClosed)
    }
}

/// The scheduler stopped and no longer accepts commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("scheduler is no longer running")]
pub struct SchedulerClosed;

/// Result of one executor dispatch.
#[derive(Debug, Clone)]
pub(crate) enum ExecutionOutcome {
    /// The collaborator reported success with a result detail.
    Success(String),
    /// The collaborator reported failure with an error detail.
    Failure(String),
}

/// Completion messages correlated back to the scheduler loop.
#[derive(Debug)]
pub(crate) enum CompletionMessage {
    /// An executor dispatch finished.
    Execution {
        task_id: TaskId,
        correlation: Uuid,
        outcome: ExecutionOutcome,
    },
    /// A check dispatch finished (its result is already recorded).
    Check { task_id: TaskId, kind: CheckKind },
}

/// Pending cancellation bookkeeping for an in-flight execution.
#[derive(Debug)]
pub(crate) struct CancelRequest {
    pub(crate) actor: PrincipalId,
    pub(crate) comment: Option<String>,
    pub(crate) deadline: DateTime<Utc>,
}

/// One in-flight executor dispatch.
#[derive(Debug)]
pub(crate) struct InFlightExecution {
    pub(crate) correlation: Uuid,
    pub(crate) cancel: CancelHandle,
    pub(crate) cancel_requested: Option<CancelRequest>,
}
