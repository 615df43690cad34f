//! Error types for task domain validation, transitions, and payload codec.

use super::{CheckKind, TaskCheckRunStatus, TaskId, TaskRunStatus, TaskStatus, TaskType};
use thiserror::Error;

/// Errors raised by the payload codec.
///
/// `Corrupt` signals a stored payload that cannot be parsed into the shape
/// implied by the task type: an unrecoverable data-integrity fault that must
/// be logged and surfaced, never silently defaulted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PayloadCodecError {
    /// A required field is missing or blank for the declared task type.
    #[error("{task_type} payload is missing required field `{field}`")]
    MissingField {
        /// Declared task type.
        task_type: TaskType,
        /// Name of the missing field.
        field: &'static str,
    },

    /// The payload variant does not match the declared task type.
    #[error("expected a {expected} payload, got {actual}")]
    Mismatch {
        /// Type the task declares.
        expected: TaskType,
        /// Type the payload actually carries.
        actual: TaskType,
    },

    /// The stored payload cannot be parsed into the declared shape.
    #[error("corrupt {task_type} payload: {detail}")]
    Corrupt {
        /// Declared task type.
        task_type: TaskType,
        /// Parser diagnostic.
        detail: String,
    },

    /// The payload could not be serialised.
    #[error("payload serialisation failed: {0}")]
    Serialise(String),
}

/// Errors returned while constructing or mutating domain task values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskDomainError {
    /// Payload validation or codec failure.
    #[error(transparent)]
    Payload(#[from] PayloadCodecError),

    /// The requested status change is not a legal state-machine move.
    #[error("task {task_id} cannot transition from {from} to {to}")]
    InvalidStateTransition {
        /// Task the transition was requested for.
        task_id: TaskId,
        /// Status before the request.
        from: TaskStatus,
        /// Requested target status.
        to: TaskStatus,
    },

    /// A run was started while another run is still active.
    #[error("task {0} already has an active run")]
    RunAlreadyActive(TaskId),

    /// A run completion was recorded with no active run.
    #[error("task {0} has no active run")]
    NoActiveRun(TaskId),

    /// A run completion used a non-terminal status.
    #[error("task run completion status must be terminal, got {0}")]
    NonTerminalRunStatus(TaskRunStatus),

    /// A check completion used a non-terminal status.
    #[error("check run completion status must be terminal, got {0}")]
    NonTerminalCheckStatus(TaskCheckRunStatus),

    /// A check was started while the same kind is still running.
    #[error("task {task_id} already has a running {kind} check")]
    CheckAlreadyRunning {
        /// Task carrying the check.
        task_id: TaskId,
        /// Kind of the duplicate check.
        kind: CheckKind,
    },

    /// A check completion was recorded with no running check of that kind.
    #[error("task {task_id} has no running {kind} check")]
    NoRunningCheck {
        /// Task carrying the check.
        task_id: TaskId,
        /// Kind of the missing check.
        kind: CheckKind,
    },

    /// A non-creating task was constructed without a target database.
    #[error("{0} tasks require a target database")]
    MissingDatabase(TaskType),

    /// A database-create task was constructed with a database already set.
    #[error("database_create tasks must not carry a database id at creation")]
    UnexpectedDatabase,

    /// The created database was resolved twice.
    #[error("task {0} already has a resolved database")]
    DatabaseAlreadyResolved(TaskId),

    /// A statement was patched onto a task type that does not carry one.
    #[error("statement is not supported for {0} tasks")]
    StatementNotSupported(TaskType),

    /// A blank statement was patched onto a statement-bearing task.
    #[error("statement must not be empty")]
    EmptyStatement,
}

/// Error returned while parsing task statuses from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task status: {0}")]
pub struct ParseTaskStatusError(pub String);

/// Error returned while parsing task types from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task type: {0}")]
pub struct ParseTaskTypeError(pub String);
