//! Status enums for tasks, task runs, and task check runs.

use super::ParseTaskStatusError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is waiting to become eligible for execution.
    Pending,
    /// Task is waiting for its gating checks to pass.
    PendingApproval,
    /// Task execution is in flight.
    Running,
    /// Task completed successfully.
    Done,
    /// The latest execution attempt failed; an operator may retry.
    Failed,
    /// Task was canceled before or during execution.
    Canceled,
}

impl TaskStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PendingApproval => "pending_approval",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    /// Whether the status is terminal for the task.
    ///
    /// `Failed` is terminal only for the current run; the task itself may be
    /// retried by explicit operator action, so it is not terminal here.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Canceled)
    }

    /// Whether a transition from `self` to `to` is a legal move in the
    /// status state machine.
    ///
    /// Self-transitions are not legal moves; the state-machine entry point
    /// absorbs them as idempotent no-ops before consulting this table.
    /// Preconditions that depend on wall-clock time or check results are
    /// enforced by the lifecycle service, not here.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        match self {
            Self::Pending => matches!(to, Self::PendingApproval | Self::Running | Self::Canceled),
            Self::PendingApproval => {
                matches!(to, Self::Pending | Self::Running | Self::Canceled)
            }
            Self::Running => matches!(to, Self::Done | Self::Failed | Self::Canceled),
            // Operator retry re-enters the lifecycle explicitly.
            Self::Failed => matches!(to, Self::Pending | Self::Running),
            Self::Done | Self::Canceled => false,
        }
    }
}

impl TryFrom<&str> for TaskStatus {
    type Error = ParseTaskStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "pending" => Ok(Self::Pending),
            "pending_approval" => Ok(Self::PendingApproval),
            "running" => Ok(Self::Running),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            _ => Err(ParseTaskStatusError(value.to_owned())),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one execution attempt of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskRunStatus {
    /// The attempt is in flight.
    Running,
    /// The attempt completed successfully.
    Done,
    /// The attempt failed.
    Failed,
    /// The attempt was canceled.
    Canceled,
}

impl TaskRunStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    /// Whether the attempt has finished.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for TaskRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one pre-flight validation attempt of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCheckRunStatus {
    /// The check is in flight.
    Running,
    /// The check ran to completion and produced advice.
    Done,
    /// The check itself could not run (collaborator error, timeout).
    Failed,
}

impl TaskCheckRunStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Whether the check attempt has finished.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for TaskCheckRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
