//! Execution attempt records for tasks.

use super::TaskRunStatus;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// One execution attempt of a task.
///
/// A task accumulates runs in chronological order across retries; at most
/// one run may be non-terminal at any instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRun {
    status: TaskRunStatus,
    result: Option<String>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    abort_unconfirmed: bool,
}

impl TaskRun {
    /// Starts a new execution attempt.
    pub(crate) fn started(clock: &impl Clock) -> Self {
        Self {
            status: TaskRunStatus::Running,
            result: None,
            started_at: clock.utc(),
            finished_at: None,
            abort_unconfirmed: false,
        }
    }

    /// Finishes the attempt with a terminal status and result detail.
    pub(crate) fn finish(
        &mut self,
        status: TaskRunStatus,
        result: Option<String>,
        clock: &impl Clock,
    ) {
        self.status = status;
        self.result = result;
        self.finished_at = Some(clock.utc());
    }

    /// Marks the attempt canceled.
    ///
    /// `confirmed` records whether the execution collaborator acknowledged
    /// the abort; an unconfirmed abort is flagged for operator review.
    pub(crate) fn cancel(&mut self, confirmed: bool, clock: &impl Clock) {
        self.status = TaskRunStatus::Canceled;
        self.abort_unconfirmed = !confirmed;
        self.finished_at = Some(clock.utc());
    }

    /// Returns the attempt status.
    #[must_use]
    pub const fn status(&self) -> TaskRunStatus {
        self.status
    }

    /// Returns the result detail reported by the execution collaborator.
    #[must_use]
    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    /// Returns when the attempt started.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns when the attempt finished, if it has.
    #[must_use]
    pub const fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Whether the abort was never acknowledged by the collaborator.
    #[must_use]
    pub const fn abort_unconfirmed(&self) -> bool {
        self.abort_unconfirmed
    }

    /// Whether the attempt is still in flight.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}
