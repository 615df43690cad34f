//! Pre-flight validation records: check kinds, advisor advice, check runs.

use super::TaskCheckRunStatus;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of pre-flight check dispatched against a task's statement.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    /// Statement parses under the target dialect.
    StatementSyntax,
    /// Statement is compatible with the current schema.
    StatementCompatibility,
}

impl CheckKind {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StatementSyntax => "statement_syntax",
            Self::StatementCompatibility => "statement_compatibility",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a single advisor finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdviceStatus {
    /// The statement passed this finding.
    Success,
    /// Surfaced to the approver but does not block execution.
    Warn,
    /// Blocks the task from leaving `PendingApproval`.
    Error,
}

/// A single finding produced by an advisor capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advice {
    /// Finding severity.
    pub status: AdviceStatus,
    /// Short human-readable title, e.g. "Syntax error".
    pub title: String,
    /// Detailed finding content.
    pub content: String,
}

impl Advice {
    /// Creates an advice entry.
    #[must_use]
    pub fn new(status: AdviceStatus, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            status,
            title: title.into(),
            content: content.into(),
        }
    }

    /// Whether this finding blocks task progression.
    #[must_use]
    pub const fn is_blocking(&self) -> bool {
        matches!(self.status, AdviceStatus::Error)
    }
}

/// One pre-flight validation attempt tied to a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCheckRun {
    kind: CheckKind,
    status: TaskCheckRunStatus,
    advice: Vec<Advice>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl TaskCheckRun {
    /// Starts a new check attempt of the given kind.
    pub(crate) fn started(kind: CheckKind, clock: &impl Clock) -> Self {
        Self {
            kind,
            status: TaskCheckRunStatus::Running,
            advice: Vec::new(),
            started_at: clock.utc(),
            finished_at: None,
        }
    }

    /// Finishes the attempt with a terminal status and collected advice.
    pub(crate) fn finish(
        &mut self,
        status: TaskCheckRunStatus,
        advice: Vec<Advice>,
        clock: &impl Clock,
    ) {
        self.status = status;
        self.advice = advice;
        self.finished_at = Some(clock.utc());
    }

    /// Returns the check kind.
    #[must_use]
    pub const fn kind(&self) -> CheckKind {
        self.kind
    }

    /// Returns the attempt status.
    #[must_use]
    pub const fn status(&self) -> TaskCheckRunStatus {
        self.status
    }

    /// Returns the collected advice entries.
    #[must_use]
    pub fn advice(&self) -> &[Advice] {
        &self.advice
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

    /// Whether the attempt is terminal (`Done`) with no blocking advice.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == TaskCheckRunStatus::Done && !self.advice.iter().any(Advice::is_blocking)
    }
}
