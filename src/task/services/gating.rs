//! Check-run gating engine.
//!
//! Decides whether a task may leave `PendingApproval`: which checks its
//! type mandates, whether their latest results allow execution, and the
//! dispatch of statements to advisor capabilities with bounded retry.

use super::lifecycle::{TaskLifecycleError, TaskLifecycleService};
use crate::task::{
    domain::{CheckKind, Task, TaskCheckRunStatus, TaskId, TaskType},
    ports::{ActivitySink, AdvisorContext, AdvisorRegistry, TaskFind, TaskRepository},
};
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Whether a task is approved for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Every mandatory check passed; the task may run.
    Approved,
    /// One or more checks block execution.
    Blocked {
        /// Human-readable explanation, e.g. "2 unresolved blocking checks".
        reason: String,
    },
}

impl GateDecision {
    /// Whether the task may run.
    #[must_use]
    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

/// The checks a task type must pass before leaving `PendingApproval`.
///
/// Statement-bearing types are gated by every registered check kind; other
/// types are never gated.
#[must_use]
pub fn required_checks(registry: &AdvisorRegistry, task_type: TaskType) -> Vec<CheckKind> {
    if task_type.requires_checks() {
        registry.kinds()
    } else {
        Vec::new()
    }
}

/// Evaluates the gate for a task against its mandatory check kinds.
///
/// Approved only if every kind's latest check run is terminal (`Done`) with
/// no error-severity advice. Warn-severity advice never blocks. A check
/// that failed to run, is still running, or never ran blocks progression.
#[must_use]
pub fn evaluate_gate(task: &Task, required: &[CheckKind]) -> GateDecision {
    let mut unresolved = 0_usize;
    let mut blocking = 0_usize;
    for kind in required {
        match task.latest_check_run(*kind) {
            Some(run) if run.passed() => {}
            Some(run) if run.status() == TaskCheckRunStatus::Done => blocking += 1,
            Some(_) | None => unresolved += 1,
        }
    }
    if unresolved == 0 && blocking == 0 {
        return GateDecision::Approved;
    }
    let mut parts = Vec::new();
    if unresolved > 0 {
        parts.push(format!(
            "{unresolved} unresolved blocking {}",
            plural_checks(unresolved)
        ));
    }
    if blocking > 0 {
        parts.push(format!(
            "{blocking} {} reported blocking advice",
            plural_checks(blocking)
        ));
    }
    GateDecision::Blocked {
        reason: parts.join(" and "),
    }
}

const fn plural_checks(count: usize) -> &'static str {
    if count == 1 { "check" } else { "checks" }
}

/// Retry policy for collaborator dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum dispatch attempts before the check run is marked failed.
    pub max_attempts: u32,
    /// Base delay between attempts; grows linearly per attempt.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based).
    #[must_use]
    pub const fn delay_after(self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Errors raised by the gating engine itself.
///
/// Advisor failures are not errors here: they are captured into the owning
/// check run as a `Failed` status after retries are exhausted.
#[derive(Debug, Error)]
pub enum CheckGateError {
    /// The task does not exist.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    /// The task carries no statement to check.
    #[error("task {0} has no statement to check")]
    NoStatement(TaskId),
    /// No advisor is registered for the requested kind.
    #[error("no advisor registered for {0} checks")]
    UnregisteredCheck(CheckKind),
    /// Recording the check run failed.
    #[error(transparent)]
    Lifecycle(#[from] TaskLifecycleError),
}

/// Check-run gating engine.
///
/// Wraps the lifecycle service for check-run bookkeeping (sharing its
/// per-task serialization) and the advisor registry for dispatch. Cloneable
/// so dispatches can run as independent units of concurrency.
pub struct CheckGate<R, S, C>
where
    R: TaskRepository,
    S: ActivitySink,
    C: Clock + Send + Sync,
{
    lifecycle: Arc<TaskLifecycleService<R, S, C>>,
    advisors: Arc<AdvisorRegistry>,
    retry: RetryPolicy,
}

impl<R, S, C> Clone for CheckGate<R, S, C>
where
    R: TaskRepository,
    S: ActivitySink,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            lifecycle: Arc::clone(&self.lifecycle),
            advisors: Arc::clone(&self.advisors),
            retry: self.retry,
        }
    }
}

impl<R, S, C> CheckGate<R, S, C>
where
    R: TaskRepository,
    S: ActivitySink,
    C: Clock + Send + Sync,
{
    /// Creates a gating engine over the lifecycle service's registry.
    #[must_use]
    pub fn new(lifecycle: Arc<TaskLifecycleService<R, S, C>>, retry: RetryPolicy) -> Self {
        let advisors = lifecycle.advisors();
        Self {
            lifecycle,
            advisors,
            retry,
        }
    }

    /// The check kinds mandatory for a task type.
    #[must_use]
    pub fn required_for(&self, task_type: TaskType) -> Vec<CheckKind> {
        required_checks(&self.advisors, task_type)
    }

    /// Evaluates the gate for a task.
    #[must_use]
    pub fn evaluate(&self, task: &Task) -> GateDecision {
        evaluate_gate(task, &self.required_for(task.task_type()))
    }

    /// Mandatory check kinds that have never been dispatched for the task.
    ///
    /// Failed check runs are excluded: they block the gate until an
    /// explicit [`CheckGate::rerun_checks`].
    #[must_use]
    pub fn kinds_needing_dispatch(&self, task: &Task) -> Vec<CheckKind> {
        self.required_for(task.task_type())
            .into_iter()
            .filter(|kind| task.latest_check_run(*kind).is_none())
            .collect()
    }

    /// Dispatches one check: records a running check run, calls the
    /// advisor with bounded retry, and records the terminal result.
    ///
    /// Advisor failures after exhausted retries are captured as a `Failed`
    /// check run rather than returned, so a collaborator outage never
    /// propagates past the owning record.
    ///
    /// # Errors
    ///
    /// Returns [`CheckGateError`] when the task is unknown, carries no
    /// statement, has no advisor for the kind, or bookkeeping fails.
    pub async fn run_check(&self, task_id: TaskId, kind: CheckKind) -> Result<(), CheckGateError> {
        let task = self
            .lifecycle
            .find_task(&TaskFind::by_id(task_id))
            .await?
            .ok_or(CheckGateError::TaskNotFound(task_id))?;
        let statement = task
            .payload()
            .statement()
            .map(str::to_owned)
            .ok_or(CheckGateError::NoStatement(task_id))?;
        let context = AdvisorContext {
            charset: task.payload().character_set().map(str::to_owned),
            collation: task.payload().collation().map(str::to_owned),
        };
        let advisor = self
            .advisors
            .get(kind)
            .ok_or(CheckGateError::UnregisteredCheck(kind))?;

        self.lifecycle.record_check_started(task_id, kind).await?;
        let mut attempt = 1_u32;
        loop {
            match advisor.check(&statement, &context).await {
                Ok(advice) => {
                    self.lifecycle
                        .record_check_finished(task_id, kind, TaskCheckRunStatus::Done, advice)
                        .await?;
                    return Ok(());
                }
                Err(err) if attempt >= self.retry.max_attempts => {
                    tracing::warn!(
                        task_id = %task_id,
                        check = %kind,
                        error = %err,
                        attempts = attempt,
                        "advisor dispatch exhausted retries; marking check run failed"
                    );
                    self.lifecycle
                        .record_check_finished(
                            task_id,
                            kind,
                            TaskCheckRunStatus::Failed,
                            Vec::new(),
                        )
                        .await?;
                    return Ok(());
                }
                Err(err) => {
                    tracing::debug!(
                        task_id = %task_id,
                        check = %kind,
                        error = %err,
                        attempt,
                        "advisor dispatch failed; retrying"
                    );
                    tokio::time::sleep(self.retry.delay_after(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Re-dispatches every mandatory check that is not currently running.
    ///
    /// This is the explicit operator entry for re-validating a task, e.g.
    /// after amending its statement or after a check failed to run.
    ///
    /// # Errors
    ///
    /// Propagates [`CheckGateError`] from the underlying dispatches.
    pub async fn rerun_checks(&self, task_id: TaskId) -> Result<Vec<CheckKind>, CheckGateError> {
        let task = self
            .lifecycle
            .find_task(&TaskFind::by_id(task_id))
            .await?
            .ok_or(CheckGateError::TaskNotFound(task_id))?;
        let kinds: Vec<CheckKind> = self
            .required_for(task.task_type())
            .into_iter()
            .filter(|kind| {
                task.latest_check_run(*kind)
                    .is_none_or(|run| run.status().is_terminal())
            })
            .collect();
        for kind in &kinds {
            self.run_check(task_id, *kind).await?;
        }
        Ok(kinds)
    }
}
