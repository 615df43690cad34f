//! Service layer for task creation, patching, and status transitions.
//!
//! [`TaskLifecycleService::patch_task_status`] is the sole entry point for
//! status changes: it absorbs idempotent re-requests, enforces the gate and
//! scheduling preconditions for entering `Running`, applies run side
//! effects, and emits one activity record per effective transition.

use super::gating::{GateDecision, evaluate_gate, required_checks};
use super::locks::TaskLockMap;
use crate::task::{
    domain::{
        Advice, CheckKind, DatabaseId, InstanceId, NewTask, PipelineId, PrincipalId, SYSTEM_BOT_ID,
        StageId, Task, TaskCheckRunStatus, TaskDomainError, TaskId, TaskPayload, TaskRunStatus,
        TaskStatus, TaskType,
    },
    ports::{
        Activity, ActivityLevel, ActivitySink, AdvisorRegistry, TaskFind, TaskRepository,
        TaskRepositoryError, TaskStatusUpdatePayload,
    },
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;

/// Request payload for creating a task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskCreateRequest {
    creator_id: PrincipalId,
    pipeline_id: PipelineId,
    stage_id: StageId,
    instance_id: InstanceId,
    database_id: Option<DatabaseId>,
    name: String,
    task_type: TaskType,
    payload: TaskPayload,
    earliest_allowed_at: Option<DateTime<Utc>>,
    independent: bool,
}

impl TaskCreateRequest {
    /// Creates a request with required fields.
    #[must_use]
    pub fn new(
        creator_id: PrincipalId,
        pipeline_id: PipelineId,
        stage_id: StageId,
        instance_id: InstanceId,
        name: impl Into<String>,
        task_type: TaskType,
        payload: TaskPayload,
    ) -> Self {
        Self {
            creator_id,
            pipeline_id,
            stage_id,
            instance_id,
            database_id: None,
            name: name.into(),
            task_type,
            payload,
            earliest_allowed_at: None,
            independent: false,
        }
    }

    /// Sets the target database.
    #[must_use]
    pub const fn with_database(mut self, database_id: DatabaseId) -> Self {
        self.database_id = Some(database_id);
        self
    }

    /// Defers execution until the given instant.
    #[must_use]
    pub const fn with_earliest_allowed_at(mut self, at: DateTime<Utc>) -> Self {
        self.earliest_allowed_at = Some(at);
        self
    }

    /// Opts the task out of intra-stage ordering.
    #[must_use]
    pub const fn independent(mut self) -> Self {
        self.independent = true;
        self
    }
}

/// Mutable-field patch for a task. Never changes status.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskPatch {
    /// Task to patch.
    pub task_id: TaskId,
    /// Principal performing the patch.
    pub updater_id: PrincipalId,
    /// Replacement statement for statement-bearing tasks.
    pub statement: Option<String>,
    /// New earliest allowed execution instant.
    pub earliest_allowed_at: Option<DateTime<Utc>>,
    /// Database resolved by a completed database-create task.
    pub database_id: Option<DatabaseId>,
}

impl TaskPatch {
    /// Creates an empty patch.
    #[must_use]
    pub const fn new(task_id: TaskId, updater_id: PrincipalId) -> Self {
        Self {
            task_id,
            updater_id,
            statement: None,
            earliest_allowed_at: None,
            database_id: None,
        }
    }

    /// Replaces the statement.
    #[must_use]
    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        self.statement = Some(statement.into());
        self
    }

    /// Reschedules the earliest allowed execution instant.
    #[must_use]
    pub const fn with_earliest_allowed_at(mut self, at: DateTime<Utc>) -> Self {
        self.earliest_allowed_at = Some(at);
        self
    }

    /// Resolves the created database.
    #[must_use]
    pub const fn with_database(mut self, database_id: DatabaseId) -> Self {
        self.database_id = Some(database_id);
        self
    }
}

/// Status transition request for a task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStatusPatch {
    /// Task to transition.
    pub task_id: TaskId,
    /// Principal requesting the transition.
    pub updater_id: PrincipalId,
    /// Requested target status.
    pub status: TaskStatus,
    /// Free-text comment for the audit trail.
    pub comment: Option<String>,
    /// Result detail recorded on the finishing run.
    pub result: Option<String>,
    /// Marks a cancellation whose abort was never acknowledged.
    pub abort_unconfirmed: bool,
}

impl TaskStatusPatch {
    /// Creates a transition request.
    #[must_use]
    pub const fn new(task_id: TaskId, updater_id: PrincipalId, status: TaskStatus) -> Self {
        Self {
            task_id,
            updater_id,
            status,
            comment: None,
            result: None,
            abort_unconfirmed: false,
        }
    }

    /// Attaches an audit comment.
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Attaches a run result detail.
    #[must_use]
    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    /// Flags the cancellation abort as unacknowledged.
    #[must_use]
    pub const fn with_abort_unconfirmed(mut self) -> Self {
        self.abort_unconfirmed = true;
        self
    }
}

/// Service-level errors for task lifecycle operations.
#[derive(Debug, Error)]
pub enum TaskLifecycleError {
    /// Domain validation or transition failure.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),
    /// Repository operation failure.
    #[error(transparent)]
    Repository(#[from] TaskRepositoryError),
    /// A precondition for entering `Running` is unmet.
    #[error("task {task_id} cannot run: {reason}")]
    TransitionBlocked {
        /// Task the transition was requested for.
        task_id: TaskId,
        /// Human-readable explanation of the unmet precondition.
        reason: String,
    },
}

/// Result type for task lifecycle service operations.
pub type TaskLifecycleResult<T> = Result<T, TaskLifecycleError>;

/// Task lifecycle orchestration service.
pub struct TaskLifecycleService<R, S, C>
where
    R: TaskRepository,
    S: ActivitySink,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    activity: Arc<S>,
    clock: Arc<C>,
    advisors: Arc<AdvisorRegistry>,
    locks: TaskLockMap,
}

impl<R, S, C> TaskLifecycleService<R, S, C>
where
    R: TaskRepository,
    S: ActivitySink,
    C: Clock + Send + Sync,
{
    /// Creates a new task lifecycle service.
    ///
    /// The advisor registry defines which checks gate `PendingApproval`
    /// departures; pass an empty registry when no checks are configured.
    #[must_use]
    pub fn new(
        repository: Arc<R>,
        activity: Arc<S>,
        clock: Arc<C>,
        advisors: Arc<AdvisorRegistry>,
    ) -> Self {
        Self {
            repository,
            activity,
            clock,
            advisors,
            locks: TaskLockMap::new(),
        }
    }

    /// Creates a task from a validated request and persists it.
    ///
    /// The initial status is `Pending`, or `PendingApproval` for types that
    /// require gating checks.
    ///
    /// # Errors
    ///
    /// Returns a domain error when payload validation fails (nothing is
    /// persisted) and a repository error on conflict.
    pub async fn create_task(&self, request: TaskCreateRequest) -> TaskLifecycleResult<Task> {
        let id = self.repository.allocate_id().await?;
        let task = Task::new(
            NewTask {
                id,
                creator_id: request.creator_id,
                pipeline_id: request.pipeline_id,
                stage_id: request.stage_id,
                instance_id: request.instance_id,
                database_id: request.database_id,
                name: request.name,
                task_type: request.task_type,
                payload: request.payload,
                earliest_allowed_at: request.earliest_allowed_at,
                independent: request.independent,
            },
            &*self.clock,
        )?;
        self.repository.insert(&task).await?;
        Ok(task)
    }

    /// Returns every task matching the filter, in creation order.
    ///
    /// # Errors
    ///
    /// Returns a repository error when the lookup fails.
    pub async fn find_tasks(&self, find: &TaskFind) -> TaskLifecycleResult<Vec<Task>> {
        Ok(self.repository.find(find).await?)
    }

    /// Returns the task matching the filter, or `None`.
    ///
    /// # Errors
    ///
    /// Returns a repository error when the lookup fails or matches more
    /// than one task.
    pub async fn find_task(&self, find: &TaskFind) -> TaskLifecycleResult<Option<Task>> {
        Ok(self.repository.find_one(find).await?)
    }

    /// Patches mutable task fields: statement, scheduling constraint, and
    /// the resolved database. Never status.
    ///
    /// Amending the statement of a `PendingApproval` task does not reset
    /// existing check results; re-validation happens only through an
    /// explicit check rerun.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::NotFound`] for unknown tasks and
    /// domain errors for invalid field changes.
    pub async fn patch_task(&self, patch: TaskPatch) -> TaskLifecycleResult<Task> {
        let _guard = self.locks.acquire(patch.task_id).await;
        let mut task = self.load(patch.task_id).await?;
        let clock = &*self.clock;
        if let Some(statement) = patch.statement {
            task.set_statement(statement, patch.updater_id, clock)?;
        }
        if let Some(at) = patch.earliest_allowed_at {
            task.set_earliest_allowed_at(at, patch.updater_id, clock);
        }
        if let Some(database_id) = patch.database_id {
            task.resolve_database(database_id, patch.updater_id, clock)?;
        }
        self.repository.update(&task).await?;
        Ok(task)
    }

    /// Applies a status transition; the sole status entry point.
    ///
    /// Re-requesting the current status is an idempotent no-op. Entering
    /// `Running` requires the scheduling constraint and the check gate to
    /// be satisfied, and spawns a new task run; entering `Done`, `Failed`,
    /// or `Canceled` finishes the active run. Every effective transition
    /// into `Running` or a terminal state emits one activity record.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] for illegal
    /// moves (state untouched), [`TaskLifecycleError::TransitionBlocked`]
    /// for unmet run preconditions, and repository errors on persistence
    /// failure.
    pub async fn patch_task_status(&self, patch: TaskStatusPatch) -> TaskLifecycleResult<Task> {
        let TaskStatusPatch {
            task_id,
            updater_id,
            status,
            comment,
            result,
            abort_unconfirmed,
        } = patch;
        let _guard = self.locks.acquire(task_id).await;
        let mut task = self.load(task_id).await?;
        let previous = task.status();
        if status == previous {
            return Ok(task);
        }
        if !previous.can_transition_to(status) {
            return Err(TaskDomainError::InvalidStateTransition {
                task_id: task.id(),
                from: previous,
                to: status,
            }
            .into());
        }
        if status == TaskStatus::Running {
            self.ensure_may_run(&task)?;
        }

        let clock = &*self.clock;
        task.apply_status(status, updater_id, clock)?;
        match status {
            TaskStatus::Running => task.start_run(updater_id, clock)?,
            TaskStatus::Done => {
                task.finish_run(TaskRunStatus::Done, result, updater_id, clock)?;
            }
            TaskStatus::Failed => {
                task.finish_run(TaskRunStatus::Failed, result, updater_id, clock)?;
            }
            TaskStatus::Canceled => {
                if task.active_run().is_some() {
                    task.cancel_run(!abort_unconfirmed, updater_id, clock)?;
                }
            }
            TaskStatus::Pending | TaskStatus::PendingApproval => {}
        }
        self.repository.update(&task).await?;
        self.emit_status_activity(&task, previous, status, updater_id, comment)
            .await;
        Ok(task)
    }

    /// Records the start of a check run; used by the gating engine.
    ///
    /// # Errors
    ///
    /// Returns a domain error when a check of the kind is already running.
    pub async fn record_check_started(
        &self,
        task_id: TaskId,
        kind: CheckKind,
    ) -> TaskLifecycleResult<Task> {
        let _guard = self.locks.acquire(task_id).await;
        let mut task = self.load(task_id).await?;
        task.begin_check_run(kind, SYSTEM_BOT_ID, &*self.clock)?;
        self.repository.update(&task).await?;
        Ok(task)
    }

    /// Records the completion of a check run; used by the gating engine.
    ///
    /// # Errors
    ///
    /// Returns a domain error when no check of the kind is running.
    pub async fn record_check_finished(
        &self,
        task_id: TaskId,
        kind: CheckKind,
        status: TaskCheckRunStatus,
        advice: Vec<Advice>,
    ) -> TaskLifecycleResult<Task> {
        let _guard = self.locks.acquire(task_id).await;
        let mut task = self.load(task_id).await?;
        task.finish_check_run(kind, status, advice, SYSTEM_BOT_ID, &*self.clock)?;
        self.repository.update(&task).await?;
        Ok(task)
    }

    /// Returns the advisor registry gating this service.
    #[must_use]
    pub fn advisors(&self) -> Arc<AdvisorRegistry> {
        Arc::clone(&self.advisors)
    }

    /// Returns the clock shared by this service.
    #[must_use]
    pub fn clock(&self) -> Arc<C> {
        Arc::clone(&self.clock)
    }

    async fn load(&self, task_id: TaskId) -> TaskLifecycleResult<Task> {
        self.find_task(&TaskFind::by_id(task_id))
            .await?
            .ok_or_else(|| TaskRepositoryError::NotFound(task_id).into())
    }

    fn ensure_may_run(&self, task: &Task) -> TaskLifecycleResult<()> {
        let now = self.clock.utc();
        if !task.earliest_allowed_reached(now) {
            let at = task
                .earliest_allowed_at()
                .map_or_else(String::new, |at| at.to_rfc3339());
            return Err(TaskLifecycleError::TransitionBlocked {
                task_id: task.id(),
                reason: format!("earliest allowed time {at} not reached"),
            });
        }
        let required = required_checks(&self.advisors, task.task_type());
        match evaluate_gate(task, &required) {
            GateDecision::Approved => Ok(()),
            GateDecision::Blocked { reason } => Err(TaskLifecycleError::TransitionBlocked {
                task_id: task.id(),
                reason,
            }),
        }
    }

    async fn emit_status_activity(
        &self,
        task: &Task,
        previous: TaskStatus,
        next: TaskStatus,
        actor: PrincipalId,
        comment: Option<String>,
    ) {
        let Some(level) = status_activity_level(next) else {
            return;
        };
        let record = Activity::status_update(
            actor,
            task.id(),
            level,
            &TaskStatusUpdatePayload {
                previous,
                next,
                comment,
            },
            &*self.clock,
        );
        if let Err(err) = self.activity.record(record).await {
            tracing::warn!(
                task_id = %task.id(),
                error = %err,
                "failed to record task status activity"
            );
        }
    }
}

/// Activity level for transitions worth an audit record.
///
/// Transitions between waiting states are not audited.
const fn status_activity_level(status: TaskStatus) -> Option<ActivityLevel> {
    match status {
        TaskStatus::Running | TaskStatus::Done => Some(ActivityLevel::Info),
        TaskStatus::Canceled => Some(ActivityLevel::Warn),
        TaskStatus::Failed => Some(ActivityLevel::Error),
        TaskStatus::Pending | TaskStatus::PendingApproval => None,
    }
}
