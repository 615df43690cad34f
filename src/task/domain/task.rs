//! Task aggregate root and related lifecycle types.

use super::{
    Advice, CheckKind, DatabaseId, InstanceId, PayloadCodecError, PipelineId, PrincipalId, StageId,
    TaskCheckRun, TaskCheckRunStatus, TaskDomainError, TaskId, TaskPayload, TaskRun, TaskRunStatus,
    TaskStatus, TaskType, decode_payload, encode_payload,
};
use chrono::{DateTime, Utc};
use mockable::Clock;

/// Outcome of a status transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The status changed.
    Applied,
    /// The task was already in the requested status; nothing changed.
    AlreadyInState,
}

/// Parameter object for constructing a new task.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    /// Store-assigned task identifier.
    pub id: TaskId,
    /// Principal creating the task.
    pub creator_id: PrincipalId,
    /// Pipeline the task belongs to.
    pub pipeline_id: PipelineId,
    /// Stage within the pipeline.
    pub stage_id: StageId,
    /// Target database instance.
    pub instance_id: InstanceId,
    /// Target database; `None` only for database-create tasks.
    pub database_id: Option<DatabaseId>,
    /// Human-readable task name.
    pub name: String,
    /// Declared task type.
    pub task_type: TaskType,
    /// Type-specific payload.
    pub payload: TaskPayload,
    /// Execution must not begin before this instant, when set.
    pub earliest_allowed_at: Option<DateTime<Utc>>,
    /// Opts the task out of intra-stage ordering.
    pub independent: bool,
}

/// Parameter object for reconstructing a persisted task aggregate.
///
/// The payload is carried in its flat serialized form and decoded during
/// rehydration; a decode failure is a data-integrity fault.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedTaskData {
    /// Persisted task identifier.
    pub id: TaskId,
    /// Persisted creator.
    pub creator_id: PrincipalId,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted last updater.
    pub updater_id: PrincipalId,
    /// Persisted last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Persisted pipeline reference.
    pub pipeline_id: PipelineId,
    /// Persisted stage reference.
    pub stage_id: StageId,
    /// Persisted instance reference.
    pub instance_id: InstanceId,
    /// Persisted database reference, if resolved.
    pub database_id: Option<DatabaseId>,
    /// Persisted task name.
    pub name: String,
    /// Persisted task type.
    pub task_type: TaskType,
    /// Persisted lifecycle status.
    pub status: TaskStatus,
    /// Persisted payload in flat serialized form.
    pub payload: String,
    /// Persisted earliest allowed execution instant.
    pub earliest_allowed_at: Option<DateTime<Utc>>,
    /// Persisted intra-stage ordering opt-out.
    pub independent: bool,
    /// Persisted execution attempts, in chronological order.
    pub runs: Vec<TaskRun>,
    /// Persisted validation attempts.
    pub check_runs: Vec<TaskCheckRun>,
}

/// Task aggregate root: one unit of database change work.
///
/// The task owns its execution attempts ([`TaskRun`]) and validation
/// attempts ([`TaskCheckRun`]); both cascade with the task. Pipeline and
/// stage are referenced by identifier only, so the aggregate graph stays
/// acyclic.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    id: TaskId,
    creator_id: PrincipalId,
    created_at: DateTime<Utc>,
    updater_id: PrincipalId,
    updated_at: DateTime<Utc>,
    pipeline_id: PipelineId,
    stage_id: StageId,
    instance_id: InstanceId,
    database_id: Option<DatabaseId>,
    name: String,
    task_type: TaskType,
    status: TaskStatus,
    payload: TaskPayload,
    earliest_allowed_at: Option<DateTime<Utc>>,
    independent: bool,
    runs: Vec<TaskRun>,
    check_runs: Vec<TaskCheckRun>,
}

impl Task {
    /// Creates a new task.
    ///
    /// The initial status is `Pending`, or `PendingApproval` when the task
    /// type requires gating checks. Tasks must reference their target
    /// database unless the task itself will create it: database-create
    /// tasks never carry one at creation, and restore tasks may instead
    /// name a database that does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns a payload validation error when the payload does not match
    /// the declared type or a required field is missing, and a database
    /// reference error when the database requirement above is violated.
    pub fn new(data: NewTask, clock: &impl Clock) -> Result<Self, TaskDomainError> {
        if data.payload.task_type() != data.task_type {
            return Err(PayloadCodecError::Mismatch {
                expected: data.task_type,
                actual: data.payload.task_type(),
            }
            .into());
        }
        data.payload.validate().map_err(TaskDomainError::from)?;
        match (data.task_type, data.database_id) {
            (TaskType::DatabaseCreate, Some(_)) => return Err(TaskDomainError::UnexpectedDatabase),
            (TaskType::DatabaseCreate, None) | (_, Some(_)) => {}
            (TaskType::Restore, None) => {
                let names_new_database = match &data.payload {
                    TaskPayload::Restore(payload) => payload
                        .database_name
                        .as_deref()
                        .is_some_and(|name| !name.trim().is_empty()),
                    _ => false,
                };
                if !names_new_database {
                    return Err(TaskDomainError::MissingDatabase(TaskType::Restore));
                }
            }
            (other, None) => return Err(TaskDomainError::MissingDatabase(other)),
        }

        let timestamp = clock.utc();
        let status = if data.task_type.requires_checks() {
            TaskStatus::PendingApproval
        } else {
            TaskStatus::Pending
        };
        Ok(Self {
            id: data.id,
            creator_id: data.creator_id,
            created_at: timestamp,
            updater_id: data.creator_id,
            updated_at: timestamp,
            pipeline_id: data.pipeline_id,
            stage_id: data.stage_id,
            instance_id: data.instance_id,
            database_id: data.database_id,
            name: data.name,
            task_type: data.task_type,
            status,
            payload: data.payload,
            earliest_allowed_at: data.earliest_allowed_at,
            independent: data.independent,
            runs: Vec::new(),
            check_runs: Vec::new(),
        })
    }

    /// Reconstructs a task from persisted storage, decoding the payload.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadCodecError::Corrupt`] when the stored payload cannot
    /// be parsed into the shape implied by the persisted task type.
    pub fn from_persisted(data: PersistedTaskData) -> Result<Self, PayloadCodecError> {
        let payload = decode_payload(data.task_type, &data.payload)?;
        Ok(Self {
            id: data.id,
            creator_id: data.creator_id,
            created_at: data.created_at,
            updater_id: data.updater_id,
            updated_at: data.updated_at,
            pipeline_id: data.pipeline_id,
            stage_id: data.stage_id,
            instance_id: data.instance_id,
            database_id: data.database_id,
            name: data.name,
            task_type: data.task_type,
            status: data.status,
            payload,
            earliest_allowed_at: data.earliest_allowed_at,
            independent: data.independent,
            runs: data.runs,
            check_runs: data.check_runs,
        })
    }

    /// Converts the task into its persistable form, encoding the payload.
    ///
    /// # Errors
    ///
    /// Returns a codec error when the payload cannot be serialized.
    pub fn to_persisted(&self) -> Result<PersistedTaskData, PayloadCodecError> {
        Ok(PersistedTaskData {
            id: self.id,
            creator_id: self.creator_id,
            created_at: self.created_at,
            updater_id: self.updater_id,
            updated_at: self.updated_at,
            pipeline_id: self.pipeline_id,
            stage_id: self.stage_id,
            instance_id: self.instance_id,
            database_id: self.database_id,
            name: self.name.clone(),
            task_type: self.task_type,
            status: self.status,
            payload: encode_payload(&self.payload)?,
            earliest_allowed_at: self.earliest_allowed_at,
            independent: self.independent,
            runs: self.runs.clone(),
            check_runs: self.check_runs.clone(),
        })
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the creating principal.
    #[must_use]
    pub const fn creator_id(&self) -> PrincipalId {
        self.creator_id
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the principal of the latest mutation.
    #[must_use]
    pub const fn updater_id(&self) -> PrincipalId {
        self.updater_id
    }

    /// Returns the latest mutation timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the owning pipeline.
    #[must_use]
    pub const fn pipeline_id(&self) -> PipelineId {
        self.pipeline_id
    }

    /// Returns the owning stage.
    #[must_use]
    pub const fn stage_id(&self) -> StageId {
        self.stage_id
    }

    /// Returns the target instance.
    #[must_use]
    pub const fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    /// Returns the target database, absent only while a database-create
    /// task has not yet completed successfully.
    #[must_use]
    pub const fn database_id(&self) -> Option<DatabaseId> {
        self.database_id
    }

    /// Returns the task name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the task type.
    #[must_use]
    pub const fn task_type(&self) -> TaskType {
        self.task_type
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    /// Returns the typed payload.
    #[must_use]
    pub const fn payload(&self) -> &TaskPayload {
        &self.payload
    }

    /// Returns the earliest allowed execution instant, when set.
    #[must_use]
    pub const fn earliest_allowed_at(&self) -> Option<DateTime<Utc>> {
        self.earliest_allowed_at
    }

    /// Whether the task opts out of intra-stage ordering.
    #[must_use]
    pub const fn independent(&self) -> bool {
        self.independent
    }

    /// Returns execution attempts in chronological order.
    #[must_use]
    pub fn runs(&self) -> &[TaskRun] {
        &self.runs
    }

    /// Returns validation attempts in dispatch order.
    #[must_use]
    pub fn check_runs(&self) -> &[TaskCheckRun] {
        &self.check_runs
    }

    /// Returns the non-terminal execution attempt, if one is in flight.
    #[must_use]
    pub fn active_run(&self) -> Option<&TaskRun> {
        self.runs.iter().find(|run| run.is_active())
    }

    /// Returns the most recent validation attempt of the given kind.
    #[must_use]
    pub fn latest_check_run(&self, kind: CheckKind) -> Option<&TaskCheckRun> {
        self.check_runs.iter().rev().find(|run| run.kind() == kind)
    }

    /// Applies a status transition.
    ///
    /// Requesting the current status is an idempotent no-op. Preconditions
    /// that depend on wall-clock or check results are the lifecycle
    /// service's responsibility; this method enforces only the shape of the
    /// state machine.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] when the move is
    /// illegal; the task is left untouched.
    pub fn apply_status(
        &mut self,
        to: TaskStatus,
        actor: PrincipalId,
        clock: &impl Clock,
    ) -> Result<TransitionOutcome, TaskDomainError> {
        if to == self.status {
            return Ok(TransitionOutcome::AlreadyInState);
        }
        if !self.status.can_transition_to(to) {
            return Err(TaskDomainError::InvalidStateTransition {
                task_id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.touch(actor, clock);
        Ok(TransitionOutcome::Applied)
    }

    /// Starts a new execution attempt.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::RunAlreadyActive`] when an attempt is
    /// still in flight.
    pub fn start_run(
        &mut self,
        actor: PrincipalId,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        if self.active_run().is_some() {
            return Err(TaskDomainError::RunAlreadyActive(self.id));
        }
        self.runs.push(TaskRun::started(clock));
        self.touch(actor, clock);
        Ok(())
    }

    /// Finishes the active execution attempt with a terminal status.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::NoActiveRun`] when no attempt is in
    /// flight and [`TaskDomainError::NonTerminalRunStatus`] when the given
    /// status is not terminal.
    pub fn finish_run(
        &mut self,
        status: TaskRunStatus,
        result: Option<String>,
        actor: PrincipalId,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        if !status.is_terminal() {
            return Err(TaskDomainError::NonTerminalRunStatus(status));
        }
        let task_id = self.id;
        let run = self
            .runs
            .iter_mut()
            .find(|run| run.is_active())
            .ok_or(TaskDomainError::NoActiveRun(task_id))?;
        run.finish(status, result, clock);
        self.touch(actor, clock);
        Ok(())
    }

    /// Cancels the active execution attempt.
    ///
    /// `confirmed` records whether the execution collaborator acknowledged
    /// the abort before a bounded timeout elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::NoActiveRun`] when no attempt is in
    /// flight.
    pub fn cancel_run(
        &mut self,
        confirmed: bool,
        actor: PrincipalId,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        let task_id = self.id;
        let run = self
            .runs
            .iter_mut()
            .find(|run| run.is_active())
            .ok_or(TaskDomainError::NoActiveRun(task_id))?;
        run.cancel(confirmed, clock);
        self.touch(actor, clock);
        Ok(())
    }

    /// Starts a validation attempt of the given kind.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::CheckAlreadyRunning`] when an attempt of
    /// the same kind is still in flight.
    pub fn begin_check_run(
        &mut self,
        kind: CheckKind,
        actor: PrincipalId,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        if self
            .latest_check_run(kind)
            .is_some_and(|run| !run.status().is_terminal())
        {
            return Err(TaskDomainError::CheckAlreadyRunning {
                task_id: self.id,
                kind,
            });
        }
        self.check_runs.push(TaskCheckRun::started(kind, clock));
        self.touch(actor, clock);
        Ok(())
    }

    /// Finishes the running validation attempt of the given kind.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::NoRunningCheck`] when no attempt of the
    /// kind is in flight and [`TaskDomainError::NonTerminalCheckStatus`]
    /// when the given status is not terminal.
    pub fn finish_check_run(
        &mut self,
        kind: CheckKind,
        status: TaskCheckRunStatus,
        advice: Vec<Advice>,
        actor: PrincipalId,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        if !status.is_terminal() {
            return Err(TaskDomainError::NonTerminalCheckStatus(status));
        }
        let task_id = self.id;
        let run = self
            .check_runs
            .iter_mut()
            .rev()
            .find(|run| run.kind() == kind && !run.status().is_terminal())
            .ok_or(TaskDomainError::NoRunningCheck { task_id, kind })?;
        run.finish(status, advice, clock);
        self.touch(actor, clock);
        Ok(())
    }

    /// Records the database created by a successful database-create task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::DatabaseAlreadyResolved`] when the task
    /// already references a database.
    pub fn resolve_database(
        &mut self,
        database_id: DatabaseId,
        actor: PrincipalId,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        if self.database_id.is_some() {
            return Err(TaskDomainError::DatabaseAlreadyResolved(self.id));
        }
        self.database_id = Some(database_id);
        self.touch(actor, clock);
        Ok(())
    }

    /// Replaces the statement on a statement-bearing task.
    ///
    /// Amending the statement does not reset existing check results; the
    /// approver-visible gate only changes through an explicit check rerun.
    ///
    /// # Errors
    ///
    /// Propagates payload errors for blank statements or unsupported types.
    pub fn set_statement(
        &mut self,
        statement: String,
        actor: PrincipalId,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        self.payload.set_statement(statement)?;
        self.touch(actor, clock);
        Ok(())
    }

    /// Reschedules the earliest allowed execution instant.
    pub fn set_earliest_allowed_at(
        &mut self,
        earliest_allowed_at: DateTime<Utc>,
        actor: PrincipalId,
        clock: &impl Clock,
    ) {
        self.earliest_allowed_at = Some(earliest_allowed_at);
        self.touch(actor, clock);
    }

    /// Whether the task may begin executing at `now` with respect to its
    /// scheduling constraint.
    #[must_use]
    pub fn earliest_allowed_reached(&self, now: DateTime<Utc>) -> bool {
        self.earliest_allowed_at.is_none_or(|at| now >= at)
    }

    /// Updates the audit trail for the latest mutation.
    fn touch(&mut self, actor: PrincipalId, clock: &impl Clock) {
        self.updater_id = actor;
        self.updated_at = clock.utc();
    }
}
