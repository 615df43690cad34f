//! The polling scheduler engine.

use super::config::SchedulerConfig;
use super::messages::{
    CancelRequest, CompletionMessage, ExecutionOutcome, InFlightExecution, SchedulerCommand,
    SchedulerHandle,
};
use crate::pipeline::ports::{PipelineRepository, PipelineRepositoryError};
use crate::task::{
    domain::{CheckKind, PrincipalId, SYSTEM_BOT_ID, Task, TaskId, TaskStatus},
    ports::{ActivitySink, ExecutorRegistry, TaskFind, TaskRepository, cancellation_pair},
    services::{CheckGate, TaskLifecycleError, TaskLifecycleService, TaskStatusPatch},
};
use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

const COMMAND_BUFFER: usize = 64;
const COMPLETION_BUFFER: usize = 256;

/// Errors raised while advancing a single task.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A lifecycle operation failed.
    #[error(transparent)]
    Lifecycle(#[from] TaskLifecycleError),
    /// A pipeline lookup failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineRepositoryError),
}

/// Cooperative polling scheduler.
///
/// Each poll advances every `Pending` / `PendingApproval` task whose
/// preconditions hold: checks are dispatched for gated tasks, and eligible
/// tasks enter `Running` with their execution spawned as an independent
/// unit of concurrency. Completions and operator commands are applied
/// between polls; the loop itself never awaits a collaborator.
pub struct Scheduler<R, P, S, C>
where
    R: TaskRepository + 'static,
    P: PipelineRepository,
    S: ActivitySink + 'static,
    C: Clock + Send + Sync + 'static,
{
    lifecycle: Arc<TaskLifecycleService<R, S, C>>,
    gate: CheckGate<R, S, C>,
    executors: Arc<ExecutorRegistry>,
    pipelines: Arc<P>,
    clock: Arc<C>,
    config: SchedulerConfig,
    cancel_grace: TimeDelta,
    commands_tx: mpsc::Sender<SchedulerCommand>,
    commands_rx: mpsc::Receiver<SchedulerCommand>,
    completions_tx: mpsc::Sender<CompletionMessage>,
    pub(super) completions_rx: mpsc::Receiver<CompletionMessage>,
    in_flight: HashMap<TaskId, InFlightExecution>,
    dispatched_checks: HashSet<(TaskId, CheckKind)>,
}

impl<R, P, S, C> Scheduler<R, P, S, C>
where
    R: TaskRepository + 'static,
    P: PipelineRepository,
    S: ActivitySink + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a scheduler over the given services and registries.
    #[must_use]
    pub fn new(
        lifecycle: Arc<TaskLifecycleService<R, S, C>>,
        gate: CheckGate<R, S, C>,
        executors: Arc<ExecutorRegistry>,
        pipelines: Arc<P>,
        config: SchedulerConfig,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (completions_tx, completions_rx) = mpsc::channel(COMPLETION_BUFFER);
        let clock = lifecycle.clock();
        let cancel_grace = TimeDelta::from_std(config.cancel_grace).unwrap_or(TimeDelta::MAX);
        Self {
            lifecycle,
            gate,
            executors,
            pipelines,
            clock,
            config,
            cancel_grace,
            commands_tx,
            commands_rx,
            completions_tx,
            completions_rx,
            in_flight: HashMap::new(),
            dispatched_checks: HashSet::new(),
        }
    }

    /// Returns a cloneable command handle for this scheduler.
    #[must_use]
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle::new(self.commands_tx.clone())
    }

    /// Runs the scheduler loop until a shutdown command arrives.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.expire_cancellations().await;
                    self.tick().await;
                }
                Some(command) = self.commands_rx.recv() => match command {
                    SchedulerCommand::Shutdown => break,
                    SchedulerCommand::CancelTask { task_id, actor, comment } => {
                        self.handle_cancel(task_id, actor, comment).await;
                    }
                },
                Some(message) = self.completions_rx.recv() => {
                    self.apply_completion(message).await;
                }
            }
        }
    }

    /// One eligibility poll over all waiting tasks.
    pub(super) async fn tick(&mut self) {
        let find = TaskFind::any()
            .with_statuses([TaskStatus::Pending, TaskStatus::PendingApproval]);
        let tasks = match self.lifecycle.find_tasks(&find).await {
            Ok(tasks) => tasks,
            Err(err) => {
                tracing::warn!(error = %err, "eligibility poll failed");
                return;
            }
        };
        for task in tasks {
            if let Err(err) = self.advance(&task).await {
                tracing::warn!(task_id = %task.id(), error = %err, "failed to advance task");
            }
        }
    }

    /// Attempts one step of progress for a waiting task.
    async fn advance(&mut self, task: &Task) -> Result<(), SchedulerError> {
        match task.status() {
            TaskStatus::Pending => {
                let required = self.gate.required_for(task.task_type());
                if required.is_empty() || self.gate.evaluate(task).is_approved() {
                    self.try_start(task).await
                } else {
                    let patch =
                        TaskStatusPatch::new(task.id(), SYSTEM_BOT_ID, TaskStatus::PendingApproval);
                    let moved = self.lifecycle.patch_task_status(patch).await?;
                    self.dispatch_checks(&moved);
                    Ok(())
                }
            }
            TaskStatus::PendingApproval => {
                self.dispatch_checks(task);
                if self.gate.evaluate(task).is_approved() {
                    self.try_start(task).await
                } else {
                    Ok(())
                }
            }
            TaskStatus::Running
            | TaskStatus::Done
            | TaskStatus::Failed
            | TaskStatus::Canceled => Ok(()),
        }
    }

    /// Starts an eligible task and spawns its execution dispatch.
    ///
    /// Quietly skips tasks whose scheduling constraint, stage order, or
    /// gate no longer holds; the next poll re-evaluates them.
    async fn try_start(&mut self, task: &Task) -> Result<(), SchedulerError> {
        if self.in_flight.contains_key(&task.id()) {
            return Ok(());
        }
        if !task.earliest_allowed_reached(self.clock.utc()) {
            return Ok(());
        }
        if !self.stage_order_satisfied(task).await? {
            return Ok(());
        }
        let Some(executor) = self.executors.get(task.task_type()) else {
            tracing::warn!(
                task_id = %task.id(),
                task_type = %task.task_type(),
                "no executor registered; task left waiting"
            );
            return Ok(());
        };

        let patch = TaskStatusPatch::new(task.id(), SYSTEM_BOT_ID, TaskStatus::Running);
        let started = match self.lifecycle.patch_task_status(patch).await {
            Ok(started) => started,
            Err(TaskLifecycleError::TransitionBlocked { reason, .. }) => {
                tracing::debug!(task_id = %task.id(), reason, "start blocked; skipping");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let correlation = Uuid::new_v4();
        let (handle, signal) = cancellation_pair();
        self.in_flight.insert(
            started.id(),
            InFlightExecution {
                correlation,
                cancel: handle,
                cancel_requested: None,
            },
        );
        let completions = self.completions_tx.clone();
        let task_id = started.id();
        let _execution = tokio::spawn(async move {
            let outcome = match executor.execute(&started, signal).await {
                Ok(detail) => ExecutionOutcome::Success(detail),
                Err(err) => ExecutionOutcome::Failure(err.to_string()),
            };
            let message = CompletionMessage::Execution {
                task_id,
                correlation,
                outcome,
            };
            if completions.send(message).await.is_err() {
                tracing::debug!(
                    task_id = %task_id,
                    "scheduler stopped before execution completion was delivered"
                );
            }
        });
        Ok(())
    }

    /// Whether every task ordered before this one is terminal.
    ///
    /// Earlier stages must be fully terminal before a stage may begin;
    /// within its own stage the task waits for every earlier task unless it
    /// is explicitly marked independent. A failed task is not terminal and
    /// therefore halts its successors until an operator intervenes.
    async fn stage_order_satisfied(&self, task: &Task) -> Result<bool, SchedulerError> {
        let stages = self.pipelines.stages_of(task.pipeline_id()).await?;
        for stage in &stages {
            let stage_tasks = self
                .lifecycle
                .find_tasks(&TaskFind::any().with_stage(stage.id()))
                .await?;
            if stage.id() == task.stage_id() {
                if task.independent() {
                    return Ok(true);
                }
                let statuses: HashMap<TaskId, TaskStatus> = stage_tasks
                    .iter()
                    .map(|t| (t.id(), t.status()))
                    .collect();
                for task_id in stage.task_ids() {
                    if *task_id == task.id() {
                        break;
                    }
                    let terminal = statuses
                        .get(task_id)
                        .copied()
                        .is_some_and(TaskStatus::is_terminal);
                    if !terminal {
                        return Ok(false);
                    }
                }
                return Ok(true);
            }
            if stage_tasks.iter().any(|t| !t.status().is_terminal()) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Spawns dispatches for mandatory checks that never ran.
    fn dispatch_checks(&mut self, task: &Task) {
        for kind in self.gate.kinds_needing_dispatch(task) {
            if !self.dispatched_checks.insert((task.id(), kind)) {
                continue;
            }
            let gate = self.gate.clone();
            let completions = self.completions_tx.clone();
            let task_id = task.id();
            let _dispatch = tokio::spawn(async move {
                if let Err(err) = gate.run_check(task_id, kind).await {
                    tracing::warn!(
                        task_id = %task_id,
                        check = %kind,
                        error = %err,
                        "check dispatch failed"
                    );
                }
                let message = CompletionMessage::Check { task_id, kind };
                if completions.send(message).await.is_err() {
                    tracing::debug!(
                        task_id = %task_id,
                        "scheduler stopped before check completion was delivered"
                    );
                }
            });
        }
    }

    /// Applies a correlated completion message.
    pub(super) async fn apply_completion(&mut self, message: CompletionMessage) {
        match message {
            CompletionMessage::Check { task_id, kind } => {
                self.dispatched_checks.remove(&(task_id, kind));
            }
            CompletionMessage::Execution {
                task_id,
                correlation,
                outcome,
            } => {
                let current = self
                    .in_flight
                    .get(&task_id)
                    .is_some_and(|entry| entry.correlation == correlation);
                if !current {
                    tracing::debug!(task_id = %task_id, "dropping stale execution completion");
                    return;
                }
                let Some(entry) = self.in_flight.remove(&task_id) else {
                    return;
                };
                let patch = entry.cancel_requested.map_or_else(
                    || match outcome {
                        ExecutionOutcome::Success(detail) => {
                            TaskStatusPatch::new(task_id, SYSTEM_BOT_ID, TaskStatus::Done)
                                .with_result(detail)
                        }
                        ExecutionOutcome::Failure(detail) => {
                            TaskStatusPatch::new(task_id, SYSTEM_BOT_ID, TaskStatus::Failed)
                                .with_result(detail)
                        }
                    },
                    |request| {
                        // Completion while a cancel was pending counts as the
                        // collaborator acknowledging the abort.
                        let mut patch =
                            TaskStatusPatch::new(task_id, request.actor, TaskStatus::Canceled);
                        if let Some(text) = request.comment {
                            patch = patch.with_comment(text);
                        }
                        patch
                    },
                );
                if let Err(err) = self.lifecycle.patch_task_status(patch).await {
                    tracing::warn!(
                        task_id = %task_id,
                        error = %err,
                        "failed to record execution completion"
                    );
                }
            }
        }
    }

    /// Handles an operator cancellation command.
    pub(super) async fn handle_cancel(
        &mut self,
        task_id: TaskId,
        actor: PrincipalId,
        comment: Option<String>,
    ) {
        let task = match self.lifecycle.find_task(&TaskFind::by_id(task_id)).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                tracing::warn!(task_id = %task_id, "cancel requested for unknown task");
                return;
            }
            Err(err) => {
                tracing::warn!(task_id = %task_id, error = %err, "cancel lookup failed");
                return;
            }
        };

        if task.status() == TaskStatus::Running {
            if let Some(entry) = self.in_flight.get_mut(&task_id) {
                entry.cancel.cancel();
                entry.cancel_requested = Some(CancelRequest {
                    actor,
                    comment,
                    deadline: deadline_after(self.clock.utc(), self.cancel_grace),
                });
                return;
            }
        }

        let mut patch = TaskStatusPatch::new(task_id, actor, TaskStatus::Canceled);
        if let Some(text) = comment {
            patch = patch.with_comment(text);
        }
        if let Err(err) = self.lifecycle.patch_task_status(patch).await {
            tracing::warn!(task_id = %task_id, error = %err, "failed to cancel task");
        }
    }

    /// Finalizes cancellations whose acknowledgement deadline passed.
    ///
    /// The task is marked canceled with an abort-unconfirmed flag for
    /// operator review; a completion arriving later is dropped as stale.
    pub(super) async fn expire_cancellations(&mut self) {
        let now = self.clock.utc();
        let expired: Vec<TaskId> = self
            .in_flight
            .iter()
            .filter(|(_, entry)| {
                entry
                    .cancel_requested
                    .as_ref()
                    .is_some_and(|request| request.deadline <= now)
            })
            .map(|(task_id, _)| *task_id)
            .collect();
        for task_id in expired {
            let Some(entry) = self.in_flight.remove(&task_id) else {
                continue;
            };
            let Some(request) = entry.cancel_requested else {
                continue;
            };
            let mut patch = TaskStatusPatch::new(task_id, request.actor, TaskStatus::Canceled)
                .with_abort_unconfirmed();
            if let Some(text) = request.comment {
                patch = patch.with_comment(text);
            }
            if let Err(err) = self.lifecycle.patch_task_status(patch).await {
                tracing::warn!(
                    task_id = %task_id,
                    error = %err,
                    "failed to finalize unacknowledged cancellation"
                );
            }
        }
    }
}

/// Overflow-safe deadline computation.
fn deadline_after(now: DateTime<Utc>, grace: TimeDelta) -> DateTime<Utc> {
    now.checked_add_signed(grace).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
