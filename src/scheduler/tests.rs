//! Scenario tests driving the scheduler one step at a time.

use std::sync::Arc;
use std::time::Duration;

use crate::pipeline::{
    adapters::InMemoryPipelineRepository,
    domain::Stage,
    ports::{NewPipeline, NewStage, PipelineRepository},
};
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::task::{
    adapters::memory::{InMemoryActivitySink, InMemoryTaskRepository},
    domain::{
        Advice, AdviceStatus, BackupId, BackupPayload, CheckKind, DatabaseId, GeneralPayload,
        InstanceId, PrincipalId, SchemaUpdatePayload, Task, TaskId, TaskPayload, TaskRunStatus,
        TaskStatus, TaskType,
    },
    ports::{
        Advisor, AdvisorContext, AdvisorRegistry, AdvisorResult, CancelSignal, ExecutorError,
        ExecutorRegistry, ExecutorResult, TaskExecutor, TaskFind,
    },
    services::{
        CheckGate, RetryPolicy, TaskCreateRequest, TaskLifecycleService, TaskStatusPatch,
    },
};
use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use eyre::{bail, ensure};
use mockable::DefaultClock;
use rstest::rstest;

const OPERATOR: PrincipalId = PrincipalId::new(101);

type TestService = TaskLifecycleService<InMemoryTaskRepository, InMemoryActivitySink, DefaultClock>;
type TestScheduler = Scheduler<
    InMemoryTaskRepository,
    InMemoryPipelineRepository<DefaultClock>,
    InMemoryActivitySink,
    DefaultClock,
>;

struct Harness {
    scheduler: TestScheduler,
    service: Arc<TestService>,
    pipelines: Arc<InMemoryPipelineRepository<DefaultClock>>,
}

/// Advisor double that always returns the same advice.
struct FixedAdvisor {
    advice: Vec<Advice>,
}

#[async_trait]
impl Advisor for FixedAdvisor {
    async fn check(
        &self,
        _statement: &str,
        _context: &AdvisorContext,
    ) -> AdvisorResult<Vec<Advice>> {
        Ok(self.advice.clone())
    }
}

/// Executor double that completes immediately with a fixed detail.
struct OkExecutor(&'static str);

#[async_trait]
impl TaskExecutor for OkExecutor {
    async fn execute(&self, _task: &Task, _cancel: CancelSignal) -> ExecutorResult<String> {
        Ok(self.0.to_owned())
    }
}

/// Executor double that fails immediately with a fixed detail.
struct FailExecutor(&'static str);

#[async_trait]
impl TaskExecutor for FailExecutor {
    async fn execute(&self, _task: &Task, _cancel: CancelSignal) -> ExecutorResult<String> {
        Err(ExecutorError::Failed(self.0.to_owned()))
    }
}

/// Executor double that runs until its cancellation signal fires.
struct WaitForCancelExecutor;

#[async_trait]
impl TaskExecutor for WaitForCancelExecutor {
    async fn execute(&self, _task: &Task, mut cancel: CancelSignal) -> ExecutorResult<String> {
        cancel.cancelled().await;
        Err(ExecutorError::Failed("aborted on request".to_owned()))
    }
}

/// Executor double that never completes and ignores cancellation.
struct NeverExecutor;

#[async_trait]
impl TaskExecutor for NeverExecutor {
    async fn execute(&self, _task: &Task, _cancel: CancelSignal) -> ExecutorResult<String> {
        std::future::pending().await
    }
}

fn syntax_registry(advice: Vec<Advice>) -> eyre::Result<AdvisorRegistry> {
    Ok(AdvisorRegistry::builder()
        .register(CheckKind::StatementSyntax, Arc::new(FixedAdvisor { advice }))
        .build()?)
}

fn build_harness(
    advisors: AdvisorRegistry,
    executors: ExecutorRegistry,
    cancel_grace: Duration,
) -> Harness {
    let clock = Arc::new(DefaultClock);
    let service = Arc::new(TaskLifecycleService::new(
        Arc::new(InMemoryTaskRepository::new()),
        Arc::new(InMemoryActivitySink::new()),
        Arc::clone(&clock),
        Arc::new(advisors),
    ));
    let gate = CheckGate::new(
        Arc::clone(&service),
        RetryPolicy {
            max_attempts: 2,
            backoff: Duration::from_millis(1),
        },
    );
    let pipelines = Arc::new(InMemoryPipelineRepository::new(clock));
    let config = SchedulerConfig {
        poll_interval: Duration::from_millis(20),
        cancel_grace,
    };
    let scheduler = Scheduler::new(
        Arc::clone(&service),
        gate,
        Arc::new(executors),
        Arc::clone(&pipelines),
        config,
    );
    Harness {
        scheduler,
        service,
        pipelines,
    }
}

async fn single_stage(harness: &Harness) -> eyre::Result<Stage> {
    let pipeline = harness
        .pipelines
        .create(NewPipeline::new(
            "rollout",
            vec![NewStage::new("production", "prod")],
        ))
        .await?;
    let stages = harness.pipelines.stages_of(pipeline.id()).await?;
    let Some(stage) = stages.into_iter().next() else {
        bail!("pipeline created without stages");
    };
    Ok(stage)
}

fn request_for(
    stage: &Stage,
    name: &str,
    task_type: TaskType,
    payload: TaskPayload,
) -> TaskCreateRequest {
    TaskCreateRequest::new(
        OPERATOR,
        stage.pipeline_id(),
        stage.id(),
        InstanceId::new(5),
        name,
        task_type,
        payload,
    )
    .with_database(DatabaseId::new(9))
}

fn general_payload() -> TaskPayload {
    TaskPayload::General(GeneralPayload::default())
}

fn schema_payload() -> TaskPayload {
    TaskPayload::SchemaUpdate(SchemaUpdatePayload {
        statement: "ALTER TABLE t ADD COLUMN c INT".to_owned(),
        migration_kind: None,
        schema_version: None,
        push_event: None,
    })
}

async fn add_task(
    harness: &Harness,
    stage: &Stage,
    request: TaskCreateRequest,
) -> eyre::Result<Task> {
    let task = harness.service.create_task(request).await?;
    harness.pipelines.append_task(stage.id(), task.id()).await?;
    Ok(task)
}

async fn reload(harness: &Harness, task_id: TaskId) -> eyre::Result<Task> {
    let Some(task) = harness.service.find_task(&TaskFind::by_id(task_id)).await? else {
        bail!("task {task_id} disappeared");
    };
    Ok(task)
}

/// Applies the next dispatch completion, failing the test on a stall.
async fn settle(scheduler: &mut TestScheduler) -> eyre::Result<()> {
    let received =
        tokio::time::timeout(Duration::from_secs(5), scheduler.completions_rx.recv()).await?;
    let Some(message) = received else {
        bail!("completion channel closed unexpectedly");
    };
    scheduler.apply_completion(message).await;
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn schema_update_flows_to_done_through_checks() -> eyre::Result<()> {
    let advisors = syntax_registry(vec![Advice::new(AdviceStatus::Success, "Syntax OK", "OK")])?;
    let executors = ExecutorRegistry::builder()
        .register(TaskType::SchemaUpdate, Arc::new(OkExecutor("applied")))
        .build()?;
    let mut harness = build_harness(advisors, executors, Duration::from_secs(30));
    let stage = single_stage(&harness).await?;
    let task = add_task(
        &harness,
        &stage,
        request_for(&stage, "add column c", TaskType::SchemaUpdate, schema_payload()),
    )
    .await?;
    ensure!(task.status() == TaskStatus::PendingApproval);

    harness.scheduler.tick().await;
    settle(&mut harness.scheduler).await?;

    let checked = reload(&harness, task.id()).await?;
    ensure!(checked.status() == TaskStatus::PendingApproval);
    let Some(check) = checked.latest_check_run(CheckKind::StatementSyntax) else {
        bail!("no check run dispatched");
    };
    ensure!(check.passed());

    harness.scheduler.tick().await;
    let running = reload(&harness, task.id()).await?;
    ensure!(running.status() == TaskStatus::Running);

    settle(&mut harness.scheduler).await?;
    let done = reload(&harness, task.id()).await?;
    ensure!(done.status() == TaskStatus::Done);
    ensure!(done.runs().len() == 1);
    let Some(run) = done.runs().first() else {
        bail!("missing task run");
    };
    ensure!(run.status() == TaskRunStatus::Done);
    ensure!(run.result() == Some("applied"));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn blocking_advice_keeps_the_task_waiting() -> eyre::Result<()> {
    let advisors = syntax_registry(vec![Advice::new(
        AdviceStatus::Error,
        "Syntax error",
        "unexpected token",
    )])?;
    let executors = ExecutorRegistry::builder()
        .register(TaskType::SchemaUpdate, Arc::new(OkExecutor("applied")))
        .build()?;
    let mut harness = build_harness(advisors, executors, Duration::from_secs(30));
    let stage = single_stage(&harness).await?;
    let task = add_task(
        &harness,
        &stage,
        request_for(&stage, "add column c", TaskType::SchemaUpdate, schema_payload()),
    )
    .await?;

    harness.scheduler.tick().await;
    settle(&mut harness.scheduler).await?;
    harness.scheduler.tick().await;

    let blocked = reload(&harness, task.id()).await?;
    ensure!(blocked.status() == TaskStatus::PendingApproval);
    ensure!(blocked.runs().is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stage_tasks_start_in_declared_order() -> eyre::Result<()> {
    let executors = ExecutorRegistry::builder()
        .register(TaskType::General, Arc::new(NeverExecutor))
        .build()?;
    let mut harness = build_harness(AdvisorRegistry::empty(), executors, Duration::from_secs(30));
    let stage = single_stage(&harness).await?;
    let first = add_task(
        &harness,
        &stage,
        request_for(&stage, "first", TaskType::General, general_payload()),
    )
    .await?;
    let second = add_task(
        &harness,
        &stage,
        request_for(&stage, "second", TaskType::General, general_payload()),
    )
    .await?;

    harness.scheduler.tick().await;

    ensure!(reload(&harness, first.id()).await?.status() == TaskStatus::Running);
    ensure!(reload(&harness, second.id()).await?.status() == TaskStatus::Pending);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn independent_tasks_start_concurrently() -> eyre::Result<()> {
    let executors = ExecutorRegistry::builder()
        .register(TaskType::General, Arc::new(NeverExecutor))
        .build()?;
    let mut harness = build_harness(AdvisorRegistry::empty(), executors, Duration::from_secs(30));
    let stage = single_stage(&harness).await?;
    let first = add_task(
        &harness,
        &stage,
        request_for(&stage, "first", TaskType::General, general_payload()),
    )
    .await?;
    let second = add_task(
        &harness,
        &stage,
        request_for(&stage, "second", TaskType::General, general_payload()).independent(),
    )
    .await?;

    harness.scheduler.tick().await;

    ensure!(reload(&harness, first.id()).await?.status() == TaskStatus::Running);
    ensure!(reload(&harness, second.id()).await?.status() == TaskStatus::Running);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_task_halts_the_following_stage() -> eyre::Result<()> {
    let executors = ExecutorRegistry::builder()
        .register(TaskType::General, Arc::new(FailExecutor("disk full")))
        .register(TaskType::Backup, Arc::new(OkExecutor("backed up")))
        .build()?;
    let mut harness = build_harness(AdvisorRegistry::empty(), executors, Duration::from_secs(30));
    let pipeline = harness
        .pipelines
        .create(NewPipeline::new(
            "rollout",
            vec![
                NewStage::new("staging", "staging"),
                NewStage::new("production", "prod"),
            ],
        ))
        .await?;
    let stages = harness.pipelines.stages_of(pipeline.id()).await?;
    let [staging, production] = stages.as_slice() else {
        bail!("expected two stages");
    };
    let doomed = add_task(
        &harness,
        staging,
        request_for(staging, "doomed", TaskType::General, general_payload()),
    )
    .await?;
    let backup = add_task(
        &harness,
        production,
        request_for(
            production,
            "nightly backup",
            TaskType::Backup,
            TaskPayload::Backup(BackupPayload {
                backup_id: BackupId::new(3),
            }),
        ),
    )
    .await?;

    harness.scheduler.tick().await;
    settle(&mut harness.scheduler).await?;
    let failed = reload(&harness, doomed.id()).await?;
    ensure!(failed.status() == TaskStatus::Failed);
    let Some(run) = failed.runs().first() else {
        bail!("missing task run");
    };
    ensure!(run.result() == Some("execution failed: disk full"));

    // The failed stage pins the next one in place.
    harness.scheduler.tick().await;
    ensure!(reload(&harness, backup.id()).await?.status() == TaskStatus::Pending);

    // Operator gives up on the change: retry to pending, then cancel.
    harness
        .service
        .patch_task_status(TaskStatusPatch::new(doomed.id(), OPERATOR, TaskStatus::Pending))
        .await?;
    harness
        .scheduler
        .handle_cancel(doomed.id(), OPERATOR, Some("abandoning change".to_owned()))
        .await;
    ensure!(reload(&harness, doomed.id()).await?.status() == TaskStatus::Canceled);

    harness.scheduler.tick().await;
    settle(&mut harness.scheduler).await?;
    ensure!(reload(&harness, backup.id()).await?.status() == TaskStatus::Done);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancel_running_task_waits_for_acknowledgement() -> eyre::Result<()> {
    let executors = ExecutorRegistry::builder()
        .register(TaskType::General, Arc::new(WaitForCancelExecutor))
        .build()?;
    let mut harness = build_harness(AdvisorRegistry::empty(), executors, Duration::from_secs(30));
    let stage = single_stage(&harness).await?;
    let task = add_task(
        &harness,
        &stage,
        request_for(&stage, "long migration", TaskType::General, general_payload()),
    )
    .await?;

    harness.scheduler.tick().await;
    ensure!(reload(&harness, task.id()).await?.status() == TaskStatus::Running);

    harness
        .scheduler
        .handle_cancel(task.id(), OPERATOR, Some("wrong window".to_owned()))
        .await;
    settle(&mut harness.scheduler).await?;

    let canceled = reload(&harness, task.id()).await?;
    ensure!(canceled.status() == TaskStatus::Canceled);
    ensure!(canceled.runs().len() == 1);
    let Some(run) = canceled.runs().first() else {
        bail!("missing task run");
    };
    ensure!(run.status() == TaskRunStatus::Canceled);
    ensure!(!run.abort_unconfirmed());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unacknowledged_cancel_expires_with_the_abort_flag() -> eyre::Result<()> {
    let executors = ExecutorRegistry::builder()
        .register(TaskType::General, Arc::new(NeverExecutor))
        .build()?;
    let mut harness = build_harness(AdvisorRegistry::empty(), executors, Duration::ZERO);
    let stage = single_stage(&harness).await?;
    let task = add_task(
        &harness,
        &stage,
        request_for(&stage, "stuck migration", TaskType::General, general_payload()),
    )
    .await?;

    harness.scheduler.tick().await;
    harness
        .scheduler
        .handle_cancel(task.id(), OPERATOR, None)
        .await;
    harness.scheduler.expire_cancellations().await;

    let canceled = reload(&harness, task.id()).await?;
    ensure!(canceled.status() == TaskStatus::Canceled);
    ensure!(canceled.runs().len() == 1);
    let Some(run) = canceled.runs().first() else {
        bail!("missing task run");
    };
    ensure!(run.status() == TaskRunStatus::Canceled);
    ensure!(run.abort_unconfirmed());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn scheduling_constraint_defers_the_start() -> eyre::Result<()> {
    let executors = ExecutorRegistry::builder()
        .register(TaskType::General, Arc::new(OkExecutor("done")))
        .build()?;
    let mut harness = build_harness(AdvisorRegistry::empty(), executors, Duration::from_secs(30));
    let stage = single_stage(&harness).await?;
    let task = add_task(
        &harness,
        &stage,
        request_for(&stage, "deferred", TaskType::General, general_payload())
            .with_earliest_allowed_at(Utc::now() + TimeDelta::hours(1)),
    )
    .await?;

    harness.scheduler.tick().await;

    let deferred = reload(&harness, task.id()).await?;
    ensure!(deferred.status() == TaskStatus::Pending);
    ensure!(deferred.runs().is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn shutdown_command_stops_the_run_loop() -> eyre::Result<()> {
    let executors = ExecutorRegistry::builder()
        .register(TaskType::General, Arc::new(OkExecutor("done")))
        .build()?;
    let harness = build_harness(AdvisorRegistry::empty(), executors, Duration::from_secs(30));
    let handle = harness.scheduler.handle();

    let loop_task = tokio::spawn(harness.scheduler.run());
    handle.shutdown().await?;
    tokio::time::timeout(Duration::from_secs(5), loop_task).await??;
    Ok(())
}
