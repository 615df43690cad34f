//! Tests for pipeline and stage records and their in-memory repository.

use std::sync::Arc;

use crate::pipeline::{
    adapters::InMemoryPipelineRepository,
    ports::{NewPipeline, NewStage, PipelineRepository, PipelineRepositoryError},
};
use crate::task::domain::{PipelineId, TaskId};
use eyre::{bail, ensure};
use mockable::DefaultClock;
use rstest::{fixture, rstest};

type TestRepository = InMemoryPipelineRepository<DefaultClock>;

#[fixture]
fn repository() -> TestRepository {
    InMemoryPipelineRepository::new(Arc::new(DefaultClock))
}

fn rollout() -> NewPipeline {
    NewPipeline::new(
        "sales schema rollout",
        vec![
            NewStage::new("staging", "staging"),
            NewStage::new("production", "prod"),
        ],
    )
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn create_preserves_declared_stage_order(repository: TestRepository) -> eyre::Result<()> {
    let pipeline = repository.create(rollout()).await?;

    ensure!(pipeline.name() == "sales schema rollout");
    ensure!(pipeline.stage_ids().len() == 2);

    let stages = repository.stages_of(pipeline.id()).await?;
    ensure!(stages.len() == 2);
    let names: Vec<&str> = stages.iter().map(|stage| stage.name()).collect();
    ensure!(names == vec!["staging", "production"]);
    for stage in &stages {
        ensure!(stage.pipeline_id() == pipeline.id());
        ensure!(stage.task_ids().is_empty());
    }
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn append_task_preserves_execution_order(repository: TestRepository) -> eyre::Result<()> {
    let pipeline = repository.create(rollout()).await?;
    let stages = repository.stages_of(pipeline.id()).await?;
    let Some(staging) = stages.first() else {
        bail!("missing staging stage");
    };

    repository.append_task(staging.id(), TaskId::new(11)).await?;
    repository.append_task(staging.id(), TaskId::new(12)).await?;
    repository.append_task(staging.id(), TaskId::new(13)).await?;

    let Some(reloaded) = repository.find_stage(staging.id()).await? else {
        bail!("stage disappeared");
    };
    ensure!(
        reloaded.task_ids() == [TaskId::new(11), TaskId::new(12), TaskId::new(13)]
    );
    ensure!(reloaded.position_of(TaskId::new(12)) == Some(1));
    ensure!(reloaded.position_of(TaskId::new(99)).is_none());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unknown_pipeline_is_reported(repository: TestRepository) -> eyre::Result<()> {
    let missing = repository.find_pipeline(PipelineId::new(404)).await?;
    ensure!(missing.is_none());

    let result = repository.stages_of(PipelineId::new(404)).await;
    ensure!(matches!(
        result,
        Err(PipelineRepositoryError::PipelineNotFound(_))
    ));
    Ok(())
}
