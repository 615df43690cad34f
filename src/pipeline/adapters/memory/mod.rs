//! In-memory pipeline repository.

use async_trait::async_trait;
use mockable::Clock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, RwLock};

use crate::pipeline::{
    domain::{Pipeline, Stage},
    ports::{NewPipeline, PipelineRepository, PipelineRepositoryError, PipelineRepositoryResult},
};
use crate::task::domain::{PipelineId, StageId, TaskId};

/// Thread-safe in-memory pipeline repository.
#[derive(Debug)]
pub struct InMemoryPipelineRepository<C>
where
    C: Clock + Send + Sync,
{
    clock: Arc<C>,
    state: Arc<InMemoryPipelineState>,
}

#[derive(Debug, Default)]
struct InMemoryPipelineState {
    pipelines: RwLock<BTreeMap<PipelineId, Pipeline>>,
    stages: RwLock<BTreeMap<StageId, Stage>>,
    next_pipeline_id: AtomicI32,
    next_stage_id: AtomicI32,
}

impl<C> Clone for InMemoryPipelineRepository<C>
where
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            clock: Arc::clone(&self.clock),
            state: Arc::clone(&self.state),
        }
    }
}

impl<C> InMemoryPipelineRepository<C>
where
    C: Clock + Send + Sync,
{
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new(clock: Arc<C>) -> Self {
        Self {
            clock,
            state: Arc::new(InMemoryPipelineState::default()),
        }
    }
}

#[async_trait]
impl<C> PipelineRepository for InMemoryPipelineRepository<C>
where
    C: Clock + Send + Sync,
{
    async fn create(&self, new: NewPipeline) -> PipelineRepositoryResult<Pipeline> {
        let pipeline_id =
            PipelineId::new(self.state.next_pipeline_id.fetch_add(1, Ordering::SeqCst) + 1);
        let mut stage_ids = Vec::with_capacity(new.stages.len());
        let mut stages = self.state.stages.write().map_err(|err| {
            PipelineRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        for new_stage in new.stages {
            let stage_id =
                StageId::new(self.state.next_stage_id.fetch_add(1, Ordering::SeqCst) + 1);
            stages.insert(
                stage_id,
                Stage::new(stage_id, pipeline_id, new_stage.name, new_stage.environment),
            );
            stage_ids.push(stage_id);
        }
        drop(stages);

        let pipeline = Pipeline::new(pipeline_id, new.name, stage_ids, self.clock.utc());
        let mut pipelines = self.state.pipelines.write().map_err(|err| {
            PipelineRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        pipelines.insert(pipeline_id, pipeline.clone());
        Ok(pipeline)
    }

    async fn find_pipeline(&self, id: PipelineId) -> PipelineRepositoryResult<Option<Pipeline>> {
        let pipelines = self.state.pipelines.read().map_err(|err| {
            PipelineRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        Ok(pipelines.get(&id).cloned())
    }

    async fn find_stage(&self, id: StageId) -> PipelineRepositoryResult<Option<Stage>> {
        let stages = self.state.stages.read().map_err(|err| {
            PipelineRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        Ok(stages.get(&id).cloned())
    }

    async fn stages_of(&self, pipeline_id: PipelineId) -> PipelineRepositoryResult<Vec<Stage>> {
        let pipelines = self.state.pipelines.read().map_err(|err| {
            PipelineRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        let pipeline = pipelines
            .get(&pipeline_id)
            .ok_or(PipelineRepositoryError::PipelineNotFound(pipeline_id))?;
        let stages = self.state.stages.read().map_err(|err| {
            PipelineRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        let mut ordered = Vec::with_capacity(pipeline.stage_ids().len());
        for stage_id in pipeline.stage_ids() {
            let stage = stages
                .get(stage_id)
                .ok_or(PipelineRepositoryError::StageNotFound(*stage_id))?;
            ordered.push(stage.clone());
        }
        Ok(ordered)
    }

    async fn append_task(
        &self,
        stage_id: StageId,
        task_id: TaskId,
    ) -> PipelineRepositoryResult<()> {
        let mut stages = self.state.stages.write().map_err(|err| {
            PipelineRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        let stage = stages
            .get_mut(&stage_id)
            .ok_or(PipelineRepositoryError::StageNotFound(stage_id))?;
        stage.push_task(task_id);
        Ok(())
    }
}
