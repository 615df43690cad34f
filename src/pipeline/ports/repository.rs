//! Repository port for pipeline and stage persistence.

use crate::pipeline::domain::{Pipeline, Stage};
use crate::task::domain::{PipelineId, StageId, TaskId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for pipeline repository operations.
pub type PipelineRepositoryResult<T> = Result<T, PipelineRepositoryError>;

/// Creation request for a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStage {
    /// Stage name.
    pub name: String,
    /// Environment label the stage targets.
    pub environment: String,
}

impl NewStage {
    /// Creates a stage request.
    #[must_use]
    pub fn new(name: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            environment: environment.into(),
        }
    }
}

/// Creation request for a pipeline with its stages in rollout order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPipeline {
    /// Pipeline name.
    pub name: String,
    /// Stages in rollout order.
    pub stages: Vec<NewStage>,
}

impl NewPipeline {
    /// Creates a pipeline request.
    #[must_use]
    pub fn new(name: impl Into<String>, stages: Vec<NewStage>) -> Self {
        Self {
            name: name.into(),
            stages,
        }
    }
}

/// Pipeline persistence contract.
#[async_trait]
pub trait PipelineRepository: Send + Sync {
    /// Creates a pipeline and its stages, assigning identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineRepositoryError::Persistence`] when the underlying
    /// store fails.
    async fn create(&self, new: NewPipeline) -> PipelineRepositoryResult<Pipeline>;

    /// Finds a pipeline by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineRepositoryError::Persistence`] when the underlying
    /// store fails.
    async fn find_pipeline(&self, id: PipelineId) -> PipelineRepositoryResult<Option<Pipeline>>;

    /// Finds a stage by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineRepositoryError::Persistence`] when the underlying
    /// store fails.
    async fn find_stage(&self, id: StageId) -> PipelineRepositoryResult<Option<Stage>>;

    /// Returns a pipeline's stages in rollout order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineRepositoryError::PipelineNotFound`] for unknown
    /// pipelines.
    async fn stages_of(&self, pipeline_id: PipelineId) -> PipelineRepositoryResult<Vec<Stage>>;

    /// Appends a task at the end of a stage's execution order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineRepositoryError::StageNotFound`] for unknown
    /// stages.
    async fn append_task(
        &self,
        stage_id: StageId,
        task_id: TaskId,
    ) -> PipelineRepositoryResult<()>;
}

/// Errors returned by pipeline repository implementations.
#[derive(Debug, Clone, Error)]
pub enum PipelineRepositoryError {
    /// The pipeline was not found.
    #[error("pipeline not found: {0}")]
    PipelineNotFound(PipelineId),

    /// The stage was not found.
    #[error("stage not found: {0}")]
    StageNotFound(StageId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl PipelineRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
