//! Pipeline and stage records.

use crate::task::domain::{PipelineId, StageId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An end-to-end change rollout: an ordered sequence of stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    id: PipelineId,
    name: String,
    stage_ids: Vec<StageId>,
    created_at: DateTime<Utc>,
}

impl Pipeline {
    /// Creates a pipeline record with its stages in rollout order.
    #[must_use]
    pub const fn new(
        id: PipelineId,
        name: String,
        stage_ids: Vec<StageId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            stage_ids,
            created_at,
        }
    }

    /// Returns the pipeline identifier.
    #[must_use]
    pub const fn id(&self) -> PipelineId {
        self.id
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stage identifiers in rollout order.
    #[must_use]
    pub fn stage_ids(&self) -> &[StageId] {
        &self.stage_ids
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// An ordered sequence of tasks within a pipeline, typically scoped to one
/// environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    id: StageId,
    pipeline_id: PipelineId,
    name: String,
    environment: String,
    task_ids: Vec<TaskId>,
}

impl Stage {
    /// Creates a stage record.
    #[must_use]
    pub const fn new(
        id: StageId,
        pipeline_id: PipelineId,
        name: String,
        environment: String,
    ) -> Self {
        Self {
            id,
            pipeline_id,
            name,
            environment,
            task_ids: Vec::new(),
        }
    }

    /// Returns the stage identifier.
    #[must_use]
    pub const fn id(&self) -> StageId {
        self.id
    }

    /// Returns the owning pipeline.
    #[must_use]
    pub const fn pipeline_id(&self) -> PipelineId {
        self.pipeline_id
    }

    /// Returns the stage name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the environment label the stage targets.
    #[must_use]
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Returns the task identifiers in declared execution order.
    #[must_use]
    pub fn task_ids(&self) -> &[TaskId] {
        &self.task_ids
    }

    /// Appends a task at the end of the execution order.
    pub fn push_task(&mut self, task_id: TaskId) {
        self.task_ids.push(task_id);
    }

    /// Position of a task in the declared execution order.
    #[must_use]
    pub fn position_of(&self, task_id: TaskId) -> Option<usize> {
        self.task_ids.iter().position(|id| *id == task_id)
    }
}
