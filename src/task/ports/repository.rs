//! Repository port for task persistence and lookup.

use crate::task::domain::{
    InstanceId, PayloadCodecError, PipelineId, StageId, Task, TaskId, TaskStatus,
};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type for task repository operations.
pub type TaskRepositoryResult<T> = Result<T, TaskRepositoryError>;

/// Filter for task lookup.
///
/// All set fields must match. Results are returned in creation (identifier)
/// order so pipeline replay is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskFind {
    /// Match a single task by identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<TaskId>,
    /// Match tasks belonging to a pipeline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<PipelineId>,
    /// Match tasks belonging to a stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<StageId>,
    /// Match tasks whose status is in the given set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statuses: Option<Vec<TaskStatus>>,
}

impl TaskFind {
    /// Matches every task.
    #[must_use]
    pub const fn any() -> Self {
        Self {
            id: None,
            pipeline_id: None,
            stage_id: None,
            statuses: None,
        }
    }

    /// Matches a single task by identifier.
    #[must_use]
    pub const fn by_id(id: TaskId) -> Self {
        Self {
            id: Some(id),
            pipeline_id: None,
            stage_id: None,
            statuses: None,
        }
    }

    /// Restricts matches to one pipeline.
    #[must_use]
    pub const fn with_pipeline(mut self, pipeline_id: PipelineId) -> Self {
        self.pipeline_id = Some(pipeline_id);
        self
    }

    /// Restricts matches to one stage.
    #[must_use]
    pub const fn with_stage(mut self, stage_id: StageId) -> Self {
        self.stage_id = Some(stage_id);
        self
    }

    /// Restricts matches to the given statuses.
    #[must_use]
    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = TaskStatus>) -> Self {
        self.statuses = Some(statuses.into_iter().collect());
        self
    }

    /// Whether the task satisfies every set field of the filter.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        self.id.is_none_or(|id| task.id() == id)
            && self.pipeline_id.is_none_or(|id| task.pipeline_id() == id)
            && self.stage_id.is_none_or(|id| task.stage_id() == id)
            && self
                .statuses
                .as_ref()
                .is_none_or(|statuses| statuses.contains(&task.status()))
    }
}

impl fmt::Display for TaskFind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered =
            serde_json::to_string(self).unwrap_or_else(|err| format!("unprintable filter: {err}"));
        f.write_str(&rendered)
    }
}

/// Task persistence contract.
///
/// Implementations assign identifiers, enforce uniqueness constraints, and
/// return tasks in creation order. All operations run under the caller's
/// cancellable async context.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Reserves the next task identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::Persistence`] when the underlying
    /// store fails.
    async fn allocate_id(&self) -> TaskRepositoryResult<TaskId>;

    /// Stores a new task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::DuplicateTask`] when the identifier is
    /// already taken and [`TaskRepositoryError::ConflictingDatabaseCreate`]
    /// when another active database-create task targets the same database
    /// name on the same instance.
    async fn insert(&self, task: &Task) -> TaskRepositoryResult<()>;

    /// Persists changes to an existing task (payload, scheduling, status,
    /// runs, check runs).
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::NotFound`] when the task does not
    /// exist.
    async fn update(&self, task: &Task) -> TaskRepositoryResult<()>;

    /// Returns every task matching the filter, in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::CorruptPayload`] when a stored
    /// payload cannot be decoded.
    async fn find(&self, find: &TaskFind) -> TaskRepositoryResult<Vec<Task>>;

    /// Returns the task matching the filter, or `None`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::AmbiguousResult`] when more than one
    /// task matches.
    async fn find_one(&self, find: &TaskFind) -> TaskRepositoryResult<Option<Task>>;
}

/// Errors returned by task repository implementations.
#[derive(Debug, Clone, Error)]
pub enum TaskRepositoryError {
    /// A task with the same identifier already exists.
    #[error("duplicate task identifier: {0}")]
    DuplicateTask(TaskId),

    /// The task was not found.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// Another active database-create task targets the same database.
    #[error(
        "an active database-create task for `{database_name}` on instance {instance_id} already exists"
    )]
    ConflictingDatabaseCreate {
        /// Target instance of the conflicting task.
        instance_id: InstanceId,
        /// Database name both tasks would create.
        database_name: String,
    },

    /// A single-result lookup matched more than one task.
    #[error("filter {0} matched more than one task")]
    AmbiguousResult(String),

    /// A stored payload could not be decoded.
    #[error(transparent)]
    CorruptPayload(#[from] PayloadCodecError),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
