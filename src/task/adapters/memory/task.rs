//! In-memory task repository.
//!
//! Stores tasks in their persisted form (payload encoded flat), decoding on
//! read, so the codec path matches what a persistent store would exercise.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, RwLock};

use crate::task::{
    domain::{PersistedTaskData, Task, TaskId, TaskPayload, TaskType, decode_payload},
    ports::{TaskFind, TaskRepository, TaskRepositoryError, TaskRepositoryResult},
};

/// Thread-safe in-memory task repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskRepository {
    state: Arc<InMemoryTaskState>,
}

#[derive(Debug, Default)]
struct InMemoryTaskState {
    records: RwLock<BTreeMap<TaskId, PersistedTaskData>>,
    next_id: AtomicI32,
}

impl InMemoryTaskRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Database name an active database-create record would create, if any.
fn create_target(record: &PersistedTaskData) -> Option<String> {
    if record.task_type != TaskType::DatabaseCreate || record.status.is_terminal() {
        return None;
    }
    match decode_payload(record.task_type, &record.payload) {
        Ok(TaskPayload::DatabaseCreate(payload)) => Some(payload.database_name),
        Ok(_) | Err(_) => None,
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn allocate_id(&self) -> TaskRepositoryResult<TaskId> {
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TaskId::new(id))
    }

    async fn insert(&self, task: &Task) -> TaskRepositoryResult<()> {
        let record = task.to_persisted()?;
        let mut records = self.state.records.write().map_err(|err| {
            TaskRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        if records.contains_key(&task.id()) {
            return Err(TaskRepositoryError::DuplicateTask(task.id()));
        }
        if let TaskPayload::DatabaseCreate(payload) = task.payload() {
            let conflict = records.values().any(|existing| {
                existing.instance_id == task.instance_id()
                    && create_target(existing).as_deref() == Some(payload.database_name.as_str())
            });
            if conflict {
                return Err(TaskRepositoryError::ConflictingDatabaseCreate {
                    instance_id: task.instance_id(),
                    database_name: payload.database_name.clone(),
                });
            }
        }
        records.insert(task.id(), record);
        Ok(())
    }

    async fn update(&self, task: &Task) -> TaskRepositoryResult<()> {
        let record = task.to_persisted()?;
        let mut records = self.state.records.write().map_err(|err| {
            TaskRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        if !records.contains_key(&task.id()) {
            return Err(TaskRepositoryError::NotFound(task.id()));
        }
        records.insert(task.id(), record);
        Ok(())
    }

    async fn find(&self, find: &TaskFind) -> TaskRepositoryResult<Vec<Task>> {
        let records = self.state.records.read().map_err(|err| {
            TaskRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        let mut tasks = Vec::new();
        for record in records.values() {
            let task = Task::from_persisted(record.clone())?;
            if find.matches(&task) {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    async fn find_one(&self, find: &TaskFind) -> TaskRepositoryResult<Option<Task>> {
        let mut tasks = self.find(find).await?;
        if tasks.len() > 1 {
            return Err(TaskRepositoryError::AmbiguousResult(find.to_string()));
        }
        Ok(tasks.pop())
    }
}
