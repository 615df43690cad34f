//! Activity sink port: audit trail for task transitions.

use crate::task::domain::{PrincipalId, TaskId, TaskStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Result type for activity recording.
pub type ActivitySinkResult<T> = Result<T, ActivitySinkError>;

/// Classification of an activity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// A task changed status.
    TaskStatusUpdate,
}

/// Severity of an activity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    /// Routine progress.
    Info,
    /// Needs operator attention.
    Warn,
    /// Something went wrong.
    Error,
}

/// Structured payload for [`ActivityKind::TaskStatusUpdate`] records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatusUpdatePayload {
    /// Status before the transition.
    pub previous: TaskStatus,
    /// Status after the transition.
    pub next: TaskStatus,
    /// Free-text comment supplied with the transition, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// One audit record describing who moved which task where.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Principal that caused the activity.
    pub actor: PrincipalId,
    /// Task the activity belongs to.
    pub task_id: TaskId,
    /// Activity classification.
    pub kind: ActivityKind,
    /// Severity.
    pub level: ActivityLevel,
    /// Kind-specific payload.
    pub payload: serde_json::Value,
    /// When the activity was recorded.
    pub created_at: DateTime<Utc>,
}

impl Activity {
    /// Builds a status-update activity record.
    ///
    /// An unserialisable payload degrades to JSON `null` rather than losing
    /// the record; the structured payload types used here always serialise.
    #[must_use]
    pub fn status_update(
        actor: PrincipalId,
        task_id: TaskId,
        level: ActivityLevel,
        payload: &TaskStatusUpdatePayload,
        clock: &impl Clock,
    ) -> Self {
        Self {
            actor,
            task_id,
            kind: ActivityKind::TaskStatusUpdate,
            level,
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
            created_at: clock.utc(),
        }
    }
}

/// Audit trail consumer.
///
/// Recording is fire-and-forget from the core's perspective, but creation
/// failure must be surfaced as a warning by callers, never dropped silently.
#[async_trait]
pub trait ActivitySink: Send + Sync {
    /// Records one activity.
    ///
    /// # Errors
    ///
    /// Returns [`ActivitySinkError`] when the record could not be stored.
    async fn record(&self, activity: Activity) -> ActivitySinkResult<()>;
}

/// Errors returned by activity sink implementations.
#[derive(Debug, Clone, Error)]
pub enum ActivitySinkError {
    /// The sink could not store the record.
    #[error("activity sink failure: {0}")]
    Unavailable(Arc<dyn std::error::Error + Send + Sync>),
}

impl ActivitySinkError {
    /// Wraps a sink failure.
    pub fn unavailable(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Unavailable(Arc::new(err))
    }
}
