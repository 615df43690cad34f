//! Port contracts for task lifecycle management.
//!
//! Ports define infrastructure-agnostic interfaces used by task services:
//! persistence, advisor checks, execution dispatch, and the activity sink.

pub mod activity;
pub mod advisor;
pub mod executor;
pub mod repository;

pub use activity::{Activity, ActivityKind, ActivityLevel, ActivitySink, ActivitySinkError,
    ActivitySinkResult, TaskStatusUpdatePayload};
pub use advisor::{Advisor, AdvisorContext, AdvisorError, AdvisorRegistry,
    AdvisorRegistryBuilder, AdvisorRegistryError, AdvisorResult};
pub use executor::{CancelHandle, CancelSignal, ExecutorError, ExecutorRegistry,
    ExecutorRegistryBuilder, ExecutorRegistryError, ExecutorResult, TaskExecutor,
    cancellation_pair};
pub use repository::{TaskFind, TaskRepository, TaskRepositoryError, TaskRepositoryResult};
