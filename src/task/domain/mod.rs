//! Domain model for task lifecycle management.
//!
//! The task domain models typed change payloads, the status state machine,
//! execution attempts (task runs), and pre-flight validation attempts (task
//! check runs) while keeping all infrastructure concerns outside of the
//! domain boundary.

mod check;
mod error;
mod ids;
mod payload;
mod run;
mod status;
mod task;

pub use check::{Advice, AdviceStatus, CheckKind, TaskCheckRun};
pub use error::{ParseTaskStatusError, ParseTaskTypeError, PayloadCodecError, TaskDomainError};
pub use ids::{
    BackupId, DatabaseId, InstanceId, PipelineId, PrincipalId, ProjectId, SYSTEM_BOT_ID, StageId,
    TaskId,
};
pub use payload::{
    BackupPayload, DataUpdatePayload, DatabaseCreatePayload, GeneralPayload, MigrationKind,
    RestorePayload, SchemaUpdatePayload, TaskPayload, TaskType, decode_payload, encode_payload,
};
pub use run::TaskRun;
pub use status::{TaskCheckRunStatus, TaskRunStatus, TaskStatus};
pub use task::{NewTask, PersistedTaskData, Task, TransitionOutcome};
