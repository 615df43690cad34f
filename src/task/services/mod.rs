//! Application services for task lifecycle orchestration.

mod gating;
mod lifecycle;
mod locks;

pub use gating::{
    CheckGate, CheckGateError, GateDecision, RetryPolicy, evaluate_gate, required_checks,
};
pub use lifecycle::{
    TaskCreateRequest, TaskLifecycleError, TaskLifecycleResult, TaskLifecycleService, TaskPatch,
    TaskStatusPatch,
};
pub use locks::TaskLockMap;
