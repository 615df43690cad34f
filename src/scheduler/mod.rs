//! Cooperative polling scheduler for Gantry pipelines.
//!
//! A scheduler polls for tasks eligible to progress and attempts
//! transitions on them. Polling (rather than a push-based event system) is
//! deliberate: eligibility depends on wall-clock scheduling constraints and
//! on asynchronous check completion, neither of which produces a reliable
//! push signal.
//!
//! Check and execution dispatches each run as an independent unit of
//! concurrency; their completions come back as messages correlated to the
//! originating record, so the scheduler loop never blocks on a
//! collaborator and one task's failure never halts the others.

mod config;
mod engine;
mod messages;

pub use config::SchedulerConfig;
pub use engine::{Scheduler, SchedulerError};
pub use messages::{SchedulerClosed, SchedulerCommand, SchedulerHandle};

#[cfg(test)]
mod tests;
