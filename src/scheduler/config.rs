//! Scheduler configuration.

use std::time::Duration;

/// Tunables for the polling scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Interval between eligibility polls.
    pub poll_interval: Duration,
    /// How long a cancellation waits for the execution collaborator to
    /// acknowledge before the task is marked canceled with an
    /// abort-unconfirmed flag.
    pub cancel_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            cancel_grace: Duration::from_secs(30),
        }
    }
}
