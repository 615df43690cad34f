//! In-memory activity sink recording the audit trail for inspection.

use async_trait::async_trait;
use std::sync::{Arc, RwLock};

use crate::task::ports::{Activity, ActivitySink, ActivitySinkError, ActivitySinkResult};

/// Thread-safe in-memory activity sink.
#[derive(Debug, Clone, Default)]
pub struct InMemoryActivitySink {
    records: Arc<RwLock<Vec<Activity>>>,
}

impl InMemoryActivitySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every recorded activity in arrival order.
    #[must_use]
    pub fn recorded(&self) -> Vec<Activity> {
        self.records
            .read()
            .map_or_else(|_| Vec::new(), |records| records.clone())
    }
}

#[async_trait]
impl ActivitySink for InMemoryActivitySink {
    async fn record(&self, activity: Activity) -> ActivitySinkResult<()> {
        let mut records = self.records.write().map_err(|err| {
            ActivitySinkError::unavailable(std::io::Error::other(err.to_string()))
        })?;
        records.push(activity);
        Ok(())
    }
}
