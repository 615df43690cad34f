//! Identifier types for the task domain.
//!
//! All entity identifiers are numeric, assigned by the owning store. They
//! are copy newtypes so a stage identifier can never be passed where a
//! pipeline identifier is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! numeric_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i32);

        impl $name {
            /// Wraps a store-assigned numeric identifier.
            #[must_use]
            pub const fn new(value: i32) -> Self {
                Self(value)
            }

            /// Returns the underlying numeric value.
            #[must_use]
            pub const fn value(self) -> i32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id! {
    /// Unique identifier for a task record.
    TaskId
}

numeric_id! {
    /// Unique identifier for a pipeline.
    PipelineId
}

numeric_id! {
    /// Unique identifier for a stage within a pipeline.
    StageId
}

numeric_id! {
    /// Unique identifier for a target database instance.
    InstanceId
}

numeric_id! {
    /// Unique identifier for a database on an instance.
    DatabaseId
}

numeric_id! {
    /// Unique identifier for a project owning databases.
    ProjectId
}

numeric_id! {
    /// Unique identifier for a backup artifact.
    BackupId
}

numeric_id! {
    /// Unique identifier for a principal (human or bot actor).
    PrincipalId
}

/// Principal recorded as the actor for transitions the system itself
/// initiates, such as scheduler-driven starts and completions.
pub const SYSTEM_BOT_ID: PrincipalId = PrincipalId::new(1);
