//! Task types and the type-specific payload codec.
//!
//! Each task type implies one payload shape. The payload is persisted as a
//! flat JSON document with the task's type as the external tag; this module
//! is the only place that interprets that tag. Source-control push events
//! are attached verbatim as opaque JSON and never parsed here.

use super::{BackupId, ParseTaskTypeError, PayloadCodecError, ProjectId, TaskDomainError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a task; immutable after creation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// A general task with no database side effect.
    General,
    /// Creates a database on the target instance.
    DatabaseCreate,
    /// Applies schema DDL to the target database.
    SchemaUpdate,
    /// Applies data DML to the target database.
    DataUpdate,
    /// Takes a backup of the target database.
    Backup,
    /// Restores a backup into a database.
    Restore,
}

impl TaskType {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::DatabaseCreate => "database_create",
            Self::SchemaUpdate => "schema_update",
            Self::DataUpdate => "data_update",
            Self::Backup => "backup",
            Self::Restore => "restore",
        }
    }

    /// Whether tasks of this type must pass advisor checks before leaving
    /// `PendingApproval`.
    ///
    /// Only statement-bearing change types are gated.
    #[must_use]
    pub const fn requires_checks(self) -> bool {
        matches!(self, Self::SchemaUpdate | Self::DataUpdate)
    }
}

impl TryFrom<&str> for TaskType {
    type Error = ParseTaskTypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "general" => Ok(Self::General),
            "database_create" => Ok(Self::DatabaseCreate),
            "schema_update" => Ok(Self::SchemaUpdate),
            "data_update" => Ok(Self::DataUpdate),
            "backup" => Ok(Self::Backup),
            "restore" => Ok(Self::Restore),
            _ => Err(ParseTaskTypeError(value.to_owned())),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of schema migration a schema-update task applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationKind {
    /// Establishes a baseline without executing the statement.
    Baseline,
    /// A forward schema migration.
    Migrate,
    /// A migration applied on a branched schema.
    Branch,
    /// A data-only migration.
    Data,
}

/// Payload for a general task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneralPayload {
    /// Free-text description of the work.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Payload for creating a database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseCreatePayload {
    /// The project owning the new database.
    pub project_id: ProjectId,
    /// Name of the database to create.
    pub database_name: String,
    /// Character set for the new database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_set: Option<String>,
    /// Collation for the new database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collation: Option<String>,
    /// Serialized label set to attach to the new database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<String>,
    /// Statement executed to create the database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,
    /// Schema version recorded for the creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
}

/// Payload for a schema update (DDL).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaUpdatePayload {
    /// The DDL statement to apply.
    pub statement: String,
    /// Kind of migration this statement represents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration_kind: Option<MigrationKind>,
    /// Schema version recorded for the migration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    /// Originating source-control push event, attached verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_event: Option<serde_json::Value>,
}

/// Payload for a data update (DML).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataUpdatePayload {
    /// The DML statement to apply.
    pub statement: String,
    /// Schema version recorded for the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    /// Originating source-control push event, attached verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_event: Option<serde_json::Value>,
}

/// Payload for taking a backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupPayload {
    /// Backup artifact to produce.
    pub backup_id: BackupId,
}

/// Payload for restoring a backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestorePayload {
    /// Backup artifact to restore from.
    pub backup_id: BackupId,
    /// Database name to restore into, used when restoring into a database
    /// that does not exist yet and therefore has no identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
}

/// Type-specific task payload.
///
/// Modelled as a tagged union keyed by [`TaskType`]; the tag itself lives on
/// the task record, so the serialized form is the flat variant document.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskPayload {
    /// Payload for [`TaskType::General`].
    General(GeneralPayload),
    /// Payload for [`TaskType::DatabaseCreate`].
    DatabaseCreate(DatabaseCreatePayload),
    /// Payload for [`TaskType::SchemaUpdate`].
    SchemaUpdate(SchemaUpdatePayload),
    /// Payload for [`TaskType::DataUpdate`].
    DataUpdate(DataUpdatePayload),
    /// Payload for [`TaskType::Backup`].
    Backup(BackupPayload),
    /// Payload for [`TaskType::Restore`].
    Restore(RestorePayload),
}

impl TaskPayload {
    /// Returns the task type this payload belongs to.
    #[must_use]
    pub const fn task_type(&self) -> TaskType {
        match self {
            Self::General(_) => TaskType::General,
            Self::DatabaseCreate(_) => TaskType::DatabaseCreate,
            Self::SchemaUpdate(_) => TaskType::SchemaUpdate,
            Self::DataUpdate(_) => TaskType::DataUpdate,
            Self::Backup(_) => TaskType::Backup,
            Self::Restore(_) => TaskType::Restore,
        }
    }

    /// Returns the SQL statement carried by the payload, if any.
    #[must_use]
    pub fn statement(&self) -> Option<&str> {
        match self {
            Self::SchemaUpdate(payload) => Some(payload.statement.as_str()),
            Self::DataUpdate(payload) => Some(payload.statement.as_str()),
            Self::DatabaseCreate(payload) => payload.statement.as_deref(),
            Self::General(_) | Self::Backup(_) | Self::Restore(_) => None,
        }
    }

    /// Replaces the statement on a statement-bearing payload.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::StatementNotSupported`] for payload kinds
    /// that do not carry an amendable statement and
    /// [`TaskDomainError::EmptyStatement`] when the replacement is blank.
    pub fn set_statement(&mut self, statement: String) -> Result<(), TaskDomainError> {
        if statement.trim().is_empty() {
            return Err(TaskDomainError::EmptyStatement);
        }
        match self {
            Self::SchemaUpdate(payload) => {
                payload.statement = statement;
                Ok(())
            }
            Self::DataUpdate(payload) => {
                payload.statement = statement;
                Ok(())
            }
            Self::General(_) | Self::DatabaseCreate(_) | Self::Backup(_) | Self::Restore(_) => {
                Err(TaskDomainError::StatementNotSupported(self.task_type()))
            }
        }
    }

    /// Returns the character set context for advisor dispatch, if known.
    #[must_use]
    pub fn character_set(&self) -> Option<&str> {
        match self {
            Self::DatabaseCreate(payload) => payload.character_set.as_deref(),
            Self::General(_)
            | Self::SchemaUpdate(_)
            | Self::DataUpdate(_)
            | Self::Backup(_)
            | Self::Restore(_) => None,
        }
    }

    /// Returns the collation context for advisor dispatch, if known.
    #[must_use]
    pub fn collation(&self) -> Option<&str> {
        match self {
            Self::DatabaseCreate(payload) => payload.collation.as_deref(),
            Self::General(_)
            | Self::SchemaUpdate(_)
            | Self::DataUpdate(_)
            | Self::Backup(_)
            | Self::Restore(_) => None,
        }
    }

    /// Validates required fields for the payload's type.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadCodecError::MissingField`] when a required field is
    /// missing or blank.
    pub fn validate(&self) -> Result<(), PayloadCodecError> {
        match self {
            Self::DatabaseCreate(payload) => {
                require(
                    &payload.database_name,
                    TaskType::DatabaseCreate,
                    "database_name",
                )?;
            }
            Self::SchemaUpdate(payload) => {
                require(&payload.statement, TaskType::SchemaUpdate, "statement")?;
            }
            Self::DataUpdate(payload) => {
                require(&payload.statement, TaskType::DataUpdate, "statement")?;
            }
            Self::General(_) | Self::Backup(_) | Self::Restore(_) => {}
        }
        Ok(())
    }
}

fn require(
    value: &str,
    task_type: TaskType,
    field: &'static str,
) -> Result<(), PayloadCodecError> {
    if value.trim().is_empty() {
        return Err(PayloadCodecError::MissingField { task_type, field });
    }
    Ok(())
}

/// Encodes a payload into the flat serialized form stored on the task.
///
/// # Errors
///
/// Returns [`PayloadCodecError::MissingField`] when a required field is
/// missing or blank, or [`PayloadCodecError::Serialise`] when the payload
/// cannot be serialized.
pub fn encode_payload(payload: &TaskPayload) -> Result<String, PayloadCodecError> {
    payload.validate()?;
    let serialized = match payload {
        TaskPayload::General(inner) => serde_json::to_string(inner),
        TaskPayload::DatabaseCreate(inner) => serde_json::to_string(inner),
        TaskPayload::SchemaUpdate(inner) => serde_json::to_string(inner),
        TaskPayload::DataUpdate(inner) => serde_json::to_string(inner),
        TaskPayload::Backup(inner) => serde_json::to_string(inner),
        TaskPayload::Restore(inner) => serde_json::to_string(inner),
    };
    serialized.map_err(|err| PayloadCodecError::Serialise(err.to_string()))
}

/// Decodes a stored payload into the shape implied by the task type.
///
/// # Errors
///
/// Returns [`PayloadCodecError::Corrupt`] when the stored document cannot be
/// parsed into the declared shape. This is a data-integrity fault: callers
/// must log and surface it, never substitute a default.
pub fn decode_payload(task_type: TaskType, raw: &str) -> Result<TaskPayload, PayloadCodecError> {
    let corrupt = |err: serde_json::Error| PayloadCodecError::Corrupt {
        task_type,
        detail: err.to_string(),
    };
    match task_type {
        TaskType::General => serde_json::from_str(raw)
            .map(TaskPayload::General)
            .map_err(corrupt),
        TaskType::DatabaseCreate => serde_json::from_str(raw)
            .map(TaskPayload::DatabaseCreate)
            .map_err(corrupt),
        TaskType::SchemaUpdate => serde_json::from_str(raw)
            .map(TaskPayload::SchemaUpdate)
            .map_err(corrupt),
        TaskType::DataUpdate => serde_json::from_str(raw)
            .map(TaskPayload::DataUpdate)
            .map_err(corrupt),
        TaskType::Backup => serde_json::from_str(raw)
            .map(TaskPayload::Backup)
            .map_err(corrupt),
        TaskType::Restore => serde_json::from_str(raw)
            .map(TaskPayload::Restore)
            .map_err(corrupt),
    }
}
