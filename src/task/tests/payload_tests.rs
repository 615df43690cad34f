//! Unit tests for the payload codec.

use crate::task::domain::{
    BackupId, BackupPayload, DataUpdatePayload, DatabaseCreatePayload, PayloadCodecError,
    ProjectId, SchemaUpdatePayload, TaskDomainError, TaskPayload, TaskType, decode_payload,
    encode_payload,
};
use eyre::{bail, ensure};
use rstest::rstest;

fn database_create_payload() -> TaskPayload {
    TaskPayload::DatabaseCreate(DatabaseCreatePayload {
        project_id: ProjectId::new(7),
        database_name: "sales".to_owned(),
        character_set: None,
        collation: None,
        labels: None,
        statement: None,
        schema_version: None,
    })
}

#[rstest]
fn database_create_round_trips_with_absent_optionals() -> eyre::Result<()> {
    let payload = database_create_payload();

    let encoded = encode_payload(&payload)?;
    let decoded = decode_payload(TaskType::DatabaseCreate, &encoded)?;

    ensure!(decoded == payload);
    // Absent optional fields stay absent in the flat form, not sentinels.
    let document: serde_json::Value = serde_json::from_str(&encoded)?;
    ensure!(document.get("character_set").is_none());
    ensure!(document.get("collation").is_none());
    ensure!(document.get("database_name").is_some());
    Ok(())
}

#[rstest]
fn schema_update_preserves_opaque_push_event() -> eyre::Result<()> {
    let push_event = serde_json::json!({
        "ref": "refs/heads/main",
        "commits": [{"id": "abc123", "message": "add column"}],
    });
    let payload = TaskPayload::SchemaUpdate(SchemaUpdatePayload {
        statement: "ALTER TABLE t ADD COLUMN c INT".to_owned(),
        migration_kind: None,
        schema_version: Some("v42".to_owned()),
        push_event: Some(push_event.clone()),
    });

    let encoded = encode_payload(&payload)?;
    let decoded = decode_payload(TaskType::SchemaUpdate, &encoded)?;

    let TaskPayload::SchemaUpdate(inner) = decoded else {
        bail!("decoded into the wrong payload kind");
    };
    ensure!(inner.push_event == Some(push_event.clone()));
    Ok(())
}

#[rstest]
fn encoding_blank_database_name_fails_validation() {
    let payload = TaskPayload::DatabaseCreate(DatabaseCreatePayload {
        project_id: ProjectId::new(7),
        database_name: "  ".to_owned(),
        character_set: None,
        collation: None,
        labels: None,
        statement: None,
        schema_version: None,
    });

    let result = encode_payload(&payload);

    assert_eq!(
        result,
        Err(PayloadCodecError::MissingField {
            task_type: TaskType::DatabaseCreate,
            field: "database_name",
        })
    );
}

#[rstest]
#[case(TaskType::SchemaUpdate)]
#[case(TaskType::DataUpdate)]
fn encoding_blank_statement_fails_validation(#[case] task_type: TaskType) {
    let payload = match task_type {
        TaskType::SchemaUpdate => TaskPayload::SchemaUpdate(SchemaUpdatePayload {
            statement: String::new(),
            migration_kind: None,
            schema_version: None,
            push_event: None,
        }),
        _ => TaskPayload::DataUpdate(DataUpdatePayload {
            statement: String::new(),
            schema_version: None,
            push_event: None,
        }),
    };

    let result = encode_payload(&payload);

    assert_eq!(
        result,
        Err(PayloadCodecError::MissingField {
            task_type,
            field: "statement",
        })
    );
}

#[rstest]
fn decoding_garbage_reports_corrupt_payload() {
    let result = decode_payload(TaskType::Backup, "not json at all");

    assert!(matches!(
        result,
        Err(PayloadCodecError::Corrupt {
            task_type: TaskType::Backup,
            ..
        })
    ));
}

#[rstest]
fn decoding_wrong_shape_reports_corrupt_payload() -> eyre::Result<()> {
    let encoded = encode_payload(&TaskPayload::Backup(BackupPayload {
        backup_id: BackupId::new(3),
    }))?;

    let result = decode_payload(TaskType::SchemaUpdate, &encoded);

    ensure!(matches!(
        result,
        Err(PayloadCodecError::Corrupt {
            task_type: TaskType::SchemaUpdate,
            ..
        })
    ));
    Ok(())
}

#[rstest]
fn set_statement_rejects_non_statement_payloads() {
    let mut payload = TaskPayload::Backup(BackupPayload {
        backup_id: BackupId::new(3),
    });

    let result = payload.set_statement("DROP TABLE t".to_owned());

    assert_eq!(
        result,
        Err(TaskDomainError::StatementNotSupported(TaskType::Backup))
    );
}

#[rstest]
fn set_statement_rejects_blank_statements() {
    let mut payload = TaskPayload::SchemaUpdate(SchemaUpdatePayload {
        statement: "ALTER TABLE t ADD COLUMN c INT".to_owned(),
        migration_kind: None,
        schema_version: None,
        push_event: None,
    });

    let result = payload.set_statement("   ".to_owned());

    assert_eq!(result, Err(TaskDomainError::EmptyStatement));
}

#[rstest]
fn task_type_string_round_trips() -> eyre::Result<()> {
    for task_type in [
        TaskType::General,
        TaskType::DatabaseCreate,
        TaskType::SchemaUpdate,
        TaskType::DataUpdate,
        TaskType::Backup,
        TaskType::Restore,
    ] {
        let parsed = TaskType::try_from(task_type.as_str())?;
        ensure!(parsed == task_type);
    }
    Ok(())
}
