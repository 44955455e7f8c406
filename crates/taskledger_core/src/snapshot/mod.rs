//! Backend-neutral snapshot codec for task records.
//!
//! # Responsibility
//! - Convert between the in-memory `Task` and a flat map of primitive
//!   fields shared by every storage engine.
//! - Serialize that map to deterministic UTF-8 JSON bytes and back.
//!
//! # Invariants
//! - Task -> snapshot -> Task is lossless, field-for-field, timestamps
//!   included at millisecond precision.
//! - Keys are lexically ordered; two independent encodings of the same task
//!   are byte-identical.
//! - Empty `details` encodes as an explicit JSON `null`, never omitted.
//! - Decoding validates every required field before constructing a task and
//!   names the offending field on failure.

use crate::model::task::{Task, TaskId, TaskStatus};
use crate::repo::{StorageError, StorageResult};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

/// Flat map representation of one task record.
///
/// A `BTreeMap` keeps key order lexical without any extra bookkeeping.
pub type Snapshot = BTreeMap<String, Value>;

pub const KEY_ID: &str = "id";
pub const KEY_NAME: &str = "name";
pub const KEY_DETAILS: &str = "details";
pub const KEY_STATUS: &str = "status";
pub const KEY_CREATED_AT: &str = "created_at";
pub const KEY_UPDATED_AT: &str = "updated_at";

/// Encodes a task into its backend-neutral snapshot.
pub fn task_to_snapshot(task: &Task) -> Snapshot {
    let mut snapshot = Snapshot::new();
    snapshot.insert(KEY_ID.to_string(), Value::String(task.id.to_string()));
    snapshot.insert(KEY_NAME.to_string(), Value::String(task.name.clone()));
    let details = if task.details.is_empty() {
        Value::Null
    } else {
        Value::String(task.details.clone())
    };
    snapshot.insert(KEY_DETAILS.to_string(), details);
    snapshot.insert(
        KEY_STATUS.to_string(),
        Value::String(status_to_str(task.status).to_string()),
    );
    snapshot.insert(
        KEY_CREATED_AT.to_string(),
        Value::String(encode_timestamp(task.created_at)),
    );
    snapshot.insert(
        KEY_UPDATED_AT.to_string(),
        Value::String(encode_timestamp(task.updated_at)),
    );
    snapshot
}

/// Decodes a snapshot back into a task.
///
/// Unknown keys are ignored for forward compatibility. The decoded task is
/// re-validated; invalid persisted state surfaces as `SnapshotConversion`.
pub fn snapshot_to_task(snapshot: &Snapshot) -> StorageResult<Task> {
    let id = parse_id(required_str(snapshot, KEY_ID)?)?;
    let name = required_str(snapshot, KEY_NAME)?.to_string();
    let details = match snapshot.get(KEY_DETAILS) {
        Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => {
            return Err(StorageError::snapshot(format!(
                "snapshot field `{KEY_DETAILS}` must be a string or null, got {other}"
            )))
        }
        None => {
            return Err(StorageError::snapshot(format!(
                "snapshot field `{KEY_DETAILS}` is missing"
            )))
        }
    };
    let status = parse_status(required_str(snapshot, KEY_STATUS)?).ok_or_else(|| {
        StorageError::snapshot(format!(
            "snapshot field `{KEY_STATUS}` has invalid value; expected pending|completed|cancelled"
        ))
    })?;
    let created_at = parse_timestamp(required_str(snapshot, KEY_CREATED_AT)?, KEY_CREATED_AT)?;
    let updated_at = parse_timestamp(required_str(snapshot, KEY_UPDATED_AT)?, KEY_UPDATED_AT)?;

    let task = Task::with_id(id, name, details, status, created_at, updated_at);
    task.validate()
        .map_err(|err| StorageError::snapshot_with("persisted task violates invariants", err))?;
    Ok(task)
}

/// Serializes one snapshot to compact deterministic JSON bytes.
pub fn serialize_snapshot(snapshot: &Snapshot) -> StorageResult<Vec<u8>> {
    Ok(serde_json::to_vec(snapshot)?)
}

/// Deserializes one snapshot from JSON bytes.
pub fn deserialize_snapshot(bytes: &[u8]) -> StorageResult<Snapshot> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Wire name for a task status, shared with the SQLite schema's check
/// constraint.
pub fn status_to_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Completed => "completed",
        TaskStatus::Cancelled => "cancelled",
    }
}

pub fn parse_status(value: &str) -> Option<TaskStatus> {
    match value {
        "pending" => Some(TaskStatus::Pending),
        "completed" => Some(TaskStatus::Completed),
        "cancelled" => Some(TaskStatus::Cancelled),
        _ => None,
    }
}

/// RFC 3339 with millisecond precision and an explicit `+00:00` offset.
pub fn encode_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, false)
}

pub fn parse_timestamp(value: &str, field: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| {
            StorageError::snapshot_with(
                format!("snapshot field `{field}` is not a valid RFC 3339 timestamp"),
                err,
            )
        })
}

fn parse_id(value: &str) -> StorageResult<TaskId> {
    TaskId::parse_str(value).map_err(|err| {
        StorageError::snapshot_with(format!("snapshot field `{KEY_ID}` is not a valid uuid"), err)
    })
}

fn required_str<'snap>(snapshot: &'snap Snapshot, field: &str) -> StorageResult<&'snap str> {
    match snapshot.get(field) {
        Some(Value::String(text)) => Ok(text),
        Some(other) => Err(StorageError::snapshot(format!(
            "snapshot field `{field}` must be a string, got {other}"
        ))),
        None => Err(StorageError::snapshot(format!(
            "snapshot field `{field}` is missing"
        ))),
    }
}
