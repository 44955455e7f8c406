//! Repository contract, error taxonomy and storage engine implementations.
//!
//! # Responsibility
//! - Define the backend-agnostic persistence contract for task records.
//! - Define the closed error set every engine reports through.
//! - Isolate file-document and SQLite details behind one trait.
//!
//! # Invariants
//! - No raw OS or driver error leaves an engine's public methods; every
//!   failure is re-wrapped into a `StorageError` kind at the boundary.
//! - Write paths must call `Task::validate()` before persisting.
//! - `list_all` and `find` order records by `created_at` ascending, then id
//!   ascending, on every engine, so results are comparable across engines.

use crate::model::task::{Task, TaskId, TaskStatus, TaskValidationError};
use chrono::{DateTime, Utc};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod file_repo;
pub mod sqlite_repo;

pub type StorageResult<T> = Result<T, StorageError>;

type Cause = Box<dyn Error + Send + Sync + 'static>;

/// Closed failure set for every storage engine.
///
/// Engines never surface anything outside these five kinds; callers can
/// match exhaustively.
#[derive(Debug)]
pub enum StorageError {
    /// A persisted snapshot is malformed or incomplete and cannot become a
    /// task. Not retryable; the stored data is corrupt.
    SnapshotConversion {
        message: String,
        cause: Option<Cause>,
    },
    /// A well-formed record violates field constraints, or a `create` hit an
    /// existing id. Not retryable; the caller's input is bad.
    Validation { message: String },
    /// A concurrent writer invalidated the operation (lock contention,
    /// busy/locked database). Worth one retry.
    Conflict {
        message: String,
        cause: Option<Cause>,
    },
    /// File or connection failure: permissions, disk full, broken handle.
    Io {
        message: String,
        cause: Option<Cause>,
    },
    /// The requested id does not exist. An expected outcome for lookups,
    /// never logged as an error by the core.
    NotFound(TaskId),
}

impl StorageError {
    pub fn snapshot(message: impl Into<String>) -> Self {
        Self::SnapshotConversion {
            message: message.into(),
            cause: None,
        }
    }

    pub fn snapshot_with(message: impl Into<String>, cause: impl Into<Cause>) -> Self {
        Self::SnapshotConversion {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            cause: None,
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            cause: None,
        }
    }

    pub fn io_with(message: impl Into<String>, cause: impl Into<Cause>) -> Self {
        Self::Io {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    /// Whether one in-engine retry is worthwhile.
    ///
    /// Conflicts always qualify; IO failures qualify only when the wrapped
    /// OS error is an interruption or timeout.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Conflict { .. } => true,
            Self::Io { cause, .. } => cause
                .as_deref()
                .and_then(|cause| cause.downcast_ref::<std::io::Error>())
                .is_some_and(|io_err| {
                    matches!(
                        io_err.kind(),
                        std::io::ErrorKind::Interrupted
                            | std::io::ErrorKind::TimedOut
                            | std::io::ErrorKind::WouldBlock
                    )
                }),
            _ => false,
        }
    }
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SnapshotConversion { message, .. } => {
                write!(f, "snapshot conversion failed: {message}")
            }
            Self::Validation { message } => write!(f, "validation failed: {message}"),
            Self::Conflict { message, .. } => write!(f, "storage conflict: {message}"),
            Self::Io { message, .. } => write!(f, "storage io failure: {message}"),
            Self::NotFound(id) => write!(f, "task not found: {id}"),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::SnapshotConversion { cause, .. }
            | Self::Conflict { cause, .. }
            | Self::Io { cause, .. } => cause
                .as_deref()
                .map(|cause| cause as &(dyn Error + 'static)),
            Self::Validation { .. } | Self::NotFound(_) => None,
        }
    }
}

impl From<TaskValidationError> for StorageError {
    fn from(value: TaskValidationError) -> Self {
        Self::Validation {
            message: value.to_string(),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(value: std::io::Error) -> Self {
        Self::Io {
            message: value.to_string(),
            cause: Some(Box::new(value)),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(value: serde_json::Error) -> Self {
        Self::SnapshotConversion {
            message: value.to_string(),
            cause: Some(Box::new(value)),
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(value: rusqlite::Error) -> Self {
        match &value {
            rusqlite::Error::SqliteFailure(ffi_err, _)
                if matches!(
                    ffi_err.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                Self::Conflict {
                    message: "database is locked by another writer".to_string(),
                    cause: Some(Box::new(value)),
                }
            }
            _ => Self::Io {
                message: value.to_string(),
                cause: Some(Box::new(value)),
            },
        }
    }
}

impl From<crate::db::DbError> for StorageError {
    fn from(value: crate::db::DbError) -> Self {
        match value {
            crate::db::DbError::Sqlite(err) => err.into(),
            other => Self::Io {
                message: other.to_string(),
                cause: Some(Box::new(other)),
            },
        }
    }
}

/// Filter and pagination options for [`TaskRepository::find`].
///
/// Predicates are AND-composed. `limit: Some(0)` yields an empty page;
/// `offset` past the end yields an empty page, never an error.
#[derive(Debug, Clone, Default)]
pub struct TaskQuery {
    /// Exact status match.
    pub status: Option<TaskStatus>,
    /// ASCII-case-insensitive substring match over name or details.
    pub text: Option<String>,
    /// Inclusive lower bound on `created_at`.
    pub created_on_or_after: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at` (day-boundary semantics).
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Backend-agnostic persistence contract for task records.
///
/// Both storage engines implement every operation with identical observable
/// behavior; the conformance tests assert this.
pub trait TaskRepository {
    /// Creates on-disk structures when absent and validates them when
    /// present. Idempotent; safe to call repeatedly.
    fn initialize(&self) -> StorageResult<()>;

    /// Inserts a new record. Fails `Validation` when the id already exists;
    /// use [`TaskRepository::upsert`] for idempotent writes.
    fn create(&self, task: &Task) -> StorageResult<()>;

    /// Inserts or fully replaces the record with the task's id.
    fn upsert(&self, task: &Task) -> StorageResult<()>;

    /// Fetches one record. Fails `NotFound` when absent.
    fn get(&self, id: TaskId) -> StorageResult<Task>;

    /// Existence check. Never fails `NotFound`.
    fn exists(&self, id: TaskId) -> StorageResult<bool>;

    /// All records ordered by `created_at` ascending, then id ascending.
    fn list_all(&self) -> StorageResult<Vec<Task>>;

    /// Filtered, paginated query in the same order as `list_all`.
    fn find(&self, query: &TaskQuery) -> StorageResult<Vec<Task>>;

    /// Removes one record. Returns whether a record was actually removed;
    /// absence is not an error.
    fn delete(&self, id: TaskId) -> StorageResult<bool>;
}

/// Runs an operation, retrying exactly once on a transient failure.
///
/// A second failure of the same kind is surfaced, never retried again.
pub(crate) fn retry_once<T>(mut op: impl FnMut() -> StorageResult<T>) -> StorageResult<T> {
    match op() {
        Err(err) if err.is_transient() => {
            log::warn!("event=storage_retry module=repo status=retrying error={err}");
            op()
        }
        other => other,
    }
}

/// Canonical result order shared by both engines: `created_at` ascending,
/// then id ascending as the tiebreaker. Uuid byte order equals the order of
/// its hyphenated lowercase text form, so this matches SQLite's
/// `ORDER BY created_at, id` over text ids.
pub(crate) fn sort_by_creation(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// ASCII-case-insensitive substring check.
///
/// Matches SQLite's default `LIKE` folding, which only folds ASCII, so the
/// file engine and the SQLite engine agree on every needle.
pub(crate) fn contains_ignore_ascii_case(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    if needle.len() > haystack.len() {
        return false;
    }
    haystack
        .as_bytes()
        .windows(needle.len())
        .any(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}
