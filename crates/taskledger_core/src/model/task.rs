//! Task domain model.
//!
//! # Responsibility
//! - Define the persisted task record and its lifecycle states.
//! - Provide validation shared by every storage engine's write path.
//!
//! # Invariants
//! - `id` is stable after creation and never reused for another task.
//! - `created_at` is set once and never changes.
//! - `updated_at` is never earlier than `created_at`.
//! - Timestamps are truncated to millisecond precision so that encoding
//!   round-trips reproduce them exactly on every engine.

use chrono::{DateTime, Utc};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for a task record.
///
/// Kept as a type alias to make semantic intent explicit in signatures.
pub type TaskId = Uuid;

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Created but not finished.
    Pending,
    /// Finished successfully.
    Completed,
    /// No longer actionable.
    Cancelled,
}

/// Validation failure for a task record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskValidationError {
    NilId,
    EmptyName,
    UpdatedBeforeCreated {
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    },
}

impl Display for TaskValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NilId => write!(f, "task id must not be nil"),
            Self::EmptyName => write!(f, "task name must not be empty"),
            Self::UpdatedBeforeCreated {
                created_at,
                updated_at,
            } => write!(
                f,
                "updated_at {updated_at} is earlier than created_at {created_at}"
            ),
        }
    }
}

impl Error for TaskValidationError {}

/// Canonical persisted task record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Stable global ID used for point reads, updates and deletes.
    pub id: TaskId,
    /// Short human-readable title. Must not be empty.
    pub name: String,
    /// Free-form body text. May be empty.
    pub details: String,
    /// Lifecycle state.
    pub status: TaskStatus,
    /// Set once at creation, immutable afterwards.
    pub created_at: DateTime<Utc>,
    /// Refreshed on every mutation via [`Task::touch`].
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Creates a new pending task with a generated stable ID.
    ///
    /// Both timestamps start equal, at the current instant truncated to
    /// millisecond precision.
    pub fn new(name: impl Into<String>, details: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            details: details.into(),
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a task with caller-provided identity and timestamps.
    ///
    /// Used by decode and migration paths where identity already exists.
    /// Does not validate; callers run [`Task::validate`] afterwards.
    pub fn with_id(
        id: TaskId,
        name: impl Into<String>,
        details: impl Into<String>,
        status: TaskStatus,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            details: details.into(),
            status,
            created_at,
            updated_at,
        }
    }

    /// Refreshes `updated_at` for a mutation.
    ///
    /// # Invariants
    /// - The new `updated_at` is strictly greater than the previous one,
    ///   even when two mutations land inside the same millisecond.
    pub fn touch(&mut self) {
        let now = now_millis();
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + chrono::Duration::milliseconds(1)
        };
    }

    /// Checks record invariants shared by all storage engines.
    pub fn validate(&self) -> Result<(), TaskValidationError> {
        if self.id.is_nil() {
            return Err(TaskValidationError::NilId);
        }
        if self.name.is_empty() {
            return Err(TaskValidationError::EmptyName);
        }
        if self.updated_at < self.created_at {
            return Err(TaskValidationError::UpdatedBeforeCreated {
                created_at: self.created_at,
                updated_at: self.updated_at,
            });
        }
        Ok(())
    }
}

/// Current instant truncated to millisecond precision.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}
