//! Task lifecycle service.
//!
//! # Responsibility
//! - Provide create/rename/status-transition entry points over any engine.
//! - Keep mutation plumbing (fetch, mutate, touch, upsert) in one place.
//!
//! # Invariants
//! - Every mutation refreshes `updated_at` via `Task::touch` before the
//!   upsert, so `updated_at` grows strictly monotonic per record.
//! - The service never reaches past the repository contract.

use crate::model::task::{Task, TaskId, TaskStatus};
use crate::repo::{StorageResult, TaskRepository};

/// Lifecycle helpers for task records, generic over the storage engine.
pub struct TaskService<R: TaskRepository> {
    repo: R,
}

impl<R: TaskRepository> TaskService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Borrow of the underlying repository, for read paths.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Creates a new pending task and returns the stored record.
    pub fn create_task(
        &self,
        name: impl Into<String>,
        details: impl Into<String>,
    ) -> StorageResult<Task> {
        let task = Task::new(name, details);
        self.repo.create(&task)?;
        Ok(task)
    }

    /// Renames a task.
    pub fn rename_task(&self, id: TaskId, name: impl Into<String>) -> StorageResult<Task> {
        self.mutate(id, |task| task.name = name.into())
    }

    /// Replaces a task's details text.
    pub fn edit_details(&self, id: TaskId, details: impl Into<String>) -> StorageResult<Task> {
        self.mutate(id, |task| task.details = details.into())
    }

    /// Marks a task completed.
    pub fn complete_task(&self, id: TaskId) -> StorageResult<Task> {
        self.mutate(id, |task| task.status = TaskStatus::Completed)
    }

    /// Marks a task cancelled.
    pub fn cancel_task(&self, id: TaskId) -> StorageResult<Task> {
        self.mutate(id, |task| task.status = TaskStatus::Cancelled)
    }

    /// Returns a completed or cancelled task to pending.
    pub fn reopen_task(&self, id: TaskId) -> StorageResult<Task> {
        self.mutate(id, |task| task.status = TaskStatus::Pending)
    }

    fn mutate(&self, id: TaskId, apply: impl FnOnce(&mut Task)) -> StorageResult<Task> {
        let mut task = self.repo.get(id)?;
        apply(&mut task);
        task.touch();
        self.repo.upsert(&task)?;
        Ok(task)
    }
}
