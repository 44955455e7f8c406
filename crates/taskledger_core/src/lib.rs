//! Storage core for the taskledger task tracker.
//! This crate is the single source of truth for persistence invariants:
//! both storage engines implement one contract with identical observable
//! behavior.

pub mod db;
pub mod logging;
pub mod migrate;
pub mod model;
pub mod repo;
pub mod service;
pub mod snapshot;

pub use logging::{default_log_level, init_logging, logging_status};
pub use migrate::{migrate_tasks, MigrationReport, DEFAULT_BATCH_SIZE};
pub use model::task::{Task, TaskId, TaskStatus, TaskValidationError};
pub use repo::file_repo::FileTaskRepository;
pub use repo::sqlite_repo::SqliteTaskRepository;
pub use repo::{StorageError, StorageResult, TaskQuery, TaskRepository};
pub use service::task_service::TaskService;
pub use snapshot::{
    deserialize_snapshot, serialize_snapshot, snapshot_to_task, task_to_snapshot, Snapshot,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
