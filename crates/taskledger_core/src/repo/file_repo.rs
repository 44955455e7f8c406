//! Flat-file JSON storage engine.
//!
//! # Responsibility
//! - Implement the repository contract over a single JSON document.
//! - Keep every mutation crash-safe via temp-write-then-atomic-rename.
//!
//! # Invariants
//! - The primary document is only ever replaced by a completed rename;
//!   readers never observe a half-written file.
//! - One process-wide mutex serializes the whole load-modify-write cycle
//!   per repository instance.
//! - An undecodable existing document is reported, never truncated.
//!
//! Cross-process writers are a known limitation: a second process's rename
//! cannot corrupt an in-flight read, but it can race the next write.
//! Last-writer-wins, no merge.

use crate::model::task::{Task, TaskId};
use crate::repo::{
    contains_ignore_ascii_case, retry_once, sort_by_creation, StorageError, StorageResult,
    TaskQuery, TaskRepository,
};
use crate::snapshot::{snapshot_to_task, task_to_snapshot, Snapshot};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::NamedTempFile;

/// Newest on-disk document layout this binary understands.
pub const DOCUMENT_VERSION: u32 = 1;

/// On-disk shape: a version marker plus the full snapshot array.
#[derive(Debug, Serialize, Deserialize)]
struct TaskDocument {
    version: u32,
    tasks: Vec<Snapshot>,
}

impl TaskDocument {
    fn empty() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            tasks: Vec::new(),
        }
    }
}

/// File-backed task repository over one JSON document.
///
/// Suited to small stores (low thousands of records); every query decodes
/// the full document in memory.
pub struct FileTaskRepository {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileTaskRepository {
    /// Creates a repository over the given document path.
    ///
    /// No IO happens here; call [`TaskRepository::initialize`] before the
    /// first operation.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the underlying document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_writes(&self) -> StorageResult<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StorageError::conflict("write lock poisoned by a panicked writer"))
    }

    fn load_document(&self) -> StorageResult<TaskDocument> {
        let bytes = fs::read(&self.path)
            .map_err(|err| StorageError::io_with("failed to read task document", err))?;
        let document: TaskDocument = serde_json::from_slice(&bytes)?;
        if document.version > DOCUMENT_VERSION {
            return Err(StorageError::snapshot(format!(
                "task document version {} is newer than supported {DOCUMENT_VERSION}",
                document.version
            )));
        }
        Ok(document)
    }

    fn load_tasks(&self) -> StorageResult<Vec<Task>> {
        let document = self.load_document()?;
        document.tasks.iter().map(snapshot_to_task).collect()
    }

    /// Publishes a document by writing a sibling temp file and renaming it
    /// over the primary. The rename is the only state transition readers
    /// can observe.
    fn store_document(&self, document: &TaskDocument) -> StorageResult<()> {
        let parent = self.path.parent().ok_or_else(|| {
            StorageError::io(format!(
                "task document path `{}` has no parent directory",
                self.path.display()
            ))
        })?;
        // Encode failures are conversion problems, not I/O; the From impl
        // classifies them as SnapshotConversion.
        let bytes = serde_json::to_vec_pretty(document)?;

        let mut temp = NamedTempFile::new_in(parent)
            .map_err(|err| StorageError::io_with("failed to create temp task document", err))?;
        temp.write_all(&bytes)
            .map_err(|err| StorageError::io_with("failed to write temp task document", err))?;
        temp.as_file()
            .sync_all()
            .map_err(|err| StorageError::io_with("failed to sync temp task document", err))?;
        temp.persist(&self.path)
            .map_err(|err| StorageError::io_with("failed to publish task document", err))?;
        Ok(())
    }

    fn store_tasks(&self, tasks: &[Task]) -> StorageResult<()> {
        let document = TaskDocument {
            version: DOCUMENT_VERSION,
            tasks: tasks.iter().map(task_to_snapshot).collect(),
        };
        self.store_document(&document)
    }
}

impl TaskRepository for FileTaskRepository {
    fn initialize(&self) -> StorageResult<()> {
        let _guard = self.lock_writes()?;
        if self.path.exists() {
            // Validates decodability; a corrupt document surfaces here
            // instead of being silently replaced.
            self.load_tasks()?;
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                StorageError::io_with("failed to create task document directory", err)
            })?;
        }
        self.store_document(&TaskDocument::empty())?;
        info!(
            "event=store_init module=file_repo status=ok path={}",
            self.path.display()
        );
        Ok(())
    }

    fn create(&self, task: &Task) -> StorageResult<()> {
        task.validate()?;
        let _guard = self.lock_writes()?;
        retry_once(|| {
            let mut tasks = self.load_tasks()?;
            if tasks.iter().any(|existing| existing.id == task.id) {
                return Err(StorageError::validation(format!(
                    "task id {} already exists",
                    task.id
                )));
            }
            tasks.push(task.clone());
            self.store_tasks(&tasks)
        })
    }

    fn upsert(&self, task: &Task) -> StorageResult<()> {
        task.validate()?;
        let _guard = self.lock_writes()?;
        retry_once(|| {
            let mut tasks = self.load_tasks()?;
            match tasks.iter_mut().find(|existing| existing.id == task.id) {
                Some(existing) => *existing = task.clone(),
                None => tasks.push(task.clone()),
            }
            self.store_tasks(&tasks)
        })
    }

    fn get(&self, id: TaskId) -> StorageResult<Task> {
        self.load_tasks()?
            .into_iter()
            .find(|task| task.id == id)
            .ok_or(StorageError::NotFound(id))
    }

    fn exists(&self, id: TaskId) -> StorageResult<bool> {
        Ok(self.load_tasks()?.iter().any(|task| task.id == id))
    }

    fn list_all(&self) -> StorageResult<Vec<Task>> {
        let mut tasks = self.load_tasks()?;
        sort_by_creation(&mut tasks);
        Ok(tasks)
    }

    fn find(&self, query: &TaskQuery) -> StorageResult<Vec<Task>> {
        let mut tasks = self.load_tasks()?;
        tasks.retain(|task| matches_query(task, query));
        sort_by_creation(&mut tasks);

        let offset = query.offset as usize;
        let page: Vec<Task> = match query.limit {
            Some(limit) => tasks.into_iter().skip(offset).take(limit as usize).collect(),
            None => tasks.into_iter().skip(offset).collect(),
        };
        Ok(page)
    }

    fn delete(&self, id: TaskId) -> StorageResult<bool> {
        let _guard = self.lock_writes()?;
        retry_once(|| {
            let mut tasks = self.load_tasks()?;
            let before = tasks.len();
            tasks.retain(|task| task.id != id);
            if tasks.len() == before {
                return Ok(false);
            }
            self.store_tasks(&tasks)?;
            Ok(true)
        })
    }
}

fn matches_query(task: &Task, query: &TaskQuery) -> bool {
    if let Some(status) = query.status {
        if task.status != status {
            return false;
        }
    }
    if let Some(text) = &query.text {
        if !contains_ignore_ascii_case(&task.name, text)
            && !contains_ignore_ascii_case(&task.details, text)
        {
            return false;
        }
    }
    if let Some(lower) = query.created_on_or_after {
        if task.created_at < lower {
            return false;
        }
    }
    if let Some(upper) = query.created_before {
        if task.created_at >= upper {
            return false;
        }
    }
    true
}
