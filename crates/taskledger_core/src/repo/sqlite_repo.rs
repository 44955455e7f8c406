//! Embedded SQLite storage engine.
//!
//! # Responsibility
//! - Implement the repository contract over one SQLite connection.
//! - Push filtering and pagination down to the query engine so indexed
//!   predicates serve large stores without full scans.
//!
//! # Invariants
//! - Every write runs inside one IMMEDIATE transaction: commit on success,
//!   rollback (on drop) before any error propagates.
//! - The connection is owned exclusively and guarded by a mutex; it is
//!   never handed out to callers.
//! - Busy/locked failures surface as `Conflict`, not generic IO, after the
//!   bounded lock wait configured at open time.
//!
//! Single-process usage is assumed; multi-process write safety beyond
//! SQLite's own locking is not validated here.

use crate::db::{open_db, open_db_in_memory, DEFAULT_LOCK_WAIT};
use crate::db::migrations::apply_migrations;
use crate::model::task::{Task, TaskId};
use crate::repo::{retry_once, StorageError, StorageResult, TaskQuery, TaskRepository};
use crate::snapshot::{parse_status, status_to_str};
use chrono::DateTime;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const TASK_SELECT_SQL: &str = "SELECT
    id,
    name,
    details,
    status,
    created_at,
    updated_at
FROM tasks";

/// SQLite-backed task repository.
pub struct SqliteTaskRepository {
    conn: Mutex<Connection>,
}

impl SqliteTaskRepository {
    /// Opens (creating if absent) a database file with the default bounded
    /// lock wait.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open_with_lock_wait(path, DEFAULT_LOCK_WAIT)
    }

    /// Opens a database file with a caller-chosen bounded lock wait; once
    /// the wait is exhausted, operations fail with `Conflict`.
    pub fn open_with_lock_wait(path: impl AsRef<Path>, lock_wait: Duration) -> StorageResult<Self> {
        let conn = open_db(path, lock_wait)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens a private in-memory database. Used by tests and tooling.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = open_db_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::conflict("connection lock poisoned by a panicked writer"))
    }
}

impl TaskRepository for SqliteTaskRepository {
    fn initialize(&self) -> StorageResult<()> {
        let mut conn = self.conn()?;
        apply_migrations(&mut conn)?;
        Ok(())
    }

    fn create(&self, task: &Task) -> StorageResult<()> {
        task.validate()?;
        retry_once(|| {
            let mut conn = self.conn()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let taken: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM tasks WHERE id = ?1;",
                    [task.id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            if taken.is_some() {
                return Err(StorageError::validation(format!(
                    "task id {} already exists",
                    task.id
                )));
            }

            tx.execute(
                "INSERT INTO tasks (id, name, details, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                params![
                    task.id.to_string(),
                    task.name.as_str(),
                    task.details.as_str(),
                    status_to_str(task.status),
                    task.created_at.timestamp_millis(),
                    task.updated_at.timestamp_millis(),
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    fn upsert(&self, task: &Task) -> StorageResult<()> {
        task.validate()?;
        retry_once(|| {
            let mut conn = self.conn()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                "INSERT INTO tasks (id, name, details, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    details = excluded.details,
                    status = excluded.status,
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at;",
                params![
                    task.id.to_string(),
                    task.name.as_str(),
                    task.details.as_str(),
                    status_to_str(task.status),
                    task.created_at.timestamp_millis(),
                    task.updated_at.timestamp_millis(),
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    fn get(&self, id: TaskId) -> StorageResult<Task> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{TASK_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => parse_task_row(row),
            None => Err(StorageError::NotFound(id)),
        }
    }

    fn exists(&self, id: TaskId) -> StorageResult<bool> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM tasks WHERE id = ?1;",
                [id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn list_all(&self) -> StorageResult<Vec<Task>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare(&format!("{TASK_SELECT_SQL} ORDER BY created_at ASC, id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(parse_task_row(row)?);
        }
        Ok(tasks)
    }

    fn find(&self, query: &TaskQuery) -> StorageResult<Vec<Task>> {
        let (sql, bind_values) = build_find_sql(query);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(parse_task_row(row)?);
        }
        Ok(tasks)
    }

    fn delete(&self, id: TaskId) -> StorageResult<bool> {
        retry_once(|| {
            let mut conn = self.conn()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let changed = tx.execute("DELETE FROM tasks WHERE id = ?1;", [id.to_string()])?;
            tx.commit()?;
            Ok(changed > 0)
        })
    }
}

/// Builds the pushed-down `find` statement: indexed status equality,
/// escaped LIKE over name/details, integer range predicates on created_at,
/// native LIMIT/OFFSET.
pub(crate) fn build_find_sql(query: &TaskQuery) -> (String, Vec<Value>) {
    let mut sql = format!("{TASK_SELECT_SQL} WHERE 1 = 1");
    let mut bind_values: Vec<Value> = Vec::new();

    if let Some(status) = query.status {
        sql.push_str(" AND status = ?");
        bind_values.push(Value::Text(status_to_str(status).to_string()));
    }

    if let Some(text) = &query.text {
        sql.push_str(" AND (name LIKE ? ESCAPE '\\' OR details LIKE ? ESCAPE '\\')");
        let pattern = format!("%{}%", escape_like(text));
        bind_values.push(Value::Text(pattern.clone()));
        bind_values.push(Value::Text(pattern));
    }

    if let Some(lower) = query.created_on_or_after {
        sql.push_str(" AND created_at >= ?");
        bind_values.push(Value::Integer(lower.timestamp_millis()));
    }

    if let Some(upper) = query.created_before {
        sql.push_str(" AND created_at < ?");
        bind_values.push(Value::Integer(upper.timestamp_millis()));
    }

    sql.push_str(" ORDER BY created_at ASC, id ASC");

    if let Some(limit) = query.limit {
        sql.push_str(" LIMIT ?");
        bind_values.push(Value::Integer(i64::from(limit)));
        if query.offset > 0 {
            sql.push_str(" OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }
    } else if query.offset > 0 {
        sql.push_str(" LIMIT -1 OFFSET ?");
        bind_values.push(Value::Integer(i64::from(query.offset)));
    }

    sql.push(';');
    (sql, bind_values)
}

fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for ch in needle.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn parse_task_row(row: &Row<'_>) -> StorageResult<Task> {
    let id_text: String = row.get("id")?;
    let id = TaskId::parse_str(&id_text).map_err(|err| {
        StorageError::snapshot_with(format!("invalid uuid value `{id_text}` in tasks.id"), err)
    })?;

    let status_text: String = row.get("status")?;
    let status = parse_status(&status_text).ok_or_else(|| {
        StorageError::snapshot(format!(
            "invalid status value `{status_text}` in tasks.status"
        ))
    })?;

    let created_at = parse_epoch_millis(row.get("created_at")?, "tasks.created_at")?;
    let updated_at = parse_epoch_millis(row.get("updated_at")?, "tasks.updated_at")?;

    let task = Task::with_id(
        id,
        row.get::<_, String>("name")?,
        row.get::<_, String>("details")?,
        status,
        created_at,
        updated_at,
    );
    task.validate()
        .map_err(|err| StorageError::snapshot_with("persisted task violates invariants", err))?;
    Ok(task)
}

fn parse_epoch_millis(millis: i64, column: &str) -> StorageResult<chrono::DateTime<chrono::Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        StorageError::snapshot(format!(
            "timestamp value `{millis}` in {column} is out of range"
        ))
    })
}

#[cfg(test)]
mod tests {
    //! Query-plan assertions: `find` must stay pushed down to indexed
    //! predicates; an in-memory rewrite producing the same rows is a
    //! regression.

    use super::*;
    use crate::model::task::TaskStatus;
    use chrono::Utc;

    fn explain(repo: &SqliteTaskRepository, query: &TaskQuery) -> String {
        let (sql, bind_values) = build_find_sql(query);
        let conn = repo.conn().unwrap();
        let mut stmt = conn.prepare(&format!("EXPLAIN QUERY PLAN {sql}")).unwrap();
        let mut rows = stmt.query(params_from_iter(bind_values)).unwrap();
        let mut details = Vec::new();
        while let Some(row) = rows.next().unwrap() {
            details.push(row.get::<_, String>(3).unwrap());
        }
        details.join("\n")
    }

    #[test]
    fn status_filter_uses_status_index() {
        let repo = SqliteTaskRepository::open_in_memory().unwrap();
        let plan = explain(
            &repo,
            &TaskQuery {
                status: Some(TaskStatus::Pending),
                ..TaskQuery::default()
            },
        );
        assert!(
            plan.contains("USING INDEX idx_tasks_status"),
            "unexpected plan: {plan}"
        );
    }

    #[test]
    fn date_range_filter_uses_created_at_index() {
        let repo = SqliteTaskRepository::open_in_memory().unwrap();
        let plan = explain(
            &repo,
            &TaskQuery {
                created_on_or_after: Some(Utc::now()),
                ..TaskQuery::default()
            },
        );
        assert!(
            plan.contains("USING INDEX idx_tasks_created_at"),
            "unexpected plan: {plan}"
        );
    }

    #[test]
    fn combined_status_and_range_uses_composite_index() {
        let repo = SqliteTaskRepository::open_in_memory().unwrap();
        let plan = explain(
            &repo,
            &TaskQuery {
                status: Some(TaskStatus::Pending),
                created_on_or_after: Some(Utc::now()),
                ..TaskQuery::default()
            },
        );
        assert!(
            plan.contains("USING INDEX idx_tasks_status"),
            "unexpected plan: {plan}"
        );
    }
}
