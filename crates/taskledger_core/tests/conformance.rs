//! Cross-engine conformance suite: the same operation sequence must produce
//! field-for-field, order-for-order identical results on every engine.

use chrono::DateTime;
use taskledger_core::{
    migrate_tasks, FileTaskRepository, SqliteTaskRepository, StorageError, Task, TaskQuery,
    TaskRepository, TaskStatus,
};
use uuid::Uuid;

fn task_at(name: &str, details: &str, status: TaskStatus, millis: i64) -> Task {
    let at = DateTime::from_timestamp_millis(millis).unwrap();
    Task::with_id(Uuid::new_v4(), name, details, status, at, at)
}

fn backends(dir: &tempfile::TempDir) -> Vec<(&'static str, Box<dyn TaskRepository>)> {
    let file = FileTaskRepository::new(dir.path().join("tasks.json"));
    file.initialize().unwrap();
    let sqlite = SqliteTaskRepository::open(dir.path().join("tasks.db")).unwrap();
    sqlite.initialize().unwrap();
    vec![
        ("file", Box::new(file) as Box<dyn TaskRepository>),
        ("sqlite", Box::new(sqlite) as Box<dyn TaskRepository>),
    ]
}

/// Fixed fixture shared by every engine run: same ids, same timestamps.
fn fixture() -> Vec<Task> {
    let base = 1_700_000_000_000;
    vec![
        task_at("buy groceries", "milk and eggs", TaskStatus::Pending, base),
        task_at("write report", "quarterly numbers", TaskStatus::Pending, base + 1_000),
        task_at("book flights", "", TaskStatus::Completed, base + 2_000),
        task_at("clean desk", "also the DRAWERS", TaskStatus::Pending, base + 3_000),
        task_at("call dentist", "reschedule milk teeth joke", TaskStatus::Pending, base + 4_000),
    ]
}

/// Runs the shared operation sequence and records every observable result.
fn run_sequence(repo: &dyn TaskRepository, tasks: &[Task]) -> Vec<Vec<Task>> {
    let mut observations = Vec::new();

    for task in tasks {
        repo.create(task).unwrap();
    }

    // Point read.
    observations.push(vec![repo.get(tasks[0].id).unwrap()]);

    // Update one field. A fixed updated_at keeps runs comparable across
    // engines; wall-clock touches would diverge between runs.
    let mut renamed = repo.get(tasks[1].id).unwrap();
    renamed.name = "write the annual report".to_string();
    renamed.updated_at = renamed.created_at + chrono::Duration::milliseconds(500);
    repo.upsert(&renamed).unwrap();
    observations.push(vec![repo.get(tasks[1].id).unwrap()]);

    // Filter by status.
    observations.push(
        repo.find(&TaskQuery {
            status: Some(TaskStatus::Pending),
            ..TaskQuery::default()
        })
        .unwrap(),
    );

    // Filter by substring, case-insensitive, over name and details.
    observations.push(
        repo.find(&TaskQuery {
            text: Some("milk".to_string()),
            ..TaskQuery::default()
        })
        .unwrap(),
    );
    observations.push(
        repo.find(&TaskQuery {
            text: Some("drawers".to_string()),
            ..TaskQuery::default()
        })
        .unwrap(),
    );

    // Filter by date range: inclusive lower, exclusive upper.
    observations.push(
        repo.find(&TaskQuery {
            created_on_or_after: Some(tasks[1].created_at),
            created_before: Some(tasks[3].created_at),
            ..TaskQuery::default()
        })
        .unwrap(),
    );

    // Paginate.
    observations.push(
        repo.find(&TaskQuery {
            limit: Some(2),
            offset: 1,
            ..TaskQuery::default()
        })
        .unwrap(),
    );
    observations.push(
        repo.find(&TaskQuery {
            limit: Some(2),
            offset: 100,
            ..TaskQuery::default()
        })
        .unwrap(),
    );

    // Delete one.
    assert!(repo.delete(tasks[2].id).unwrap());
    observations.push(repo.list_all().unwrap());

    observations
}

#[test]
fn both_backends_produce_identical_results_for_the_same_sequence() {
    let tasks = fixture();
    let dir = tempfile::tempdir().unwrap();

    let mut results = Vec::new();
    for (name, repo) in backends(&dir) {
        results.push((name, run_sequence(repo.as_ref(), &tasks)));
    }

    let (_, reference) = &results[0];
    for (name, observations) in &results[1..] {
        assert_eq!(
            observations, reference,
            "backend `{name}` diverged from `{}`",
            results[0].0
        );
    }
}

#[test]
fn sequence_ends_with_migration_and_empty_stores() {
    let tasks = fixture();
    let dir = tempfile::tempdir().unwrap();

    let file = FileTaskRepository::new(dir.path().join("tasks.json"));
    file.initialize().unwrap();
    let sqlite = SqliteTaskRepository::open(dir.path().join("tasks.db")).unwrap();

    for task in &tasks {
        file.create(task).unwrap();
    }
    file.delete(tasks[2].id).unwrap();

    // Migrate the remaining records to the other engine.
    let report = migrate_tasks(&file, &sqlite, 2).unwrap();
    assert_eq!(report.migrated, 4);
    assert_eq!(sqlite.list_all().unwrap(), file.list_all().unwrap());

    // Delete all, verify empty.
    for task in file.list_all().unwrap() {
        assert!(file.delete(task.id).unwrap());
        assert!(sqlite.delete(task.id).unwrap());
    }
    assert!(file.list_all().unwrap().is_empty());
    assert!(sqlite.list_all().unwrap().is_empty());
}

#[test]
fn concrete_five_task_scenario_holds_on_every_backend() {
    let dir = tempfile::tempdir().unwrap();

    for (name, repo) in backends(&dir) {
        let base = 1_700_000_000_000;
        let mut tasks = Vec::new();
        for index in 0..5 {
            let status = if index == 2 {
                TaskStatus::Completed
            } else {
                TaskStatus::Pending
            };
            let task = task_at(&format!("T{}", index + 1), "", status, base + index);
            repo.create(&task).unwrap();
            tasks.push(task);
        }

        let pending = repo
            .find(&TaskQuery {
                status: Some(TaskStatus::Pending),
                ..TaskQuery::default()
            })
            .unwrap();
        let pending_names: Vec<&str> = pending.iter().map(|task| task.name.as_str()).collect();
        assert_eq!(
            pending_names,
            vec!["T1", "T2", "T4", "T5"],
            "backend `{name}` pending order"
        );

        let mut t1 = repo.get(tasks[0].id).unwrap();
        t1.name = "T1 renamed".to_string();
        t1.touch();
        repo.upsert(&t1).unwrap();
        let reloaded = repo.get(tasks[0].id).unwrap();
        assert!(
            reloaded.updated_at > reloaded.created_at,
            "backend `{name}` updated_at must advance"
        );

        assert!(repo.delete(tasks[2].id).unwrap());
        assert_eq!(repo.list_all().unwrap().len(), 4, "backend `{name}`");
        assert!(
            matches!(repo.get(tasks[2].id), Err(StorageError::NotFound(_))),
            "backend `{name}` deleted id must be NotFound"
        );
    }
}

#[test]
fn same_millisecond_records_tie_break_identically_across_backends() {
    let dir = tempfile::tempdir().unwrap();

    // Every record shares one created_at millisecond, so ordering falls
    // entirely on the id tie-break: Uuid byte order on the file engine,
    // ORDER BY over hyphenated text on SQLite. Both must agree.
    let at = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
    let mut tasks = Vec::new();
    for index in 0..50 {
        tasks.push(Task::with_id(
            Uuid::new_v4(),
            format!("tied task {index}"),
            "",
            TaskStatus::Pending,
            at,
            at,
        ));
    }

    let mut orders = Vec::new();
    for (name, repo) in backends(&dir) {
        for task in &tasks {
            repo.create(task).unwrap();
        }
        let ids: Vec<Uuid> = repo
            .list_all()
            .unwrap()
            .iter()
            .map(|task| task.id)
            .collect();
        assert_eq!(ids.len(), tasks.len(), "backend `{name}` lost records");
        orders.push((name, ids));
    }

    let (_, reference) = &orders[0];
    for (name, ids) in &orders[1..] {
        assert_eq!(
            ids, reference,
            "backend `{name}` tie-break order diverged from `{}`",
            orders[0].0
        );
    }

    // The shared rule predicts the exact sequence: ascending id.
    let mut expected: Vec<Uuid> = tasks.iter().map(|task| task.id).collect();
    expected.sort();
    assert_eq!(*reference, expected);
}

#[test]
fn repeated_reads_return_identical_order_on_every_backend() {
    let dir = tempfile::tempdir().unwrap();

    for (name, repo) in backends(&dir) {
        for task in fixture() {
            repo.upsert(&task).unwrap();
        }
        let first = repo.list_all().unwrap();
        let second = repo.list_all().unwrap();
        assert_eq!(first, second, "backend `{name}` order must be stable");
    }
}
