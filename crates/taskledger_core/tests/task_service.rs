use taskledger_core::{
    FileTaskRepository, SqliteTaskRepository, StorageError, TaskRepository, TaskService,
    TaskStatus,
};

#[test]
fn create_then_complete_then_reopen() {
    let service = TaskService::new(SqliteTaskRepository::open_in_memory().unwrap());

    let task = service.create_task("file taxes", "before the deadline").unwrap();
    assert_eq!(task.status, TaskStatus::Pending);

    let completed = service.complete_task(task.id).unwrap();
    assert_eq!(completed.status, TaskStatus::Completed);
    assert!(completed.updated_at > task.updated_at);

    let reopened = service.reopen_task(task.id).unwrap();
    assert_eq!(reopened.status, TaskStatus::Pending);
    assert!(reopened.updated_at > completed.updated_at);
}

#[test]
fn cancel_task_persists_through_the_repository() {
    let dir = tempfile::tempdir().unwrap();
    let repo = FileTaskRepository::new(dir.path().join("tasks.json"));
    repo.initialize().unwrap();
    let service = TaskService::new(repo);

    let task = service.create_task("obsolete chore", "").unwrap();
    service.cancel_task(task.id).unwrap();

    let stored = service.repo().get(task.id).unwrap();
    assert_eq!(stored.status, TaskStatus::Cancelled);
}

#[test]
fn rename_and_edit_details_refresh_updated_at() {
    let service = TaskService::new(SqliteTaskRepository::open_in_memory().unwrap());

    let task = service.create_task("old name", "old details").unwrap();
    let renamed = service.rename_task(task.id, "new name").unwrap();
    assert_eq!(renamed.name, "new name");
    assert!(renamed.updated_at > task.updated_at);

    let edited = service.edit_details(task.id, "new details").unwrap();
    assert_eq!(edited.details, "new details");
    assert!(edited.updated_at > renamed.updated_at);
    assert_eq!(edited.created_at, task.created_at);
}

#[test]
fn transitions_on_missing_tasks_return_not_found() {
    let service = TaskService::new(SqliteTaskRepository::open_in_memory().unwrap());

    let err = service.complete_task(uuid::Uuid::new_v4()).unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
}
