//! Cross-engine migration with verification and rollback.
//!
//! # Responsibility
//! - Copy every record from a source engine to a destination engine
//!   through the shared snapshot codec.
//! - Verify each copied record field-for-field before declaring success.
//!
//! # Invariants
//! - The source is never mutated.
//! - On any failure, every record written to the destination is removed
//!   again (all-or-nothing) before the error propagates.
//! - At most one batch of records is held in memory at a time.
//!
//! The source must not receive concurrent writes while a migration runs;
//! batched offset pagination assumes a stable record set.
//!
//! Rollback is compensation through the public contract: every written id
//! is deleted from the destination again. If a cleanup delete itself fails
//! (for example the destination becomes unreachable mid-rollback), the
//! destination retains those records; each leftover id is reported via a
//! `rollback_incomplete` log event.

use crate::model::task::TaskId;
use crate::repo::{StorageError, StorageResult, TaskQuery, TaskRepository};
use crate::snapshot::{snapshot_to_task, task_to_snapshot};
use log::{info, warn};

/// Batch size used when the caller has no preference.
pub const DEFAULT_BATCH_SIZE: u32 = 256;

/// Outcome of a completed migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    /// Number of records copied and verified.
    pub migrated: usize,
}

/// Copies every record from `source` to `destination` in batches.
///
/// Records travel through the snapshot codec, so a migration exercises the
/// same encoding both engines persist. Ids already present in the
/// destination fail the whole migration with `Validation`.
pub fn migrate_tasks(
    source: &dyn TaskRepository,
    destination: &dyn TaskRepository,
    batch_size: u32,
) -> StorageResult<MigrationReport> {
    if batch_size == 0 {
        return Err(StorageError::validation("batch size must be at least 1"));
    }

    info!("event=migrate module=migrate status=start batch_size={batch_size}");

    let mut written: Vec<TaskId> = Vec::new();
    let mut offset: u32 = 0;

    loop {
        let batch = match source.find(&TaskQuery {
            limit: Some(batch_size),
            offset,
            ..TaskQuery::default()
        }) {
            Ok(batch) => batch,
            Err(err) => return rollback(destination, &written, err),
        };
        if batch.is_empty() {
            break;
        }

        for task in &batch {
            let snapshot = task_to_snapshot(task);
            let decoded = match snapshot_to_task(&snapshot) {
                Ok(decoded) => decoded,
                Err(err) => return rollback(destination, &written, err),
            };
            if let Err(err) = destination.create(&decoded) {
                return rollback(destination, &written, err);
            }
            written.push(decoded.id);
        }

        // Verify the batch before fetching the next one, so a divergence
        // aborts with at most one batch written since the last check.
        for task in &batch {
            let stored = match destination.get(task.id) {
                Ok(stored) => stored,
                Err(err) => return rollback(destination, &written, err),
            };
            if stored != *task {
                let err = StorageError::snapshot(format!(
                    "migrated task {} does not match its source record",
                    task.id
                ));
                return rollback(destination, &written, err);
            }
        }

        offset += batch.len() as u32;
    }

    info!(
        "event=migrate module=migrate status=ok migrated={}",
        written.len()
    );
    Ok(MigrationReport {
        migrated: written.len(),
    })
}

fn rollback<T>(
    destination: &dyn TaskRepository,
    written: &[TaskId],
    err: StorageError,
) -> StorageResult<T> {
    warn!(
        "event=migrate module=migrate status=rollback written={} error={err}",
        written.len()
    );
    for id in written {
        if let Err(cleanup_err) = destination.delete(*id) {
            warn!(
                "event=migrate module=migrate status=rollback_incomplete id={id} error={cleanup_err}"
            );
        }
    }
    Err(err)
}
