//! Connection bootstrap utilities for the SQLite engine.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure durability pragmas and the bounded lock wait.
//! - Trigger schema migrations before returning a usable connection.
//!
//! # Invariants
//! - Returned connections have WAL journaling and `synchronous=FULL` set.
//! - Returned connections have migrations fully applied.
//! - Lock acquisition is bounded; a saturated wait surfaces as a busy error
//!   rather than blocking indefinitely.

use super::migrations::apply_migrations;
use super::DbResult;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Default bounded wait for a contended database lock.
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(5);

/// Opens a SQLite database file and applies all pending migrations.
///
/// # Side effects
/// - Performs connection bootstrap and migration checks.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>, lock_wait: Duration) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode=file");

    let mut conn = match Connection::open(path) {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode=file duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn, lock_wait) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode=file duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode=file duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

/// Opens an in-memory SQLite database and applies all pending migrations.
///
/// Used by tests and short-lived tooling; same bootstrap path as `open_db`.
pub fn open_db_in_memory() -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode=memory");

    let mut conn = match Connection::open_in_memory() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode=memory duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn, DEFAULT_LOCK_WAIT) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode=memory duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode=memory duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &mut Connection, lock_wait: Duration) -> DbResult<()> {
    // journal_mode returns its resulting mode as a row, so it cannot go
    // through execute_batch.
    conn.query_row("PRAGMA journal_mode = WAL;", [], |_row| Ok(()))?;
    conn.execute_batch("PRAGMA synchronous = FULL;")?;
    conn.busy_timeout(lock_wait)?;
    apply_migrations(conn)?;
    Ok(())
}
