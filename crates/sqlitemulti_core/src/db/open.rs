//! Connection opening for the worker thread.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections per [`OpenOptions`].
//! - Apply the busy timeout before the connection is handed to the worker.
//!
//! # Invariants
//! - Every successful open has the busy timeout configured.
//! - `db_open` events are emitted for both outcomes with duration.

use super::{DbResult, DbTarget, OpenOptions};
use log::{error, info};
use rusqlite::{Connection, OpenFlags};
use std::time::Instant;

/// Opens the worker connection for `target` and configures it.
pub(crate) fn open_target(target: &DbTarget, options: &OpenOptions) -> DbResult<Connection> {
    let mode = target.mode_label();
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    match try_open(target, options) {
        Ok(conn) => {
            info!(
                "event=db_open module=db status=ok mode={mode} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error={err}",
                started_at.elapsed().as_millis()
            );
            Err(err)
        }
    }
}

fn try_open(target: &DbTarget, options: &OpenOptions) -> DbResult<Connection> {
    let conn = match target {
        DbTarget::File(path) => Connection::open_with_flags(path, open_flags(options))?,
        DbTarget::InMemory => Connection::open_in_memory()?,
    };
    conn.busy_timeout(options.busy_timeout)?;
    Ok(conn)
}

fn open_flags(options: &OpenOptions) -> OpenFlags {
    let mut flags = OpenFlags::default();
    if !options.uri {
        flags.remove(OpenFlags::SQLITE_OPEN_URI);
    }
    flags
}
