//! Thread-safe SQLite facade backed by a single worker thread.
//!
//! # Responsibility
//! - Expose blocking, call-site friendly SQL operations to any thread.
//! - Own worker lifecycle: spawn, readiness handshake, stop and join.
//!
//! # Invariants
//! - All clones of a handle talk to the same worker and database.
//! - Every call either receives the worker's reply or fails with
//!   `Disconnected`; callers never block on a dead worker.
//! - `join()` requires a prior `stop()` on some clone of the handle.

use crate::command::{ReplySender, Row, SqlOutcome, SqlRequest, Statement};
use crate::db::{DbError, DbTarget, OpenOptions};
use crate::worker::{run_worker, WorkerError};
use log::{debug, info};
use rusqlite::types::Value;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

pub type MultiResult<T> = Result<T, MultiError>;

/// Caller-facing error for serialized SQL operations.
#[derive(Debug)]
pub enum MultiError {
    /// Connection bootstrap failed while spawning the worker.
    Db(DbError),
    /// A statement failed on the worker.
    Sqlite(rusqlite::Error),
    /// A transaction batch failed and was rolled back.
    Rollback {
        statement_index: usize,
        source: rusqlite::Error,
    },
    /// The worker is gone; the command queue is closed.
    Disconnected,
    /// `join()` was called without a prior `stop()`.
    StopNotRequested,
    /// The worker thread panicked.
    WorkerPanicked,
    /// The worker answered with a payload the call did not expect.
    InconsistentReply(&'static str),
}

impl Display for MultiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Rollback {
                statement_index,
                source,
            } => write!(
                f,
                "transaction rolled back at statement {statement_index}: {source}"
            ),
            Self::Disconnected => write!(f, "worker is not running"),
            Self::StopNotRequested => write!(f, "join requires a prior stop"),
            Self::WorkerPanicked => write!(f, "worker thread panicked"),
            Self::InconsistentReply(details) => {
                write!(f, "inconsistent worker reply: {details}")
            }
        }
    }
}

impl Error for MultiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Sqlite(err) => Some(err),
            Self::Rollback { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<DbError> for MultiError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<WorkerError> for MultiError {
    fn from(value: WorkerError) -> Self {
        match value {
            WorkerError::Sqlite(err) => Self::Sqlite(err),
            WorkerError::Rollback {
                statement_index,
                source,
            } => Self::Rollback {
                statement_index,
                source,
            },
        }
    }
}

/// Queue occupancy snapshot returned by [`SqliteMulti::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    /// Commands enqueued and not yet finished by the worker.
    pub pending_commands: usize,
    /// Whether `stop()` has been requested on any clone.
    pub stopping: bool,
}

impl Display for QueueStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} commands pending", self.pending_commands)?;
        if self.stopping {
            write!(f, " (stopping)")?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct WorkerShared {
    pending: Arc<AtomicUsize>,
    stopping: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerShared {
    fn worker_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Cloneable handle to one serialized SQLite worker.
///
/// Cloning is cheap; clones may be moved freely across threads. Dropping
/// every clone without `stop()` closes the command queue and the worker
/// shuts down on its own after finishing queued work.
#[derive(Debug)]
pub struct SqliteMulti {
    sender: Sender<SqlRequest>,
    shared: Arc<WorkerShared>,
}

impl Clone for SqliteMulti {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl SqliteMulti {
    /// Connects to a file-backed database with default options.
    ///
    /// # Contract
    /// - Spawns the worker thread and blocks until the database is open.
    /// - Open failures surface here, not on the first statement.
    pub fn connect(path: impl AsRef<Path>) -> MultiResult<Self> {
        Self::connect_with(path, OpenOptions::default())
    }

    /// Connects to a file-backed database with explicit options.
    pub fn connect_with(path: impl AsRef<Path>, options: OpenOptions) -> MultiResult<Self> {
        Self::spawn(DbTarget::File(path.as_ref().to_path_buf()), options)
    }

    /// Connects to a private in-memory database with default options.
    pub fn connect_in_memory() -> MultiResult<Self> {
        Self::connect_in_memory_with(OpenOptions::default())
    }

    /// Connects to a private in-memory database with explicit options.
    pub fn connect_in_memory_with(options: OpenOptions) -> MultiResult<Self> {
        Self::spawn(DbTarget::InMemory, options)
    }

    fn spawn(target: DbTarget, options: OpenOptions) -> MultiResult<Self> {
        let (sender, requests) = channel();
        let (ready_tx, ready_rx) = channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker_pending = Arc::clone(&pending);

        let handle = thread::Builder::new()
            .name("sqlitemulti-worker".to_string())
            .spawn(move || run_worker(target, options, requests, ready_tx, worker_pending))
            .map_err(DbError::WorkerSpawn)?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = handle.join();
                return Err(err.into());
            }
            Err(_) => {
                let _ = handle.join();
                return Err(DbError::WorkerUnavailable.into());
            }
        }

        Ok(Self {
            sender,
            shared: Arc::new(WorkerShared {
                pending,
                stopping: AtomicBool::new(false),
                worker: Mutex::new(Some(handle)),
            }),
        })
    }

    /// Executes one statement and returns the affected-row count.
    ///
    /// Row-returning statements (e.g. `PRAGMA journal_mode = WAL`) are
    /// accepted and report zero changes. With `commit = true` any open
    /// implicit transaction is committed after the statement.
    pub fn execute(&self, sql: &str, params: Vec<Value>, commit: bool) -> MultiResult<usize> {
        let outcome = self.send_request(|reply| SqlRequest::Execute {
            statement: Statement::with_params(sql, params),
            commit,
            reply,
        })?;
        expect_changes(outcome)
    }

    /// Executes a statement batch atomically.
    ///
    /// # Contract
    /// - Statements run in order inside one transaction.
    /// - On failure the whole batch is rolled back and the error names the
    ///   failing statement index.
    /// - On success the batch is committed and the summed affected-row
    ///   count is returned.
    pub fn execute_transaction(&self, statements: Vec<Statement>) -> MultiResult<usize> {
        let outcome =
            self.send_request(|reply| SqlRequest::ExecuteTransaction { statements, reply })?;
        expect_changes(outcome)
    }

    /// Executes one statement repeatedly over a parameter sequence.
    ///
    /// Commits after the sequence, mirroring classic `executemany`
    /// semantics. Returns the summed affected-row count.
    pub fn execute_many(&self, sql: &str, params_seq: Vec<Vec<Value>>) -> MultiResult<usize> {
        let outcome = self.send_request(|reply| SqlRequest::ExecuteMany {
            sql: sql.to_string(),
            params_seq,
            reply,
        })?;
        expect_changes(outcome)
    }

    /// Executes an `INSERT`-shaped statement and commits.
    ///
    /// Convenience for `execute(sql, params, true)`; returns the
    /// affected-row count.
    pub fn insert(&self, sql: &str, params: Vec<Value>) -> MultiResult<usize> {
        self.execute(sql, params, true)
    }

    /// Executes a `DELETE`-shaped statement and commits.
    ///
    /// Convenience for `execute(sql, params, true)`; returns the
    /// affected-row count.
    pub fn delete(&self, sql: &str, params: Vec<Value>) -> MultiResult<usize> {
        self.execute(sql, params, true)
    }

    /// Runs a query and returns its first row, if any.
    pub fn fetch_one(&self, sql: &str, params: Vec<Value>) -> MultiResult<Option<Row>> {
        let outcome = self.send_request(|reply| SqlRequest::FetchOne {
            statement: Statement::with_params(sql, params),
            reply,
        })?;
        match outcome {
            SqlOutcome::Row(row) => Ok(row),
            _ => Err(MultiError::InconsistentReply("expected single row reply")),
        }
    }

    /// Runs a query and returns all rows.
    pub fn fetch_all(&self, sql: &str, params: Vec<Value>) -> MultiResult<Vec<Row>> {
        let outcome = self.send_request(|reply| SqlRequest::FetchAll {
            statement: Statement::with_params(sql, params),
            reply,
        })?;
        match outcome {
            SqlOutcome::Rows(rows) => Ok(rows),
            _ => Err(MultiError::InconsistentReply("expected row list reply")),
        }
    }

    /// Commits any open implicit transaction.
    pub fn commit(&self) -> MultiResult<()> {
        let outcome = self.send_request(|reply| SqlRequest::Commit { reply })?;
        match outcome {
            SqlOutcome::Committed => Ok(()),
            _ => Err(MultiError::InconsistentReply("expected commit ack")),
        }
    }

    /// Requests worker shutdown. Idempotent across clones.
    ///
    /// Commands already queued before the stop are still processed; new
    /// calls on any clone fail with `Disconnected`.
    pub fn stop(&self) {
        if self.shared.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("event=stop_requested module=multi status=ok");
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(SqlRequest::Stop).is_err() {
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
            debug!("event=stop_requested module=multi status=ok detail=worker_already_gone");
        }
    }

    /// Waits for the worker to finish.
    ///
    /// # Contract
    /// - Requires a prior `stop()` on some clone; otherwise fails with
    ///   `StopNotRequested` instead of blocking forever.
    /// - Joining an already-joined worker is a no-op.
    pub fn join(&self) -> MultiResult<()> {
        if !self.shared.stopping.load(Ordering::SeqCst) {
            return Err(MultiError::StopNotRequested);
        }
        let handle = self.shared.worker_slot().take();
        let Some(handle) = handle else {
            return Ok(());
        };
        handle.join().map_err(|_| MultiError::WorkerPanicked)
    }

    /// Returns a snapshot of queue occupancy and lifecycle state.
    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            pending_commands: self.shared.pending.load(Ordering::SeqCst),
            stopping: self.shared.stopping.load(Ordering::SeqCst),
        }
    }

    /// Enqueues one request and blocks until the worker answers.
    fn send_request(
        &self,
        build: impl FnOnce(ReplySender) -> SqlRequest,
    ) -> MultiResult<SqlOutcome> {
        if self.shared.stopping.load(Ordering::SeqCst) {
            return Err(MultiError::Disconnected);
        }

        let (reply_tx, reply_rx) = channel();
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(build(reply_tx)).is_err() {
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(MultiError::Disconnected);
        }

        match reply_rx.recv() {
            Ok(result) => result.map_err(MultiError::from),
            // Request was dropped unanswered; the worker is shutting down.
            Err(_) => Err(MultiError::Disconnected),
        }
    }
}

fn expect_changes(outcome: SqlOutcome) -> MultiResult<usize> {
    match outcome {
        SqlOutcome::Changes(changes) => Ok(changes),
        _ => Err(MultiError::InconsistentReply("expected change count reply")),
    }
}
