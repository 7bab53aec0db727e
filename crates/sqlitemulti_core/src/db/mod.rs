//! SQLite connection bootstrap types and error taxonomy.
//!
//! # Responsibility
//! - Define connection options shared by handle and worker.
//! - Open and configure the single worker-owned connection.
//!
//! # Invariants
//! - Connections are only ever constructed for, and owned by, the worker
//!   thread; this module never stores one.
//! - Returned connections have the configured busy timeout applied.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

mod open;

pub(crate) use open::open_target;

pub type DbResult<T> = Result<T, DbError>;

/// Connection bootstrap error.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The worker thread could not be spawned.
    WorkerSpawn(std::io::Error),
    /// The worker thread died before reporting readiness.
    WorkerUnavailable,
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::WorkerSpawn(err) => write!(f, "failed to spawn worker thread: {err}"),
            Self::WorkerUnavailable => {
                write!(f, "worker thread exited before the database was ready")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::WorkerSpawn(err) => Some(err),
            Self::WorkerUnavailable => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Implicit transaction behavior for write commands.
///
/// `Autocommit` makes every statement durable on its own. The other modes
/// lazily open a matching `BEGIN` before the first write and keep the
/// transaction open until an explicit commit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionMode {
    Autocommit,
    Deferred,
    Immediate,
    Exclusive,
}

impl TransactionMode {
    /// SQL used to open the implicit transaction, `None` when autocommitting.
    pub(crate) fn begin_sql(self) -> Option<&'static str> {
        match self {
            Self::Autocommit => None,
            Self::Deferred => Some("BEGIN DEFERRED;"),
            Self::Immediate => Some("BEGIN IMMEDIATE;"),
            Self::Exclusive => Some("BEGIN EXCLUSIVE;"),
        }
    }
}

/// Options applied when the worker opens its connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenOptions {
    /// How long SQLite retries on a locked database before failing.
    pub busy_timeout: Duration,
    /// Treat the database path as a `file:` URI.
    pub uri: bool,
    /// Implicit transaction behavior for write commands.
    pub transaction_mode: TransactionMode,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            uri: false,
            transaction_mode: TransactionMode::Deferred,
        }
    }
}

/// Where the worker opens its database.
#[derive(Debug, Clone)]
pub(crate) enum DbTarget {
    File(PathBuf),
    InMemory,
}

impl DbTarget {
    pub(crate) fn mode_label(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::InMemory => "memory",
        }
    }
}
