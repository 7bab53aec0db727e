//! Serialized multi-thread access to a single SQLite database.
//!
//! One dedicated worker thread owns the only connection; cloneable
//! [`SqliteMulti`] handles enqueue commands and block for the reply, so any
//! number of threads can share one database without caller-side locking.

pub mod command;
pub mod db;
pub mod logging;
pub mod multi;
pub mod worker;

pub use command::{Row, Statement};
pub use db::{DbError, DbResult, OpenOptions, TransactionMode};
pub use logging::{default_log_level, init_logging, logging_status};
pub use multi::{MultiError, MultiResult, QueueStatus, SqliteMulti};
pub use rusqlite::types::Value;
pub use worker::WorkerError;

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
