//! Wire types exchanged between handles and the worker.
//!
//! # Responsibility
//! - Define the command taxonomy processed by the worker loop.
//! - Define the typed payloads carried back on reply channels.
//!
//! # Invariants
//! - Every data-carrying request owns exactly one reply sender.
//! - Parameter vectors are bound positionally, in declaration order.

use crate::worker::WorkerError;
use rusqlite::types::Value;
use std::sync::mpsc::Sender;

/// One fetched row, column values in `SELECT` order.
pub type Row = Vec<Value>;

/// A single SQL statement with positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    /// Creates a parameterless statement.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Creates a statement with positional parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

pub(crate) type ReplySender = Sender<Result<SqlOutcome, WorkerError>>;

/// Reply payload produced by the worker.
#[derive(Debug)]
pub(crate) enum SqlOutcome {
    /// Affected-row count of an execute-shaped command.
    Changes(usize),
    /// First row of a query, if any.
    Row(Option<Row>),
    /// All rows of a query.
    Rows(Vec<Row>),
    /// An explicit commit completed.
    Committed,
}

/// Commands accepted by the worker, processed in strict arrival order.
#[derive(Debug)]
pub(crate) enum SqlRequest {
    Execute {
        statement: Statement,
        commit: bool,
        reply: ReplySender,
    },
    /// Atomic multi-statement transaction; committed as a whole or rolled
    /// back entirely.
    ExecuteTransaction {
        statements: Vec<Statement>,
        reply: ReplySender,
    },
    /// One statement bound repeatedly against a parameter sequence.
    ExecuteMany {
        sql: String,
        params_seq: Vec<Vec<Value>>,
        reply: ReplySender,
    },
    FetchOne {
        statement: Statement,
        reply: ReplySender,
    },
    FetchAll {
        statement: Statement,
        reply: ReplySender,
    },
    Commit {
        reply: ReplySender,
    },
    /// Terminates the worker loop; carries no reply.
    Stop,
}

impl SqlRequest {
    /// Stable command name for diagnostic events.
    pub(crate) fn command_label(&self) -> &'static str {
        match self {
            Self::Execute { .. } => "execute",
            Self::ExecuteTransaction { .. } => "execute_transaction",
            Self::ExecuteMany { .. } => "execute_many",
            Self::FetchOne { .. } => "fetch_one",
            Self::FetchAll { .. } => "fetch_all",
            Self::Commit { .. } => "commit",
            Self::Stop => "stop",
        }
    }
}
