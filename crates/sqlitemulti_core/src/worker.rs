//! Serialized SQL executor owning the only database connection.
//!
//! # Responsibility
//! - Process queued commands in strict arrival order on one thread.
//! - Implement implicit transaction behavior per [`TransactionMode`].
//! - Answer every data-carrying request exactly once.
//!
//! # Invariants
//! - The connection is created and dropped on the worker thread only.
//! - Multi-statement transactions commit as a whole or roll back entirely.
//! - A failing command produces an error reply, never a silent drop.

use crate::command::{ReplySender, Row, SqlOutcome, SqlRequest, Statement};
use crate::db::{open_target, DbError, DbTarget, OpenOptions, TransactionMode};
use log::{debug, error, info};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;

/// Error produced while executing a command on the worker thread.
#[derive(Debug)]
pub enum WorkerError {
    Sqlite(rusqlite::Error),
    /// A transaction batch failed and was rolled back.
    Rollback {
        /// Zero-based index of the failing statement within the batch.
        statement_index: usize,
        source: rusqlite::Error,
    },
}

impl Display for WorkerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Rollback {
                statement_index,
                source,
            } => write!(
                f,
                "transaction rolled back at statement {statement_index}: {source}"
            ),
        }
    }
}

impl Error for WorkerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Rollback { source, .. } => Some(source),
        }
    }
}

impl From<rusqlite::Error> for WorkerError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Worker loop entry point.
///
/// Opens the connection, reports readiness on `ready`, then serves requests
/// until a `Stop` command arrives or every handle has been dropped.
pub(crate) fn run_worker(
    target: DbTarget,
    options: OpenOptions,
    requests: Receiver<SqlRequest>,
    ready: Sender<Result<(), DbError>>,
    pending: Arc<AtomicUsize>,
) {
    let conn = match open_target(&target, &options) {
        Ok(conn) => {
            if ready.send(Ok(())).is_err() {
                // Connecting caller vanished before the handshake finished.
                return;
            }
            conn
        }
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    info!(
        "event=worker_start module=worker status=ok mode={}",
        target.mode_label()
    );

    loop {
        let Ok(request) = requests.recv() else {
            info!("event=worker_stop module=worker status=ok reason=disconnected");
            return;
        };

        debug!(
            "event=sql_command module=worker command={}",
            request.command_label()
        );
        let stop = matches!(request, SqlRequest::Stop);
        dispatch(&conn, options.transaction_mode, request);
        pending.fetch_sub(1, Ordering::SeqCst);

        if stop {
            info!("event=worker_stop module=worker status=ok reason=stop");
            return;
        }
    }
}

fn dispatch(conn: &Connection, mode: TransactionMode, request: SqlRequest) {
    match request {
        SqlRequest::Execute {
            statement,
            commit,
            reply,
        } => {
            let result = execute_one(conn, mode, statement, commit).map(SqlOutcome::Changes);
            send_reply("execute", &reply, result);
        }
        SqlRequest::ExecuteTransaction { statements, reply } => {
            let result = execute_transaction(conn, statements).map(SqlOutcome::Changes);
            send_reply("execute_transaction", &reply, result);
        }
        SqlRequest::ExecuteMany {
            sql,
            params_seq,
            reply,
        } => {
            let result = execute_many(conn, mode, &sql, params_seq).map(SqlOutcome::Changes);
            send_reply("execute_many", &reply, result);
        }
        SqlRequest::FetchOne { statement, reply } => {
            let result = fetch_first_row(conn, statement)
                .map(SqlOutcome::Row)
                .map_err(WorkerError::Sqlite);
            send_reply("fetch_one", &reply, result);
        }
        SqlRequest::FetchAll { statement, reply } => {
            let result = fetch_all_rows(conn, statement)
                .map(SqlOutcome::Rows)
                .map_err(WorkerError::Sqlite);
            send_reply("fetch_all", &reply, result);
        }
        SqlRequest::Commit { reply } => {
            let result = commit_open_transaction(conn).map(|()| SqlOutcome::Committed);
            send_reply("commit", &reply, result);
        }
        SqlRequest::Stop => {}
    }
}

fn send_reply(command: &str, reply: &ReplySender, result: Result<SqlOutcome, WorkerError>) {
    if let Err(err) = &result {
        error!("event=sql_error module=worker command={command} error={err}");
    }
    if reply.send(result).is_err() {
        // Caller gave up waiting; nothing left to notify.
        debug!("event=reply_dropped module=worker command={command}");
    }
}

fn execute_one(
    conn: &Connection,
    mode: TransactionMode,
    statement: Statement,
    commit: bool,
) -> Result<usize, WorkerError> {
    if is_dml(&statement.sql) {
        begin_if_needed(conn, mode)?;
    }
    let changes = run_statement(conn, statement)?;
    if commit {
        commit_open_transaction(conn)?;
    }
    Ok(changes)
}

/// Executes a batch atomically and returns the summed affected-row count.
///
/// The batch shares the implicit transaction when one is already open, so a
/// rollback also discards earlier uncommitted work.
fn execute_transaction(
    conn: &Connection,
    statements: Vec<Statement>,
) -> Result<usize, WorkerError> {
    if conn.is_autocommit() {
        conn.execute_batch("BEGIN DEFERRED;")
            .map_err(WorkerError::Sqlite)?;
    }

    let mut total_changes = 0;
    for (index, statement) in statements.into_iter().enumerate() {
        match run_statement(conn, statement) {
            Ok(changes) => total_changes += changes,
            Err(WorkerError::Sqlite(source)) => {
                if let Err(rollback_err) = conn.execute_batch("ROLLBACK;") {
                    error!(
                        "event=rollback_failed module=worker error={rollback_err}"
                    );
                }
                return Err(WorkerError::Rollback {
                    statement_index: index,
                    source,
                });
            }
            Err(other) => return Err(other),
        }
    }

    conn.execute_batch("COMMIT;").map_err(WorkerError::Sqlite)?;
    Ok(total_changes)
}

fn execute_many(
    conn: &Connection,
    mode: TransactionMode,
    sql: &str,
    params_seq: Vec<Vec<Value>>,
) -> Result<usize, WorkerError> {
    if is_dml(sql) {
        begin_if_needed(conn, mode)?;
    }

    let mut stmt = conn.prepare(sql)?;
    let mut total_changes = 0;
    for params in params_seq {
        total_changes += stmt.execute(params_from_iter(params))?;
    }

    commit_open_transaction(conn)?;
    Ok(total_changes)
}

/// Runs one statement, tolerating row-returning SQL such as `PRAGMA`.
///
/// Row-returning statements are drained and report zero changes; DML
/// reports the affected-row count.
fn run_statement(conn: &Connection, statement: Statement) -> Result<usize, WorkerError> {
    let Statement { sql, params } = statement;
    let mut stmt = conn.prepare(&sql)?;
    if stmt.column_count() > 0 {
        let mut rows = stmt.query(params_from_iter(params))?;
        while rows.next()?.is_some() {}
        Ok(0)
    } else {
        Ok(stmt.execute(params_from_iter(params))?)
    }
}

fn fetch_first_row(conn: &Connection, statement: Statement) -> rusqlite::Result<Option<Row>> {
    let Statement { sql, params } = statement;
    let mut stmt = conn.prepare(&sql)?;
    let column_count = stmt.column_count();
    let mut rows = stmt.query(params_from_iter(params))?;
    match rows.next()? {
        Some(row) => Ok(Some(read_row(row, column_count)?)),
        None => Ok(None),
    }
}

fn fetch_all_rows(conn: &Connection, statement: Statement) -> rusqlite::Result<Vec<Row>> {
    let Statement { sql, params } = statement;
    let mut stmt = conn.prepare(&sql)?;
    let column_count = stmt.column_count();
    let mut rows = stmt.query(params_from_iter(params))?;
    let mut fetched = Vec::new();
    while let Some(row) = rows.next()? {
        fetched.push(read_row(row, column_count)?);
    }
    Ok(fetched)
}

fn read_row(row: &rusqlite::Row<'_>, column_count: usize) -> rusqlite::Result<Row> {
    let mut values = Vec::with_capacity(column_count);
    for index in 0..column_count {
        values.push(row.get::<_, Value>(index)?);
    }
    Ok(values)
}

/// Whether a statement is data modification language.
///
/// Only DML opens the implicit transaction; DDL, `SELECT` and `PRAGMA`
/// run directly (the dbapi rule, matched by keyword prefix).
fn is_dml(sql: &str) -> bool {
    const DML_KEYWORDS: [&str; 4] = ["INSERT", "UPDATE", "DELETE", "REPLACE"];
    let trimmed = sql.trim_start();
    DML_KEYWORDS.iter().any(|keyword| {
        trimmed
            .get(..keyword.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(keyword))
    })
}

fn begin_if_needed(conn: &Connection, mode: TransactionMode) -> Result<(), WorkerError> {
    let Some(begin_sql) = mode.begin_sql() else {
        return Ok(());
    };
    if conn.is_autocommit() {
        conn.execute_batch(begin_sql)?;
    }
    Ok(())
}

fn commit_open_transaction(conn: &Connection) -> Result<(), WorkerError> {
    if !conn.is_autocommit() {
        conn.execute_batch("COMMIT;")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        commit_open_transaction, execute_one, execute_transaction, is_dml, run_statement,
        WorkerError,
    };
    use crate::db::TransactionMode;
    use crate::command::Statement;
    use rusqlite::types::Value;
    use rusqlite::Connection;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, label TEXT NOT NULL);")
            .unwrap();
        conn
    }

    #[test]
    fn run_statement_reports_affected_rows() {
        let conn = test_conn();
        let changes = run_statement(
            &conn,
            Statement::with_params(
                "INSERT INTO t (label) VALUES (?1)",
                vec![Value::Text("a".to_string())],
            ),
        )
        .unwrap();
        assert_eq!(changes, 1);
    }

    #[test]
    fn run_statement_drains_row_returning_sql() {
        let conn = test_conn();
        let changes = run_statement(&conn, Statement::new("PRAGMA journal_mode")).unwrap();
        assert_eq!(changes, 0);
    }

    #[test]
    fn transaction_failure_rolls_back_earlier_statements() {
        let conn = test_conn();
        let err = execute_transaction(
            &conn,
            vec![
                Statement::with_params(
                    "INSERT INTO t (label) VALUES (?1)",
                    vec![Value::Text("kept?".to_string())],
                ),
                Statement::new("INSERT INTO missing_table VALUES (1)"),
            ],
        )
        .unwrap_err();

        match err {
            WorkerError::Rollback {
                statement_index, ..
            } => assert_eq!(statement_index, 1),
            other => panic!("unexpected error: {other}"),
        }

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn transaction_success_commits_all_statements() {
        let conn = test_conn();
        let total = execute_transaction(
            &conn,
            vec![
                Statement::with_params(
                    "INSERT INTO t (label) VALUES (?1)",
                    vec![Value::Text("a".to_string())],
                ),
                Statement::with_params(
                    "INSERT INTO t (label) VALUES (?1)",
                    vec![Value::Text("b".to_string())],
                ),
            ],
        )
        .unwrap();
        assert_eq!(total, 2);
        assert!(conn.is_autocommit());
    }

    #[test]
    fn commit_without_open_transaction_is_a_noop() {
        let conn = test_conn();
        assert!(conn.is_autocommit());
        commit_open_transaction(&conn).unwrap();
    }

    #[test]
    fn only_dml_keywords_are_recognized() {
        assert!(is_dml("INSERT INTO t VALUES (1)"));
        assert!(is_dml("  update t set label = 'x'"));
        assert!(is_dml("Replace INTO t VALUES (1)"));
        assert!(!is_dml("SELECT * FROM t"));
        assert!(!is_dml("CREATE TABLE u (id INTEGER)"));
        assert!(!is_dml("PRAGMA journal_mode = WAL"));
    }

    #[test]
    fn dml_opens_the_implicit_transaction_and_non_dml_does_not() {
        let conn = test_conn();

        execute_one(
            &conn,
            TransactionMode::Deferred,
            Statement::new("CREATE TABLE u (id INTEGER)"),
            false,
        )
        .unwrap();
        assert!(conn.is_autocommit());

        execute_one(
            &conn,
            TransactionMode::Deferred,
            Statement::with_params(
                "INSERT INTO t (label) VALUES (?1)",
                vec![Value::Text("open".to_string())],
            ),
            false,
        )
        .unwrap();
        assert!(!conn.is_autocommit());

        commit_open_transaction(&conn).unwrap();
        assert!(conn.is_autocommit());
    }
}
