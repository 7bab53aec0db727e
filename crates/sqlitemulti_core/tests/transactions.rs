use sqlitemulti_core::{
    MultiError, OpenOptions, SqliteMulti, Statement, TransactionMode, Value,
};

const SQL_CREATE: &str = "CREATE TABLE IF NOT EXISTS entries (id INTEGER PRIMARY KEY, label TEXT NOT NULL)";
const SQL_INSERT: &str = "INSERT INTO entries (label) VALUES (?1)";
const SQL_COUNT: &str = "SELECT COUNT(*) FROM entries";

fn label_params(label: &str) -> Vec<Value> {
    vec![Value::Text(label.to_string())]
}

fn count(db: &SqliteMulti) -> i64 {
    match db.fetch_one(SQL_COUNT, vec![]).unwrap() {
        Some(row) => match row[0] {
            Value::Integer(value) => value,
            ref other => panic!("unexpected count value: {other:?}"),
        },
        None => panic!("count query returned no row"),
    }
}

#[test]
fn transaction_batch_commits_as_a_whole() {
    let db = SqliteMulti::connect_in_memory().unwrap();
    db.execute(SQL_CREATE, vec![], true).unwrap();

    let total = db
        .execute_transaction(vec![
            Statement::with_params(SQL_INSERT, label_params("a")),
            Statement::with_params(SQL_INSERT, label_params("b")),
            Statement::with_params(SQL_INSERT, label_params("c")),
        ])
        .unwrap();
    assert_eq!(total, 3);
    assert_eq!(count(&db), 3);

    db.stop();
    db.join().unwrap();
}

#[test]
fn failing_batch_rolls_back_and_names_the_statement() {
    let db = SqliteMulti::connect_in_memory().unwrap();
    db.execute(SQL_CREATE, vec![], true).unwrap();

    let err = db
        .execute_transaction(vec![
            Statement::with_params(SQL_INSERT, label_params("kept?")),
            Statement::new("INSERT INTO no_such_table VALUES (1)"),
        ])
        .unwrap_err();

    match err {
        MultiError::Rollback {
            statement_index, ..
        } => assert_eq!(statement_index, 1),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(count(&db), 0);

    db.stop();
    db.join().unwrap();
}

#[test]
fn deferred_work_is_lost_without_commit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("deferred.db");

    let db = SqliteMulti::connect(&path).unwrap();
    db.execute(SQL_CREATE, vec![], true).unwrap();
    db.execute(SQL_INSERT, label_params("uncommitted"), false)
        .unwrap();
    db.stop();
    db.join().unwrap();

    let reopened = SqliteMulti::connect(&path).unwrap();
    assert_eq!(count(&reopened), 0);
    reopened.stop();
    reopened.join().unwrap();
}

#[test]
fn committed_work_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("committed.db");

    let db = SqliteMulti::connect(&path).unwrap();
    db.execute(SQL_CREATE, vec![], true).unwrap();
    db.execute(SQL_INSERT, label_params("first"), false).unwrap();
    db.commit().unwrap();
    db.stop();
    db.join().unwrap();

    let reopened = SqliteMulti::connect(&path).unwrap();
    assert_eq!(count(&reopened), 1);
    reopened.stop();
    reopened.join().unwrap();
}

#[test]
fn autocommit_mode_persists_without_explicit_commit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("autocommit.db");
    let options = OpenOptions {
        transaction_mode: TransactionMode::Autocommit,
        ..OpenOptions::default()
    };

    let db = SqliteMulti::connect_with(&path, options.clone()).unwrap();
    db.execute(SQL_CREATE, vec![], false).unwrap();
    db.execute(SQL_INSERT, label_params("durable"), false)
        .unwrap();
    db.stop();
    db.join().unwrap();

    let reopened = SqliteMulti::connect_with(&path, options).unwrap();
    assert_eq!(count(&reopened), 1);
    reopened.stop();
    reopened.join().unwrap();
}

#[test]
fn batch_is_atomic_even_under_autocommit() {
    let options = OpenOptions {
        transaction_mode: TransactionMode::Autocommit,
        ..OpenOptions::default()
    };
    let db = SqliteMulti::connect_in_memory_with(options).unwrap();
    db.execute(SQL_CREATE, vec![], false).unwrap();

    let err = db
        .execute_transaction(vec![
            Statement::with_params(SQL_INSERT, label_params("partial?")),
            Statement::new("not even sql"),
        ])
        .unwrap_err();
    assert!(matches!(err, MultiError::Rollback { .. }));
    assert_eq!(count(&db), 0);

    db.stop();
    db.join().unwrap();
}
