use sqlitemulti_core::{MultiError, SqliteMulti, Value};

#[test]
fn join_without_stop_is_rejected() {
    let db = SqliteMulti::connect_in_memory().unwrap();
    let err = db.join().unwrap_err();
    assert!(matches!(err, MultiError::StopNotRequested));
    db.stop();
    db.join().unwrap();
}

#[test]
fn stop_then_join_shuts_the_worker_down() {
    let db = SqliteMulti::connect_in_memory().unwrap();
    db.execute("CREATE TABLE t (id INTEGER)", vec![], true).unwrap();

    db.stop();
    db.join().unwrap();

    let status = db.status();
    assert!(status.stopping);
    assert_eq!(status.pending_commands, 0);
}

#[test]
fn stop_is_idempotent_across_clones() {
    let db = SqliteMulti::connect_in_memory().unwrap();
    let clone = db.clone();

    db.stop();
    clone.stop();
    clone.join().unwrap();
    db.join().unwrap();
}

#[test]
fn calls_after_stop_fail_instead_of_blocking() {
    let db = SqliteMulti::connect_in_memory().unwrap();
    db.stop();

    let err = db.execute("SELECT 1", vec![], false).unwrap_err();
    assert!(matches!(err, MultiError::Disconnected));
    let err = db.fetch_all("SELECT 1", vec![]).unwrap_err();
    assert!(matches!(err, MultiError::Disconnected));

    db.join().unwrap();
}

#[test]
fn clones_share_one_worker_and_database() {
    let db = SqliteMulti::connect_in_memory().unwrap();
    db.execute("CREATE TABLE t (id INTEGER)", vec![], true).unwrap();

    let clone = db.clone();
    clone
        .insert("INSERT INTO t (id) VALUES (?1)", vec![Value::Integer(7)])
        .unwrap();

    let row = db.fetch_one("SELECT id FROM t", vec![]).unwrap().unwrap();
    assert_eq!(row, vec![Value::Integer(7)]);

    db.stop();
    db.join().unwrap();
}

#[test]
fn status_reflects_stop_request() {
    let db = SqliteMulti::connect_in_memory().unwrap();
    assert!(!db.status().stopping);
    db.stop();
    assert!(db.status().stopping);
    assert!(db.status().to_string().contains("(stopping)"));
    db.join().unwrap();
}
