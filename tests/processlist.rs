//! Process tracking, SHOW PROCESSLIST, and KILL

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::*;
use opalsql::expr::Expression;
use opalsql::plan::Node;
use opalsql::process::ProcessCommand;
use opalsql::types::Value;

fn sleep_plan(seconds: i64) -> Node {
    Node::project(
        vec![Expression::UnresolvedFunction {
            name: "SLEEP".into(),
            args: vec![lit(seconds)],
        }],
        Node::Values { rows: vec![vec![]] },
    )
}

#[test]
fn test_processes_track_query_and_sleep_states() {
    let ctx = TestContext::new();
    int_table(&ctx, "t", &[(1, 10)]);

    // Idle connection: exactly one process, sleeping.
    let procs = ctx.engine.process_list().processes();
    assert_eq!(procs.len(), 1);
    assert_eq!(procs[0].command, ProcessCommand::Sleep);

    // After a completed query the connection is sleeping again.
    ctx.query(
        "SELECT a FROM t",
        &select(vec![col("a")], Node::table("t")),
    )
    .unwrap();
    let procs = ctx.engine.process_list().processes();
    assert_eq!(procs.len(), 1);
    assert_eq!(procs[0].command, ProcessCommand::Sleep);
    assert_eq!(procs[0].query, "");
}

#[test]
fn test_show_processlist_reports_running_queries() {
    let ctx = TestContext::new();
    let session_b = ctx.connect(2, "127.0.0.1:34568");

    // Start a query on connection 1 but do not finish it: analyze and hold
    // the iterator.
    let qctx = ctx.engine.context(Arc::clone(&ctx.session));
    let (_schema, iter, qctx) = ctx
        .engine
        .query(qctx, "SELECT SLEEP(10)", &sleep_plan(10))
        .unwrap();

    let rows = ctx
        .query_as(session_b, "SHOW PROCESSLIST", &Node::ShowProcessList)
        .unwrap();
    assert_eq!(rows.len(), 2);
    let conn1 = rows
        .iter()
        .find(|r| r[0] == Value::I64(1))
        .expect("connection 1 listed");
    assert_eq!(conn1[4], Value::Str("Query".into()));
    assert_eq!(conn1[7], Value::Str("SELECT SLEEP(10)".into()));

    let mut iter = iter;
    iter.close(&qctx).unwrap();
}

#[test]
fn test_kill_query_cancels_within_bounded_time() {
    let ctx = TestContext::new();
    let session_b = ctx.connect(2, "127.0.0.1:34568");

    let qctx = ctx.engine.context(Arc::clone(&ctx.session));
    let (_schema, iter, qctx) = ctx
        .engine
        .query(qctx, "SELECT SLEEP(10)", &sleep_plan(10))
        .unwrap();

    // Drive connection 1's iterator on its own thread, as its connection
    // thread would.
    let handle = std::thread::spawn(move || {
        let started = Instant::now();
        let result = opalsql::execution::collect(&qctx, iter);
        (result, started.elapsed())
    });

    // Give the sleeping query a moment to get going, then kill it from
    // connection 2.
    std::thread::sleep(Duration::from_millis(100));
    ctx.query_as(
        Arc::clone(&session_b),
        "KILL QUERY 1",
        &Node::Kill {
            connection_id: 1,
            query_only: true,
        },
    )
    .unwrap();

    let (result, elapsed) = handle.join().expect("query thread");
    assert!(
        matches!(result, Err(ref e) if e.is_cancelled()),
        "expected cancellation, got {result:?}"
    );
    assert!(
        elapsed < Duration::from_secs(5),
        "kill took too long: {elapsed:?}"
    );

    // Connection 1 shows as sleeping afterwards.
    let rows = ctx
        .query_as(session_b, "SHOW PROCESSLIST", &Node::ShowProcessList)
        .unwrap();
    let conn1 = rows
        .iter()
        .find(|r| r[0] == Value::I64(1))
        .expect("connection 1 listed");
    assert_eq!(conn1[4], Value::Str("Sleep".into()));
}

#[test]
fn test_duplicate_pid_is_rejected() {
    let ctx = TestContext::new();
    let session_b = ctx.connect(2, "b");

    let ctx_a = ctx.engine.context(Arc::clone(&ctx.session)).with_pid(42);
    let (_s, _iter, _ctx_a) = ctx
        .engine
        .query(ctx_a, "SELECT SLEEP(1)", &sleep_plan(1))
        .unwrap();

    let ctx_b = ctx.engine.context(session_b).with_pid(42);
    let err = ctx
        .engine
        .query(ctx_b, "SELECT 1", &sleep_plan(0))
        .unwrap_err();
    assert_eq!(err, opalsql::Error::PidAlreadyUsed(42));
}

#[test]
fn test_table_progress_is_registered_for_tracked_scans() {
    let ctx = TestContext::new();
    ctx.create_table(
        "p",
        opalsql::types::Schema::new(vec![opalsql::types::Column::new(
            "a",
            opalsql::types::DataType::I64,
        )])
        .unwrap(),
        vec![],
    );

    let qctx = ctx.engine.context(Arc::clone(&ctx.session));
    let (_schema, iter, qctx) = ctx
        .engine
        .query(
            qctx,
            "SELECT a FROM p",
            &select(vec![col("a")], Node::table("p")),
        )
        .unwrap();

    // Progress totals are registered at analysis time.
    let procs = ctx.engine.process_list().processes();
    let progress = &procs[0].progress;
    assert!(progress.contains_key("p"), "progress: {progress:?}");
    assert_eq!(progress["p"].progress.total, 1);

    let mut iter = iter;
    iter.close(&qctx).unwrap();
}
