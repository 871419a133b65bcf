//! LOCK TABLES / UNLOCK TABLES lock accounting

mod common;

use std::sync::atomic::Ordering;

use common::*;
use opalsql::plan::{Node, TableLock};

fn lock_plan(locks: &[(&str, bool)]) -> Node {
    Node::LockTables {
        locks: locks
            .iter()
            .map(|(name, write)| TableLock {
                table: Node::table(name),
                write: *write,
            })
            .collect(),
    }
}

#[test]
fn test_lock_and_unlock_counters() {
    let ctx = TestContext::new();
    let t1 = int_table(&ctx, "t1", &[]);
    let t2 = int_table(&ctx, "t2", &[]);
    let t3 = int_table(&ctx, "t3", &[]);

    ctx.query(
        "LOCK TABLES t1 READ, t2 WRITE, t3 READ",
        &lock_plan(&[("t1", false), ("t2", true), ("t3", false)]),
    )
    .unwrap();

    assert_eq!(t1.locks.read_locks.load(Ordering::Relaxed), 1);
    assert_eq!(t1.locks.write_locks.load(Ordering::Relaxed), 0);
    assert_eq!(t2.locks.read_locks.load(Ordering::Relaxed), 0);
    assert_eq!(t2.locks.write_locks.load(Ordering::Relaxed), 1);
    assert_eq!(t3.locks.read_locks.load(Ordering::Relaxed), 1);
    assert_eq!(t1.locks.unlocks.load(Ordering::Relaxed), 0);

    ctx.query("UNLOCK TABLES", &Node::UnlockTables).unwrap();

    assert_eq!(t1.locks.unlocks.load(Ordering::Relaxed), 1);
    assert_eq!(t2.locks.unlocks.load(Ordering::Relaxed), 1);
    assert_eq!(t3.locks.unlocks.load(Ordering::Relaxed), 1);

    // Unlocking again is a no-op: nothing is recorded any more.
    ctx.query("UNLOCK TABLES", &Node::UnlockTables).unwrap();
    assert_eq!(t1.locks.unlocks.load(Ordering::Relaxed), 1);
}

#[test]
fn test_connection_close_releases_locks() {
    let ctx = TestContext::new();
    let t1 = int_table(&ctx, "t1", &[]);

    ctx.query("LOCK TABLES t1 WRITE", &lock_plan(&[("t1", true)]))
        .unwrap();
    assert_eq!(t1.locks.write_locks.load(Ordering::Relaxed), 1);

    let conn_ctx = ctx.engine.context(ctx.session.clone());
    ctx.engine.close_connection(&conn_ctx);
    assert_eq!(t1.locks.unlocks.load(Ordering::Relaxed), 1);
}
