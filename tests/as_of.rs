//! AS OF snapshot selection and its propagation through CALL chains

mod common;

use common::*;
use opalsql::catalog::ProcedureDefinition;
use opalsql::expr::Expression;
use opalsql::plan::Node;
use opalsql::types::{Column, DataType, Schema, Value};

/// A history table with one more row in each snapshot, mirroring a table
/// that grew over time.
fn versioned_table(ctx: &TestContext) {
    let table = ctx.create_table(
        "myhistorytable",
        Schema::new(vec![
            Column::new("id", DataType::I64),
            Column::new("msg", DataType::text()),
        ])
        .unwrap(),
        vec![],
    );
    table.put_rows([vec![Value::I64(1), Value::Str("first row, 1".into())]]);
    table.snapshot_as_of("2019-01-01");
    table.put_rows([vec![Value::I64(2), Value::Str("second row, 2".into())]]);
    table.snapshot_as_of("2019-01-02");
    table.put_rows([vec![Value::I64(3), Value::Str("third row, 3".into())]]);
    table.snapshot_as_of("2019-01-03");
}

fn select_history(as_of: Option<&str>) -> Node {
    Node::project(
        vec![Expression::Star { table: None }],
        Node::UnresolvedTable {
            database: None,
            name: "myhistorytable".into(),
            as_of: as_of.map(lit),
        },
    )
}

fn call(procedure: &str, as_of: Option<&str>) -> Node {
    Node::Call {
        database: None,
        procedure: procedure.into(),
        args: vec![],
        as_of: as_of.map(lit),
        body: None,
    }
}

fn procedures(ctx: &TestContext) {
    // p1 calls p2; p1a pins a snapshot on its nested call; p2 reads the
    // history table directly; p2a pins its own snapshot on the table.
    ctx.db.add_procedure(ProcedureDefinition {
        name: "p1".into(),
        params: vec![],
        body: call("p2", None),
    });
    ctx.db.add_procedure(ProcedureDefinition {
        name: "p1a".into(),
        params: vec![],
        body: call("p2", Some("2019-01-01")),
    });
    ctx.db.add_procedure(ProcedureDefinition {
        name: "p2".into(),
        params: vec![],
        body: select_history(None),
    });
    ctx.db.add_procedure(ProcedureDefinition {
        name: "p2a".into(),
        params: vec![],
        body: select_history(Some("2019-01-02")),
    });
}

fn row_count(ctx: &TestContext, text: &str, plan: &Node) -> usize {
    ctx.query(text, plan).unwrap_or_else(|e| panic!("{text}: {e}")).len()
}

#[test]
fn test_direct_as_of_reads_the_snapshot() {
    let ctx = TestContext::new();
    versioned_table(&ctx);

    assert_eq!(
        row_count(
            &ctx,
            "SELECT * FROM myhistorytable AS OF '2019-01-01'",
            &select_history(Some("2019-01-01"))
        ),
        1
    );
    assert_eq!(
        row_count(&ctx, "SELECT * FROM myhistorytable", &select_history(None)),
        3
    );
}

#[test]
fn test_as_of_propagates_to_nested_calls() {
    let ctx = TestContext::new();
    versioned_table(&ctx);
    procedures(&ctx);

    // CALL p1() AS OF '2019-01-01' runs p2's SELECT against the 2019-01-01
    // snapshot.
    assert_eq!(
        row_count(
            &ctx,
            "CALL p1() AS OF '2019-01-01'",
            &call("p1", Some("2019-01-01"))
        ),
        1
    );
    // Without AS OF the current contents are visible.
    assert_eq!(row_count(&ctx, "CALL p1()", &call("p1", None)), 3);
}

#[test]
fn test_inner_as_of_takes_precedence() {
    let ctx = TestContext::new();
    versioned_table(&ctx);
    procedures(&ctx);

    // p1a pins 2019-01-01 on its nested CALL; the outer 2019-01-03 does not
    // override it.
    assert_eq!(
        row_count(
            &ctx,
            "CALL p1a() AS OF '2019-01-03'",
            &call("p1a", Some("2019-01-03"))
        ),
        1
    );
    // p2a pins 2019-01-02 directly on the table.
    assert_eq!(
        row_count(
            &ctx,
            "CALL p2a() AS OF '2019-01-03'",
            &call("p2a", Some("2019-01-03"))
        ),
        2
    );
}

#[test]
fn test_recursive_procedures_are_detected() {
    let ctx = TestContext::new();
    ctx.db.add_procedure(ProcedureDefinition {
        name: "loop_a".into(),
        params: vec![],
        body: call("loop_b", None),
    });
    ctx.db.add_procedure(ProcedureDefinition {
        name: "loop_b".into(),
        params: vec![],
        body: call("loop_a", None),
    });

    let err = ctx.query_err("CALL loop_a()", &call("loop_a", None));
    assert!(
        matches!(err, opalsql::Error::RecursiveDefinition { kind: "procedure", .. }),
        "got {err:?}"
    );
}

#[test]
fn test_unknown_procedure() {
    let ctx = TestContext::new();
    let err = ctx.query_err("CALL nope()", &call("nope", None));
    assert!(matches!(err, opalsql::Error::ProcedureNotFound(_)));
}
