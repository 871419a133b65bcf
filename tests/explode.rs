//! Generator lifting and execution

mod common;

use common::*;
use opalsql::expr::Expression;
use opalsql::plan::Node;
use opalsql::types::{Column, DataType, Schema, Value};

fn explode(arg: Expression) -> Expression {
    Expression::UnresolvedFunction {
        name: "EXPLODE".into(),
        args: vec![arg],
    }
}

fn array_table(ctx: &TestContext) {
    ctx.create_table(
        "t",
        Schema::new(vec![Column::new(
            "col",
            DataType::Array(Box::new(DataType::I64)),
        )])
        .unwrap(),
        vec![vec![Value::Array(vec![
            Value::I64(1),
            Value::I64(2),
            Value::I64(3),
        ])]],
    );
}

#[test]
fn test_explode_emits_one_row_per_element() {
    let ctx = TestContext::new();
    array_table(&ctx);

    let plan = select(vec![explode(col("col"))], Node::table("t"));
    ctx.assert_rows(
        "SELECT EXPLODE(col) FROM t",
        &plan,
        vec![
            vec![Value::I64(1)],
            vec![Value::I64(2)],
            vec![Value::I64(3)],
        ],
    );
}

#[test]
fn test_multiple_generators_are_rejected() {
    let ctx = TestContext::new();
    array_table(&ctx);

    let plan = select(
        vec![explode(col("col")), explode(col("col"))],
        Node::table("t"),
    );
    let err = ctx.query_err("SELECT EXPLODE(col), EXPLODE(col) FROM t", &plan);
    assert_eq!(err, opalsql::Error::MultipleGenerators);
}

#[test]
fn test_explode_of_non_array_is_rejected() {
    let ctx = TestContext::new();
    int_table(&ctx, "u", &[(1, 2)]);

    let plan = select(vec![explode(col("a"))], Node::table("u"));
    let err = ctx.query_err("SELECT EXPLODE(a) FROM u", &plan);
    assert!(matches!(err, opalsql::Error::ExplodeNotArray(_)), "got {err:?}");
}

#[test]
fn test_exploded_column_keeps_its_alias_and_passthroughs() {
    let ctx = TestContext::new();
    ctx.create_table(
        "t2",
        Schema::new(vec![
            Column::new("id", DataType::I64),
            Column::new("col", DataType::Array(Box::new(DataType::I64))),
        ])
        .unwrap(),
        vec![vec![
            Value::I64(7),
            Value::Array(vec![Value::I64(1), Value::I64(2)]),
        ]],
    );

    let plan = select(
        vec![col("id"), explode(col("col")).alias("element")],
        Node::table("t2"),
    );
    let rows = ctx
        .query("SELECT id, EXPLODE(col) AS element FROM t2", &plan)
        .unwrap();
    assert_eq!(
        rows,
        vec![
            vec![Value::I64(7), Value::I64(1)],
            vec![Value::I64(7), Value::I64(2)],
        ]
    );
}
