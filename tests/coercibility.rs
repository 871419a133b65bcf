//! COLLATION() and COERCIBILITY() against the MySQL reference behaviour

mod common;

use common::*;
use opalsql::expr::Expression;
use opalsql::plan::Node;
use opalsql::types::{CollationId, Column, DataType, Schema, Value};

fn fn_over(name: &str, arg: Expression) -> Node {
    Node::project(
        vec![Expression::UnresolvedFunction {
            name: name.into(),
            args: vec![arg],
        }],
        Node::Values { rows: vec![vec![]] },
    )
}

fn coercibility_of(ctx: &TestContext, arg: Expression) -> i64 {
    let rows = ctx
        .query("SELECT COERCIBILITY(...)", &fn_over("COERCIBILITY", arg))
        .unwrap();
    match rows[0][0] {
        Value::I64(v) => v,
        ref other => panic!("unexpected value {other:?}"),
    }
}

fn collation_of(ctx: &TestContext, arg: Expression) -> String {
    let rows = ctx
        .query("SELECT COLLATION(...)", &fn_over("COLLATION", arg))
        .unwrap();
    match &rows[0][0] {
        Value::Str(s) => s.clone(),
        other => panic!("unexpected value {other:?}"),
    }
}

#[test]
fn test_coercibility_of_literals() {
    let ctx = TestContext::new();
    // String literal: 4. Numeric literal: 5. NULL: 6.
    assert_eq!(coercibility_of(&ctx, lit("abc")), 4);
    assert_eq!(coercibility_of(&ctx, lit(42i64)), 5);
    assert_eq!(coercibility_of(&ctx, Expression::Literal(Value::Null)), 6);
}

#[test]
fn test_coercibility_of_collate_and_system_constants() {
    let ctx = TestContext::new();
    // Explicit COLLATE clause: 0.
    assert_eq!(
        coercibility_of(
            &ctx,
            Expression::Collate(Box::new(lit("abc")), CollationId::UTF8MB4_BIN)
        ),
        0
    );
    // System constants such as USER(): 3.
    assert_eq!(
        coercibility_of(
            &ctx,
            Expression::Function {
                name: "USER".into(),
                args: vec![],
                return_type: DataType::text(),
            }
        ),
        3
    );
}

#[test]
fn test_coercibility_of_columns() {
    let ctx = TestContext::new();
    ctx.create_table(
        "s",
        Schema::new(vec![
            Column::new("txt", DataType::VarChar(32, CollationId::LATIN1_SWEDISH_CI)),
            Column::new("num", DataType::I64),
        ])
        .unwrap(),
        vec![vec![Value::Str("x".into()), Value::I64(1)]],
    );

    // Column references carry implicit coercibility (2).
    let rows = ctx
        .query(
            "SELECT COERCIBILITY(txt), COERCIBILITY(num), COLLATION(txt) FROM s",
            &Node::project(
                vec![
                    Expression::UnresolvedFunction {
                        name: "COERCIBILITY".into(),
                        args: vec![col("txt")],
                    },
                    Expression::UnresolvedFunction {
                        name: "COERCIBILITY".into(),
                        args: vec![col("num")],
                    },
                    Expression::UnresolvedFunction {
                        name: "COLLATION".into(),
                        args: vec![col("txt")],
                    },
                ],
                Node::table("s"),
            ),
        )
        .unwrap();
    assert_eq!(rows[0][0], Value::I64(2));
    assert_eq!(rows[0][1], Value::I64(5));
    assert_eq!(rows[0][2], Value::Str("latin1_swedish_ci".into()));
}

#[test]
fn test_collation_of_literals_and_collate() {
    let ctx = TestContext::new();
    assert_eq!(collation_of(&ctx, lit("abc")), "utf8mb4_0900_ai_ci");
    assert_eq!(
        collation_of(
            &ctx,
            Expression::Collate(Box::new(lit("abc")), CollationId::UTF8MB4_BIN)
        ),
        "utf8mb4_bin"
    );
    assert_eq!(collation_of(&ctx, lit(5i64)), "binary");
}

#[test]
fn test_mixed_collation_comparison_uses_dominant_side() {
    let ctx = TestContext::new();
    ctx.create_table(
        "s",
        Schema::new(vec![Column::new(
            "txt",
            DataType::VarChar(32, CollationId::UTF8MB4_0900_AI_CI),
        )])
        .unwrap(),
        vec![vec![Value::Str("HELLO".into())]],
    );

    // Column (implicit, case-insensitive collation) dominates the literal:
    // the comparison is case-insensitive.
    let plan = select(
        vec![col("txt")],
        Node::filter(col("txt").equals(lit("hello")), Node::table("s")),
    );
    let rows = ctx
        .query("SELECT txt FROM s WHERE txt = 'hello'", &plan)
        .unwrap();
    assert_eq!(rows.len(), 1);

    // With an explicit binary COLLATE, the comparison becomes case
    // sensitive.
    let plan = select(
        vec![col("txt")],
        Node::filter(
            Expression::Compare(
                opalsql::expr::CompareOp::Equal,
                Box::new(col("txt")),
                Box::new(Expression::Collate(
                    Box::new(lit("hello")),
                    CollationId::UTF8MB4_BIN,
                )),
            ),
            Node::table("s"),
        ),
    );
    let rows = ctx
        .query(
            "SELECT txt FROM s WHERE txt = 'hello' COLLATE utf8mb4_bin",
            &plan,
        )
        .unwrap();
    assert!(rows.is_empty());
}
