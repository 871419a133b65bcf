//! Plan algebra and analyzer properties

mod common;

use common::*;
use opalsql::analyzer::{Analyzer, Scope};
use opalsql::catalog::ViewDefinition;
use opalsql::expr::{CompareOp, Expression, SortField};
use opalsql::plan::{transform_up, Node};
use opalsql::types::{DataType, Value};

/// A corpus of plans exercising most node shapes.
fn plan_corpus() -> Vec<Node> {
    vec![
        Node::table("t"),
        select(vec![col("a"), col("b")], Node::table("t")),
        Node::filter(col("a").equals(lit(1i64)), Node::table("t")),
        Node::Sort {
            fields: vec![SortField::asc(col("a")), SortField::desc(col("b"))],
            child: Box::new(Node::table("t")),
        },
        Node::Limit {
            limit: lit(10i64),
            child: Box::new(Node::Offset {
                offset: lit(5i64),
                child: Box::new(Node::table("t")),
            }),
        },
        Node::group_by(vec![col("a")], vec![col("a")], Node::table("t")),
        Node::join(
            opalsql::plan::JoinType::Inner,
            Some(col("a").equals(col("c"))),
            Node::table("t"),
            Node::table("u"),
        ),
        Node::Distinct {
            child: Box::new(Node::table("t")),
        },
        Node::SubqueryAlias {
            name: "sq".into(),
            child: Box::new(select(vec![col("a")], Node::table("t"))),
        },
        Node::Values {
            rows: vec![vec![lit(1i64), lit("x")], vec![lit(2i64), lit("y")]],
        },
    ]
}

#[test]
fn test_with_children_identity_over_corpus() {
    for plan in plan_corpus() {
        let children: Vec<Node> = plan.children().into_iter().cloned().collect();
        let rebuilt = plan.with_children(children).unwrap();
        assert_eq!(
            format!("{plan:?}"),
            format!("{rebuilt:?}"),
            "with_children(children()) changed {}",
            plan.name()
        );
    }
}

#[test]
fn test_with_expressions_identity_over_corpus() {
    for plan in plan_corpus() {
        let exprs: Vec<Expression> = plan.expressions().into_iter().cloned().collect();
        let rebuilt = plan.with_expressions(exprs).unwrap();
        assert_eq!(
            format!("{plan:?}"),
            format!("{rebuilt:?}"),
            "with_expressions(expressions()) changed {}",
            plan.name()
        );
    }
}

#[test]
fn test_with_children_arity_mismatch_is_an_error() {
    let plan = Node::filter(col("a"), Node::table("t"));
    assert!(matches!(
        plan.with_children(vec![]),
        Err(opalsql::Error::InvalidChildCount { .. })
    ));
    assert!(matches!(
        plan.with_children(vec![Node::Nothing, Node::Nothing]),
        Err(opalsql::Error::InvalidChildCount { .. })
    ));
}

#[test]
fn test_resolution_is_idempotent_at_fixed_point() {
    let ctx = TestContext::new();
    int_table(&ctx, "t", &[(1, 10)]);

    let plan = select(
        vec![col("a")],
        Node::filter(col("b").equals(lit(10i64)), Node::table("t")),
    );
    let analyzer = Analyzer::new(std::sync::Arc::clone(ctx.engine.catalog()));
    let qctx = ctx.engine.context(std::sync::Arc::clone(&ctx.session));

    let once = analyzer.resolve_only(&qctx, &plan, &Scope::new()).unwrap();
    let twice = analyzer.resolve_only(&qctx, &once, &Scope::new()).unwrap();
    assert_eq!(format!("{once:?}"), format!("{twice:?}"));
}

#[test]
fn test_resolved_column_ordinals_and_types_agree_with_schema() {
    let ctx = TestContext::new();
    int_table(&ctx, "t", &[(1, 10), (2, 20)]);

    let plan = select(vec![col("b"), col("a")], Node::table("t"));
    let analyzer = Analyzer::new(std::sync::Arc::clone(ctx.engine.catalog()));
    let qctx = ctx.engine.context(std::sync::Arc::clone(&ctx.session));
    let analyzed = analyzer.resolve_only(&qctx, &plan, &Scope::new()).unwrap();

    // Every column reference's ordinal points at a column of the source
    // schema with the same declared type.
    let mut checked = 0;
    let _ = transform_up(&analyzed, &mut |n| {
        let child_schema = n.children().first().map(|c| c.schema());
        for expr in n.expressions() {
            let _ = expr.transform_up(&mut |e| {
                if let Expression::Column(c) = e {
                    let schema = child_schema.as_ref().expect("column over a child");
                    let column = schema.column(c.index).expect("ordinal in range");
                    assert_eq!(column.data_type, c.data_type);
                    assert!(column.name.eq_ignore_ascii_case(&c.name));
                    checked += 1;
                }
                Ok(None)
            });
        }
        Ok(None)
    });
    assert!(checked >= 2, "no column references checked");

    // The declared expression types match the values the plan produces.
    let rows = ctx
        .query("SELECT b, a FROM t", &select(vec![col("b"), col("a")], Node::table("t")))
        .unwrap();
    for row in rows {
        assert!(matches!(row[0], Value::I64(_)));
        assert!(matches!(row[1], Value::I64(_)));
    }
}

#[test]
fn test_views_expand_and_cycles_are_detected() {
    let ctx = TestContext::new();
    int_table(&ctx, "t", &[(1, 10), (2, 20)]);

    ctx.db.add_view(ViewDefinition {
        name: "v".into(),
        definition: select(
            vec![col("a")],
            Node::filter(
                Expression::Compare(
                    CompareOp::Greater,
                    Box::new(col("b")),
                    Box::new(lit(15i64)),
                ),
                Node::table("t"),
            ),
        ),
    });
    let rows = ctx
        .query("SELECT * FROM v", &select(vec![col("a")], Node::table("v")))
        .unwrap();
    assert_eq!(rows, vec![vec![Value::I64(2)]]);

    // A view whose body references itself fails with RecursiveDefinition.
    ctx.db.add_view(ViewDefinition {
        name: "cyclic".into(),
        definition: select(vec![col("a")], Node::table("cyclic")),
    });
    let err = ctx.query_err(
        "SELECT * FROM cyclic",
        &select(vec![col("a")], Node::table("cyclic")),
    );
    assert!(
        matches!(err, opalsql::Error::RecursiveDefinition { kind: "view", .. }),
        "got {err:?}"
    );
}

#[test]
fn test_case_insensitive_identifiers() {
    let ctx = TestContext::new();
    int_table(&ctx, "t", &[(1, 10)]);

    let plan = select(
        vec![Expression::column("A")],
        Node::UnresolvedTable {
            database: Some("MYDB".into()),
            name: "T".into(),
            as_of: None,
        },
    );
    let rows = ctx.query("SELECT A FROM MYDB.T", &plan).unwrap();
    assert_eq!(rows, vec![vec![Value::I64(1)]]);
}

#[test]
fn test_generated_schema_has_element_type() {
    let ctx = TestContext::new();
    ctx.create_table(
        "arr",
        opalsql::types::Schema::new(vec![opalsql::types::Column::new(
            "col",
            DataType::Array(Box::new(DataType::I64)),
        )])
        .unwrap(),
        vec![],
    );
    let analyzer = Analyzer::new(std::sync::Arc::clone(ctx.engine.catalog()));
    let qctx = ctx.engine.context(std::sync::Arc::clone(&ctx.session));
    let plan = select(
        vec![Expression::UnresolvedFunction {
            name: "EXPLODE".into(),
            args: vec![col("col")],
        }],
        Node::table("arr"),
    );
    let analyzed = analyzer.resolve_only(&qctx, &plan, &Scope::new()).unwrap();
    assert_eq!(analyzed.schema().columns()[0].data_type, DataType::I64);
}
