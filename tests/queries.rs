//! End-to-end query shapes through the engine

mod common;

use std::sync::Arc;

use common::*;
use opalsql::expr::{
    AggregateExpr, AggregateOp, CompareOp, Expression, SortField, SubqueryExpr, SubqueryKind,
    WindowExpr, WindowFrame, WindowFunc,
};
use opalsql::plan::{JoinType, Node, SetAssignment};
use opalsql::session::VariableScope;
use opalsql::types::Value;

#[test]
fn test_filter_sort_limit() {
    let ctx = TestContext::new();
    int_table(&ctx, "t", &[(3, 30), (1, 10), (4, 40), (2, 20)]);

    let plan = Node::Limit {
        limit: lit(2i64),
        child: Box::new(Node::Sort {
            fields: vec![SortField::desc(col("b"))],
            child: Box::new(Node::filter(
                Expression::Compare(
                    CompareOp::Greater,
                    Box::new(col("a")),
                    Box::new(lit(1i64)),
                ),
                Node::table("t"),
            )),
        }),
    };
    let rows = ctx
        .query("SELECT * FROM t WHERE a > 1 ORDER BY b DESC LIMIT 2", &plan)
        .unwrap();
    assert_eq!(ints(&rows), vec![vec![4, 40], vec![3, 30]]);
}

#[test]
fn test_inner_join_through_engine() {
    let ctx = TestContext::new();
    int_table(&ctx, "t", &[(1, 10), (2, 20)]);
    int_table(&ctx, "u", &[(1, 100), (3, 300)]);

    let plan = Node::join(
        JoinType::Inner,
        Some(
            Expression::qualified_column("t", "a")
                .equals(Expression::qualified_column("u", "a")),
        ),
        Node::table("t"),
        Node::table("u"),
    );
    let rows = ctx
        .query("SELECT * FROM t JOIN u ON t.a = u.a", &plan)
        .unwrap();
    assert_eq!(ints(&rows), vec![vec![1, 10, 1, 100]]);
}

#[test]
fn test_scalar_and_correlated_subqueries() {
    let ctx = TestContext::new();
    int_table(&ctx, "t", &[(1, 10), (2, 20)]);
    int_table(&ctx, "u", &[(1, 1), (2, 2), (2, 3)]);

    // Correlated: SELECT a, (SELECT COUNT(*) FROM u WHERE u.a = t.a) FROM t
    let inner = Node::group_by(
        vec![Expression::Aggregate(AggregateExpr::count_star())],
        vec![],
        Node::filter(
            Expression::qualified_column("u", "a")
                .equals(Expression::qualified_column("t", "a")),
            Node::table("u"),
        ),
    );
    let plan = select(
        vec![
            col("a"),
            Expression::Subquery(Box::new(SubqueryExpr {
                plan: inner,
                kind: SubqueryKind::Scalar,
            })),
        ],
        Node::table("t"),
    );
    let rows = ctx
        .query(
            "SELECT a, (SELECT COUNT(*) FROM u WHERE u.a = t.a) FROM t",
            &plan,
        )
        .unwrap();
    assert_eq!(ints(&rows), vec![vec![1, 1], vec![2, 2]]);
}

#[test]
fn test_in_subquery_becomes_semi_join() {
    let ctx = TestContext::new();
    int_table(&ctx, "t", &[(1, 10), (2, 20), (3, 30)]);
    int_table(&ctx, "u", &[(2, 0), (3, 0)]);

    let subquery = Expression::Subquery(Box::new(SubqueryExpr {
        plan: select(vec![col("a")], Node::table("u")),
        kind: SubqueryKind::In {
            operand: Box::new(col("a")),
            negated: false,
        },
    }));
    let plan = select(
        vec![col("a")],
        Node::filter(subquery, Node::table("t")),
    );
    let rows = ctx
        .query("SELECT a FROM t WHERE a IN (SELECT a FROM u)", &plan)
        .unwrap();
    assert_eq!(ints(&rows), vec![vec![2], vec![3]]);
}

#[test]
fn test_recursive_cte_through_engine() {
    let ctx = TestContext::new();

    let next = Expression::Arithmetic(
        opalsql::expr::ArithmeticOp::Add,
        Box::new(col("n")),
        Box::new(lit(1i64)),
    );
    let plan = Node::RecursiveCte {
        name: "seq".into(),
        column_names: vec!["n".into()],
        anchor: Box::new(Node::Values {
            rows: vec![vec![lit(1i64)]],
        }),
        recursive: Box::new(select(
            vec![next],
            Node::filter(
                Expression::Compare(
                    CompareOp::Less,
                    Box::new(col("n")),
                    Box::new(lit(4i64)),
                ),
                Node::table("seq"),
            ),
        )),
        distinct: false,
    };
    let rows = ctx
        .query(
            "WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n+1 FROM seq WHERE n < 4) SELECT * FROM seq",
            &plan,
        )
        .unwrap();
    assert_eq!(ints(&rows), vec![vec![1], vec![2], vec![3], vec![4]]);
}

#[test]
fn test_window_function_through_engine() {
    let ctx = TestContext::new();
    int_table(&ctx, "t", &[(1, 30), (1, 10), (2, 20)]);

    let window = WindowExpr {
        func: WindowFunc::Aggregate(AggregateExpr::new(AggregateOp::Sum, col("b"))),
        partition_by: vec![col("a")],
        order_by: vec![SortField::asc(col("b"))],
        frame: WindowFrame::default(),
    };
    let plan = Node::Window {
        expressions: vec![col("a"), Expression::Window(Box::new(window))],
        child: Box::new(Node::table("t")),
    };
    let rows = ctx
        .query(
            "SELECT a, SUM(b) OVER (PARTITION BY a ORDER BY b) FROM t",
            &plan,
        )
        .unwrap();
    assert_eq!(ints(&rows), vec![vec![1, 10], vec![1, 40], vec![2, 20]]);
}

#[test]
fn test_warnings_are_reported_and_cleared() {
    let ctx = TestContext::new();

    // CAST('abc' AS SIGNED) parses a zero prefix without warning; an
    // overflowing cast warns.
    let plan = select(
        vec![Expression::Cast(
            Box::new(lit(1000i64)),
            opalsql::types::DataType::I8,
        )],
        Node::Values { rows: vec![vec![]] },
    );
    let rows = ctx.query("SELECT CAST(1000 AS TINYINT)", &plan).unwrap();
    assert_eq!(rows, vec![vec![Value::I8(127)]]);

    let warnings = ctx
        .query("SHOW WARNINGS", &Node::ShowWarnings)
        .unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0][1], Value::U16(1292));

    // The next ordinary statement clears the diagnostics area.
    ctx.query(
        "SELECT 1",
        &select(vec![lit(1i64)], Node::Values { rows: vec![vec![]] }),
    )
    .unwrap();
    let warnings = ctx.query("SHOW WARNINGS", &Node::ShowWarnings).unwrap();
    assert!(warnings.is_empty());
}

#[test]
fn test_index_selection_restricts_the_scan() {
    let ctx = TestContext::new();
    let table = int_table(&ctx, "t", &[(1, 10), (2, 20), (3, 30)]);

    // Build an index over `a`, then add a row the index does not know
    // about. An indexed scan cannot see the new row; a full scan can.
    ctx.query(
        "CREATE INDEX idx_a ON t(a)",
        &Node::CreateIndex {
            table: Node::table("t").into(),
            name: "idx_a".into(),
            expressions: vec![col("a")],
            comment: String::new(),
        },
    )
    .unwrap();
    table.put_rows([vec![Value::I64(1), Value::I64(99)]]);

    let filtered = select(
        vec![col("b")],
        Node::filter(col("a").equals(lit(1i64)), Node::table("t")),
    );
    let rows = ctx.query("SELECT b FROM t WHERE a = 1", &filtered).unwrap();
    assert_eq!(ints(&rows), vec![vec![10]]);

    // A non-indexed predicate still scans everything.
    let unfiltered = select(
        vec![col("b")],
        Node::filter(col("b").equals(lit(99i64)), Node::table("t")),
    );
    let rows = ctx.query("SELECT b FROM t WHERE b = 99", &unfiltered).unwrap();
    assert_eq!(ints(&rows), vec![vec![99]]);
}

#[test]
fn test_set_and_show_variables() {
    let ctx = TestContext::new();

    ctx.query(
        "SET sql_select_limit = 10",
        &Node::Set {
            assignments: vec![SetAssignment {
                scope: VariableScope::Session,
                name: "sql_select_limit".into(),
                value: lit(10i64),
            }],
        },
    )
    .unwrap();
    assert_eq!(
        ctx.session.get_variable("sql_select_limit").unwrap(),
        Value::I64(10)
    );

    let rows = ctx
        .query(
            "SHOW VARIABLES LIKE 'sql_select_limit'",
            &Node::ShowVariables {
                pattern: Some("sql_select_limit".into()),
            },
        )
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][1], Value::Str("10".into()));
}

#[test]
fn test_use_switches_database_and_validates() {
    let ctx = TestContext::new();
    ctx.query(
        "USE mydb",
        &Node::Use {
            database: "mydb".into(),
        },
    )
    .unwrap();
    let err = ctx.query_err(
        "USE missing",
        &Node::Use {
            database: "missing".into(),
        },
    );
    assert!(matches!(err, opalsql::Error::DatabaseNotFound(_)));
}

#[test]
fn test_replication_statements_are_stubbed() {
    let ctx = TestContext::new();
    for (text, plan) in [
        (
            "CHANGE REPLICATION SOURCE TO SOURCE_HOST='h'",
            Node::ChangeReplicationSource {
                options: vec![("SOURCE_HOST".into(), Value::Str("h".into()))],
            },
        ),
        ("START REPLICA", Node::StartReplica),
        ("STOP REPLICA", Node::StopReplica),
    ] {
        let err = ctx.query_err(text, &plan);
        assert_eq!(err, opalsql::Error::ReplicationUnsupported);
    }
}

#[test]
fn test_show_charset() {
    let ctx = TestContext::new();
    let rows = ctx.query("SHOW CHARACTER SET", &Node::ShowCharset).unwrap();
    assert!(rows.iter().any(|r| r[0] == Value::Str("utf8mb4".into())));
    let utf8mb4 = rows
        .iter()
        .find(|r| r[0] == Value::Str("utf8mb4".into()))
        .unwrap();
    assert_eq!(utf8mb4[3], Value::U64(4));
}

#[test]
fn test_insert_update_delete_round_trip() {
    let ctx = TestContext::new();
    int_table(&ctx, "t", &[]);

    let insert = Node::Insert {
        table: Node::table("t").into(),
        columns: vec![],
        source: Box::new(Node::Values {
            rows: vec![
                vec![lit(1i64), lit(10i64)],
                vec![lit(2i64), lit(20i64)],
            ],
        }),
    };
    let rows = ctx.query("INSERT INTO t VALUES ...", &insert).unwrap();
    assert_eq!(rows, vec![vec![Value::U64(2)]]);

    let update = Node::Update {
        table: Node::table("t").into(),
        assignments: vec![("b".into(), lit(99i64))],
        filter: Some(col("a").equals(lit(1i64))),
    };
    let rows = ctx.query("UPDATE t SET b = 99 WHERE a = 1", &update).unwrap();
    assert_eq!(rows, vec![vec![Value::U64(1)]]);

    let delete = Node::Delete {
        table: Node::table("t").into(),
        filter: Some(col("a").equals(lit(2i64))),
    };
    let rows = ctx.query("DELETE FROM t WHERE a = 2", &delete).unwrap();
    assert_eq!(rows, vec![vec![Value::U64(1)]]);

    let rows = ctx
        .query("SELECT * FROM t", &select(vec![col("a"), col("b")], Node::table("t")))
        .unwrap();
    assert_eq!(ints(&rows), vec![vec![1, 99]]);
}

#[test]
fn test_triggers_fire_after_insert() {
    let ctx = TestContext::new();
    int_table(&ctx, "t", &[]);
    int_table(&ctx, "audit", &[]);

    // An insert into t appends a marker row to audit.
    ctx.db.add_trigger(opalsql::catalog::TriggerDefinition {
        name: "t_after_insert".into(),
        table: "t".into(),
        definition: Node::Insert {
            table: Node::table("audit").into(),
            columns: vec![],
            source: Box::new(Node::Values {
                rows: vec![vec![lit(0i64), lit(1i64)]],
            }),
        },
    });

    let insert = Node::Insert {
        table: Node::table("t").into(),
        columns: vec![],
        source: Box::new(Node::Values {
            rows: vec![vec![lit(1i64), lit(10i64)]],
        }),
    };
    let rows = ctx.query("INSERT INTO t VALUES (1, 10)", &insert).unwrap();
    assert_eq!(rows, vec![vec![Value::U64(1)]]);

    let audit = ctx
        .query(
            "SELECT * FROM audit",
            &select(vec![col("a"), col("b")], Node::table("audit")),
        )
        .unwrap();
    assert_eq!(ints(&audit), vec![vec![0, 1]]);
}

#[test]
fn test_self_referential_trigger_is_detected() {
    let ctx = TestContext::new();
    int_table(&ctx, "t", &[]);

    // The trigger writes back into its own table.
    ctx.db.add_trigger(opalsql::catalog::TriggerDefinition {
        name: "t_loop".into(),
        table: "t".into(),
        definition: Node::Insert {
            table: Node::table("t").into(),
            columns: vec![],
            source: Box::new(Node::Values {
                rows: vec![vec![lit(0i64), lit(0i64)]],
            }),
        },
    });

    let insert = Node::Insert {
        table: Node::table("t").into(),
        columns: vec![],
        source: Box::new(Node::Values {
            rows: vec![vec![lit(1i64), lit(1i64)]],
        }),
    };
    let err = ctx.query_err("INSERT INTO t VALUES (1, 1)", &insert);
    assert!(
        matches!(err, opalsql::Error::RecursiveDefinition { kind: "trigger", .. }),
        "got {err:?}"
    );
}

#[test]
fn test_table_function_as_relation() {
    let ctx = TestContext::new();

    #[derive(Debug)]
    struct SequenceTable;
    impl opalsql::catalog::TableFunction for SequenceTable {
        fn name(&self) -> &str {
            "sequence_table"
        }
        fn schema(&self, _args: &[Value]) -> opalsql::Result<opalsql::types::Schema> {
            Ok(opalsql::types::Schema::from(vec![
                opalsql::types::Column::new("x", opalsql::types::DataType::I64),
            ]))
        }
        fn rows(
            &self,
            _ctx: &opalsql::Context,
            args: &[Value],
        ) -> opalsql::Result<opalsql::catalog::RowIterator> {
            let n = args
                .first()
                .and_then(|v| v.to_i128().ok())
                .unwrap_or(0) as i64;
            Ok(Box::new((0..n).map(|i| Ok(vec![Value::I64(i)]))))
        }
    }

    ctx.provider.add_table_function(Arc::new(SequenceTable));

    let plan = select(
        vec![col("x")],
        Node::TableFunctionCall {
            name: "sequence_table".into(),
            args: vec![lit(3i64)],
            function: None,
            schema: opalsql::types::Schema::empty(),
        },
    );
    let rows = ctx
        .query("SELECT x FROM sequence_table(3)", &plan)
        .unwrap();
    assert_eq!(ints(&rows), vec![vec![0], vec![1], vec![2]]);
}
