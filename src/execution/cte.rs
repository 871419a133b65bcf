//! Recursive CTE execution
//!
//! The anchor seeds a working table; the recursive member re-runs against
//! the previous iteration's rows until it produces nothing new, bounded by
//! the `cte_max_recursion_depth` session variable. UNION (as opposed to
//! UNION ALL) deduplicates across the whole accumulated result.

use std::collections::HashSet;

use super::{build, collect, BoxedRowIter, RowIter};
use crate::catalog::{Partition, RowIterator, Table};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::plan::{transform_up, Node};
use crate::types::{Row, Schema};

/// The placeholder the analyzer binds a recursive CTE's self reference to;
/// execution swaps it for the previous iteration's rows. Scanned directly
/// (outside the recursion loop) it is empty.
#[derive(Debug)]
pub struct WorkingTable {
    pub name: String,
    pub schema: Schema,
}

impl Table for WorkingTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> Schema {
        self.schema.clone()
    }

    fn partitions(&self, _ctx: &Context) -> Result<Vec<Partition>> {
        Ok(vec![])
    }

    fn partition_rows(&self, _ctx: &Context, partition: &Partition) -> Result<RowIterator> {
        Err(Error::Io(format!("unknown partition: {}", partition.key)))
    }
}

pub fn build_recursive_cte(ctx: &Context, node: &Node) -> Result<BoxedRowIter> {
    let Node::RecursiveCte {
        name,
        anchor,
        recursive,
        distinct,
        ..
    } = node
    else {
        return Err(Error::Internal("build_recursive_cte on a non-CTE node".into()));
    };

    let max_depth = ctx
        .session()
        .get_variable("cte_max_recursion_depth")
        .ok()
        .and_then(|v| v.to_i128().ok())
        .unwrap_or(1000) as usize;

    let mut all: Vec<Row> = Vec::new();
    let mut seen: HashSet<Row> = HashSet::new();
    let mut working = collect(ctx, build(ctx, anchor)?)?;
    if *distinct {
        working.retain(|row| seen.insert(row.clone()));
    }
    all.extend(working.iter().cloned());

    let mut depth = 0;
    while !working.is_empty() {
        ctx.check_cancelled()?;
        depth += 1;
        if depth > max_depth {
            return Err(Error::Runtime(format!(
                "recursive query aborted after {max_depth} iterations; \
                 raise cte_max_recursion_depth to allow more"
            )));
        }
        // Rebind the self-reference to the previous iteration's rows.
        let bound = bind_working_table(recursive, name, &working)?;
        let mut produced = collect(ctx, build(ctx, &bound)?)?;
        if *distinct {
            produced.retain(|row| seen.insert(row.clone()));
        }
        all.extend(produced.iter().cloned());
        working = produced;
    }

    Ok(Box::new(MaterialisedIter { rows: all, pos: 0 }))
}

/// Replace references to the CTE's own name with the working table's rows.
fn bind_working_table(recursive: &Node, name: &str, rows: &[Row]) -> Result<Node> {
    let replacement = Node::Values {
        rows: rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|v| crate::expr::Expression::Literal(v.clone()))
                    .collect()
            })
            .collect(),
    };
    let bound = transform_up(recursive, &mut |n| match n {
        Node::UnresolvedTable {
            name: table_name, ..
        } if table_name.eq_ignore_ascii_case(name) => Ok(Some(replacement.clone())),
        Node::ResolvedTable { table, .. } if table.name().eq_ignore_ascii_case(name) => {
            Ok(Some(replacement.clone()))
        }
        _ => Ok(None),
    })?;
    Ok(bound.unwrap_or_else(|| recursive.clone()))
}

struct MaterialisedIter {
    rows: Vec<Row>,
    pos: usize,
}

impl RowIter for MaterialisedIter {
    fn next(&mut self, _ctx: &Context) -> Option<Result<Row>> {
        let row = self.rows.get(self.pos)?.clone();
        self.pos += 1;
        Some(Ok(row))
    }

    fn close(&mut self, _ctx: &Context) -> Result<()> {
        self.rows = Vec::new();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{ArithmeticOp, ColumnRef, CompareOp, Expression};
    use crate::types::{DataType, Value};

    /// WITH RECURSIVE n AS (SELECT 1 UNION ALL SELECT n+1 FROM n WHERE n < 5)
    #[test]
    fn test_counting_cte() -> Result<()> {
        let ctx = Context::for_tests();
        let col = Expression::Column(ColumnRef::new(0, "n", DataType::I64));
        let recursive = Node::project(
            vec![Expression::Arithmetic(
                ArithmeticOp::Add,
                Box::new(col.clone()),
                Box::new(Expression::literal(1i64)),
            )],
            Node::filter(
                Expression::Compare(
                    CompareOp::Less,
                    Box::new(col),
                    Box::new(Expression::literal(5i64)),
                ),
                Node::table("n"),
            ),
        );
        let plan = Node::RecursiveCte {
            name: "n".into(),
            column_names: vec!["n".into()],
            anchor: Box::new(Node::Values {
                rows: vec![vec![Expression::literal(1i64)]],
            }),
            recursive: Box::new(recursive),
            distinct: false,
        };
        let rows = collect(&ctx, build(&ctx, &plan)?)?;
        let got: Vec<i64> = rows
            .iter()
            .map(|r| match r[0] {
                Value::I64(v) => v,
                _ => panic!("unexpected value"),
            })
            .collect();
        assert_eq!(got, vec![1, 2, 3, 4, 5]);
        Ok(())
    }

    /// A CTE that never shrinks trips the depth limit.
    #[test]
    fn test_runaway_recursion_is_bounded() -> Result<()> {
        let ctx = Context::for_tests();
        ctx.session()
            .set_variable("cte_max_recursion_depth", Value::I64(10))?;
        let plan = Node::RecursiveCte {
            name: "n".into(),
            column_names: vec!["n".into()],
            anchor: Box::new(Node::Values {
                rows: vec![vec![Expression::literal(1i64)]],
            }),
            recursive: Box::new(Node::project(
                vec![Expression::Column(ColumnRef::new(0, "n", DataType::I64))],
                Node::table("n"),
            )),
            distinct: false,
        };
        let result = build(&ctx, &plan);
        assert!(matches!(result, Err(Error::Runtime(_))));
        Ok(())
    }
}
