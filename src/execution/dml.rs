//! INSERT, UPDATE and DELETE execution
//!
//! Writes go through the table's capability interfaces. Values are
//! converted to the destination column types with the lax policy; an
//! out-of-range conversion attaches a warning to the session. Each
//! statement emits a single row holding the affected-row count.

use std::sync::Arc;

use super::{admin::Materialised, build, BoxedRowIter};
use crate::catalog::Table;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::expr::Expression;
use crate::plan::Node;
use crate::types::{Row, Schema, Value};

pub fn build_dml(ctx: &Context, node: &Node) -> Result<BoxedRowIter> {
    let count = match node {
        Node::Insert {
            table,
            columns,
            source,
        } => run_insert(ctx, table, columns, source)?,
        Node::Update {
            table,
            assignments,
            filter,
        } => run_update(ctx, table, assignments, filter.as_ref())?,
        Node::Delete { table, filter } => run_delete(ctx, table, filter.as_ref())?,
        other => {
            return Err(Error::Internal(format!(
                "build_dml on {} node",
                other.name()
            )))
        }
    };
    Ok(Box::new(Materialised::of(vec![vec![Value::U64(count)]])))
}

fn resolved_table(node: &Node) -> Result<&Arc<dyn Table>> {
    match node {
        Node::ResolvedTable { table, .. } => Ok(table),
        other => Err(Error::Internal(format!(
            "DML against {} node",
            other.name()
        ))),
    }
}

fn run_insert(
    ctx: &Context,
    table: &Node,
    columns: &[String],
    source: &Node,
) -> Result<u64> {
    let table = resolved_table(table)?;
    let insertable = table
        .as_insertable()
        .ok_or_else(|| Error::Unsupported(format!("table {} is read-only", table.name())))?;
    let schema = table.schema();

    // Map each destination column to its position in the source row.
    let positions: Vec<Option<usize>> = if columns.is_empty() {
        (0..schema.len()).map(Some).collect()
    } else {
        let mut positions = vec![None; schema.len()];
        for (src_pos, name) in columns.iter().enumerate() {
            let dest = schema
                .index_of(name)
                .ok_or_else(|| Error::ColumnNotFound(name.clone()))?;
            positions[dest] = Some(src_pos);
        }
        positions
    };

    let rows = super::collect(ctx, build(ctx, source)?)?;
    let mut count = 0;
    for row in rows {
        ctx.check_cancelled()?;
        let full = assemble_row(ctx, &schema, &positions, &row)?;
        insertable.insert(ctx, full)?;
        count += 1;
    }
    Ok(count)
}

/// Build a full-width row: mapped source values are converted to the column
/// type; unmapped columns fall back to their DEFAULT expression or NULL.
fn assemble_row(
    ctx: &Context,
    schema: &Schema,
    positions: &[Option<usize>],
    source: &Row,
) -> Result<Row> {
    let mut out = Vec::with_capacity(schema.len());
    for (column, position) in schema.columns().iter().zip(positions.iter()) {
        let raw = match position {
            Some(pos) => source
                .get(*pos)
                .cloned()
                .ok_or_else(|| Error::Internal("insert source row too narrow".into()))?,
            None => match &column.default {
                Some(default) => default.eval(ctx, &vec![])?,
                None => Value::Null,
            },
        };
        let (converted, out_of_range) = column.data_type.convert(raw)?;
        if out_of_range {
            ctx.warn(
                1264,
                format!("Out of range value for column '{}'", column.name),
            );
        }
        if converted.is_null() && !column.nullable {
            return Err(Error::NotNullViolation(column.name.clone()));
        }
        out.push(converted);
    }
    Ok(out)
}

fn run_update(
    ctx: &Context,
    table: &Node,
    assignments: &[(String, Expression)],
    filter: Option<&Expression>,
) -> Result<u64> {
    let table = resolved_table(table)?;
    let updatable = table
        .as_updatable()
        .ok_or_else(|| Error::Unsupported(format!("table {} is read-only", table.name())))?;
    let schema = table.schema();

    let targets: Vec<(usize, &Expression)> = assignments
        .iter()
        .map(|(name, expr)| {
            schema
                .index_of(name)
                .map(|i| (i, expr))
                .ok_or_else(|| Error::ColumnNotFound(name.clone()))
        })
        .collect::<Result<_>>()?;

    let mut count = 0;
    for row in matching_rows(ctx, table, filter)? {
        let row = row?;
        let mut updated = row.clone();
        for (index, expr) in &targets {
            let raw = expr.eval(ctx, &row)?;
            let column = schema
                .column(*index)
                .ok_or_else(|| Error::Internal("assignment column out of bounds".into()))?;
            let (converted, out_of_range) = column.data_type.convert(raw)?;
            if out_of_range {
                ctx.warn(
                    1264,
                    format!("Out of range value for column '{}'", column.name),
                );
            }
            updated[*index] = converted;
        }
        if updated != row {
            updatable.update(ctx, &row, updated)?;
            count += 1;
        }
    }
    Ok(count)
}

fn run_delete(ctx: &Context, table: &Node, filter: Option<&Expression>) -> Result<u64> {
    let table = resolved_table(table)?;
    let deletable = table
        .as_deletable()
        .ok_or_else(|| Error::Unsupported(format!("table {} is read-only", table.name())))?;

    let mut count = 0;
    for row in matching_rows(ctx, table, filter)? {
        deletable.delete(ctx, &row?)?;
        count += 1;
    }
    Ok(count)
}

/// Materialise the rows a filtered write targets, before mutating.
fn matching_rows(
    ctx: &Context,
    table: &Arc<dyn Table>,
    filter: Option<&Expression>,
) -> Result<std::vec::IntoIter<Result<Row>>> {
    let mut out = Vec::new();
    for partition in table.partitions(ctx)? {
        ctx.check_cancelled()?;
        for row in table.partition_rows(ctx, &partition)? {
            let row = row?;
            let keep = match filter {
                Some(predicate) => {
                    let v = predicate.eval(ctx, &row)?;
                    !v.is_null() && v.is_true()?
                }
                None => true,
            };
            if keep {
                out.push(Ok(row));
            }
        }
    }
    Ok(out.into_iter())
}
