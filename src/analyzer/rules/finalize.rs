//! Finishing rules: aggregation validation, generator lifting, process
//! tracking, and the resolution check

use crate::analyzer::{Analyzer, Scope};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::expr::{ColumnRef, Expression};
use crate::plan::{transform_up, Node};
use crate::types::DataType;

/// Every selected expression that is not an aggregate must be functionally
/// determined by the group-by set.
pub(super) fn validate_grouping(
    _ctx: &Context,
    _analyzer: &Analyzer,
    node: &Node,
    _scope: &Scope,
) -> Result<Option<Node>> {
    transform_up(node, &mut |n| {
        let Node::GroupBy {
            selected, grouping, ..
        } = n
        else {
            return Ok(None);
        };
        if grouping.is_empty() {
            return Ok(None);
        }
        let grouped: Vec<String> = grouping.iter().map(|g| g.to_string()).collect();
        for expr in selected {
            if expr.contains_aggregate() {
                continue;
            }
            let stripped = match expr {
                Expression::Alias(_, inner) => inner.as_ref(),
                other => other,
            };
            if matches!(stripped, Expression::Literal(_)) {
                continue;
            }
            if !grouped.contains(&stripped.to_string()) {
                return Err(Error::NotGrouped(expr.to_string()));
            }
        }
        Ok(None)
    })
}

/// Lift EXPLODE out of projections: the projection keeps the array
/// expression and a Generate node above it unrolls the elements through a
/// synthetic column of the element type.
pub(super) fn resolve_generators(
    _ctx: &Context,
    _analyzer: &Analyzer,
    node: &Node,
    _scope: &Scope,
) -> Result<Option<Node>> {
    transform_up(node, &mut |n| {
        let Node::Project { expressions, child } = n else {
            return Ok(None);
        };

        let mut generator: Option<(usize, Expression, String)> = None;
        for (i, expr) in expressions.iter().enumerate() {
            let (inner, name) = match expr {
                Expression::Alias(name, inner) => (inner.as_ref(), name.clone()),
                other => (other, other.result_name()),
            };
            if let Expression::Explode(array) = inner {
                if generator.is_some() {
                    return Err(Error::MultipleGenerators);
                }
                generator = Some((i, array.as_ref().clone(), name));
            }
        }
        let Some((index, array, name)) = generator else {
            return Ok(None);
        };

        let element = match array.data_type() {
            DataType::Array(element) => *element,
            other => return Err(Error::ExplodeNotArray(other.to_string())),
        };

        let mut projection = expressions.clone();
        projection[index] = match &expressions[index] {
            Expression::Alias(alias, _) => array.clone().alias(alias),
            _ => array.clone(),
        };
        Ok(Some(Node::Generate {
            column: ColumnRef {
                index,
                name,
                table: None,
                data_type: element,
                nullable: true,
            },
            child: Box::new(Node::Project {
                expressions: projection,
                child: child.clone(),
            }),
        }))
    })
}

/// Wrap the root in a QueryProcess, mark scans as progress-tracked, and
/// pre-register their partition totals with the process list.
pub(super) fn track_process(
    ctx: &Context,
    _analyzer: &Analyzer,
    node: &Node,
    _scope: &Scope,
) -> Result<Option<Node>> {
    if matches!(
        node,
        Node::QueryProcess { .. }
            | Node::Prepare { .. }
            | Node::ExecutePrepared { .. }
            | Node::Deallocate { .. }
    ) {
        return Ok(None);
    }

    let tracked = transform_up(node, &mut |n| {
        let Node::ResolvedTable {
            database,
            table,
            as_of,
            tracked: false,
        } = n
        else {
            return Ok(None);
        };
        let total = table.partition_count(ctx).unwrap_or(-1);
        ctx.add_table_progress(table.name(), total);
        Ok(Some(Node::ResolvedTable {
            database: database.clone(),
            table: table.clone(),
            as_of: as_of.clone(),
            tracked: true,
        }))
    })?;

    Ok(Some(Node::QueryProcess {
        child: Box::new(tracked.unwrap_or_else(|| node.clone())),
    }))
}

/// The final gate: every node and expression must be resolved.
pub(super) fn ensure_resolved(
    _ctx: &Context,
    _analyzer: &Analyzer,
    node: &Node,
    _scope: &Scope,
) -> Result<Option<Node>> {
    if node.resolved() {
        return Ok(None);
    }
    // Surface the innermost unresolved piece for the error message.
    let mut offender: Option<String> = None;
    let _ = transform_up(node, &mut |n| {
        if offender.is_none() {
            match n {
                Node::UnresolvedTable { name, .. } => offender = Some(format!("table {name}")),
                _ => {
                    for expr in n.expressions() {
                        if !expr.resolved() && offender.is_none() {
                            offender = Some(format!("expression {expr}"));
                        }
                    }
                }
            }
        }
        Ok(None)
    });
    Err(Error::Internal(format!(
        "plan failed to resolve: {}",
        offender.unwrap_or_else(|| node.name().to_string())
    )))
}
