//! Rewrite rules: type checks, subquery conversion, pushdown, and index
//! selection

use crate::analyzer::{Analyzer, Scope};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::expr::{ColumnRef, CompareOp, Expression, SubqueryKind};
use crate::plan::{transform_up, JoinType, Node};
use crate::types::DataType;

/// Validate that predicates are boolean-coercible and bounds are integral.
/// MySQL's lax conversions make most scalars usable as booleans; structured
/// values are not.
pub(super) fn coerce_types(
    _ctx: &Context,
    _analyzer: &Analyzer,
    node: &Node,
    _scope: &Scope,
) -> Result<Option<Node>> {
    transform_up(node, &mut |n| {
        match n {
            Node::Filter { predicate, .. } | Node::Having { predicate, .. } => {
                let t = predicate.data_type();
                if matches!(
                    t,
                    DataType::Json | DataType::Geometry(_) | DataType::Array(_)
                ) {
                    return Err(Error::TypeMismatch {
                        expected: "boolean predicate".into(),
                        found: t.to_string(),
                    });
                }
            }
            Node::Limit { limit: bound, .. } | Node::Offset { offset: bound, .. } => {
                let t = bound.data_type();
                // Unbound parameters type as NULL until EXECUTE.
                if t != DataType::Null && !t.is_integer() {
                    return Err(Error::TypeMismatch {
                        expected: "integer bound".into(),
                        found: t.to_string(),
                    });
                }
            }
            _ => {}
        }
        Ok(None)
    })
}

/// Convert uncorrelated IN/EXISTS subquery filters into semi/anti joins.
pub(super) fn convert_subqueries(
    _ctx: &Context,
    _analyzer: &Analyzer,
    node: &Node,
    _scope: &Scope,
) -> Result<Option<Node>> {
    transform_up(node, &mut |n| {
        let Node::Filter { predicate, child } = n else {
            return Ok(None);
        };
        let Expression::Subquery(sq) = predicate else {
            return Ok(None);
        };
        if is_correlated(&sq.plan) {
            return Ok(None);
        }
        let left_width = child.schema().len();
        match &sq.kind {
            SubqueryKind::In { operand, negated } => {
                let right_schema = sq.plan.schema();
                let Some(first) = right_schema.columns().first() else {
                    return Ok(None);
                };
                let condition = Expression::Compare(
                    CompareOp::Equal,
                    operand.clone(),
                    Box::new(Expression::Column(ColumnRef {
                        index: left_width,
                        name: first.name.clone(),
                        table: first.source.clone(),
                        data_type: first.data_type.clone(),
                        nullable: first.nullable,
                    })),
                );
                Ok(Some(Node::Join {
                    join_type: if *negated {
                        JoinType::Anti
                    } else {
                        JoinType::Semi
                    },
                    condition: Some(condition),
                    left: child.clone(),
                    right: Box::new(sq.plan.clone()),
                }))
            }
            SubqueryKind::Exists { negated } => Ok(Some(Node::Join {
                join_type: if *negated {
                    JoinType::Anti
                } else {
                    JoinType::Semi
                },
                condition: None,
                left: child.clone(),
                right: Box::new(sq.plan.clone()),
            })),
            SubqueryKind::Scalar => Ok(None),
        }
    })
}

fn is_correlated(plan: &Node) -> bool {
    let mut found = false;
    let _ = transform_up(plan, &mut |n| {
        for expr in n.expressions() {
            let _ = expr.transform_up(&mut |e| {
                match e {
                    Expression::OuterColumn { .. } => found = true,
                    Expression::Subquery(sq) => {
                        if is_correlated(&sq.plan) {
                            found = true;
                        }
                    }
                    _ => {}
                }
                Ok(None)
            });
        }
        Ok(None)
    });
    found
}

/// Predicate pushdown and projection pruning: merge stacked filters, move
/// filters below sorts, split join filters onto their sides, and collapse
/// column-only projections into the projection beneath them.
pub(super) fn pushdown(
    _ctx: &Context,
    _analyzer: &Analyzer,
    node: &Node,
    _scope: &Scope,
) -> Result<Option<Node>> {
    transform_up(node, &mut |n| {
        match n {
            // Filter(Filter(x)) → Filter(a AND b, x)
            Node::Filter { predicate, child } => {
                if let Node::Filter {
                    predicate: inner,
                    child: grandchild,
                } = child.as_ref()
                {
                    return Ok(Some(Node::Filter {
                        predicate: Expression::And(
                            Box::new(inner.clone()),
                            Box::new(predicate.clone()),
                        ),
                        child: grandchild.clone(),
                    }));
                }
                // Filter(Sort(x)) → Sort(Filter(x))
                if let Node::Sort { fields, child: grandchild } = child.as_ref() {
                    return Ok(Some(Node::Sort {
                        fields: fields.clone(),
                        child: Box::new(Node::Filter {
                            predicate: predicate.clone(),
                            child: grandchild.clone(),
                        }),
                    }));
                }
                // Filter over an inner/cross join: push side-local conjuncts
                // into the join inputs.
                if let Node::Join {
                    join_type: join_type @ (JoinType::Inner | JoinType::Cross),
                    condition,
                    left,
                    right,
                } = child.as_ref()
                {
                    return push_into_join(predicate, *join_type, condition, left, right);
                }
                Ok(None)
            }
            // Project of plain columns over Project → composed Project
            Node::Project { expressions, child } => {
                let Node::Project {
                    expressions: inner,
                    child: grandchild,
                } = child.as_ref()
                else {
                    return Ok(None);
                };
                let all_columns = expressions
                    .iter()
                    .all(|e| matches!(e, Expression::Column(_)));
                if !all_columns {
                    return Ok(None);
                }
                let composed: Option<Vec<Expression>> = expressions
                    .iter()
                    .map(|e| match e {
                        Expression::Column(c) => inner.get(c.index).cloned(),
                        _ => None,
                    })
                    .collect();
                match composed {
                    Some(composed) => Ok(Some(Node::Project {
                        expressions: composed,
                        child: grandchild.clone(),
                    })),
                    None => Ok(None),
                }
            }
            _ => Ok(None),
        }
    })
}

fn push_into_join(
    predicate: &Expression,
    join_type: JoinType,
    condition: &Option<Expression>,
    left: &Node,
    right: &Node,
) -> Result<Option<Node>> {
    let left_width = left.schema().len();
    let total_width = left_width + right.schema().len();

    let mut conjuncts = Vec::new();
    split_conjuncts(predicate, &mut conjuncts);

    let mut left_only = Vec::new();
    let mut right_only = Vec::new();
    let mut rest = Vec::new();
    for conjunct in conjuncts {
        match column_span(&conjunct) {
            Some((_, max)) if max < left_width => left_only.push(conjunct),
            Some((min, max)) if min >= left_width && max < total_width => {
                right_only.push(rebase_columns(&conjunct, left_width)?);
            }
            _ => rest.push(conjunct),
        }
    }
    if left_only.is_empty() && right_only.is_empty() {
        return Ok(None);
    }

    let mut new_left = left.clone();
    if let Some(p) = join_all(left_only) {
        new_left = Node::Filter {
            predicate: p,
            child: Box::new(new_left),
        };
    }
    let mut new_right = right.clone();
    if let Some(p) = join_all(right_only) {
        new_right = Node::Filter {
            predicate: p,
            child: Box::new(new_right),
        };
    }
    let join = Node::Join {
        join_type,
        condition: condition.clone(),
        left: Box::new(new_left),
        right: Box::new(new_right),
    };
    Ok(Some(match join_all(rest) {
        Some(p) => Node::Filter {
            predicate: p,
            child: Box::new(join),
        },
        None => join,
    }))
}

fn split_conjuncts(expr: &Expression, out: &mut Vec<Expression>) {
    match expr {
        Expression::And(l, r) => {
            split_conjuncts(l, out);
            split_conjuncts(r, out);
        }
        other => out.push(other.clone()),
    }
}

fn join_all(mut conjuncts: Vec<Expression>) -> Option<Expression> {
    let mut out = conjuncts.pop()?;
    while let Some(next) = conjuncts.pop() {
        out = Expression::And(Box::new(next), Box::new(out));
    }
    Some(out)
}

/// The min/max column ordinal an expression references, or None when it
/// references no columns (or anything non-relocatable).
fn column_span(expr: &Expression) -> Option<(usize, usize)> {
    let mut min = usize::MAX;
    let mut max = 0;
    let mut relocatable = true;
    let _ = expr.transform_up(&mut |e| {
        match e {
            Expression::Column(c) => {
                min = min.min(c.index);
                max = max.max(c.index);
            }
            Expression::Subquery(_) | Expression::OuterColumn { .. } => relocatable = false,
            _ => {}
        }
        Ok(None)
    });
    if !relocatable || min == usize::MAX {
        None
    } else {
        Some((min, max))
    }
}

fn rebase_columns(expr: &Expression, offset: usize) -> Result<Expression> {
    Ok(expr
        .transform_up(&mut |e| match e {
            Expression::Column(c) => {
                let mut c = c.clone();
                c.index -= offset;
                Ok(Some(Expression::Column(c)))
            }
            _ => Ok(None),
        })?
        .unwrap_or_else(|| expr.clone()))
}

/// Replace full scans with index-restricted scans when an equality filter
/// covers an index of the table.
pub(super) fn select_indexes(
    ctx: &Context,
    _analyzer: &Analyzer,
    node: &Node,
    _scope: &Scope,
) -> Result<Option<Node>> {
    transform_up(node, &mut |n| {
        let Node::Filter { predicate, child } = n else {
            return Ok(None);
        };
        let Node::ResolvedTable {
            database,
            table,
            as_of,
            tracked,
        } = child.as_ref()
        else {
            return Ok(None);
        };
        let Some(indexable) = table.as_indexable() else {
            return Ok(None);
        };
        let indexes = indexable.indexes(ctx)?;
        if indexes.is_empty() {
            return Ok(None);
        }

        let mut conjuncts = Vec::new();
        split_conjuncts(predicate, &mut conjuncts);
        // Column-name → literal equalities usable as index keys.
        let equalities: Vec<(String, crate::types::Value)> = conjuncts
            .iter()
            .filter_map(|c| match c {
                Expression::Compare(CompareOp::Equal, l, r) => match (l.as_ref(), r.as_ref()) {
                    (Expression::Column(col), Expression::Literal(v))
                    | (Expression::Literal(v), Expression::Column(col)) => {
                        Some((col.name.to_lowercase(), v.clone()))
                    }
                    _ => None,
                },
                _ => None,
            })
            .collect();
        if equalities.is_empty() {
            return Ok(None);
        }

        let mut lookup: Option<crate::catalog::Lookup> = None;
        for index in &indexes {
            let exprs = index.expressions();
            let key: Option<Vec<crate::types::Value>> = exprs
                .iter()
                .map(|e| {
                    let column = e.rsplit('.').next().unwrap_or(e).to_lowercase();
                    equalities
                        .iter()
                        .find(|(name, _)| *name == column)
                        .map(|(_, v)| v.clone())
                })
                .collect();
            let Some(key) = key else { continue };
            let found = index.get(&key)?;
            lookup = Some(match lookup {
                Some(existing) if existing.is_mergeable(&found) => existing.intersection(&found),
                Some(existing) => existing,
                None => found,
            });
        }
        let Some(lookup) = lookup else {
            return Ok(None);
        };

        let restricted = indexable.with_index_lookup(ctx, lookup)?;
        tracing::debug!(table = table.name(), "index lookup selected");
        Ok(Some(Node::Filter {
            predicate: predicate.clone(),
            child: Box::new(Node::ResolvedTable {
                database: database.clone(),
                table: restricted,
                as_of: as_of.clone(),
                tracked: *tracked,
            }),
        }))
    })
}
