//! Resolution rules: names to tables, columns, functions and procedures

use std::sync::Arc;

use crate::analyzer::{Analyzer, Scope};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::expr::{AggregateExpr, AggregateOp, ColumnRef, Expression, SubqueryExpr};
use crate::plan::{transform_expressions, transform_up, Node};
use crate::types::{Column, Schema, Value};

/// Lowercase identifiers and inject the session's current database into
/// unqualified table references.
pub(super) fn normalize_idents(
    ctx: &Context,
    _analyzer: &Analyzer,
    node: &Node,
    _scope: &Scope,
) -> Result<Option<Node>> {
    let current = ctx.session().current_database();
    let normalized = transform_up(node, &mut |n| match n {
        Node::UnresolvedTable {
            database,
            name,
            as_of,
        } => {
            let lowered = name.to_lowercase();
            let db = database
                .as_ref()
                .map(|d| d.to_lowercase())
                .or_else(|| current.clone());
            if db == *database && lowered == *name {
                Ok(None)
            } else {
                Ok(Some(Node::UnresolvedTable {
                    database: db,
                    name: lowered,
                    as_of: as_of.clone(),
                }))
            }
        }
        _ => Ok(None),
    })?;

    let base = normalized.as_ref().unwrap_or(node);
    let lowered = transform_expressions(base, &mut |e| match e {
        Expression::UnresolvedColumn { table, name } => {
            let lowered_name = name.to_lowercase();
            let lowered_table = table.as_ref().map(|t| t.to_lowercase());
            if lowered_name == *name && lowered_table == *table {
                Ok(None)
            } else {
                Ok(Some(Expression::UnresolvedColumn {
                    table: lowered_table,
                    name: lowered_name,
                }))
            }
        }
        _ => Ok(None),
    })?;
    Ok(lowered.or(normalized))
}

/// Bind table names to catalog tables, expanding views (with cycle
/// detection), applying AS OF snapshots, resolving table functions, and
/// registering recursive-CTE self references.
pub(super) fn resolve_tables(
    ctx: &Context,
    analyzer: &Analyzer,
    node: &Node,
    scope: &Scope,
) -> Result<Option<Node>> {
    walk_tables(ctx, analyzer, node, scope)
}

fn walk_tables(
    ctx: &Context,
    analyzer: &Analyzer,
    node: &Node,
    scope: &Scope,
) -> Result<Option<Node>> {
    // The recursive member of a CTE may reference the CTE's own name; give
    // it a scope binding before descending.
    if let Node::RecursiveCte {
        name,
        column_names,
        anchor,
        recursive,
        distinct,
    } = node
    {
        let new_anchor = walk_tables(ctx, analyzer, anchor, scope)?;
        let anchor_now = new_anchor.as_ref().unwrap_or(anchor);
        let mut new_recursive = None;
        if anchor_now.resolved() {
            let schema = cte_schema(anchor_now, column_names, name);
            let cte_scope = scope.with_cte(name, schema);
            new_recursive = walk_tables(ctx, analyzer, recursive, &cte_scope)?;
        }
        if new_anchor.is_none() && new_recursive.is_none() {
            return Ok(None);
        }
        return Ok(Some(Node::RecursiveCte {
            name: name.clone(),
            column_names: column_names.clone(),
            anchor: Box::new(new_anchor.unwrap_or_else(|| (**anchor).clone())),
            recursive: Box::new(new_recursive.unwrap_or_else(|| (**recursive).clone())),
            distinct: *distinct,
        }));
    }

    // Children first, then the node's own expressions' subquery plans,
    // then the node itself.
    let mut changed = false;
    let mut children = Vec::new();
    for child in node.children() {
        match walk_tables(ctx, analyzer, child, scope)? {
            Some(new_child) => {
                children.push(new_child);
                changed = true;
            }
            None => children.push(child.clone()),
        }
    }
    let mut current = if changed {
        node.with_children(children)?
    } else {
        node.clone()
    };

    if let Some(with_subqueries) = map_subquery_plans(&current, &mut |plan| {
        walk_tables(ctx, analyzer, plan, scope)
    })? {
        current = with_subqueries;
        changed = true;
    }

    let resolved = match &current {
        Node::UnresolvedTable {
            database,
            name,
            as_of,
        } => Some(resolve_one_table(
            ctx,
            analyzer,
            scope,
            database.as_deref(),
            name,
            as_of.as_ref(),
        )?),
        Node::TableFunctionCall {
            name,
            args,
            function: None,
            ..
        } => resolve_table_function(ctx, analyzer, name, args)?,
        _ => None,
    };

    match resolved {
        Some(Some(node)) => Ok(Some(node)),
        Some(None) | None if changed => Ok(Some(current)),
        _ => Ok(None),
    }
}

fn resolve_one_table(
    ctx: &Context,
    analyzer: &Analyzer,
    scope: &Scope,
    database: Option<&str>,
    name: &str,
    as_of: Option<&Expression>,
) -> Result<Option<Node>> {
    // A recursive CTE's self reference binds to the working table.
    if let Some(schema) = scope.cte(name) {
        return Ok(Some(Node::ResolvedTable {
            database: String::new(),
            table: Arc::new(crate::execution::WorkingTable {
                name: name.to_string(),
                schema: schema.clone(),
            }),
            as_of: None,
            tracked: false,
        }));
    }

    // Procedure and view bodies are injected after normalisation, so an
    // unqualified reference may still need the session's database here.
    let database = match database {
        Some(database) => database.to_string(),
        None => ctx
            .session()
            .current_database()
            .ok_or_else(|| Error::DatabaseNotFound("no database selected".into()))?,
    };
    let db = analyzer.catalog().database(ctx, &database)?;

    // Views expand inline; the resolution stack catches self reference.
    if let Some(view) = db.view(ctx, name)? {
        let view_scope = scope.resolving("view", name)?;
        let expanded = walk_tables(ctx, analyzer, &view.definition, &view_scope)?
            .unwrap_or(view.definition);
        return Ok(Some(Node::SubqueryAlias {
            name: name.to_string(),
            child: Box::new(expanded),
        }));
    }

    let Some(table) = db.table_insensitive(ctx, name)? else {
        return Err(Error::TableNotFound(name.to_string()));
    };

    match as_of {
        None => Ok(Some(Node::ResolvedTable {
            database: database.to_string(),
            table,
            as_of: None,
            tracked: false,
        })),
        Some(selector_expr) => {
            if !selector_expr.resolved() {
                // A parameterised AS OF waits for its binding.
                return Ok(None);
            }
            let selector = selector_expr.eval(ctx, &vec![])?;
            let versioned = table.as_versioned().ok_or_else(|| {
                Error::Unsupported(format!("table {name} does not support AS OF"))
            })?;
            let snapshot = versioned.table_as_of(ctx, &selector)?;
            Ok(Some(Node::ResolvedTable {
                database: database.to_string(),
                table: snapshot,
                as_of: Some(selector),
                tracked: false,
            }))
        }
    }
}

fn resolve_table_function(
    ctx: &Context,
    analyzer: &Analyzer,
    name: &str,
    args: &[Expression],
) -> Result<Option<Option<Node>>> {
    if !args.iter().all(|a| a.resolved()) {
        return Ok(Some(None));
    }
    let Some(function) = analyzer.catalog().table_function(ctx, name) else {
        return Err(Error::TableFunctionNotFound(name.to_string()));
    };
    let values: Vec<Value> = args
        .iter()
        .map(|a| a.eval(ctx, &vec![]))
        .collect::<Result<_>>()?;
    let schema = function.schema(&values)?;
    Ok(Some(Some(Node::TableFunctionCall {
        name: name.to_string(),
        args: args.to_vec(),
        function: Some(function),
        schema,
    })))
}

fn cte_schema(anchor: &Node, column_names: &[String], name: &str) -> Schema {
    let anchor_schema = anchor.schema();
    Schema::from(
        anchor_schema
            .columns()
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let mut c = c.clone();
                if let Some(renamed) = column_names.get(i) {
                    c.name = renamed.clone();
                }
                c.source = Some(name.to_string());
                c
            })
            .collect::<Vec<Column>>(),
    )
}

/// Wrap writes with the statement-level triggers defined on their target
/// table. Trigger bodies are walked recursively with the resolution stack,
/// so a trigger that writes back into its own table (directly or through
/// another trigger) fails with RecursiveDefinition.
pub(super) fn resolve_triggers(
    ctx: &Context,
    analyzer: &Analyzer,
    node: &Node,
    scope: &Scope,
) -> Result<Option<Node>> {
    walk_triggers(ctx, analyzer, node, scope)
}

fn walk_triggers(
    ctx: &Context,
    analyzer: &Analyzer,
    node: &Node,
    scope: &Scope,
) -> Result<Option<Node>> {
    // An existing wrapper was fully processed when it was created.
    if matches!(node, Node::TriggeredStatement { .. }) {
        return Ok(None);
    }

    let mut changed = false;
    let mut children = Vec::new();
    for child in node.children() {
        match walk_triggers(ctx, analyzer, child, scope)? {
            Some(new_child) => {
                children.push(new_child);
                changed = true;
            }
            None => children.push(child.clone()),
        }
    }
    let current = if changed {
        node.with_children(children)?
    } else {
        node.clone()
    };

    let target = match &current {
        Node::Insert { table, .. } | Node::Update { table, .. } | Node::Delete { table, .. } => {
            match table.as_ref() {
                Node::ResolvedTable {
                    database, table, ..
                } if !database.is_empty() => Some((database.clone(), table.name().to_string())),
                _ => None,
            }
        }
        _ => None,
    };
    let Some((database, table_name)) = target else {
        return Ok(changed.then_some(current));
    };

    let db = analyzer.catalog().database(ctx, &database)?;
    let triggers = db.triggers(ctx, &table_name)?;
    if triggers.is_empty() {
        return Ok(changed.then_some(current));
    }

    let mut bodies = Vec::with_capacity(triggers.len());
    for trigger in triggers {
        let trigger_scope = scope.resolving("trigger", &trigger.name)?;
        // Resolve the body's tables first so nested writes are visible to
        // the recursion check below.
        let resolved = walk_tables(ctx, analyzer, &trigger.definition, &trigger_scope)?
            .unwrap_or(trigger.definition);
        let body =
            walk_triggers(ctx, analyzer, &resolved, &trigger_scope)?.unwrap_or(resolved);
        bodies.push(body);
    }
    Ok(Some(Node::TriggeredStatement {
        child: Box::new(current),
        triggers: bodies,
    }))
}

/// Resolve CALL statements: look up the procedure, substitute arguments for
/// parameters, propagate AS OF into tables and nested calls that don't
/// carry their own, and inline nested procedure bodies with cycle
/// detection.
pub(super) fn resolve_procedures(
    ctx: &Context,
    analyzer: &Analyzer,
    node: &Node,
    scope: &Scope,
) -> Result<Option<Node>> {
    transform_up(node, &mut |n| {
        let Node::Call {
            database,
            procedure,
            args,
            as_of,
            body: None,
        } = n
        else {
            return Ok(None);
        };
        if !args.iter().all(|a| a.resolved()) {
            return Ok(None);
        }

        let db_name = database
            .clone()
            .or_else(|| ctx.session().current_database())
            .ok_or_else(|| Error::DatabaseNotFound("no database selected".into()))?;
        let db = analyzer.catalog().database(ctx, &db_name)?;
        let Some(proc) = db.procedure(ctx, procedure)? else {
            return Err(Error::ProcedureNotFound(procedure.clone()));
        };
        let call_scope = scope.resolving("procedure", procedure)?;

        let mut body = proc.body.clone();
        if !proc.params.is_empty() {
            body = transform_expressions(&body, &mut |e| match e {
                Expression::UnresolvedColumn { table: None, name } => {
                    match proc.params.iter().position(|p| p.eq_ignore_ascii_case(name)) {
                        Some(i) => Ok(args.get(i).cloned().map(Some).unwrap_or(None)),
                        None => Ok(None),
                    }
                }
                _ => Ok(None),
            })?
            .unwrap_or(body);
        }
        if let Some(as_of) = as_of {
            body = propagate_as_of(&body, as_of)?;
        }
        // Nested CALLs inline here so the cycle stack spans the chain.
        body = resolve_procedures(ctx, analyzer, &body, &call_scope)?.unwrap_or(body);

        Ok(Some(Node::Call {
            database: Some(db_name),
            procedure: procedure.clone(),
            args: args.clone(),
            as_of: as_of.clone(),
            body: Some(Box::new(body)),
        }))
    })
}

/// An AS OF on a CALL flows down to every table and nested call that does
/// not already select its own snapshot; an inner AS OF takes precedence.
fn propagate_as_of(body: &Node, as_of: &Expression) -> Result<Node> {
    let propagated = transform_up(body, &mut |n| match n {
        Node::UnresolvedTable {
            database,
            name,
            as_of: None,
        } => Ok(Some(Node::UnresolvedTable {
            database: database.clone(),
            name: name.clone(),
            as_of: Some(as_of.clone()),
        })),
        Node::Call {
            database,
            procedure,
            args,
            as_of: None,
            body: None,
        } => Ok(Some(Node::Call {
            database: database.clone(),
            procedure: procedure.clone(),
            args: args.clone(),
            as_of: Some(as_of.clone()),
            body: None,
        })),
        _ => Ok(None),
    })?;
    Ok(propagated.unwrap_or_else(|| body.clone()))
}

/// Resolve column names against the input schema of each node, expanding
/// `*`, and falling back to the scope chain for correlated references.
pub(super) fn resolve_columns(
    ctx: &Context,
    analyzer: &Analyzer,
    node: &Node,
    scope: &Scope,
) -> Result<Option<Node>> {
    transform_up(node, &mut |n| {
        let Some(input) = input_schema(n) else {
            return Ok(None);
        };
        let mut current = n.clone();
        let mut changed = false;

        if let Some(expanded) = expand_stars(&current, &input)? {
            current = expanded;
            changed = true;
        }

        let inputs_resolved = current.children().iter().all(|c| c.resolved());
        let mut exprs = Vec::new();
        let mut exprs_changed = false;
        for expr in current.expressions() {
            let new_expr = expr.transform_up(&mut |e| match e {
                Expression::UnresolvedColumn { table, name } => {
                    resolve_column_ref(&input, scope, table.as_deref(), name, inputs_resolved)
                }
                Expression::Subquery(sq) => {
                    let subquery_scope = scope.enter(input.clone());
                    let new_plan =
                        resolve_columns(ctx, analyzer, &sq.plan, &subquery_scope)?;
                    match new_plan {
                        Some(plan) => Ok(Some(Expression::Subquery(Box::new(SubqueryExpr {
                            plan,
                            kind: sq.kind.clone(),
                        })))),
                        None => Ok(None),
                    }
                }
                _ => Ok(None),
            })?;
            match new_expr {
                Some(e) => {
                    exprs.push(e);
                    exprs_changed = true;
                }
                None => exprs.push(expr.clone()),
            }
        }
        if exprs_changed {
            current = current.with_expressions(exprs)?;
            changed = true;
        }
        if changed {
            Ok(Some(current))
        } else {
            Ok(None)
        }
    })
}

fn resolve_column_ref(
    input: &Schema,
    scope: &Scope,
    table: Option<&str>,
    name: &str,
    inputs_resolved: bool,
) -> Result<Option<Expression>> {
    if let Some(index) = input.index_of_qualified(table, name) {
        let column = &input.columns()[index];
        return Ok(Some(Expression::Column(ColumnRef {
            index,
            name: column.name.clone(),
            table: column.source.clone(),
            data_type: column.data_type.clone(),
            nullable: column.nullable,
        })));
    }
    for (depth, outer) in scope.outer_schemas() {
        if let Some(index) = outer.index_of_qualified(table, name) {
            let column = &outer.columns()[index];
            return Ok(Some(Expression::OuterColumn {
                depth,
                column: ColumnRef {
                    index,
                    name: column.name.clone(),
                    table: column.source.clone(),
                    data_type: column.data_type.clone(),
                    nullable: column.nullable,
                },
            }));
        }
    }
    if inputs_resolved {
        let qualified = match table {
            Some(t) => format!("{t}.{name}"),
            None => name.to_string(),
        };
        return Err(Error::ColumnNotFound(qualified));
    }
    Ok(None)
}

/// The schema the node's expressions are evaluated against, when its
/// inputs are resolved enough to know it.
fn input_schema(node: &Node) -> Option<Schema> {
    use Node::*;
    match node {
        Project { child, .. }
        | Filter { child, .. }
        | Having { child, .. }
        | Sort { child, .. }
        | Limit { child, .. }
        | Offset { child, .. }
        | GroupBy { child, .. }
        | Window { child, .. } => child.resolved().then(|| child.schema()),
        Join { left, right, .. } => {
            (left.resolved() && right.resolved()).then(|| left.schema().join(&right.schema()))
        }
        Update { table, .. } | Delete { table, .. } | CreateIndex { table, .. } => {
            table.resolved().then(|| table.schema())
        }
        _ => None,
    }
}

/// Expand `*` and `t.*` against the input schema in projection lists.
fn expand_stars(node: &Node, input: &Schema) -> Result<Option<Node>> {
    let expand = |exprs: &[Expression]| -> Option<Vec<Expression>> {
        if !exprs.iter().any(|e| matches!(e, Expression::Star { .. })) {
            return None;
        }
        let mut out = Vec::new();
        for expr in exprs {
            match expr {
                Expression::Star { table } => {
                    for (i, column) in input.columns().iter().enumerate() {
                        let matches_table = match (table, &column.source) {
                            (Some(t), Some(s)) => s.eq_ignore_ascii_case(t),
                            (Some(_), None) => false,
                            (None, _) => true,
                        };
                        if matches_table {
                            out.push(Expression::Column(ColumnRef {
                                index: i,
                                name: column.name.clone(),
                                table: column.source.clone(),
                                data_type: column.data_type.clone(),
                                nullable: column.nullable,
                            }));
                        }
                    }
                }
                other => out.push(other.clone()),
            }
        }
        Some(out)
    };

    match node {
        Node::Project { expressions, child } => Ok(expand(expressions).map(|expressions| {
            Node::Project {
                expressions,
                child: child.clone(),
            }
        })),
        Node::GroupBy {
            selected,
            grouping,
            child,
        } => Ok(expand(selected).map(|selected| Node::GroupBy {
            selected,
            grouping: grouping.clone(),
            child: child.clone(),
        })),
        _ => Ok(None),
    }
}

/// Resolve function calls through the registry; EXPLODE becomes a generator
/// marker and aggregate names become aggregate expressions.
pub(super) fn resolve_functions(
    ctx: &Context,
    analyzer: &Analyzer,
    node: &Node,
    scope: &Scope,
) -> Result<Option<Node>> {
    let rewritten = transform_expressions(node, &mut |e| {
        let Expression::UnresolvedFunction { name, args } = e else {
            return Ok(None);
        };
        let upper = name.to_uppercase();
        if upper == "EXPLODE" {
            if args.len() != 1 {
                return Err(Error::InvalidArgumentCount {
                    name: upper,
                    expected: 1,
                    actual: args.len(),
                });
            }
            return Ok(Some(Expression::Explode(Box::new(args[0].clone()))));
        }
        if let Some(op) = aggregate_op(&upper) {
            if upper == "COUNT" && matches!(args.first(), Some(Expression::Star { .. })) {
                return Ok(Some(Expression::Aggregate(AggregateExpr::count_star())));
            }
            if args.len() != 1 {
                return Err(Error::InvalidArgumentCount {
                    name: upper,
                    expected: 1,
                    actual: args.len(),
                });
            }
            return Ok(Some(Expression::Aggregate(AggregateExpr::new(
                op,
                args[0].clone(),
            ))));
        }
        if !args.iter().all(|a| a.resolved()) {
            return Ok(None);
        }
        let arg_types: Vec<_> = args.iter().map(|a| a.data_type()).collect();
        let return_type = crate::functions::validate(name, &arg_types)?;
        Ok(Some(Expression::Function {
            name: upper,
            args: args.clone(),
            return_type,
        }))
    })?;

    // Subquery plans carry their own function calls.
    let base = rewritten.as_ref().unwrap_or(node);
    let nested = map_subquery_plans(base, &mut |plan| {
        resolve_functions(ctx, analyzer, plan, scope)
    })?;
    Ok(nested.or(rewritten))
}

fn aggregate_op(name: &str) -> Option<AggregateOp> {
    Some(match name {
        "COUNT" => AggregateOp::Count,
        "SUM" => AggregateOp::Sum,
        "AVG" => AggregateOp::Avg,
        "MIN" => AggregateOp::Min,
        "MAX" => AggregateOp::Max,
        "FIRST" => AggregateOp::First,
        "LAST" => AggregateOp::Last,
        _ => return None,
    })
}

/// Apply `f` to every subquery plan in the node's own expressions.
fn map_subquery_plans(
    node: &Node,
    f: &mut dyn FnMut(&Node) -> Result<Option<Node>>,
) -> Result<Option<Node>> {
    let mut exprs = Vec::new();
    let mut changed = false;
    for expr in node.expressions() {
        let new_expr = expr.transform_up(&mut |e| match e {
            Expression::Subquery(sq) => match f(&sq.plan)? {
                Some(plan) => Ok(Some(Expression::Subquery(Box::new(SubqueryExpr {
                    plan,
                    kind: sq.kind.clone(),
                })))),
                None => Ok(None),
            },
            _ => Ok(None),
        })?;
        match new_expr {
            Some(e) => {
                exprs.push(e);
                changed = true;
            }
            None => exprs.push(expr.clone()),
        }
    }
    if changed {
        Ok(Some(node.with_expressions(exprs)?))
    } else {
        Ok(None)
    }
}
