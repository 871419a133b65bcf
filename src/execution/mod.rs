//! Volcano-style execution
//!
//! The builder maps an analyzed plan node to a lazy row iterator. Iterator
//! discipline is enforced centrally by a fusing wrapper: after end or error
//! every further `next` repeats the same outcome, `close` is idempotent and
//! releases children child-first, and cancellation is checked at least once
//! per row.

mod admin;
mod aggregate;
mod cte;
mod dml;
mod generate;
mod join;
mod locks;
mod scan;
mod sort;
mod window;

pub use cte::WorkingTable;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::expr::Expression;
use crate::plan::Node;
use crate::types::{Row, Value};

/// A lazy sequence of rows. `next` returns `Some(Ok(row))`, `Some(Err(_))`
/// once, or `None` at the end of the stream.
pub trait RowIter: Send {
    fn next(&mut self, ctx: &Context) -> Option<Result<Row>>;
    fn close(&mut self, ctx: &Context) -> Result<()>;
}

impl std::fmt::Debug for dyn RowIter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn RowIter")
    }
}

pub type BoxedRowIter = Box<dyn RowIter>;

/// Build an iterator for an analyzed plan.
pub fn build(ctx: &Context, node: &Node) -> Result<BoxedRowIter> {
    Ok(Box::new(Fuse::new(build_inner(ctx, node)?)))
}

fn build_inner(ctx: &Context, node: &Node) -> Result<BoxedRowIter> {
    use Node::*;
    match node {
        ResolvedTable {
            table,
            as_of,
            tracked,
            ..
        } => scan::build_scan(ctx, table, as_of.as_ref(), *tracked),
        UnresolvedTable { name, .. } => Err(Error::Internal(format!(
            "executing unresolved table {name}"
        ))),
        Values { rows } => Ok(Box::new(ValuesIter {
            rows: rows.clone(),
            pos: 0,
        })),
        TableFunctionCall {
            name,
            args,
            function,
            ..
        } => scan::build_table_function(ctx, name, args, function.as_ref()),
        SubqueryAlias { child, .. } => build(ctx, child),
        RecursiveCte { .. } => cte::build_recursive_cte(ctx, node),
        Nothing => Ok(Box::new(EmptyIter)),

        Project { expressions, child } => Ok(Box::new(ProjectIter {
            expressions: expressions.clone(),
            child: build(ctx, child)?,
        })),
        Filter { predicate, child } | Having { predicate, child } => Ok(Box::new(FilterIter {
            predicate: predicate.clone(),
            child: build(ctx, child)?,
        })),
        Sort { fields, child } => sort::build_sort(ctx, fields, child),
        Limit { limit, child } => {
            let bound = bound_value(ctx, limit)?;
            Ok(Box::new(LimitIter {
                remaining: bound,
                child: build(ctx, child)?,
            }))
        }
        Offset { offset, child } => {
            let bound = bound_value(ctx, offset)?;
            Ok(Box::new(OffsetIter {
                to_skip: bound,
                child: build(ctx, child)?,
            }))
        }
        Distinct { child } => sort::build_distinct(ctx, child),
        GroupBy {
            selected,
            grouping,
            child,
        } => aggregate::build_group_by(ctx, selected, grouping, child),
        Window { expressions, child } => window::build_window(ctx, expressions, child),
        Join { .. } => join::build_join(ctx, node),
        Generate { column, child } => generate::build_generate(ctx, column, child),
        QueryProcess { child } => Ok(Box::new(QueryProcessIter {
            child: Some(build(ctx, child)?),
            notified: false,
        })),

        Insert { .. } | Update { .. } | Delete { .. } => dml::build_dml(ctx, node),
        TriggeredStatement { child, triggers } => {
            // The wrapped statement runs first; its triggers fire afterwards
            // in definition order.
            let rows = collect(ctx, build(ctx, child)?)?;
            for trigger in triggers {
                collect(ctx, build(ctx, trigger)?)?;
            }
            Ok(Box::new(admin::Materialised::of(rows)))
        }
        CreateTable { .. } | DropTable { .. } | CreateIndex { .. } | DropIndex { .. } => {
            admin::build_ddl(ctx, node)
        }
        Set { .. } | Use { .. } | ShowProcessList | ShowWarnings | ShowVariables { .. }
        | ShowCharset | Kill { .. } => admin::build_admin(ctx, node),
        LockTables { .. } | UnlockTables => locks::build_locks(ctx, node),
        ChangeReplicationSource { .. } | StartReplica | StopReplica => {
            Err(Error::ReplicationUnsupported)
        }
        Call { body, .. } => match body {
            Some(body) => build(ctx, body),
            None => Err(Error::Internal("executing unresolved CALL".into())),
        },
        Prepare { .. } | ExecutePrepared { .. } | Deallocate { .. } => Err(Error::Internal(
            "prepared statements are dispatched by the engine".into(),
        )),
    }
}

/// Evaluate a limit/offset bound; prepared parameters have been bound by
/// this point, so the expression is row-independent.
fn bound_value(ctx: &Context, expr: &Expression) -> Result<u64> {
    let v = expr.eval(ctx, &vec![])?;
    match v {
        Value::Null => Ok(0),
        v => Ok(v.to_i128()?.max(0) as u64),
    }
}

/// Enforces the iterator contract around an inner iterator.
struct Fuse {
    inner: BoxedRowIter,
    state: FuseState,
    closed: bool,
}

enum FuseState {
    Open,
    Ended,
    Failed(Error),
}

impl Fuse {
    fn new(inner: BoxedRowIter) -> Fuse {
        Fuse {
            inner,
            state: FuseState::Open,
            closed: false,
        }
    }
}

impl RowIter for Fuse {
    fn next(&mut self, ctx: &Context) -> Option<Result<Row>> {
        match &self.state {
            FuseState::Ended => return None,
            FuseState::Failed(e) => return Some(Err(e.clone())),
            FuseState::Open => {}
        }
        if let Err(e) = ctx.check_cancelled() {
            self.state = FuseState::Failed(e.clone());
            return Some(Err(e));
        }
        match self.inner.next(ctx) {
            Some(Ok(row)) => Some(Ok(row)),
            Some(Err(e)) => {
                self.state = FuseState::Failed(e.clone());
                Some(Err(e))
            }
            None => {
                self.state = FuseState::Ended;
                None
            }
        }
    }

    fn close(&mut self, ctx: &Context) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.close(ctx)
    }
}

struct EmptyIter;

impl RowIter for EmptyIter {
    fn next(&mut self, _ctx: &Context) -> Option<Result<Row>> {
        None
    }

    fn close(&mut self, _ctx: &Context) -> Result<()> {
        Ok(())
    }
}

struct ValuesIter {
    rows: Vec<Vec<Expression>>,
    pos: usize,
}

impl RowIter for ValuesIter {
    fn next(&mut self, ctx: &Context) -> Option<Result<Row>> {
        let exprs = self.rows.get(self.pos)?;
        self.pos += 1;
        let row: Result<Row> = exprs.iter().map(|e| e.eval(ctx, &vec![])).collect();
        Some(row)
    }

    fn close(&mut self, _ctx: &Context) -> Result<()> {
        Ok(())
    }
}

struct ProjectIter {
    expressions: Vec<Expression>,
    child: BoxedRowIter,
}

impl RowIter for ProjectIter {
    fn next(&mut self, ctx: &Context) -> Option<Result<Row>> {
        let row = match self.child.next(ctx)? {
            Ok(row) => row,
            Err(e) => return Some(Err(e)),
        };
        let projected: Result<Row> = self
            .expressions
            .iter()
            .map(|e| e.eval(ctx, &row))
            .collect();
        Some(projected)
    }

    fn close(&mut self, ctx: &Context) -> Result<()> {
        self.child.close(ctx)
    }
}

struct FilterIter {
    predicate: Expression,
    child: BoxedRowIter,
}

impl RowIter for FilterIter {
    fn next(&mut self, ctx: &Context) -> Option<Result<Row>> {
        loop {
            let row = match self.child.next(ctx)? {
                Ok(row) => row,
                Err(e) => return Some(Err(e)),
            };
            match self.predicate.eval(ctx, &row) {
                Ok(v) => match v.is_true() {
                    Ok(true) => return Some(Ok(row)),
                    Ok(false) => continue,
                    Err(e) => return Some(Err(e)),
                },
                Err(e) => return Some(Err(e)),
            }
        }
    }

    fn close(&mut self, ctx: &Context) -> Result<()> {
        self.child.close(ctx)
    }
}

struct LimitIter {
    remaining: u64,
    child: BoxedRowIter,
}

impl RowIter for LimitIter {
    fn next(&mut self, ctx: &Context) -> Option<Result<Row>> {
        if self.remaining == 0 {
            return None;
        }
        let row = self.child.next(ctx)?;
        if row.is_ok() {
            self.remaining -= 1;
        }
        Some(row)
    }

    fn close(&mut self, ctx: &Context) -> Result<()> {
        self.child.close(ctx)
    }
}

struct OffsetIter {
    to_skip: u64,
    child: BoxedRowIter,
}

impl RowIter for OffsetIter {
    fn next(&mut self, ctx: &Context) -> Option<Result<Row>> {
        while self.to_skip > 0 {
            match self.child.next(ctx)? {
                Ok(_) => self.to_skip -= 1,
                Err(e) => return Some(Err(e)),
            }
        }
        self.child.next(ctx)
    }

    fn close(&mut self, ctx: &Context) -> Result<()> {
        self.child.close(ctx)
    }
}

/// Ends the tracked process when the root iterator finishes or is closed,
/// whichever comes first.
struct QueryProcessIter {
    child: Option<BoxedRowIter>,
    notified: bool,
}

impl QueryProcessIter {
    fn notify(&mut self, ctx: &Context) {
        if !self.notified {
            self.notified = true;
            if let Some(list) = ctx.process_list() {
                list.end_query(ctx);
            }
        }
    }
}

impl RowIter for QueryProcessIter {
    fn next(&mut self, ctx: &Context) -> Option<Result<Row>> {
        let child = self.child.as_mut()?;
        match child.next(ctx) {
            Some(row) => Some(row),
            None => {
                self.notify(ctx);
                None
            }
        }
    }

    fn close(&mut self, ctx: &Context) -> Result<()> {
        let result = match self.child.as_mut() {
            Some(child) => child.close(ctx),
            None => Ok(()),
        };
        self.notify(ctx);
        result
    }
}

/// Drain an iterator into a vector, closing it afterwards.
pub fn collect(ctx: &Context, mut iter: BoxedRowIter) -> Result<Vec<Row>> {
    let mut rows = Vec::new();
    let mut failure = None;
    while let Some(item) = iter.next(ctx) {
        match item {
            Ok(row) => rows.push(row),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    let close_result = iter.close(ctx);
    match failure {
        Some(e) => Err(e),
        None => {
            close_result?;
            Ok(rows)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fuse_repeats_end_and_error() {
        struct OneShot {
            served: bool,
        }
        impl RowIter for OneShot {
            fn next(&mut self, _ctx: &Context) -> Option<Result<Row>> {
                if self.served {
                    // A misbehaving inner iterator; Fuse must hide this.
                    Some(Ok(vec![Value::I64(99)]))
                } else {
                    self.served = true;
                    None
                }
            }
            fn close(&mut self, _ctx: &Context) -> Result<()> {
                Ok(())
            }
        }

        let ctx = Context::for_tests();
        let mut iter = Fuse::new(Box::new(OneShot { served: false }));
        assert!(iter.next(&ctx).is_none());
        assert!(iter.next(&ctx).is_none());
        assert!(iter.close(&ctx).is_ok());
        assert!(iter.close(&ctx).is_ok());
    }

    #[test]
    fn test_fuse_observes_cancellation() {
        let ctx = Context::for_tests();
        let mut iter = Fuse::new(Box::new(ValuesIter {
            rows: vec![vec![Expression::literal(1i64)]],
            pos: 0,
        }));
        ctx.cancel_token().cancel();
        assert_eq!(iter.next(&ctx), Some(Err(Error::Cancelled)));
        // The outcome repeats.
        assert_eq!(iter.next(&ctx), Some(Err(Error::Cancelled)));
    }

    #[test]
    fn test_limit_offset() -> Result<()> {
        let ctx = Context::for_tests();
        let rows: Vec<Vec<Expression>> = (0..5)
            .map(|i| vec![Expression::literal(i as i64)])
            .collect();
        let plan = Node::Offset {
            offset: Expression::literal(1i64),
            child: Box::new(Node::Limit {
                limit: Expression::literal(3i64),
                child: Box::new(Node::Values { rows }),
            }),
        };
        let iter = build(&ctx, &plan)?;
        let rows = collect(&ctx, iter)?;
        assert_eq!(rows, vec![vec![Value::I64(1)], vec![Value::I64(2)]]);
        Ok(())
    }
}
