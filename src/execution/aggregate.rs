//! Grouped aggregation
//!
//! Without a grouping, a single buffer vector is driven to the end of the
//! input and exactly one row is emitted, even over empty input. With a
//! grouping, buffers live in a disposable history cache keyed by the
//! evaluated grouping values (hash plus equality, so colliding hashes can
//! never merge groups); groups are emitted in first-appearance order. The
//! cache registers with the memory manager and empties itself on demand.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{build, BoxedRowIter, RowIter};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::expr::{AggregateBuffer, AggregateExpr, Expression};
use crate::plan::Node;
use crate::session::{CacheHandle, Disposable};
use crate::types::{Row, Value};

pub fn build_group_by(
    ctx: &Context,
    selected: &[Expression],
    grouping: &[Expression],
    child: &Node,
) -> Result<BoxedRowIter> {
    let child = build(ctx, child)?;
    if grouping.is_empty() {
        Ok(Box::new(GlobalAggregateIter {
            selected: selected.to_vec(),
            child: Some(child),
            done: false,
        }))
    } else {
        Ok(Box::new(GroupedAggregateIter {
            selected: selected.to_vec(),
            grouping: grouping.to_vec(),
            child: Some(child),
            cache: None,
            handle: None,
            keys: Vec::new(),
            pos: 0,
        }))
    }
}

/// One buffer slot per selected expression: aggregates accumulate, plain
/// expressions keep the value they last evaluated to. Aliases are
/// transparent.
enum Slot {
    Aggregate(AggregateBuffer),
    Plain(Option<Value>),
}

fn unwrap_alias(expr: &Expression) -> &Expression {
    match expr {
        Expression::Alias(_, child) => unwrap_alias(child),
        other => other,
    }
}

fn aggregate_of(expr: &Expression) -> Option<&AggregateExpr> {
    match unwrap_alias(expr) {
        Expression::Aggregate(agg) => Some(agg),
        _ => None,
    }
}

fn new_slots(selected: &[Expression]) -> Vec<Slot> {
    selected
        .iter()
        .map(|e| match aggregate_of(e) {
            Some(agg) => Slot::Aggregate(agg.new_buffer()),
            None => Slot::Plain(None),
        })
        .collect()
}

fn update_slots(
    ctx: &Context,
    selected: &[Expression],
    slots: &mut [Slot],
    row: &Row,
) -> Result<()> {
    for (expr, slot) in selected.iter().zip(slots.iter_mut()) {
        match (aggregate_of(expr), slot) {
            (Some(agg), Slot::Aggregate(buffer)) => agg.update(ctx, buffer, row)?,
            (None, Slot::Plain(value)) => *value = Some(expr.eval(ctx, row)?),
            _ => return Err(Error::Internal("aggregation buffer shape mismatch".into())),
        }
    }
    Ok(())
}

fn eval_slots(ctx: &Context, selected: &[Expression], slots: &[Slot]) -> Result<Row> {
    selected
        .iter()
        .zip(slots.iter())
        .map(|(expr, slot)| match (aggregate_of(expr), slot) {
            (Some(agg), Slot::Aggregate(buffer)) => agg.eval_buffer(ctx, buffer),
            (None, Slot::Plain(value)) => Ok(value.clone().unwrap_or(Value::Null)),
            _ => Err(Error::Internal("aggregation buffer shape mismatch".into())),
        })
        .collect()
}

/// Aggregation without GROUP BY.
struct GlobalAggregateIter {
    selected: Vec<Expression>,
    child: Option<BoxedRowIter>,
    done: bool,
}

impl RowIter for GlobalAggregateIter {
    fn next(&mut self, ctx: &Context) -> Option<Result<Row>> {
        if self.done {
            return None;
        }
        self.done = true;
        let mut slots = new_slots(&self.selected);
        if let Some(child) = self.child.as_mut() {
            while let Some(item) = child.next(ctx) {
                let row = match item {
                    Ok(row) => row,
                    Err(e) => return Some(Err(e)),
                };
                if let Err(e) = update_slots(ctx, &self.selected, &mut slots, &row) {
                    return Some(Err(e));
                }
            }
        }
        Some(eval_slots(ctx, &self.selected, &slots))
    }

    fn close(&mut self, ctx: &Context) -> Result<()> {
        match self.child.take() {
            Some(mut child) => child.close(ctx),
            None => Ok(()),
        }
    }
}

/// The disposable buffer store behind grouped aggregation.
struct GroupCache {
    groups: Mutex<Option<HashMap<Row, Vec<Slot>>>>,
}

impl GroupCache {
    fn new() -> Arc<GroupCache> {
        Arc::new(GroupCache {
            groups: Mutex::new(Some(HashMap::new())),
        })
    }
}

impl Disposable for GroupCache {
    fn dispose(&self) {
        *self.groups.lock() = None;
    }

    fn size(&self) -> u64 {
        self.groups
            .lock()
            .as_ref()
            .map(|g| g.len() as u64 * 64)
            .unwrap_or(0)
    }
}

struct GroupedAggregateIter {
    selected: Vec<Expression>,
    grouping: Vec<Expression>,
    child: Option<BoxedRowIter>,
    cache: Option<Arc<GroupCache>>,
    handle: Option<CacheHandle>,
    /// Grouping keys in first-appearance order.
    keys: Vec<Row>,
    pos: usize,
}

impl GroupedAggregateIter {
    fn compute(&mut self, ctx: &Context) -> Result<()> {
        let cache = GroupCache::new();
        let cache_dyn: Arc<dyn Disposable> = Arc::clone(&cache) as Arc<dyn Disposable>;
        let weak: std::sync::Weak<dyn Disposable> = Arc::downgrade(&cache_dyn);
        self.handle = Some(ctx.memory().register(weak));
        let Some(child) = self.child.as_mut() else {
            return Ok(());
        };
        while let Some(item) = child.next(ctx) {
            ctx.check_cancelled()?;
            let row = item?;
            let key: Row = self
                .grouping
                .iter()
                .map(|e| e.eval(ctx, &row))
                .collect::<Result<_>>()?;

            let mut groups = cache.groups.lock();
            let groups = groups.as_mut().ok_or_else(|| {
                Error::Runtime("aggregation buffers were reclaimed under memory pressure".into())
            })?;
            if !groups.contains_key(&key) {
                self.keys.push(key.clone());
                groups.insert(key.clone(), new_slots(&self.selected));
            }
            let slots = groups
                .get_mut(&key)
                .ok_or_else(|| Error::Internal("missing aggregation group".into()))?;
            update_slots(ctx, &self.selected, slots, &row)?;
        }
        ctx.memory().maybe_free();
        self.cache = Some(cache);
        let mut child = self.child.take().expect("checked above");
        child.close(ctx)?;
        Ok(())
    }
}

impl RowIter for GroupedAggregateIter {
    fn next(&mut self, ctx: &Context) -> Option<Result<Row>> {
        if self.cache.is_none() {
            if self.child.is_none() {
                return None;
            }
            if let Err(e) = self.compute(ctx) {
                return Some(Err(e));
            }
        }
        let key = self.keys.get(self.pos)?.clone();
        self.pos += 1;
        let cache = self.cache.as_ref()?;
        let groups = cache.groups.lock();
        let Some(groups) = groups.as_ref() else {
            return Some(Err(Error::Runtime(
                "aggregation buffers were reclaimed under memory pressure".into(),
            )));
        };
        let slots = match groups.get(&key) {
            Some(slots) => slots,
            None => return Some(Err(Error::Internal("missing aggregation group".into()))),
        };
        Some(eval_slots(ctx, &self.selected, slots))
    }

    fn close(&mut self, ctx: &Context) -> Result<()> {
        if let Some(cache) = self.cache.take() {
            cache.dispose();
        }
        self.handle = None;
        self.keys = Vec::new();
        match self.child.take() {
            Some(mut child) => child.close(ctx),
            None => Ok(()),
        }
    }
}
