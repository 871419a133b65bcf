//! Window function execution
//!
//! The input is materialised, partitioned by each window's partition keys,
//! and sorted by partition then order keys. A frame cursor derives the
//! (preceding, current, following) row range per row: ROWS frames count
//! positions, RANGE frames measure value distance on the order-by key and
//! extend over peers. Each window expression is computed independently;
//! output rows follow the first window's sorted order.

use std::cmp::Ordering;

use super::{build, BoxedRowIter, RowIter};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::expr::{
    Expression, FrameBound, FrameUnit, SortField, WindowExpr, WindowFunc,
};
use crate::plan::Node;
use crate::types::{Row, Value};

pub fn build_window(
    ctx: &Context,
    expressions: &[Expression],
    child: &Node,
) -> Result<BoxedRowIter> {
    Ok(Box::new(WindowIter {
        expressions: expressions.to_vec(),
        child: Some(build(ctx, child)?),
        output: Vec::new(),
        pos: 0,
    }))
}

struct WindowIter {
    expressions: Vec<Expression>,
    child: Option<BoxedRowIter>,
    output: Vec<Row>,
    pos: usize,
}

impl WindowIter {
    fn compute(&mut self, ctx: &Context) -> Result<()> {
        let Some(child) = self.child.as_mut() else {
            return Ok(());
        };
        let mut rows = Vec::new();
        while let Some(item) = child.next(ctx) {
            ctx.check_cancelled()?;
            rows.push(item?);
        }
        let mut child = self.child.take().expect("checked above");
        child.close(ctx)?;

        // Per-expression output columns, indexed by input row.
        let mut columns: Vec<Vec<Value>> = Vec::with_capacity(self.expressions.len());
        let mut emit_order: Option<Vec<usize>> = None;
        for expr in &self.expressions {
            match expr {
                Expression::Window(w) => {
                    let (values, order) = compute_window(ctx, w, &rows)?;
                    if emit_order.is_none() {
                        emit_order = Some(order);
                    }
                    columns.push(values);
                }
                Expression::Alias(_, inner) if matches!(**inner, Expression::Window(_)) => {
                    let Expression::Window(w) = &**inner else {
                        unreachable!("matched above");
                    };
                    let (values, order) = compute_window(ctx, w, &rows)?;
                    if emit_order.is_none() {
                        emit_order = Some(order);
                    }
                    columns.push(values);
                }
                other => {
                    let values = rows
                        .iter()
                        .map(|row| other.eval(ctx, row))
                        .collect::<Result<Vec<_>>>()?;
                    columns.push(values);
                }
            }
        }

        let order = emit_order.unwrap_or_else(|| (0..rows.len()).collect());
        self.output = order
            .into_iter()
            .map(|i| columns.iter().map(|c| c[i].clone()).collect())
            .collect();
        Ok(())
    }
}

impl RowIter for WindowIter {
    fn next(&mut self, ctx: &Context) -> Option<Result<Row>> {
        if self.child.is_some() {
            if let Err(e) = self.compute(ctx) {
                return Some(Err(e));
            }
        }
        let row = self.output.get(self.pos)?.clone();
        self.pos += 1;
        Some(Ok(row))
    }

    fn close(&mut self, ctx: &Context) -> Result<()> {
        self.output = Vec::new();
        match self.child.take() {
            Some(mut child) => child.close(ctx),
            None => Ok(()),
        }
    }
}

/// Evaluate one window over all rows. Returns the value per input row and
/// the sorted row order (partition keys, then order keys).
fn compute_window(
    ctx: &Context,
    window: &WindowExpr,
    rows: &[Row],
) -> Result<(Vec<Value>, Vec<usize>)> {
    // Sort keys once per row.
    let mut partition_keys = Vec::with_capacity(rows.len());
    let mut order_keys = Vec::with_capacity(rows.len());
    for row in rows {
        partition_keys.push(
            window
                .partition_by
                .iter()
                .map(|e| e.eval(ctx, row))
                .collect::<Result<Vec<_>>>()?,
        );
        order_keys.push(
            window
                .order_by
                .iter()
                .map(|f| f.expr.eval(ctx, row))
                .collect::<Result<Vec<_>>>()?,
        );
    }

    let mut order: Vec<usize> = (0..rows.len()).collect();
    let mut failure: Option<Error> = None;
    order.sort_by(|&a, &b| {
        match compare_keys(&partition_keys[a], &partition_keys[b], None) {
            Ok(Ordering::Equal) => {}
            Ok(other) => return other,
            Err(e) => {
                failure.get_or_insert(e);
                return Ordering::Equal;
            }
        }
        match compare_keys(&order_keys[a], &order_keys[b], Some(&window.order_by)) {
            Ok(ord) => ord,
            Err(e) => {
                failure.get_or_insert(e);
                Ordering::Equal
            }
        }
    });
    if let Some(e) = failure {
        return Err(e);
    }

    let mut values = vec![Value::Null; rows.len()];
    let mut start = 0;
    while start < order.len() {
        ctx.check_cancelled()?;
        let mut end = start + 1;
        while end < order.len()
            && compare_keys(
                &partition_keys[order[start]],
                &partition_keys[order[end]],
                None,
            )? == Ordering::Equal
        {
            end += 1;
        }
        let partition = &order[start..end];
        compute_partition(ctx, window, rows, &order_keys, partition, &mut values)?;
        start = end;
    }
    Ok((values, order))
}

fn compare_keys(a: &[Value], b: &[Value], fields: Option<&[SortField]>) -> Result<Ordering> {
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let descending = fields.map(|f| !f[i].ascending).unwrap_or(false);
        let ord = x.compare(y)?;
        let ord = if descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return Ok(ord);
        }
    }
    Ok(Ordering::Equal)
}

/// Fill `values` for one sorted partition.
fn compute_partition(
    ctx: &Context,
    window: &WindowExpr,
    rows: &[Row],
    order_keys: &[Vec<Value>],
    partition: &[usize],
    values: &mut [Value],
) -> Result<()> {
    match &window.func {
        WindowFunc::RowNumber => {
            for (pos, &idx) in partition.iter().enumerate() {
                values[idx] = Value::U64(pos as u64 + 1);
            }
        }
        WindowFunc::Rank | WindowFunc::DenseRank => {
            let dense = matches!(window.func, WindowFunc::DenseRank);
            let mut rank = 0u64;
            let mut distinct = 0u64;
            let mut previous: Option<&Vec<Value>> = None;
            for (pos, &idx) in partition.iter().enumerate() {
                let key = &order_keys[idx];
                let new_key = match previous {
                    Some(prev) => compare_keys(prev, key, Some(&window.order_by))? != Ordering::Equal,
                    None => true,
                };
                if new_key {
                    distinct += 1;
                    rank = pos as u64 + 1;
                }
                values[idx] = Value::U64(if dense { distinct } else { rank });
                previous = Some(key);
            }
        }
        WindowFunc::Aggregate(agg) => {
            for (pos, &idx) in partition.iter().enumerate() {
                let (lo, hi) = frame_range(window, order_keys, partition, pos)?;
                let mut buffer = agg.new_buffer();
                for &frame_idx in &partition[lo..hi] {
                    agg.update(ctx, &mut buffer, &rows[frame_idx])?;
                }
                values[idx] = agg.eval_buffer(ctx, &buffer)?;
            }
        }
    }
    Ok(())
}

/// The half-open `[lo, hi)` range of partition positions the frame covers
/// for the row at `pos`.
fn frame_range(
    window: &WindowExpr,
    order_keys: &[Vec<Value>],
    partition: &[usize],
    pos: usize,
) -> Result<(usize, usize)> {
    // Without ORDER BY the frame is the whole partition.
    if window.order_by.is_empty() {
        return Ok((0, partition.len()));
    }
    let frame = &window.frame;
    let lo = frame_edge(frame.unit, frame.start, true, order_keys, partition, pos, window)?;
    let hi = frame_edge(frame.unit, frame.end, false, order_keys, partition, pos, window)?;
    Ok((lo.min(partition.len()), hi.min(partition.len()).max(lo)))
}

fn frame_edge(
    unit: FrameUnit,
    bound: FrameBound,
    is_start: bool,
    order_keys: &[Vec<Value>],
    partition: &[usize],
    pos: usize,
    window: &WindowExpr,
) -> Result<usize> {
    let len = partition.len();
    match (unit, bound) {
        (_, FrameBound::UnboundedPreceding) => Ok(0),
        (_, FrameBound::UnboundedFollowing) => Ok(len),
        (FrameUnit::Rows, FrameBound::Preceding(n)) => {
            let edge = pos.saturating_sub(n as usize);
            Ok(if is_start { edge } else { edge + 1 })
        }
        (FrameUnit::Rows, FrameBound::CurrentRow) => {
            Ok(if is_start { pos } else { pos + 1 })
        }
        (FrameUnit::Rows, FrameBound::Following(n)) => {
            let edge = (pos + n as usize).min(len.saturating_sub(1));
            Ok(if is_start { edge } else { edge + 1 })
        }
        // RANGE bounds measure distance on the single order-by key; the
        // current row extends over its peers.
        (FrameUnit::Range, FrameBound::CurrentRow) => {
            peer_edge(order_keys, partition, pos, is_start, window)
        }
        (FrameUnit::Range, FrameBound::Preceding(n)) | (FrameUnit::Range, FrameBound::Following(n)) => {
            let following = matches!(bound, FrameBound::Following(_));
            let key = single_order_key(order_keys, partition[pos])?;
            let distance = Value::U64(n);
            let ascending = window
                .order_by
                .first()
                .map(|f| f.ascending)
                .unwrap_or(true);
            // The bound value the frame extends to, in sort direction.
            let target = if following == ascending {
                key.checked_add(&distance)?
            } else {
                key.checked_sub(&distance)?
            };
            let mut edge = if is_start { 0 } else { len };
            if is_start {
                for (i, &idx) in partition.iter().enumerate() {
                    let k = single_order_key(order_keys, idx)?;
                    let inside = if ascending {
                        k.compare(&target)? != Ordering::Less
                    } else {
                        k.compare(&target)? != Ordering::Greater
                    };
                    if inside {
                        edge = i;
                        break;
                    }
                    edge = len;
                }
            } else {
                for (i, &idx) in partition.iter().enumerate().rev() {
                    let k = single_order_key(order_keys, idx)?;
                    let inside = if ascending {
                        k.compare(&target)? != Ordering::Greater
                    } else {
                        k.compare(&target)? != Ordering::Less
                    };
                    if inside {
                        edge = i + 1;
                        break;
                    }
                    edge = 0;
                }
            }
            Ok(edge)
        }
    }
}

/// First (or one-past-last) peer of the row at `pos`.
fn peer_edge(
    order_keys: &[Vec<Value>],
    partition: &[usize],
    pos: usize,
    is_start: bool,
    window: &WindowExpr,
) -> Result<usize> {
    let key = &order_keys[partition[pos]];
    if is_start {
        let mut edge = pos;
        while edge > 0
            && compare_keys(&order_keys[partition[edge - 1]], key, Some(&window.order_by))?
                == Ordering::Equal
        {
            edge -= 1;
        }
        Ok(edge)
    } else {
        let mut edge = pos + 1;
        while edge < partition.len()
            && compare_keys(&order_keys[partition[edge]], key, Some(&window.order_by))?
                == Ordering::Equal
        {
            edge += 1;
        }
        Ok(edge)
    }
}

fn single_order_key(order_keys: &[Vec<Value>], row_idx: usize) -> Result<Value> {
    order_keys[row_idx]
        .first()
        .cloned()
        .ok_or_else(|| Error::Internal("RANGE frame without an order key".into()))
}
