//! Join execution
//!
//! The right side is materialised as the build side. Equi-conditions over
//! column pairs become a hash join; everything else falls back to a nested
//! loop. Outer rows stream in outer-iterator order and, for a given outer
//! row, matches appear in inner-iterator order. A right join runs as a left
//! join with swapped inputs and its output columns restored; a full outer
//! join is the left join followed by the unmatched build rows.

use std::collections::HashMap;

use super::{build, BoxedRowIter, RowIter};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::expr::{CompareOp, Expression};
use crate::plan::{JoinType, Node};
use crate::types::{Row, Value};

pub fn build_join(ctx: &Context, node: &Node) -> Result<BoxedRowIter> {
    let Node::Join {
        join_type,
        condition,
        left,
        right,
    } = node
    else {
        return Err(Error::Internal("build_join on a non-join node".into()));
    };

    let left_width = left.schema().len();
    let right_width = right.schema().len();

    if *join_type == JoinType::Right {
        // left ⟖ right  ≡  right ⟕ left with output columns restored.
        let swapped_condition = condition
            .as_ref()
            .map(|c| swap_sides(c, left_width, right_width))
            .transpose()?;
        let inner = JoinIter::new(
            build(ctx, right)?,
            build(ctx, left)?,
            swapped_condition,
            JoinType::Left,
            right_width,
            left_width,
        );
        return Ok(Box::new(SwapColumnsIter {
            inner,
            first_width: right_width,
        }));
    }

    Ok(Box::new(JoinIter::new(
        build(ctx, left)?,
        build(ctx, right)?,
        condition.clone(),
        *join_type,
        left_width,
        right_width,
    )))
}

/// Rebase a condition written against `[left, right]` onto `[right, left]`.
fn swap_sides(condition: &Expression, left_width: usize, right_width: usize) -> Result<Expression> {
    Ok(condition
        .transform_up(&mut |e| match e {
            Expression::Column(c) => {
                let mut c = c.clone();
                c.index = if c.index < left_width {
                    c.index + right_width
                } else {
                    c.index - left_width
                };
                Ok(Some(Expression::Column(c)))
            }
            _ => Ok(None),
        })?
        .unwrap_or_else(|| condition.clone()))
}

/// Split an equi-condition into per-side key expressions, when the whole
/// condition is a conjunction of column equalities across the two sides.
fn equi_keys(
    condition: &Expression,
    left_width: usize,
) -> Option<(Vec<Expression>, Vec<Expression>)> {
    let mut pairs = Vec::new();
    collect_equalities(condition, &mut pairs)?;
    let mut left_keys = Vec::new();
    let mut right_keys = Vec::new();
    for (a, b) in pairs {
        let (ai, bi) = match (&a, &b) {
            (Expression::Column(x), Expression::Column(y)) => (x.index, y.index),
            _ => return None,
        };
        if ai < left_width && bi >= left_width {
            left_keys.push(a);
            right_keys.push(rebase(&b, left_width));
        } else if bi < left_width && ai >= left_width {
            left_keys.push(b);
            right_keys.push(rebase(&a, left_width));
        } else {
            return None;
        }
    }
    Some((left_keys, right_keys))
}

fn collect_equalities(
    condition: &Expression,
    out: &mut Vec<(Expression, Expression)>,
) -> Option<()> {
    match condition {
        Expression::And(l, r) => {
            collect_equalities(l, out)?;
            collect_equalities(r, out)
        }
        Expression::Compare(CompareOp::Equal, l, r) => {
            out.push((l.as_ref().clone(), r.as_ref().clone()));
            Some(())
        }
        _ => None,
    }
}

fn rebase(expr: &Expression, offset: usize) -> Expression {
    match expr {
        Expression::Column(c) => {
            let mut c = c.clone();
            c.index -= offset;
            Expression::Column(c)
        }
        other => other.clone(),
    }
}

struct JoinIter {
    left: BoxedRowIter,
    right: Option<BoxedRowIter>,
    condition: Option<Expression>,
    join_type: JoinType,
    left_width: usize,
    right_width: usize,
    /// Materialised build side.
    right_rows: Vec<Row>,
    /// Hash table over the build side, when the condition allows it.
    keys: Option<(Vec<Expression>, Vec<Expression>, HashMap<Row, Vec<usize>>)>,
    built: bool,
    current: Option<CurrentLeft>,
    /// Build rows that matched, for the full-outer tail.
    right_matched: Vec<bool>,
    tail_pos: usize,
}

struct CurrentLeft {
    row: Row,
    /// Candidate build-row indexes still to test.
    candidates: std::vec::IntoIter<usize>,
    matched: bool,
}

impl JoinIter {
    fn new(
        left: BoxedRowIter,
        right: BoxedRowIter,
        condition: Option<Expression>,
        join_type: JoinType,
        left_width: usize,
        right_width: usize,
    ) -> JoinIter {
        JoinIter {
            left,
            right: Some(right),
            condition,
            join_type,
            left_width,
            right_width,
            right_rows: Vec::new(),
            keys: None,
            built: false,
            current: None,
            right_matched: Vec::new(),
            tail_pos: 0,
        }
    }

    fn build_side(&mut self, ctx: &Context) -> Result<()> {
        self.built = true;
        let Some(right) = self.right.as_mut() else {
            return Ok(());
        };
        while let Some(item) = right.next(ctx) {
            ctx.check_cancelled()?;
            self.right_rows.push(item?);
        }
        let mut right = self.right.take().expect("checked above");
        right.close(ctx)?;
        self.right_matched = vec![false; self.right_rows.len()];

        if let Some(condition) = &self.condition {
            if let Some((left_keys, right_keys)) = equi_keys(condition, self.left_width) {
                let mut table: HashMap<Row, Vec<usize>> = HashMap::new();
                for (i, row) in self.right_rows.iter().enumerate() {
                    let key: Row = right_keys
                        .iter()
                        .map(|e| e.eval(ctx, row))
                        .collect::<Result<_>>()?;
                    // NULL keys never match an equality.
                    if key.iter().any(|v| v.is_null()) {
                        continue;
                    }
                    table.entry(key).or_default().push(i);
                }
                self.keys = Some((left_keys, right_keys, table));
            }
        }
        Ok(())
    }

    fn candidates_for(&self, ctx: &Context, left_row: &Row) -> Result<Vec<usize>> {
        match &self.keys {
            Some((left_keys, _, table)) => {
                let key: Row = left_keys
                    .iter()
                    .map(|e| e.eval(ctx, left_row))
                    .collect::<Result<_>>()?;
                if key.iter().any(|v| v.is_null()) {
                    return Ok(vec![]);
                }
                Ok(table.get(&key).cloned().unwrap_or_default())
            }
            None => Ok((0..self.right_rows.len()).collect()),
        }
    }

}

fn condition_holds(
    condition: Option<&Expression>,
    ctx: &Context,
    combined: &Row,
) -> Result<bool> {
    match condition {
        Some(condition) => {
            let v = condition.eval(ctx, combined)?;
            Ok(!v.is_null() && v.is_true()?)
        }
        None => Ok(true),
    }
}

impl RowIter for JoinIter {
    fn next(&mut self, ctx: &Context) -> Option<Result<Row>> {
        if !self.built {
            if let Err(e) = self.build_side(ctx) {
                return Some(Err(e));
            }
        }
        loop {
            let mut current = match self.current.take() {
                Some(current) => current,
                None => match self.left.next(ctx) {
                    Some(Ok(row)) => {
                        let candidates = match self.candidates_for(ctx, &row) {
                            Ok(c) => c,
                            Err(e) => return Some(Err(e)),
                        };
                        CurrentLeft {
                            row,
                            candidates: candidates.into_iter(),
                            matched: false,
                        }
                    }
                    Some(Err(e)) => return Some(Err(e)),
                    None => {
                        // Full outer: emit unmatched build rows, null-extended
                        // on the probe side.
                        if self.join_type == JoinType::FullOuter {
                            while self.tail_pos < self.right_rows.len() {
                                let i = self.tail_pos;
                                self.tail_pos += 1;
                                if !self.right_matched[i] {
                                    let mut row = vec![Value::Null; self.left_width];
                                    row.extend(self.right_rows[i].iter().cloned());
                                    return Some(Ok(row));
                                }
                            }
                        }
                        return None;
                    }
                },
            };

            while let Some(i) = current.candidates.next() {
                let mut combined = current.row.clone();
                combined.extend(self.right_rows[i].iter().cloned());
                match condition_holds(self.condition.as_ref(), ctx, &combined) {
                    Ok(true) => {
                        current.matched = true;
                        self.right_matched[i] = true;
                        match self.join_type {
                            JoinType::Semi => return Some(Ok(current.row)),
                            JoinType::Anti => break,
                            _ => {
                                self.current = Some(current);
                                return Some(Ok(combined));
                            }
                        }
                    }
                    Ok(false) => continue,
                    Err(e) => return Some(Err(e)),
                }
            }

            // The current outer row is exhausted.
            match self.join_type {
                JoinType::Left | JoinType::FullOuter if !current.matched => {
                    let mut row = current.row;
                    row.extend(std::iter::repeat(Value::Null).take(self.right_width));
                    return Some(Ok(row));
                }
                JoinType::Anti if !current.matched => {
                    return Some(Ok(current.row));
                }
                _ => {}
            }
        }
    }

    fn close(&mut self, ctx: &Context) -> Result<()> {
        self.right_rows = Vec::new();
        self.keys = None;
        let right_result = match self.right.take() {
            Some(mut right) => right.close(ctx),
            None => Ok(()),
        };
        self.left.close(ctx)?;
        right_result
    }
}

/// Restores `[left, right]` column order after a swapped right join.
struct SwapColumnsIter {
    inner: JoinIter,
    first_width: usize,
}

impl RowIter for SwapColumnsIter {
    fn next(&mut self, ctx: &Context) -> Option<Result<Row>> {
        match self.inner.next(ctx)? {
            Ok(mut row) => {
                let tail = row.split_off(self.first_width);
                let mut out = tail;
                out.extend(row);
                Some(Ok(out))
            }
            Err(e) => Some(Err(e)),
        }
    }

    fn close(&mut self, ctx: &Context) -> Result<()> {
        self.inner.close(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::collect;
    use crate::expr::ColumnRef;
    use crate::types::DataType;

    fn values(rows: Vec<Vec<i64>>) -> Node {
        Node::Values {
            rows: rows
                .into_iter()
                .map(|r| r.into_iter().map(Expression::literal).collect())
                .collect(),
        }
    }

    fn eq(l: usize, r: usize) -> Expression {
        Expression::Compare(
            CompareOp::Equal,
            Box::new(Expression::Column(ColumnRef::new(l, "l", DataType::I64))),
            Box::new(Expression::Column(ColumnRef::new(r, "r", DataType::I64))),
        )
    }

    fn ints(rows: &[Row]) -> Vec<Vec<i64>> {
        rows.iter()
            .map(|r| {
                r.iter()
                    .map(|v| match v {
                        Value::I64(i) => *i,
                        Value::Null => -1,
                        other => panic!("unexpected value {other:?}"),
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_inner_hash_join() -> Result<()> {
        let ctx = Context::for_tests();
        let plan = Node::join(
            JoinType::Inner,
            Some(eq(0, 1)),
            values(vec![vec![1], vec![2], vec![3]]),
            values(vec![vec![2], vec![3], vec![4]]),
        );
        let rows = collect(&ctx, build(&ctx, &plan)?)?;
        assert_eq!(ints(&rows), vec![vec![2, 2], vec![3, 3]]);
        Ok(())
    }

    #[test]
    fn test_left_join_null_extends() -> Result<()> {
        let ctx = Context::for_tests();
        let plan = Node::join(
            JoinType::Left,
            Some(eq(0, 1)),
            values(vec![vec![1], vec![2]]),
            values(vec![vec![2]]),
        );
        let rows = collect(&ctx, build(&ctx, &plan)?)?;
        assert_eq!(ints(&rows), vec![vec![1, -1], vec![2, 2]]);
        Ok(())
    }

    #[test]
    fn test_semi_join_emits_outer_once() -> Result<()> {
        let ctx = Context::for_tests();
        let plan = Node::join(
            JoinType::Semi,
            Some(eq(0, 1)),
            values(vec![vec![1], vec![2]]),
            values(vec![vec![2], vec![2], vec![2]]),
        );
        let rows = collect(&ctx, build(&ctx, &plan)?)?;
        assert_eq!(ints(&rows), vec![vec![2]]);
        Ok(())
    }

    #[test]
    fn test_anti_join() -> Result<()> {
        let ctx = Context::for_tests();
        let plan = Node::join(
            JoinType::Anti,
            Some(eq(0, 1)),
            values(vec![vec![1], vec![2]]),
            values(vec![vec![2]]),
        );
        let rows = collect(&ctx, build(&ctx, &plan)?)?;
        assert_eq!(ints(&rows), vec![vec![1]]);
        Ok(())
    }

    #[test]
    fn test_full_outer_join() -> Result<()> {
        let ctx = Context::for_tests();
        let plan = Node::join(
            JoinType::FullOuter,
            Some(eq(0, 1)),
            values(vec![vec![1], vec![2]]),
            values(vec![vec![2], vec![3]]),
        );
        let rows = collect(&ctx, build(&ctx, &plan)?)?;
        assert_eq!(ints(&rows), vec![vec![1, -1], vec![2, 2], vec![-1, 3]]);
        Ok(())
    }

    #[test]
    fn test_cross_join_order() -> Result<()> {
        let ctx = Context::for_tests();
        let plan = Node::join(
            JoinType::Cross,
            None,
            values(vec![vec![1], vec![2]]),
            values(vec![vec![10], vec![20]]),
        );
        let rows = collect(&ctx, build(&ctx, &plan)?)?;
        assert_eq!(
            ints(&rows),
            vec![vec![1, 10], vec![1, 20], vec![2, 10], vec![2, 20]]
        );
        Ok(())
    }

    #[test]
    fn test_right_join_restores_column_order() -> Result<()> {
        let ctx = Context::for_tests();
        let plan = Node::join(
            JoinType::Right,
            Some(eq(0, 1)),
            values(vec![vec![2]]),
            values(vec![vec![1], vec![2]]),
        );
        let rows = collect(&ctx, build(&ctx, &plan)?)?;
        assert_eq!(ints(&rows), vec![vec![-1, 1], vec![2, 2]]);
        Ok(())
    }
}
