//! Sort and distinct
//!
//! Both materialise their input. Sorting is stable; NULL placement follows
//! each sort field's nulls-first/last flag. Distinct keeps the first
//! appearance of each row.

use std::cmp::Ordering;
use std::collections::HashSet;

use super::{build, BoxedRowIter, RowIter};
use crate::context::Context;
use crate::error::Result;
use crate::expr::SortField;
use crate::plan::Node;
use crate::types::Row;

pub fn build_sort(ctx: &Context, fields: &[SortField], child: &Node) -> Result<BoxedRowIter> {
    Ok(Box::new(SortIter {
        fields: fields.to_vec(),
        child: Some(build(ctx, child)?),
        sorted: Vec::new(),
        pos: 0,
    }))
}

struct SortIter {
    fields: Vec<SortField>,
    child: Option<BoxedRowIter>,
    sorted: Vec<Row>,
    pos: usize,
}

impl SortIter {
    fn materialise(&mut self, ctx: &Context) -> Result<()> {
        let Some(child) = self.child.as_mut() else {
            return Ok(());
        };
        // Keys are evaluated once per row, then sorted stably.
        let mut keyed: Vec<(Vec<crate::types::Value>, Row)> = Vec::new();
        while let Some(item) = child.next(ctx) {
            ctx.check_cancelled()?;
            let row = item?;
            let key = self
                .fields
                .iter()
                .map(|f| f.expr.eval(ctx, &row))
                .collect::<Result<Vec<_>>>()?;
            keyed.push((key, row));
        }
        let mut failure = None;
        let fields = self.fields.clone();
        keyed.sort_by(|(a, _), (b, _)| {
            for (field, (x, y)) in fields.iter().zip(a.iter().zip(b.iter())) {
                let ord = match (x.is_null(), y.is_null()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => {
                        if field.nulls_first {
                            Ordering::Less
                        } else {
                            Ordering::Greater
                        }
                    }
                    (false, true) => {
                        if field.nulls_first {
                            Ordering::Greater
                        } else {
                            Ordering::Less
                        }
                    }
                    (false, false) => match x.compare(y) {
                        Ok(ord) => {
                            if field.ascending {
                                ord
                            } else {
                                ord.reverse()
                            }
                        }
                        Err(e) => {
                            failure.get_or_insert(e);
                            Ordering::Equal
                        }
                    },
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
        if let Some(e) = failure {
            return Err(e);
        }
        self.sorted = keyed.into_iter().map(|(_, row)| row).collect();
        let mut child = self.child.take().expect("checked above");
        child.close(ctx)?;
        Ok(())
    }
}

impl RowIter for SortIter {
    fn next(&mut self, ctx: &Context) -> Option<Result<Row>> {
        if self.child.is_some() {
            if let Err(e) = self.materialise(ctx) {
                return Some(Err(e));
            }
        }
        let row = self.sorted.get(self.pos)?.clone();
        self.pos += 1;
        Some(Ok(row))
    }

    fn close(&mut self, ctx: &Context) -> Result<()> {
        self.sorted = Vec::new();
        match self.child.take() {
            Some(mut child) => child.close(ctx),
            None => Ok(()),
        }
    }
}

pub fn build_distinct(ctx: &Context, child: &Node) -> Result<BoxedRowIter> {
    Ok(Box::new(DistinctIter {
        child: build(ctx, child)?,
        seen: HashSet::new(),
    }))
}

struct DistinctIter {
    child: BoxedRowIter,
    seen: HashSet<Row>,
}

impl RowIter for DistinctIter {
    fn next(&mut self, ctx: &Context) -> Option<Result<Row>> {
        loop {
            let row = match self.child.next(ctx)? {
                Ok(row) => row,
                Err(e) => return Some(Err(e)),
            };
            if self.seen.insert(row.clone()) {
                return Some(Ok(row));
            }
        }
    }

    fn close(&mut self, ctx: &Context) -> Result<()> {
        self.seen = HashSet::new();
        self.child.close(ctx)
    }
}
