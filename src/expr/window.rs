//! Window function expressions
//!
//! A window expression names a function, a partitioning, an ordering, and a
//! frame. The executor sorts each partition and slides a frame cursor over
//! it; ranking functions ignore the frame, aggregates accumulate over it.

use std::fmt;

use super::aggregate::AggregateExpr;
use super::{Expression, SortField};
use crate::error::Result;
use crate::types::DataType;

/// Frame measurement unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameUnit {
    Rows,
    /// Bounds are computed by value distance on the order-by column.
    Range,
}

/// One end of a window frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameBound {
    UnboundedPreceding,
    Preceding(u64),
    CurrentRow,
    Following(u64),
    UnboundedFollowing,
}

/// A window frame specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowFrame {
    pub unit: FrameUnit,
    pub start: FrameBound,
    pub end: FrameBound,
}

impl Default for WindowFrame {
    /// The SQL default: RANGE BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW.
    fn default() -> WindowFrame {
        WindowFrame {
            unit: FrameUnit::Range,
            start: FrameBound::UnboundedPreceding,
            end: FrameBound::CurrentRow,
        }
    }
}

/// The function applied over the window.
#[derive(Debug, Clone)]
pub enum WindowFunc {
    RowNumber,
    Rank,
    DenseRank,
    /// Any aggregate, evaluated over the frame.
    Aggregate(AggregateExpr),
}

#[derive(Debug, Clone)]
pub struct WindowExpr {
    pub func: WindowFunc,
    pub partition_by: Vec<Expression>,
    pub order_by: Vec<SortField>,
    pub frame: WindowFrame,
}

impl WindowExpr {
    pub fn data_type(&self) -> DataType {
        match &self.func {
            WindowFunc::RowNumber | WindowFunc::Rank | WindowFunc::DenseRank => DataType::U64,
            WindowFunc::Aggregate(agg) => agg.data_type(),
        }
    }

    pub fn nullable(&self) -> bool {
        match &self.func {
            WindowFunc::RowNumber | WindowFunc::Rank | WindowFunc::DenseRank => false,
            WindowFunc::Aggregate(agg) => agg.nullable(),
        }
    }

    /// Children in a stable order: function args, partition keys, order keys.
    pub fn children(&self) -> Vec<&Expression> {
        let mut out: Vec<&Expression> = vec![];
        if let WindowFunc::Aggregate(agg) = &self.func {
            out.extend(agg.args.iter());
        }
        out.extend(self.partition_by.iter());
        out.extend(self.order_by.iter().map(|s| &s.expr));
        out
    }

    pub fn with_children(&self, children: Vec<Expression>) -> Result<WindowExpr> {
        let mut it = children.into_iter();
        let mut next = || it.next().expect("window arity checked by caller");
        let func = match &self.func {
            WindowFunc::Aggregate(agg) => WindowFunc::Aggregate(AggregateExpr {
                op: agg.op,
                args: (0..agg.args.len()).map(|_| next()).collect(),
                distinct: agg.distinct,
            }),
            other => other.clone(),
        };
        let partition_by = (0..self.partition_by.len()).map(|_| next()).collect();
        let order_by = self
            .order_by
            .iter()
            .map(|s| SortField {
                expr: next(),
                ascending: s.ascending,
                nulls_first: s.nulls_first,
            })
            .collect();
        Ok(WindowExpr {
            func,
            partition_by,
            order_by,
            frame: self.frame,
        })
    }
}

impl fmt::Display for WindowExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.func {
            WindowFunc::RowNumber => write!(f, "ROW_NUMBER()")?,
            WindowFunc::Rank => write!(f, "RANK()")?,
            WindowFunc::DenseRank => write!(f, "DENSE_RANK()")?,
            WindowFunc::Aggregate(agg) => write!(f, "{agg}")?,
        }
        write!(f, " OVER (")?;
        if !self.partition_by.is_empty() {
            write!(f, "PARTITION BY ")?;
            for (i, p) in self.partition_by.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{p}")?;
            }
        }
        if !self.order_by.is_empty() {
            if !self.partition_by.is_empty() {
                write!(f, " ")?;
            }
            write!(f, "ORDER BY ")?;
            for (i, s) in self.order_by.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{s}")?;
            }
        }
        write!(f, ")")
    }
}
