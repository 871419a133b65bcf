//! Aggregate expressions and their accumulation buffers
//!
//! Each aggregate provides a fresh buffer, a per-row update, and a final
//! evaluation over the buffer. The executor owns buffer storage (one buffer
//! vector per group) and drives these three operations; DISTINCT aggregates
//! carry their seen-set inside the buffer.

use std::collections::HashSet;
use std::fmt;

use super::Expression;
use crate::context::Context;
use crate::error::Result;
use crate::types::{DataType, Row, Value};

/// The aggregate operations the engine executes natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    /// COUNT(*) — counts rows.
    CountStar,
    /// COUNT(expr) — counts non-NULL values.
    Count,
    Sum,
    Avg,
    Min,
    Max,
    /// The first value seen, in input order.
    First,
    /// The last value seen, in input order.
    Last,
}

impl AggregateOp {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateOp::CountStar | AggregateOp::Count => "COUNT",
            AggregateOp::Sum => "SUM",
            AggregateOp::Avg => "AVG",
            AggregateOp::Min => "MIN",
            AggregateOp::Max => "MAX",
            AggregateOp::First => "FIRST",
            AggregateOp::Last => "LAST",
        }
    }
}

/// An aggregate call within a projection or group-by.
#[derive(Debug, Clone)]
pub struct AggregateExpr {
    pub op: AggregateOp,
    pub args: Vec<Expression>,
    pub distinct: bool,
}

impl AggregateExpr {
    pub fn new(op: AggregateOp, arg: Expression) -> AggregateExpr {
        AggregateExpr {
            op,
            args: vec![arg],
            distinct: false,
        }
    }

    pub fn count_star() -> AggregateExpr {
        AggregateExpr {
            op: AggregateOp::CountStar,
            args: vec![],
            distinct: false,
        }
    }

    fn arg_type(&self) -> DataType {
        self.args
            .first()
            .map(|a| a.data_type())
            .unwrap_or(DataType::Null)
    }

    pub fn data_type(&self) -> DataType {
        match self.op {
            AggregateOp::CountStar | AggregateOp::Count => DataType::I64,
            AggregateOp::Sum => match self.arg_type() {
                DataType::F32 | DataType::F64 => DataType::F64,
                t @ DataType::Decimal(..) => t,
                t if t.is_unsigned() => DataType::U64,
                _ => DataType::I64,
            },
            AggregateOp::Avg => match self.arg_type() {
                DataType::F32 | DataType::F64 => DataType::F64,
                _ => DataType::Decimal(65, 4),
            },
            AggregateOp::Min | AggregateOp::Max | AggregateOp::First | AggregateOp::Last => {
                self.arg_type()
            }
        }
    }

    pub fn nullable(&self) -> bool {
        !matches!(self.op, AggregateOp::CountStar | AggregateOp::Count)
    }

    /// A fresh accumulation buffer for one group.
    pub fn new_buffer(&self) -> AggregateBuffer {
        let state = match self.op {
            AggregateOp::CountStar | AggregateOp::Count => BufferState::Count(0),
            AggregateOp::Sum => BufferState::Sum(Value::Null),
            AggregateOp::Avg => BufferState::Avg {
                sum: Value::Null,
                count: 0,
            },
            AggregateOp::Min | AggregateOp::Max => BufferState::Extreme(Value::Null),
            AggregateOp::First | AggregateOp::Last => BufferState::Edge(None),
        };
        AggregateBuffer {
            state,
            seen: self.distinct.then(HashSet::new),
        }
    }

    /// Fold one input row into the buffer.
    pub fn update(&self, ctx: &Context, buffer: &mut AggregateBuffer, row: &Row) -> Result<()> {
        let args: Vec<Value> = self
            .args
            .iter()
            .map(|a| a.eval(ctx, row))
            .collect::<Result<_>>()?;

        if let Some(seen) = &mut buffer.seen {
            if !args.iter().any(|v| v.is_null()) && !seen.insert(args.clone()) {
                return Ok(());
            }
        }

        let arg = args.into_iter().next().unwrap_or(Value::Null);
        match (&mut buffer.state, self.op) {
            (BufferState::Count(n), AggregateOp::CountStar) => *n += 1,
            (BufferState::Count(n), _) => {
                if !arg.is_null() {
                    *n += 1;
                }
            }
            (BufferState::Sum(sum), _) => {
                if !arg.is_null() {
                    *sum = if sum.is_null() {
                        arg
                    } else {
                        sum.checked_add(&arg)?
                    };
                }
            }
            (BufferState::Avg { sum, count }, _) => {
                if !arg.is_null() {
                    *sum = if sum.is_null() {
                        arg
                    } else {
                        sum.checked_add(&arg)?
                    };
                    *count += 1;
                }
            }
            (BufferState::Extreme(current), op) => {
                if !arg.is_null() {
                    let replace = if current.is_null() {
                        true
                    } else if op == AggregateOp::Min {
                        arg.compare(current)? == std::cmp::Ordering::Less
                    } else {
                        arg.compare(current)? == std::cmp::Ordering::Greater
                    };
                    if replace {
                        *current = arg;
                    }
                }
            }
            (BufferState::Edge(slot), AggregateOp::First) => {
                if slot.is_none() {
                    *slot = Some(arg);
                }
            }
            (BufferState::Edge(slot), _) => *slot = Some(arg),
        }
        Ok(())
    }

    /// Evaluate the buffer into the aggregate's final value.
    pub fn eval_buffer(&self, _ctx: &Context, buffer: &AggregateBuffer) -> Result<Value> {
        match &buffer.state {
            BufferState::Count(n) => Ok(Value::I64(*n)),
            BufferState::Sum(sum) => Ok(sum.clone()),
            BufferState::Avg { sum, count } => {
                if *count == 0 {
                    Ok(Value::Null)
                } else {
                    sum.checked_div(&Value::I64(*count))
                }
            }
            BufferState::Extreme(v) => Ok(v.clone()),
            BufferState::Edge(slot) => Ok(slot.clone().unwrap_or(Value::Null)),
        }
    }
}

impl fmt::Display for AggregateExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.op == AggregateOp::CountStar {
            return write!(f, "COUNT(*)");
        }
        write!(f, "{}(", self.op.name())?;
        if self.distinct {
            write!(f, "DISTINCT ")?;
        }
        for (i, a) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{a}")?;
        }
        write!(f, ")")
    }
}

/// Per-group accumulation state.
#[derive(Debug, Clone)]
pub struct AggregateBuffer {
    state: BufferState,
    seen: Option<HashSet<Row>>,
}

#[derive(Debug, Clone)]
enum BufferState {
    Count(i64),
    Sum(Value),
    Avg { sum: Value, count: i64 },
    Extreme(Value),
    Edge(Option<Value>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    fn ctx() -> Context {
        Context::for_tests()
    }

    #[test]
    fn test_count_ignores_nulls() -> Result<()> {
        let ctx = ctx();
        let agg = AggregateExpr::new(
            AggregateOp::Count,
            Expression::Column(super::super::ColumnRef::new(0, "a", DataType::I64)),
        );
        let mut buf = agg.new_buffer();
        agg.update(&ctx, &mut buf, &vec![Value::I64(1)])?;
        agg.update(&ctx, &mut buf, &vec![Value::Null])?;
        agg.update(&ctx, &mut buf, &vec![Value::I64(3)])?;
        assert_eq!(agg.eval_buffer(&ctx, &buf)?, Value::I64(2));
        Ok(())
    }

    #[test]
    fn test_empty_input_yields_count_zero_and_sum_null() -> Result<()> {
        let ctx = ctx();
        let count = AggregateExpr::count_star();
        assert_eq!(
            count.eval_buffer(&ctx, &count.new_buffer())?,
            Value::I64(0)
        );

        let sum = AggregateExpr::new(
            AggregateOp::Sum,
            Expression::Column(super::super::ColumnRef::new(0, "a", DataType::I64)),
        );
        assert_eq!(sum.eval_buffer(&ctx, &sum.new_buffer())?, Value::Null);
        Ok(())
    }

    #[test]
    fn test_sum_distinct() -> Result<()> {
        let ctx = ctx();
        let mut agg = AggregateExpr::new(
            AggregateOp::Sum,
            Expression::Column(super::super::ColumnRef::new(0, "a", DataType::I64)),
        );
        agg.distinct = true;
        let mut buf = agg.new_buffer();
        for v in [10, 10, 20] {
            agg.update(&ctx, &mut buf, &vec![Value::I64(v)])?;
        }
        assert_eq!(agg.eval_buffer(&ctx, &buf)?, Value::I64(30));
        Ok(())
    }

    #[test]
    fn test_min_max() -> Result<()> {
        let ctx = ctx();
        let min = AggregateExpr::new(
            AggregateOp::Min,
            Expression::Column(super::super::ColumnRef::new(0, "a", DataType::I64)),
        );
        let max = AggregateExpr::new(
            AggregateOp::Max,
            Expression::Column(super::super::ColumnRef::new(0, "a", DataType::I64)),
        );
        let mut minb = min.new_buffer();
        let mut maxb = max.new_buffer();
        for v in [5, 2, 8, 1] {
            min.update(&ctx, &mut minb, &vec![Value::I64(v)])?;
            max.update(&ctx, &mut maxb, &vec![Value::I64(v)])?;
        }
        assert_eq!(min.eval_buffer(&ctx, &minb)?, Value::I64(1));
        assert_eq!(max.eval_buffer(&ctx, &maxb)?, Value::I64(8));
        Ok(())
    }
}
