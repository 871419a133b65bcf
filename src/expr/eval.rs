//! Expression evaluation
//!
//! Evaluation threads the query context through every node so functions see
//! the session, cancellation, and the outer-row chain of the enclosing
//! queries. Three-valued logic follows MySQL: NULL propagates through
//! comparisons except for the null-safe operator, AND/OR short-circuit
//! around NULL where the other operand decides.

use std::cmp::Ordering;

use chrono::{Duration, Months};

use super::{
    ArithmeticOp, BitOp, CompareOp, Expression, IntervalUnit, SubqueryKind,
};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::types::{CollationId, Row, Value};

impl Expression {
    /// Evaluate this expression against a row.
    pub fn eval(&self, ctx: &Context, row: &Row) -> Result<Value> {
        use Expression::*;
        match self {
            Literal(v) => Ok(v.clone()),
            Column(c) => row.get(c.index).cloned().ok_or_else(|| {
                Error::Internal(format!("column index {} out of bounds", c.index))
            }),
            OuterColumn { depth, column } => {
                let outer = ctx.outer_row(*depth).ok_or_else(|| {
                    Error::Internal(format!("no outer row at depth {depth}"))
                })?;
                outer.get(column.index).cloned().ok_or_else(|| {
                    Error::Internal(format!("outer column index {} out of bounds", column.index))
                })
            }
            UnresolvedColumn { name, .. } => Err(Error::Internal(format!(
                "evaluated unresolved column {name}"
            ))),
            Parameter(i) => Err(Error::Internal(format!("unbound parameter ?{i}"))),
            Star { .. } => Err(Error::Internal("evaluated unexpanded *".into())),
            Alias(_, child) => child.eval(ctx, row),

            And(l, r) => {
                let l = l.eval(ctx, row)?;
                let r = r.eval(ctx, row)?;
                match (truth(&l)?, truth(&r)?) {
                    (Some(false), _) | (_, Some(false)) => Ok(Value::I8(0)),
                    (Some(true), Some(true)) => Ok(Value::I8(1)),
                    _ => Ok(Value::Null),
                }
            }
            Or(l, r) => {
                let l = l.eval(ctx, row)?;
                let r = r.eval(ctx, row)?;
                match (truth(&l)?, truth(&r)?) {
                    (Some(true), _) | (_, Some(true)) => Ok(Value::I8(1)),
                    (Some(false), Some(false)) => Ok(Value::I8(0)),
                    _ => Ok(Value::Null),
                }
            }
            Xor(l, r) => {
                let l = l.eval(ctx, row)?;
                let r = r.eval(ctx, row)?;
                match (truth(&l)?, truth(&r)?) {
                    (Some(a), Some(b)) => Ok(Value::I8((a != b) as i8)),
                    _ => Ok(Value::Null),
                }
            }
            Not(c) => match truth(&c.eval(ctx, row)?)? {
                Some(b) => Ok(Value::I8(!b as i8)),
                None => Ok(Value::Null),
            },

            Compare(op, l, r) => {
                let collation = comparison_collation(l, r);
                compare_values(*op, &l.eval(ctx, row)?, &r.eval(ctx, row)?, collation)
            }
            IsNull(c, negated) => {
                let is_null = c.eval(ctx, row)?.is_null();
                Ok(Value::I8((is_null != *negated) as i8))
            }

            Arithmetic(op, l, r) => eval_arithmetic(ctx, row, *op, l, r),
            Negate(c) => c.eval(ctx, row)?.checked_neg(),
            Bit(op, l, r) => {
                let l = l.eval(ctx, row)?;
                let r = r.eval(ctx, row)?;
                if l.is_null() || r.is_null() {
                    return Ok(Value::Null);
                }
                let a = l.to_i128()? as u64;
                let b = r.to_i128()? as u64;
                Ok(Value::U64(match op {
                    BitOp::And => a & b,
                    BitOp::Or => a | b,
                    BitOp::Xor => a ^ b,
                    BitOp::ShiftLeft => {
                        if b >= 64 {
                            0
                        } else {
                            a << b
                        }
                    }
                    BitOp::ShiftRight => {
                        if b >= 64 {
                            0
                        } else {
                            a >> b
                        }
                    }
                }))
            }
            BitNot(c) => {
                let v = c.eval(ctx, row)?;
                if v.is_null() {
                    return Ok(Value::Null);
                }
                Ok(Value::U64(!(v.to_i128()? as u64)))
            }

            Like(l, r) => {
                let collation = comparison_collation(l, r);
                let value = l.eval(ctx, row)?;
                let pattern = r.eval(ctx, row)?;
                if value.is_null() || pattern.is_null() {
                    return Ok(Value::Null);
                }
                let matched = like_match(
                    &value.to_display_string(),
                    &pattern.to_display_string(),
                    collation.is_case_insensitive(),
                );
                Ok(Value::I8(matched as i8))
            }
            InList {
                expr,
                list,
                negated,
            } => {
                let needle = expr.eval(ctx, row)?;
                if needle.is_null() {
                    return Ok(Value::Null);
                }
                let mut saw_null = false;
                for item in list {
                    let candidate = item.eval(ctx, row)?;
                    if candidate.is_null() {
                        saw_null = true;
                        continue;
                    }
                    if needle.compare(&candidate)? == Ordering::Equal {
                        return Ok(Value::I8(!negated as i8));
                    }
                }
                if saw_null {
                    Ok(Value::Null)
                } else {
                    Ok(Value::I8(*negated as i8))
                }
            }
            Between {
                expr,
                low,
                high,
                negated,
            } => {
                let v = expr.eval(ctx, row)?;
                let lo = low.eval(ctx, row)?;
                let hi = high.eval(ctx, row)?;
                if v.is_null() || lo.is_null() || hi.is_null() {
                    return Ok(Value::Null);
                }
                let inside = v.compare(&lo)? != Ordering::Less
                    && v.compare(&hi)? != Ordering::Greater;
                Ok(Value::I8((inside != *negated) as i8))
            }
            Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                let operand_value = operand
                    .as_ref()
                    .map(|op| op.eval(ctx, row))
                    .transpose()?;
                for (when, then) in when_clauses {
                    let when_value = when.eval(ctx, row)?;
                    let hit = match &operand_value {
                        Some(op) => {
                            !op.is_null()
                                && !when_value.is_null()
                                && op.compare(&when_value)? == Ordering::Equal
                        }
                        None => truth(&when_value)? == Some(true),
                    };
                    if hit {
                        return then.eval(ctx, row);
                    }
                }
                match else_clause {
                    Some(e) => e.eval(ctx, row),
                    None => Ok(Value::Null),
                }
            }

            Cast(c, target) => {
                let (converted, out_of_range) = target.convert(c.eval(ctx, row)?)?;
                if out_of_range {
                    ctx.warn(1292, format!("Truncated incorrect {target} value"));
                }
                Ok(converted)
            }
            Collate(c, _) => c.eval(ctx, row),
            Interval(c, _) => c.eval(ctx, row),

            UnresolvedFunction { name, .. } => Err(Error::Internal(format!(
                "evaluated unresolved function {name}"
            ))),
            Function { name, args, .. } => match name.to_uppercase().as_str() {
                // Collation introspection works on the expression, not the value.
                "COLLATION" => {
                    let (collation, _) = args
                        .first()
                        .map(|a| a.coercion())
                        .unwrap_or((CollationId::BINARY, crate::types::Coercibility::Ignorable));
                    Ok(Value::Str(collation.name().to_string()))
                }
                "COERCIBILITY" => {
                    let coercibility = args
                        .first()
                        .map(|a| a.coercion().1)
                        .unwrap_or(crate::types::Coercibility::Ignorable);
                    Ok(Value::I64(coercibility.as_i64()))
                }
                _ => {
                    let values: Vec<Value> = args
                        .iter()
                        .map(|a| a.eval(ctx, row))
                        .collect::<Result<_>>()?;
                    crate::functions::execute(name, &values, ctx)
                }
            },
            Aggregate(agg) => Err(Error::Internal(format!(
                "aggregate {agg} evaluated outside aggregation"
            ))),
            Window(w) => Err(Error::Internal(format!(
                "window function {w} evaluated outside a window"
            ))),
            Subquery(sq) => eval_subquery(ctx, row, sq),
            Explode(c) => Err(Error::Internal(format!(
                "EXPLODE({c}) evaluated without generator lifting"
            ))),
        }
    }
}

/// MySQL truthiness with NULL: Some(bool) or None for NULL.
fn truth(v: &Value) -> Result<Option<bool>> {
    if v.is_null() {
        Ok(None)
    } else {
        Ok(Some(v.is_true()?))
    }
}

/// The collation two compared string operands resolve to.
fn comparison_collation(l: &Expression, r: &Expression) -> CollationId {
    crate::types::merge_coercion(l.coercion(), r.coercion()).0
}

fn compare_values(
    op: CompareOp,
    l: &Value,
    r: &Value,
    collation: CollationId,
) -> Result<Value> {
    if op == CompareOp::NullSafeEqual {
        let equal = match (l.is_null(), r.is_null()) {
            (true, true) => true,
            (true, false) | (false, true) => false,
            (false, false) => ordered(l, r, collation)? == Ordering::Equal,
        };
        return Ok(Value::I8(equal as i8));
    }
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    let ord = ordered(l, r, collation)?;
    let result = match op {
        CompareOp::Equal => ord == Ordering::Equal,
        CompareOp::NotEqual => ord != Ordering::Equal,
        CompareOp::Greater => ord == Ordering::Greater,
        CompareOp::GreaterEqual => ord != Ordering::Less,
        CompareOp::Less => ord == Ordering::Less,
        CompareOp::LessEqual => ord != Ordering::Greater,
        CompareOp::NullSafeEqual => unreachable!("handled above"),
    };
    Ok(Value::I8(result as i8))
}

fn ordered(l: &Value, r: &Value, collation: CollationId) -> Result<Ordering> {
    if let (Value::Str(a), Value::Str(b)) = (l, r) {
        return Ok(collation.compare(a, b));
    }
    l.compare(r)
}

fn eval_arithmetic(
    ctx: &Context,
    row: &Row,
    op: ArithmeticOp,
    l: &Expression,
    r: &Expression,
) -> Result<Value> {
    // Temporal arithmetic with INTERVAL operands.
    if let Expression::Interval(amount, unit) = r {
        if matches!(op, ArithmeticOp::Add | ArithmeticOp::Subtract) {
            let base = l.eval(ctx, row)?;
            let amount = amount.eval(ctx, row)?;
            return shift_temporal(base, amount, *unit, op == ArithmeticOp::Subtract);
        }
    }
    if let Expression::Interval(amount, unit) = l {
        if op == ArithmeticOp::Add {
            let base = r.eval(ctx, row)?;
            let amount = amount.eval(ctx, row)?;
            return shift_temporal(base, amount, *unit, false);
        }
    }
    let l = l.eval(ctx, row)?;
    let r = r.eval(ctx, row)?;
    match op {
        ArithmeticOp::Add => l.checked_add(&r),
        ArithmeticOp::Subtract => l.checked_sub(&r),
        ArithmeticOp::Multiply => l.checked_mul(&r),
        ArithmeticOp::Divide => l.checked_div(&r),
        ArithmeticOp::Remainder => l.checked_rem(&r),
    }
}

/// date/datetime/timestamp ± INTERVAL n unit
fn shift_temporal(base: Value, amount: Value, unit: IntervalUnit, negate: bool) -> Result<Value> {
    if base.is_null() || amount.is_null() {
        return Ok(Value::Null);
    }
    let n = amount.to_i128()? as i64;
    let n = if negate { -n } else { n };
    let dt = base.to_datetime()?;

    let shifted = match unit {
        IntervalUnit::Microsecond => dt + Duration::microseconds(n),
        IntervalUnit::Second => dt + Duration::seconds(n),
        IntervalUnit::Minute => dt + Duration::minutes(n),
        IntervalUnit::Hour => dt + Duration::hours(n),
        IntervalUnit::Day => dt + Duration::days(n),
        IntervalUnit::Week => dt + Duration::weeks(n),
        IntervalUnit::Month | IntervalUnit::Quarter | IntervalUnit::Year => {
            let months = match unit {
                IntervalUnit::Month => n,
                IntervalUnit::Quarter => n * 3,
                _ => n * 12,
            };
            if months >= 0 {
                dt.checked_add_months(Months::new(months as u32))
            } else {
                dt.checked_sub_months(Months::new((-months) as u32))
            }
            .ok_or_else(|| Error::OutOfRange {
                data_type: "DATETIME".into(),
                value: dt.to_string(),
            })?
        }
    };

    Ok(match base {
        Value::Date(_) => Value::Date(shifted.date()),
        Value::Timestamp(ts) => Value::Timestamp(ts + (shifted - dt)),
        _ => Value::DateTime(shifted),
    })
}

/// SQL LIKE with `%` and `_`, honouring collation case-insensitivity.
pub(crate) fn like_match(value: &str, pattern: &str, case_insensitive: bool) -> bool {
    let (value, pattern) = if case_insensitive {
        (value.to_lowercase(), pattern.to_lowercase())
    } else {
        (value.to_string(), pattern.to_string())
    };
    let v: Vec<char> = value.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    like_match_at(&v, 0, &p, 0)
}

fn like_match_at(v: &[char], vi: usize, p: &[char], pi: usize) -> bool {
    if pi == p.len() {
        return vi == v.len();
    }
    match p[pi] {
        '%' => {
            for skip in vi..=v.len() {
                if like_match_at(v, skip, p, pi + 1) {
                    return true;
                }
            }
            false
        }
        '_' => vi < v.len() && like_match_at(v, vi + 1, p, pi + 1),
        '\\' if pi + 1 < p.len() => {
            vi < v.len() && v[vi] == p[pi + 1] && like_match_at(v, vi + 1, p, pi + 2)
        }
        c => vi < v.len() && v[vi] == c && like_match_at(v, vi + 1, p, pi + 1),
    }
}

fn eval_subquery(ctx: &Context, row: &Row, sq: &super::SubqueryExpr) -> Result<Value> {
    let inner_ctx = ctx.with_outer_row(row.clone());
    let mut iter = crate::execution::build(&inner_ctx, &sq.plan)?;
    let result = match &sq.kind {
        SubqueryKind::Scalar => {
            let first = iter.next(&inner_ctx);
            match first {
                Some(Ok(r)) => {
                    if iter.next(&inner_ctx).transpose()?.is_some() {
                        iter.close(&inner_ctx)?;
                        return Err(Error::Runtime("subquery returns more than 1 row".into()));
                    }
                    Ok(r.into_iter().next().unwrap_or(Value::Null))
                }
                Some(Err(e)) => Err(e),
                None => Ok(Value::Null),
            }
        }
        SubqueryKind::Exists { negated } => {
            let exists = match iter.next(&inner_ctx) {
                Some(Ok(_)) => true,
                Some(Err(e)) => {
                    iter.close(&inner_ctx)?;
                    return Err(e);
                }
                None => false,
            };
            Ok(Value::I8((exists != *negated) as i8))
        }
        SubqueryKind::In { operand, negated } => {
            let needle = operand.eval(ctx, row)?;
            if needle.is_null() {
                iter.close(&inner_ctx)?;
                return Ok(Value::Null);
            }
            let mut saw_null = false;
            let mut matched = false;
            while let Some(candidate) = iter.next(&inner_ctx) {
                let candidate = candidate?;
                let v = candidate.into_iter().next().unwrap_or(Value::Null);
                if v.is_null() {
                    saw_null = true;
                } else if needle.compare(&v)? == Ordering::Equal {
                    matched = true;
                    break;
                }
            }
            if matched {
                Ok(Value::I8(!negated as i8))
            } else if saw_null {
                Ok(Value::Null)
            } else {
                Ok(Value::I8(*negated as i8))
            }
        }
    };
    iter.close(&inner_ctx)?;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ColumnRef;
    use crate::types::DataType;

    fn ctx() -> Context {
        Context::for_tests()
    }

    #[test]
    fn test_three_valued_and_or() -> Result<()> {
        let ctx = ctx();
        let row = vec![];
        let null = || Box::new(Expression::Literal(Value::Null));
        let t = || Box::new(Expression::literal(1i64));
        let f = || Box::new(Expression::literal(0i64));

        assert_eq!(Expression::And(null(), f()).eval(&ctx, &row)?, Value::I8(0));
        assert_eq!(Expression::And(null(), t()).eval(&ctx, &row)?, Value::Null);
        assert_eq!(Expression::Or(null(), t()).eval(&ctx, &row)?, Value::I8(1));
        assert_eq!(Expression::Or(null(), f()).eval(&ctx, &row)?, Value::Null);
        Ok(())
    }

    #[test]
    fn test_null_safe_equal() -> Result<()> {
        let ctx = ctx();
        let row = vec![];
        let null = || Box::new(Expression::Literal(Value::Null));
        let one = || Box::new(Expression::literal(1i64));

        assert_eq!(
            Expression::Compare(CompareOp::Equal, null(), null()).eval(&ctx, &row)?,
            Value::Null
        );
        assert_eq!(
            Expression::Compare(CompareOp::NullSafeEqual, null(), null()).eval(&ctx, &row)?,
            Value::I8(1)
        );
        assert_eq!(
            Expression::Compare(CompareOp::NullSafeEqual, null(), one()).eval(&ctx, &row)?,
            Value::I8(0)
        );
        Ok(())
    }

    #[test]
    fn test_like_patterns() {
        assert!(like_match("hello", "h%o", false));
        assert!(like_match("hello", "h_llo", false));
        assert!(!like_match("hello", "h_o", false));
        assert!(like_match("HELLO", "hello", true));
        assert!(!like_match("HELLO", "hello", false));
        assert!(like_match("50%", "50\\%", false));
    }

    #[test]
    fn test_case_expression() -> Result<()> {
        let ctx = ctx();
        let expr = Expression::Case {
            operand: Some(Box::new(Expression::Column(ColumnRef::new(
                0,
                "x",
                DataType::I64,
            )))),
            when_clauses: vec![
                (Expression::literal(1i64), Expression::literal("one")),
                (Expression::literal(2i64), Expression::literal("two")),
            ],
            else_clause: Some(Box::new(Expression::literal("many"))),
        };
        assert_eq!(
            expr.eval(&ctx, &vec![Value::I64(2)])?,
            Value::Str("two".into())
        );
        assert_eq!(
            expr.eval(&ctx, &vec![Value::I64(9)])?,
            Value::Str("many".into())
        );
        Ok(())
    }

    #[test]
    fn test_interval_arithmetic() -> Result<()> {
        let ctx = ctx();
        let base = Expression::Literal(Value::Date(
            chrono::NaiveDate::from_ymd_opt(2019, 1, 31).unwrap(),
        ));
        let plus_month = Expression::Arithmetic(
            ArithmeticOp::Add,
            Box::new(base),
            Box::new(Expression::Interval(
                Box::new(Expression::literal(1i64)),
                IntervalUnit::Month,
            )),
        );
        assert_eq!(
            plus_month.eval(&ctx, &vec![])?,
            Value::Date(chrono::NaiveDate::from_ymd_opt(2019, 2, 28).unwrap())
        );
        Ok(())
    }

    #[test]
    fn test_in_list_null_semantics() -> Result<()> {
        let ctx = ctx();
        let expr = Expression::InList {
            expr: Box::new(Expression::literal(3i64)),
            list: vec![
                Expression::literal(1i64),
                Expression::Literal(Value::Null),
            ],
            negated: false,
        };
        assert_eq!(expr.eval(&ctx, &vec![])?, Value::Null);
        Ok(())
    }
}
