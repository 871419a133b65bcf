//! SQL values
//!
//! A `Value` is a tagged scalar spanning the MySQL type lattice. Values are
//! value-semantic: rows copy them freely and never share them mutably across
//! iterators. The 24-bit integer widths exist at the type level only; their
//! values are stored in the 32-bit variants and range-checked on conversion.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};

/// A row of values.
pub type Row = Vec<Value>;

/// A geometry value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    Point { x: f64, y: f64 },
    LineString(Vec<(f64, f64)>),
    Polygon(Vec<Vec<(f64, f64)>>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    // Signed integers. 24-bit values live in I32.
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    // Unsigned integers. 24-bit values live in U32.
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    // Floats
    F32(f32),
    F64(f64),
    // Fixed-precision decimal
    Decimal(Decimal),
    // Character data; the collation lives on the expression/type, not here.
    Str(String),
    // Binary data
    Bytes(Vec<u8>),
    Bit(u64),
    // Temporal types; timestamps are normalised to UTC.
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Timestamp(DateTime<Utc>),
    Time(NaiveTime),
    Year(u16),
    // Enumerations
    Enum(String),
    Set(Vec<String>),
    // Documents and collections
    Json(serde_json::Value),
    Array(Vec<Value>),
    Geometry(Geometry),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Value::I8(_)
                | Value::I16(_)
                | Value::I32(_)
                | Value::I64(_)
                | Value::U8(_)
                | Value::U16(_)
                | Value::U32(_)
                | Value::U64(_)
        )
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, Value::F32(_) | Value::F64(_) | Value::Decimal(_))
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Value::Str(_) | Value::Enum(_))
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            Value::Date(_)
                | Value::DateTime(_)
                | Value::Timestamp(_)
                | Value::Time(_)
                | Value::Year(_)
        )
    }

    /// Widen any integer to i128 for range checks and comparison.
    pub fn to_i128(&self) -> Result<i128> {
        match self {
            Value::I8(v) => Ok(*v as i128),
            Value::I16(v) => Ok(*v as i128),
            Value::I32(v) => Ok(*v as i128),
            Value::I64(v) => Ok(*v as i128),
            Value::U8(v) => Ok(*v as i128),
            Value::U16(v) => Ok(*v as i128),
            Value::U32(v) => Ok(*v as i128),
            Value::U64(v) => Ok(*v as i128),
            Value::Bit(v) => Ok(*v as i128),
            Value::Year(v) => Ok(*v as i128),
            _ => Err(Error::TypeMismatch {
                expected: "integer".into(),
                found: self.type_name().into(),
            }),
        }
    }

    pub fn to_f64(&self) -> Result<f64> {
        match self {
            Value::F32(v) => Ok(*v as f64),
            Value::F64(v) => Ok(*v),
            Value::Decimal(d) => d.to_f64().ok_or_else(|| Error::OutOfRange {
                data_type: "DOUBLE".into(),
                value: d.to_string(),
            }),
            Value::Str(s) => Ok(numeric_prefix(s)),
            v if v.is_integer() => Ok(v.to_i128()? as f64),
            _ => Err(Error::TypeMismatch {
                expected: "numeric".into(),
                found: self.type_name().into(),
            }),
        }
    }

    pub fn to_decimal(&self) -> Result<Decimal> {
        match self {
            Value::Decimal(d) => Ok(*d),
            Value::F32(v) => Decimal::from_f32(*v).ok_or_else(|| Error::OutOfRange {
                data_type: "DECIMAL".into(),
                value: v.to_string(),
            }),
            Value::F64(v) => Decimal::from_f64(*v).ok_or_else(|| Error::OutOfRange {
                data_type: "DECIMAL".into(),
                value: v.to_string(),
            }),
            Value::Str(s) => {
                Decimal::from_f64(numeric_prefix(s)).ok_or_else(|| Error::OutOfRange {
                    data_type: "DECIMAL".into(),
                    value: s.clone(),
                })
            }
            v if v.is_integer() => {
                Decimal::from_i128(v.to_i128()?).ok_or_else(|| Error::OutOfRange {
                    data_type: "DECIMAL".into(),
                    value: v.to_string(),
                })
            }
            _ => Err(Error::TypeMismatch {
                expected: "numeric".into(),
                found: self.type_name().into(),
            }),
        }
    }

    /// MySQL truthiness: non-zero numerics are true, strings go through the
    /// numeric prefix scan, NULL is not true.
    pub fn is_true(&self) -> Result<bool> {
        match self {
            Value::Null => Ok(false),
            Value::F32(v) => Ok(*v != 0.0),
            Value::F64(v) => Ok(*v != 0.0),
            Value::Decimal(d) => Ok(!d.is_zero()),
            Value::Str(s) => Ok(numeric_prefix(s) != 0.0),
            v if v.is_integer() => Ok(v.to_i128()? != 0),
            _ => Err(Error::TypeMismatch {
                expected: "boolean".into(),
                found: self.type_name().into(),
            }),
        }
    }

    /// A short name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::I8(_) => "TINYINT",
            Value::I16(_) => "SMALLINT",
            Value::I32(_) => "INT",
            Value::I64(_) => "BIGINT",
            Value::U8(_) => "TINYINT UNSIGNED",
            Value::U16(_) => "SMALLINT UNSIGNED",
            Value::U32(_) => "INT UNSIGNED",
            Value::U64(_) => "BIGINT UNSIGNED",
            Value::F32(_) => "FLOAT",
            Value::F64(_) => "DOUBLE",
            Value::Decimal(_) => "DECIMAL",
            Value::Str(_) => "VARCHAR",
            Value::Bytes(_) => "VARBINARY",
            Value::Bit(_) => "BIT",
            Value::Date(_) => "DATE",
            Value::DateTime(_) => "DATETIME",
            Value::Timestamp(_) => "TIMESTAMP",
            Value::Time(_) => "TIME",
            Value::Year(_) => "YEAR",
            Value::Enum(_) => "ENUM",
            Value::Set(_) => "SET",
            Value::Json(_) => "JSON",
            Value::Array(_) => "ARRAY",
            Value::Geometry(_) => "GEOMETRY",
        }
    }

    /// Compare two values, promoting across numeric widths. NULL sorts first;
    /// three-valued comparison semantics are applied by the caller.
    pub fn compare(&self, other: &Value) -> Result<Ordering> {
        use Value::*;
        match (self, other) {
            (Null, Null) => Ok(Ordering::Equal),
            (Null, _) => Ok(Ordering::Less),
            (_, Null) => Ok(Ordering::Greater),
            (a, b) if a.is_integer() && b.is_integer() => Ok(a.to_i128()?.cmp(&b.to_i128()?)),
            (Decimal(_), b) | (b, Decimal(_)) if b.is_numeric() => {
                let (a, b) = (self.to_decimal()?, other.to_decimal()?);
                Ok(a.cmp(&b))
            }
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let (a, b) = (a.to_f64()?, b.to_f64()?);
                Ok(a.partial_cmp(&b).unwrap_or(Ordering::Equal))
            }
            (Str(a), Str(b)) => Ok(a.cmp(b)),
            (Str(a), b) if b.is_numeric() => {
                let a = numeric_prefix(a);
                let b = b.to_f64()?;
                Ok(a.partial_cmp(&b).unwrap_or(Ordering::Equal))
            }
            (a, Str(b)) if a.is_numeric() => {
                let a = a.to_f64()?;
                let b = numeric_prefix(b);
                Ok(a.partial_cmp(&b).unwrap_or(Ordering::Equal))
            }
            (Bytes(a), Bytes(b)) => Ok(a.cmp(b)),
            (Date(a), Date(b)) => Ok(a.cmp(b)),
            (Time(a), Time(b)) => Ok(a.cmp(b)),
            (Year(a), Year(b)) => Ok(a.cmp(b)),
            (Enum(a), Enum(b)) => Ok(a.cmp(b)),
            (Set(a), Set(b)) => Ok(a.cmp(b)),
            (Bit(a), Bit(b)) => Ok(a.cmp(b)),
            // Mixed temporal comparisons widen to a datetime.
            (a, b) if a.is_temporal() && b.is_temporal() => {
                let (a, b) = (a.to_datetime()?, b.to_datetime()?);
                Ok(a.cmp(&b))
            }
            (a, Str(s)) if a.is_temporal() => {
                let parsed = parse_datetime(s)?;
                Ok(a.to_datetime()?.cmp(&parsed))
            }
            (Str(s), b) if b.is_temporal() => {
                let parsed = parse_datetime(s)?;
                Ok(parsed.cmp(&b.to_datetime()?))
            }
            (Json(a), Json(b)) => Ok(a.to_string().cmp(&b.to_string())),
            (Array(a), Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        other => return Ok(other),
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            _ => Err(Error::TypeMismatch {
                expected: self.type_name().into(),
                found: other.type_name().into(),
            }),
        }
    }

    /// Widen any temporal value to a naive datetime in UTC.
    pub fn to_datetime(&self) -> Result<NaiveDateTime> {
        match self {
            Value::Date(d) => Ok(d.and_hms_opt(0, 0, 0).unwrap_or_default()),
            Value::DateTime(dt) => Ok(*dt),
            Value::Timestamp(ts) => Ok(ts.naive_utc()),
            Value::Year(y) => Ok(NaiveDate::from_ymd_opt(*y as i32, 1, 1)
                .unwrap_or_default()
                .and_hms_opt(0, 0, 0)
                .unwrap_or_default()),
            Value::Str(s) => parse_datetime(s),
            _ => Err(Error::TypeMismatch {
                expected: "temporal".into(),
                found: self.type_name().into(),
            }),
        }
    }

    pub fn checked_add(&self, other: &Value) -> Result<Value> {
        numeric_binop(self, other, "+", |a, b| a.checked_add(b), |a, b| a + b, |a, b| {
            a.checked_add(b)
        })
    }

    pub fn checked_sub(&self, other: &Value) -> Result<Value> {
        numeric_binop(self, other, "-", |a, b| a.checked_sub(b), |a, b| a - b, |a, b| {
            a.checked_sub(b)
        })
    }

    pub fn checked_mul(&self, other: &Value) -> Result<Value> {
        numeric_binop(self, other, "*", |a, b| a.checked_mul(b), |a, b| a * b, |a, b| {
            a.checked_mul(b)
        })
    }

    pub fn checked_div(&self, other: &Value) -> Result<Value> {
        if self.is_null() || other.is_null() {
            return Ok(Value::Null);
        }
        // MySQL division: decimal for integer and decimal operands, double
        // once a float is involved.
        match (self, other) {
            (a, b)
                if matches!(a, Value::F32(_) | Value::F64(_))
                    || matches!(b, Value::F32(_) | Value::F64(_)) =>
            {
                let b = b.to_f64()?;
                if b == 0.0 {
                    return Err(Error::DivisionByZero);
                }
                Ok(Value::F64(a.to_f64()? / b))
            }
            (a, b) => {
                let b = b.to_decimal()?;
                if b.is_zero() {
                    return Err(Error::DivisionByZero);
                }
                let a = a.to_decimal()?;
                a.checked_div(b)
                    .map(Value::Decimal)
                    .ok_or(Error::OutOfRange {
                        data_type: "DECIMAL".into(),
                        value: a.to_string(),
                    })
            }
        }
    }

    pub fn checked_rem(&self, other: &Value) -> Result<Value> {
        if self.is_null() || other.is_null() {
            return Ok(Value::Null);
        }
        if self.is_integer() && other.is_integer() {
            let b = other.to_i128()?;
            if b == 0 {
                return Err(Error::DivisionByZero);
            }
            return narrow_i128(self.to_i128()? % b);
        }
        let b = other.to_f64()?;
        if b == 0.0 {
            return Err(Error::DivisionByZero);
        }
        Ok(Value::F64(self.to_f64()? % b))
    }

    pub fn checked_neg(&self) -> Result<Value> {
        match self {
            Value::Null => Ok(Value::Null),
            Value::F32(v) => Ok(Value::F32(-v)),
            Value::F64(v) => Ok(Value::F64(-v)),
            Value::Decimal(d) => Ok(Value::Decimal(-d)),
            v if v.is_integer() => narrow_i128(-v.to_i128()?),
            _ => Err(Error::TypeMismatch {
                expected: "numeric".into(),
                found: self.type_name().into(),
            }),
        }
    }

    /// The value rendered the way the server would send it as text.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".into(),
            Value::Str(s) => s.clone(),
            Value::Bytes(b) => b.iter().map(|b| format!("{b:02x}")).collect(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            Value::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
            Value::Time(t) => t.format("%H:%M:%S").to_string(),
            Value::Json(j) => j.to_string(),
            Value::Enum(s) => s.clone(),
            Value::Set(items) => items.join(","),
            Value::Array(items) => {
                let inner: Vec<String> = items.iter().map(|v| v.to_display_string()).collect();
                format!("[{}]", inner.join(", "))
            }
            other => format!("{other}"),
        }
    }
}

/// Arithmetic over the numeric lattice: integers stay integral (widening to
/// 64 bits, erroring on overflow), decimals dominate float-free mixes, and
/// any float pushes the result to F64.
fn numeric_binop(
    left: &Value,
    right: &Value,
    op: &'static str,
    int_op: fn(i128, i128) -> Option<i128>,
    float_op: fn(f64, f64) -> f64,
    dec_op: fn(Decimal, Decimal) -> Option<Decimal>,
) -> Result<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    match (left, right) {
        (a, b) if a.is_integer() && b.is_integer() => {
            let out = int_op(a.to_i128()?, b.to_i128()?).ok_or_else(|| Error::OutOfRange {
                data_type: "BIGINT".into(),
                value: format!("{a} {op} {b}"),
            })?;
            narrow_i128(out)
        }
        (a, b)
            if matches!(a, Value::F32(_) | Value::F64(_))
                || matches!(b, Value::F32(_) | Value::F64(_)) =>
        {
            Ok(Value::F64(float_op(a.to_f64()?, b.to_f64()?)))
        }
        (a, b) if a.is_numeric() && b.is_numeric() => {
            let out = dec_op(a.to_decimal()?, b.to_decimal()?).ok_or_else(|| Error::OutOfRange {
                data_type: "DECIMAL".into(),
                value: format!("{a} {op} {b}"),
            })?;
            Ok(Value::Decimal(out))
        }
        // Strings participate through the numeric prefix scan.
        (a, b) if a.is_text() || b.is_text() => Ok(Value::F64(float_op(a.to_f64()?, b.to_f64()?))),
        (a, b) => Err(Error::TypeMismatch {
            expected: a.type_name().into(),
            found: b.type_name().into(),
        }),
    }
}

/// Narrow an i128 arithmetic result back into the widest fitting value.
fn narrow_i128(v: i128) -> Result<Value> {
    if let Ok(v) = i64::try_from(v) {
        Ok(Value::I64(v))
    } else if let Ok(v) = u64::try_from(v) {
        Ok(Value::U64(v))
    } else {
        Err(Error::OutOfRange {
            data_type: "BIGINT".into(),
            value: v.to_string(),
        })
    }
}

/// MySQL's lax string-to-number rule: parse the longest numeric prefix,
/// defaulting to zero.
pub fn numeric_prefix(s: &str) -> f64 {
    let s = s.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_exp = false;
    for (i, c) in s.char_indices() {
        match c {
            '0'..='9' => end = i + 1,
            '-' | '+' if i == 0 => {}
            '.' if !seen_dot && !seen_exp => seen_dot = true,
            'e' | 'E' if !seen_exp && end > 0 => {
                seen_exp = true;
                seen_dot = true;
            }
            '-' | '+'
                if seen_exp
                    && s.as_bytes()
                        .get(i.wrapping_sub(1))
                        .is_some_and(|b| *b == b'e' || *b == b'E') => {}
            _ => break,
        }
    }
    if end == 0 {
        return 0.0;
    }
    s[..end].parse().unwrap_or(0.0)
}

/// Parse a datetime from the accepted MySQL literal forms, including
/// truncated ones (a bare date, a datetime without seconds).
pub fn parse_datetime(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    for fmt in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d.and_hms_opt(0, 0, 0).unwrap_or_default());
    }
    Err(Error::InvalidValue(format!("invalid datetime: {s:?}")))
}

/// Parse a date, rejecting obviously invalid values.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| Error::InvalidValue(format!("invalid date: {s:?}")))
}

/// Parse a time-of-day, accepting truncated forms.
pub fn parse_time(s: &str) -> Result<NaiveTime> {
    let s = s.trim();
    for fmt in ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"] {
        if let Ok(t) = NaiveTime::parse_from_str(s, fmt) {
            return Ok(t);
        }
    }
    Err(Error::InvalidValue(format!("invalid time: {s:?}")))
}

impl Eq for Value {}

// Grouping keys hash values directly; floats hash their bit patterns and
// JSON documents hash their canonical rendering.
impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::I8(v) => v.hash(state),
            Value::I16(v) => v.hash(state),
            Value::I32(v) => v.hash(state),
            Value::I64(v) => v.hash(state),
            Value::U8(v) => v.hash(state),
            Value::U16(v) => v.hash(state),
            Value::U32(v) => v.hash(state),
            Value::U64(v) => v.hash(state),
            Value::F32(v) => v.to_bits().hash(state),
            Value::F64(v) => v.to_bits().hash(state),
            Value::Decimal(d) => d.hash(state),
            Value::Str(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::Bit(v) => v.hash(state),
            Value::Date(d) => d.hash(state),
            Value::DateTime(dt) => dt.hash(state),
            Value::Timestamp(ts) => ts.hash(state),
            Value::Time(t) => t.hash(state),
            Value::Year(y) => y.hash(state),
            Value::Enum(s) => s.hash(state),
            Value::Set(items) => items.hash(state),
            Value::Json(j) => j.to_string().hash(state),
            Value::Array(items) => items.hash(state),
            Value::Geometry(g) => format!("{g:?}").hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::I8(v) => write!(f, "{v}"),
            Value::I16(v) => write!(f, "{v}"),
            Value::I32(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::U8(v) => write!(f, "{v}"),
            Value::U16(v) => write!(f, "{v}"),
            Value::U32(v) => write!(f, "{v}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::F32(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Str(s) => write!(f, "'{s}'"),
            Value::Bytes(b) => {
                write!(f, "0x")?;
                for byte in b {
                    write!(f, "{byte:02X}")?;
                }
                Ok(())
            }
            Value::Bit(v) => write!(f, "b'{v:b}'"),
            Value::Date(d) => write!(f, "'{}'", d.format("%Y-%m-%d")),
            Value::DateTime(dt) => write!(f, "'{}'", dt.format("%Y-%m-%d %H:%M:%S")),
            Value::Timestamp(ts) => write!(f, "'{}'", ts.format("%Y-%m-%d %H:%M:%S")),
            Value::Time(t) => write!(f, "'{}'", t.format("%H:%M:%S")),
            Value::Year(y) => write!(f, "{y}"),
            Value::Enum(s) => write!(f, "'{s}'"),
            Value::Set(items) => write!(f, "'{}'", items.join(",")),
            Value::Json(j) => write!(f, "{j}"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Geometry(Geometry::Point { x, y }) => write!(f, "POINT({x} {y})"),
            Value::Geometry(g) => write!(f, "{g:?}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_arithmetic_widens() -> Result<()> {
        assert_eq!(Value::I8(100).checked_add(&Value::I8(100))?, Value::I64(200));
        assert_eq!(Value::I64(7).checked_mul(&Value::I64(6))?, Value::I64(42));
        Ok(())
    }

    #[test]
    fn test_overflow_is_an_error() {
        let r = Value::U64(u64::MAX).checked_add(&Value::U64(u64::MAX));
        assert!(matches!(r, Err(Error::OutOfRange { .. })));
    }

    #[test]
    fn test_null_propagates_through_arithmetic() -> Result<()> {
        assert_eq!(Value::Null.checked_add(&Value::I64(1))?, Value::Null);
        assert_eq!(Value::I64(1).checked_div(&Value::Null)?, Value::Null);
        Ok(())
    }

    #[test]
    fn test_division() -> Result<()> {
        assert_eq!(
            Value::I64(7).checked_div(&Value::I64(2))?,
            Value::Decimal(Decimal::from_f64(3.5).unwrap())
        );
        assert!(matches!(
            Value::I64(1).checked_div(&Value::I64(0)),
            Err(Error::DivisionByZero)
        ));
        Ok(())
    }

    #[test]
    fn test_numeric_prefix_scan() {
        assert_eq!(numeric_prefix("42abc"), 42.0);
        assert_eq!(numeric_prefix("  -3.5x"), -3.5);
        assert_eq!(numeric_prefix("1e2z"), 100.0);
        assert_eq!(numeric_prefix("abc"), 0.0);
    }

    #[test]
    fn test_cross_width_comparison() -> Result<()> {
        assert_eq!(Value::I8(5).compare(&Value::U64(5))?, Ordering::Equal);
        assert_eq!(Value::F64(1.5).compare(&Value::I64(2))?, Ordering::Less);
        assert_eq!(Value::Null.compare(&Value::I64(0))?, Ordering::Less);
        Ok(())
    }

    #[test]
    fn test_datetime_parsing_accepts_truncated_forms() -> Result<()> {
        parse_datetime("2019-01-01")?;
        parse_datetime("2019-01-01 10:30")?;
        parse_datetime("2019-01-01 10:30:15")?;
        assert!(parse_datetime("not a date").is_err());
        Ok(())
    }

    #[test]
    fn test_temporal_comparison_against_string() -> Result<()> {
        let dt = Value::DateTime(parse_datetime("2022-01-01 00:01:00")?);
        assert_eq!(
            dt.compare(&Value::Str("2022-01-01 00:00:00".into()))?,
            Ordering::Greater
        );
        Ok(())
    }
}
