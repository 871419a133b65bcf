//! SQL data types
//!
//! The declared type of a column or expression. Conversion follows MySQL's
//! lax policy: strings convert to numerics via a prefix scan, numeric
//! overflow saturates to the type's bound and reports an out-of-range flag
//! (the caller turns that into a warning or an error depending on strict
//! mode), and temporal values accept truncated literal forms.

use chrono::{TimeZone, Utc};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use super::collation::{CharacterSet, CollationId};
use super::value::{numeric_prefix, parse_date, parse_time, Value};
use crate::error::{Error, Result};

/// Size tier for TEXT and BLOB columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SizeTier {
    Tiny,
    Medium,
    Long,
    Max,
}

impl SizeTier {
    pub fn max_byte_length(&self) -> u64 {
        match self {
            SizeTier::Tiny => 255,
            SizeTier::Medium => 65_535,
            SizeTier::Long => 16_777_215,
            SizeTier::Max => 4_294_967_295,
        }
    }
}

/// Geometry subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryKind {
    Point,
    LineString,
    Polygon,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Null,
    // Signed integer widths
    I8,
    I16,
    I24,
    I32,
    I64,
    // Unsigned integer widths
    U8,
    U16,
    U24,
    U32,
    U64,
    F32,
    F64,
    /// DECIMAL(precision ≤ 65, scale ≤ 30)
    Decimal(u8, u8),
    /// CHAR(n)
    Char(u16, CollationId),
    /// VARCHAR(n)
    VarChar(u16, CollationId),
    /// TINYTEXT / TEXT / MEDIUMTEXT / LONGTEXT
    Text(SizeTier, CollationId),
    /// BINARY(n)
    Binary(u16),
    /// VARBINARY(n)
    VarBinary(u16),
    /// TINYBLOB / BLOB / MEDIUMBLOB / LONGBLOB
    Blob(SizeTier),
    /// BIT(n), n ≤ 64
    Bit(u8),
    Date,
    DateTime,
    Timestamp,
    Time,
    Year,
    Enum(Vec<String>, CollationId),
    Set(Vec<String>, CollationId),
    Json,
    Geometry(GeometryKind),
    /// Element-typed array; produced by generators and array literals.
    Array(Box<DataType>),
}

impl DataType {
    /// A default textual type.
    pub fn text() -> DataType {
        DataType::Text(SizeTier::Max, CollationId::DEFAULT)
    }

    pub fn varchar(len: u16) -> DataType {
        DataType::VarChar(len, CollationId::DEFAULT)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, DataType::F32 | DataType::F64 | DataType::Decimal(..))
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DataType::I8
                | DataType::I16
                | DataType::I24
                | DataType::I32
                | DataType::I64
                | DataType::U8
                | DataType::U16
                | DataType::U24
                | DataType::U32
                | DataType::U64
        )
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            DataType::U8 | DataType::U16 | DataType::U24 | DataType::U32 | DataType::U64
        )
    }

    pub fn is_text(&self) -> bool {
        matches!(
            self,
            DataType::Char(..)
                | DataType::VarChar(..)
                | DataType::Text(..)
                | DataType::Enum(..)
                | DataType::Set(..)
        )
    }

    pub fn is_binary(&self) -> bool {
        matches!(
            self,
            DataType::Binary(_) | DataType::VarBinary(_) | DataType::Blob(_)
        )
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            DataType::Date
                | DataType::DateTime
                | DataType::Timestamp
                | DataType::Time
                | DataType::Year
        )
    }

    pub fn is_array(&self) -> bool {
        matches!(self, DataType::Array(_))
    }

    /// The collation of a character type; None for everything else.
    pub fn collation(&self) -> Option<CollationId> {
        match self {
            DataType::Char(_, c)
            | DataType::VarChar(_, c)
            | DataType::Text(_, c)
            | DataType::Enum(_, c)
            | DataType::Set(_, c) => Some(*c),
            DataType::Binary(_) | DataType::VarBinary(_) | DataType::Blob(_) => {
                Some(CollationId::BINARY)
            }
            _ => None,
        }
    }

    /// Signed integer bounds for the integral widths.
    fn integer_bounds(&self) -> Option<(i128, i128)> {
        let bounds = match self {
            DataType::I8 => (i8::MIN as i128, i8::MAX as i128),
            DataType::I16 => (i16::MIN as i128, i16::MAX as i128),
            DataType::I24 => (-8_388_608, 8_388_607),
            DataType::I32 => (i32::MIN as i128, i32::MAX as i128),
            DataType::I64 => (i64::MIN as i128, i64::MAX as i128),
            DataType::U8 => (0, u8::MAX as i128),
            DataType::U16 => (0, u16::MAX as i128),
            DataType::U24 => (0, 16_777_215),
            DataType::U32 => (0, u32::MAX as i128),
            DataType::U64 => (0, u64::MAX as i128),
            DataType::Year => (1901, 2155),
            _ => return None,
        };
        Some(bounds)
    }

    fn integer_value(&self, v: i128) -> Value {
        match self {
            DataType::I8 => Value::I8(v as i8),
            DataType::I16 => Value::I16(v as i16),
            DataType::I24 | DataType::I32 => Value::I32(v as i32),
            DataType::I64 => Value::I64(v as i64),
            DataType::U8 => Value::U8(v as u8),
            DataType::U16 => Value::U16(v as u16),
            DataType::U24 | DataType::U32 => Value::U32(v as u32),
            DataType::U64 => Value::U64(v as u64),
            DataType::Year => Value::Year(v as u16),
            _ => Value::I64(v as i64),
        }
    }

    /// Convert a value into this type.
    ///
    /// Returns the converted value and an out-of-range flag. Saturation and
    /// truncation set the flag; structurally invalid input is an error.
    pub fn convert(&self, value: Value) -> Result<(Value, bool)> {
        if value.is_null() {
            return Ok((Value::Null, false));
        }
        match self {
            t if t.is_integer() || *t == DataType::Year => {
                let raw = match &value {
                    v if v.is_integer() => v.to_i128()?,
                    Value::F32(_) | Value::F64(_) => value.to_f64()?.round() as i128,
                    Value::Decimal(d) => d.round().to_i128().unwrap_or(i128::MAX),
                    Value::Str(s) => numeric_prefix(s).round() as i128,
                    Value::Year(y) => *y as i128,
                    _ => {
                        return Err(Error::InvalidCast {
                            from: value.type_name().into(),
                            to: self.to_string(),
                        })
                    }
                };
                let (min, max) = self.integer_bounds().unwrap_or((i64::MIN as i128, i64::MAX as i128));
                let clamped = raw.clamp(min, max);
                Ok((self.integer_value(clamped), clamped != raw))
            }
            DataType::F32 => {
                let v = value.to_f64()?;
                let clamped = v.clamp(f32::MIN as f64, f32::MAX as f64);
                Ok((Value::F32(clamped as f32), clamped != v))
            }
            DataType::F64 => Ok((Value::F64(value.to_f64()?), false)),
            DataType::Decimal(precision, scale) => {
                let d = value.to_decimal()?;
                let rounded = d.round_dp(*scale as u32);
                // Saturate at the declared precision.
                let int_digits = precision.saturating_sub(*scale) as u32;
                let bound = Decimal::from_i128_with_scale(
                    10i128.checked_pow(int_digits.min(28)).unwrap_or(i128::MAX),
                    0,
                );
                if rounded.abs() >= bound {
                    let saturated = bound - Decimal::from_i128_with_scale(1, *scale as u32);
                    let saturated = if rounded.is_sign_negative() {
                        -saturated
                    } else {
                        saturated
                    };
                    Ok((Value::Decimal(saturated), true))
                } else {
                    Ok((Value::Decimal(rounded), rounded != d))
                }
            }
            DataType::Char(len, _) | DataType::VarChar(len, _) => {
                let mut s = to_text(value);
                let truncated = s.chars().count() > *len as usize;
                if truncated {
                    s = s.chars().take(*len as usize).collect();
                }
                Ok((Value::Str(s), truncated))
            }
            DataType::Text(tier, _) => {
                let mut s = to_text(value);
                let truncated = s.len() as u64 > tier.max_byte_length();
                if truncated {
                    s.truncate(tier.max_byte_length() as usize);
                }
                Ok((Value::Str(s), truncated))
            }
            DataType::Binary(len) | DataType::VarBinary(len) => {
                let mut b = to_bytes(value);
                let truncated = b.len() > *len as usize;
                b.truncate(*len as usize);
                Ok((Value::Bytes(b), truncated))
            }
            DataType::Blob(tier) => {
                let mut b = to_bytes(value);
                let truncated = b.len() as u64 > tier.max_byte_length();
                if truncated {
                    b.truncate(tier.max_byte_length() as usize);
                }
                Ok((Value::Bytes(b), truncated))
            }
            DataType::Bit(width) => {
                let raw = match &value {
                    v if v.is_integer() => v.to_i128()?,
                    Value::Str(s) => numeric_prefix(s) as i128,
                    _ => {
                        return Err(Error::InvalidCast {
                            from: value.type_name().into(),
                            to: self.to_string(),
                        })
                    }
                };
                let max = if *width >= 64 {
                    u64::MAX
                } else {
                    (1u64 << width) - 1
                };
                let clamped = raw.clamp(0, max as i128) as u64;
                Ok((Value::Bit(clamped), clamped as i128 != raw))
            }
            DataType::Date => match value {
                Value::Date(d) => Ok((Value::Date(d), false)),
                Value::DateTime(dt) => Ok((Value::Date(dt.date()), false)),
                Value::Timestamp(ts) => Ok((Value::Date(ts.date_naive()), false)),
                Value::Str(s) => Ok((Value::Date(parse_date(&s)?), false)),
                v => Err(Error::InvalidCast {
                    from: v.type_name().into(),
                    to: self.to_string(),
                }),
            },
            DataType::DateTime => match value {
                Value::DateTime(dt) => Ok((Value::DateTime(dt), false)),
                v => Ok((Value::DateTime(v.to_datetime()?), false)),
            },
            DataType::Timestamp => {
                // Timestamps normalise to UTC.
                let naive = match value {
                    Value::Timestamp(ts) => return Ok((Value::Timestamp(ts), false)),
                    v => v.to_datetime()?,
                };
                Ok((Value::Timestamp(Utc.from_utc_datetime(&naive)), false))
            }
            DataType::Time => match value {
                Value::Time(t) => Ok((Value::Time(t), false)),
                Value::DateTime(dt) => Ok((Value::Time(dt.time()), false)),
                Value::Timestamp(ts) => Ok((Value::Time(ts.time()), false)),
                Value::Str(s) => Ok((Value::Time(parse_time(&s)?), false)),
                v => Err(Error::InvalidCast {
                    from: v.type_name().into(),
                    to: self.to_string(),
                }),
            },
            DataType::Enum(allowed, collation) => {
                let s = to_text(value);
                match allowed.iter().find(|a| collation.equals(a, &s)) {
                    Some(label) => Ok((Value::Enum(label.clone()), false)),
                    // An unknown member maps to the empty member with a flag.
                    None => Ok((Value::Enum(String::new()), true)),
                }
            }
            DataType::Set(allowed, collation) => {
                let s = to_text(value);
                let mut out = Vec::new();
                let mut flagged = false;
                for part in s.split(',').filter(|p| !p.is_empty()) {
                    match allowed.iter().find(|a| collation.equals(a, part)) {
                        Some(label) => {
                            if !out.contains(label) {
                                out.push(label.clone());
                            }
                        }
                        None => flagged = true,
                    }
                }
                Ok((Value::Set(out), flagged))
            }
            DataType::Json => match value {
                Value::Json(j) => Ok((Value::Json(j), false)),
                Value::Str(s) => serde_json::from_str(&s)
                    .map(|j| (Value::Json(j), false))
                    .map_err(|e| Error::InvalidValue(format!("invalid JSON: {e}"))),
                v => Err(Error::InvalidCast {
                    from: v.type_name().into(),
                    to: self.to_string(),
                }),
            },
            DataType::Geometry(_) => match value {
                Value::Geometry(g) => Ok((Value::Geometry(g), false)),
                v => Err(Error::InvalidCast {
                    from: v.type_name().into(),
                    to: self.to_string(),
                }),
            },
            DataType::Array(elem) => match value {
                Value::Array(items) => {
                    let mut converted = Vec::with_capacity(items.len());
                    let mut flagged = false;
                    for item in items {
                        let (v, f) = elem.convert(item)?;
                        flagged |= f;
                        converted.push(v);
                    }
                    Ok((Value::Array(converted), flagged))
                }
                v => Err(Error::InvalidCast {
                    from: v.type_name().into(),
                    to: self.to_string(),
                }),
            },
            DataType::Null => Ok((Value::Null, false)),
            _ => Err(Error::InvalidCast {
                from: value.type_name().into(),
                to: self.to_string(),
            }),
        }
    }

    /// Compare two values under this type, using the type's collation for
    /// character data.
    pub fn compare(&self, a: &Value, b: &Value) -> Result<Ordering> {
        if let (Some(collation), Value::Str(x), Value::Str(y)) = (self.collation(), a, b) {
            return Ok(collation.compare(x, y));
        }
        a.compare(b)
    }

    /// The unified type of mixed arithmetic over this type and another.
    pub fn promote(&self, other: &DataType) -> DataType {
        use DataType::*;
        match (self, other) {
            (a, b) if a == b => a.clone(),
            (Null, t) | (t, Null) => t.clone(),
            (F64, _) | (_, F64) | (F32, _) | (_, F32) => F64,
            (Decimal(p1, s1), Decimal(p2, s2)) => Decimal(*p1.max(p2), *s1.max(s2)),
            (Decimal(p, s), t) | (t, Decimal(p, s)) if t.is_integer() => Decimal(*p, *s),
            (a, b) if a.is_integer() && b.is_integer() => {
                if a.is_unsigned() && b.is_unsigned() {
                    U64
                } else {
                    I64
                }
            }
            (a, b) if a.is_temporal() && b.is_temporal() => DateTime,
            (a, b) if a.is_text() || b.is_text() => F64,
            _ => F64,
        }
    }

    /// Maximum number of bytes a value of this type can occupy in a text
    /// response, given the session's result character set.
    pub fn max_response_byte_length(&self, result_charset: CharacterSet) -> u64 {
        let per_char = result_charset.max_char_length() as u64;
        match self {
            DataType::Null => 0,
            DataType::I8 | DataType::U8 => 4,
            DataType::I16 | DataType::U16 => 6,
            DataType::I24 | DataType::U24 => 9,
            DataType::I32 | DataType::U32 => 11,
            DataType::I64 | DataType::U64 => 20,
            DataType::F32 => 12,
            DataType::F64 => 22,
            DataType::Decimal(p, s) => *p as u64 + if *s > 0 { 2 } else { 1 },
            DataType::Char(n, _) | DataType::VarChar(n, _) => *n as u64 * per_char,
            DataType::Text(tier, _) | DataType::Blob(tier) => tier.max_byte_length(),
            DataType::Binary(n) | DataType::VarBinary(n) => *n as u64,
            DataType::Bit(n) => (*n as u64 + 7) / 8,
            DataType::Date => 10,
            DataType::DateTime | DataType::Timestamp => 19,
            DataType::Time => 10,
            DataType::Year => 4,
            DataType::Enum(allowed, _) => {
                allowed.iter().map(|a| a.len() as u64).max().unwrap_or(0) * per_char
            }
            DataType::Set(allowed, _) => {
                allowed.iter().map(|a| a.len() as u64 + 1).sum::<u64>() * per_char
            }
            DataType::Json => SizeTier::Max.max_byte_length(),
            DataType::Geometry(_) => SizeTier::Max.max_byte_length(),
            DataType::Array(_) => SizeTier::Max.max_byte_length(),
        }
    }

    /// The declared type matching a literal value.
    pub fn of_value(value: &Value) -> DataType {
        match value {
            Value::Null => DataType::Null,
            Value::I8(_) => DataType::I8,
            Value::I16(_) => DataType::I16,
            Value::I32(_) => DataType::I32,
            Value::I64(_) => DataType::I64,
            Value::U8(_) => DataType::U8,
            Value::U16(_) => DataType::U16,
            Value::U32(_) => DataType::U32,
            Value::U64(_) => DataType::U64,
            Value::F32(_) => DataType::F32,
            Value::F64(_) => DataType::F64,
            Value::Decimal(d) => DataType::Decimal(65, d.scale().min(30) as u8),
            Value::Str(_) => DataType::text(),
            Value::Bytes(_) => DataType::Blob(SizeTier::Max),
            Value::Bit(_) => DataType::Bit(64),
            Value::Date(_) => DataType::Date,
            Value::DateTime(_) => DataType::DateTime,
            Value::Timestamp(_) => DataType::Timestamp,
            Value::Time(_) => DataType::Time,
            Value::Year(_) => DataType::Year,
            Value::Enum(_) => DataType::Enum(vec![], CollationId::DEFAULT),
            Value::Set(_) => DataType::Set(vec![], CollationId::DEFAULT),
            Value::Json(_) => DataType::Json,
            Value::Array(items) => {
                let elem = items
                    .first()
                    .map(DataType::of_value)
                    .unwrap_or(DataType::Null);
                DataType::Array(Box::new(elem))
            }
            Value::Geometry(super::value::Geometry::Point { .. }) => {
                DataType::Geometry(GeometryKind::Point)
            }
            Value::Geometry(super::value::Geometry::LineString(_)) => {
                DataType::Geometry(GeometryKind::LineString)
            }
            Value::Geometry(super::value::Geometry::Polygon(_)) => {
                DataType::Geometry(GeometryKind::Polygon)
            }
        }
    }
}

fn to_text(value: Value) -> String {
    match value {
        Value::Str(s) => s,
        Value::Bytes(b) => String::from_utf8_lossy(&b).into_owned(),
        v => v.to_display_string(),
    }
}

fn to_bytes(value: Value) -> Vec<u8> {
    match value {
        Value::Bytes(b) => b,
        Value::Str(s) => s.into_bytes(),
        v => v.to_display_string().into_bytes(),
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Null => write!(f, "NULL"),
            DataType::I8 => write!(f, "TINYINT"),
            DataType::I16 => write!(f, "SMALLINT"),
            DataType::I24 => write!(f, "MEDIUMINT"),
            DataType::I32 => write!(f, "INT"),
            DataType::I64 => write!(f, "BIGINT"),
            DataType::U8 => write!(f, "TINYINT UNSIGNED"),
            DataType::U16 => write!(f, "SMALLINT UNSIGNED"),
            DataType::U24 => write!(f, "MEDIUMINT UNSIGNED"),
            DataType::U32 => write!(f, "INT UNSIGNED"),
            DataType::U64 => write!(f, "BIGINT UNSIGNED"),
            DataType::F32 => write!(f, "FLOAT"),
            DataType::F64 => write!(f, "DOUBLE"),
            DataType::Decimal(p, s) => write!(f, "DECIMAL({p},{s})"),
            DataType::Char(n, c) => write!(f, "CHAR({n}) COLLATE {c}"),
            DataType::VarChar(n, c) => write!(f, "VARCHAR({n}) COLLATE {c}"),
            DataType::Text(SizeTier::Tiny, c) => write!(f, "TINYTEXT COLLATE {c}"),
            DataType::Text(SizeTier::Medium, c) => write!(f, "TEXT COLLATE {c}"),
            DataType::Text(SizeTier::Long, c) => write!(f, "MEDIUMTEXT COLLATE {c}"),
            DataType::Text(SizeTier::Max, c) => write!(f, "LONGTEXT COLLATE {c}"),
            DataType::Binary(n) => write!(f, "BINARY({n})"),
            DataType::VarBinary(n) => write!(f, "VARBINARY({n})"),
            DataType::Blob(SizeTier::Tiny) => write!(f, "TINYBLOB"),
            DataType::Blob(SizeTier::Medium) => write!(f, "BLOB"),
            DataType::Blob(SizeTier::Long) => write!(f, "MEDIUMBLOB"),
            DataType::Blob(SizeTier::Max) => write!(f, "LONGBLOB"),
            DataType::Bit(n) => write!(f, "BIT({n})"),
            DataType::Date => write!(f, "DATE"),
            DataType::DateTime => write!(f, "DATETIME"),
            DataType::Timestamp => write!(f, "TIMESTAMP"),
            DataType::Time => write!(f, "TIME"),
            DataType::Year => write!(f, "YEAR"),
            DataType::Enum(allowed, _) => write!(f, "ENUM({})", allowed.join(",")),
            DataType::Set(allowed, _) => write!(f, "SET({})", allowed.join(",")),
            DataType::Json => write!(f, "JSON"),
            DataType::Geometry(GeometryKind::Point) => write!(f, "POINT"),
            DataType::Geometry(GeometryKind::LineString) => write!(f, "LINESTRING"),
            DataType::Geometry(GeometryKind::Polygon) => write!(f, "POLYGON"),
            DataType::Geometry(GeometryKind::Any) => write!(f, "GEOMETRY"),
            DataType::Array(elem) => write!(f, "ARRAY<{elem}>"),
        }
    }
}
