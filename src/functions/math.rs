//! Math functions

use rust_decimal::prelude::*;

use super::{Function, FunctionRegistry, FunctionSignature};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::types::{DataType, Value};

fn numeric_type(t: &DataType, name: &str) -> Result<()> {
    if t.is_numeric() || t.is_text() || *t == DataType::Null {
        Ok(())
    } else {
        Err(Error::TypeMismatch {
            expected: format!("numeric argument to {name}"),
            found: t.to_string(),
        })
    }
}

struct Abs;

impl Function for Abs {
    fn signature(&self) -> &FunctionSignature {
        static SIG: FunctionSignature = FunctionSignature::new("ABS", 1, Some(1));
        &SIG
    }

    fn validate(&self, arg_types: &[DataType]) -> Result<DataType> {
        numeric_type(&arg_types[0], "ABS")?;
        Ok(arg_types[0].clone())
    }

    fn execute(&self, _ctx: &Context, args: &[Value]) -> Result<Value> {
        match &args[0] {
            Value::Null => Ok(Value::Null),
            Value::F32(v) => Ok(Value::F32(v.abs())),
            Value::F64(v) => Ok(Value::F64(v.abs())),
            Value::Decimal(d) => Ok(Value::Decimal(d.abs())),
            v if v.is_integer() => {
                let n = v.to_i128()?;
                Ok(Value::I64(n.unsigned_abs().min(i64::MAX as u128) as i64))
            }
            v => Err(Error::TypeMismatch {
                expected: "numeric".into(),
                found: v.type_name().into(),
            }),
        }
    }
}

/// CEIL, FLOOR and ROUND share their shape.
struct Rounding {
    signature: FunctionSignature,
    mode: RoundingMode,
}

enum RoundingMode {
    Ceil,
    Floor,
    Round,
}

impl Function for Rounding {
    fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    fn validate(&self, arg_types: &[DataType]) -> Result<DataType> {
        numeric_type(&arg_types[0], self.signature.name)?;
        Ok(match &arg_types[0] {
            t if t.is_integer() => t.clone(),
            DataType::Decimal(p, _) => DataType::Decimal(*p, 0),
            _ => DataType::F64,
        })
    }

    fn execute(&self, _ctx: &Context, args: &[Value]) -> Result<Value> {
        if args[0].is_null() {
            return Ok(Value::Null);
        }
        if args[0].is_integer() {
            return Ok(args[0].clone());
        }
        let scale = match args.get(1) {
            Some(Value::Null) => return Ok(Value::Null),
            Some(v) => v.to_i128()? as i64,
            None => 0,
        };
        match &args[0] {
            Value::Decimal(d) => {
                let scaled = match self.mode {
                    RoundingMode::Ceil => d.ceil(),
                    RoundingMode::Floor => d.floor(),
                    RoundingMode::Round => d.round_dp(scale.max(0) as u32),
                };
                Ok(Value::Decimal(scaled))
            }
            v => {
                let f = v.to_f64()?;
                let out = match self.mode {
                    RoundingMode::Ceil => f.ceil(),
                    RoundingMode::Floor => f.floor(),
                    RoundingMode::Round => {
                        let factor = 10f64.powi(scale as i32);
                        (f * factor).round() / factor
                    }
                };
                Ok(Value::F64(out))
            }
        }
    }
}

struct Sqrt;

impl Function for Sqrt {
    fn signature(&self) -> &FunctionSignature {
        static SIG: FunctionSignature = FunctionSignature::new("SQRT", 1, Some(1));
        &SIG
    }

    fn validate(&self, arg_types: &[DataType]) -> Result<DataType> {
        numeric_type(&arg_types[0], "SQRT")?;
        Ok(DataType::F64)
    }

    fn execute(&self, _ctx: &Context, args: &[Value]) -> Result<Value> {
        if args[0].is_null() {
            return Ok(Value::Null);
        }
        let f = args[0].to_f64()?;
        // MySQL returns NULL for the square root of a negative number.
        if f < 0.0 {
            return Ok(Value::Null);
        }
        Ok(Value::F64(f.sqrt()))
    }
}

struct Power;

impl Function for Power {
    fn signature(&self) -> &FunctionSignature {
        static SIG: FunctionSignature = FunctionSignature::new("POW", 2, Some(2));
        &SIG
    }

    fn validate(&self, arg_types: &[DataType]) -> Result<DataType> {
        numeric_type(&arg_types[0], "POW")?;
        numeric_type(&arg_types[1], "POW")?;
        Ok(DataType::F64)
    }

    fn execute(&self, _ctx: &Context, args: &[Value]) -> Result<Value> {
        if args[0].is_null() || args[1].is_null() {
            return Ok(Value::Null);
        }
        Ok(Value::F64(args[0].to_f64()?.powf(args[1].to_f64()?)))
    }
}

struct Modulo;

impl Function for Modulo {
    fn signature(&self) -> &FunctionSignature {
        static SIG: FunctionSignature = FunctionSignature::new("MOD", 2, Some(2));
        &SIG
    }

    fn validate(&self, arg_types: &[DataType]) -> Result<DataType> {
        numeric_type(&arg_types[0], "MOD")?;
        numeric_type(&arg_types[1], "MOD")?;
        Ok(arg_types[0].promote(&arg_types[1]))
    }

    fn execute(&self, _ctx: &Context, args: &[Value]) -> Result<Value> {
        // MOD by zero is NULL, unlike the % operator's runtime error.
        match args[0].checked_rem(&args[1]) {
            Err(Error::DivisionByZero) => Ok(Value::Null),
            other => other,
        }
    }
}

/// GREATEST and LEAST over any comparable values.
struct Extreme {
    signature: FunctionSignature,
    greatest: bool,
}

impl Function for Extreme {
    fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    fn validate(&self, arg_types: &[DataType]) -> Result<DataType> {
        Ok(arg_types
            .iter()
            .fold(DataType::Null, |acc, t| acc.promote(t)))
    }

    fn execute(&self, _ctx: &Context, args: &[Value]) -> Result<Value> {
        let mut best: Option<&Value> = None;
        for arg in args {
            if arg.is_null() {
                return Ok(Value::Null);
            }
            best = Some(match best {
                None => arg,
                Some(current) => {
                    let replace = if self.greatest {
                        arg.compare(current)? == std::cmp::Ordering::Greater
                    } else {
                        arg.compare(current)? == std::cmp::Ordering::Less
                    };
                    if replace {
                        arg
                    } else {
                        current
                    }
                }
            });
        }
        Ok(best.cloned().unwrap_or(Value::Null))
    }
}

pub fn register(registry: &mut FunctionRegistry) {
    registry.add(Box::new(Abs));
    registry.add(Box::new(Rounding {
        signature: FunctionSignature::new("CEIL", 1, Some(1)),
        mode: RoundingMode::Ceil,
    }));
    registry.add(Box::new(Rounding {
        signature: FunctionSignature::new("FLOOR", 1, Some(1)),
        mode: RoundingMode::Floor,
    }));
    registry.add(Box::new(Rounding {
        signature: FunctionSignature::new("ROUND", 1, Some(2)),
        mode: RoundingMode::Round,
    }));
    registry.add(Box::new(Sqrt));
    registry.add(Box::new(Power));
    registry.add(Box::new(Modulo));
    registry.add(Box::new(Extreme {
        signature: FunctionSignature::new("GREATEST", 2, None),
        greatest: true,
    }));
    registry.add(Box::new(Extreme {
        signature: FunctionSignature::new("LEAST", 2, None),
        greatest: false,
    }));
}
