//! String functions

use super::{Function, FunctionRegistry, FunctionSignature};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::types::{DataType, Value};

fn text_arg(value: &Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        v => Ok(Some(v.to_display_string())),
    }
}

struct Upper;

impl Function for Upper {
    fn signature(&self) -> &FunctionSignature {
        static SIG: FunctionSignature = FunctionSignature::new("UPPER", 1, Some(1));
        &SIG
    }

    fn validate(&self, arg_types: &[DataType]) -> Result<DataType> {
        Ok(arg_types[0].clone())
    }

    fn execute(&self, _ctx: &Context, args: &[Value]) -> Result<Value> {
        Ok(match text_arg(&args[0])? {
            Some(s) => Value::Str(s.to_uppercase()),
            None => Value::Null,
        })
    }
}

struct Lower;

impl Function for Lower {
    fn signature(&self) -> &FunctionSignature {
        static SIG: FunctionSignature = FunctionSignature::new("LOWER", 1, Some(1));
        &SIG
    }

    fn validate(&self, arg_types: &[DataType]) -> Result<DataType> {
        Ok(arg_types[0].clone())
    }

    fn execute(&self, _ctx: &Context, args: &[Value]) -> Result<Value> {
        Ok(match text_arg(&args[0])? {
            Some(s) => Value::Str(s.to_lowercase()),
            None => Value::Null,
        })
    }
}

/// LENGTH measures bytes, CHAR_LENGTH measures characters.
struct Length {
    signature: FunctionSignature,
    chars: bool,
}

impl Function for Length {
    fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    fn validate(&self, _arg_types: &[DataType]) -> Result<DataType> {
        Ok(DataType::I64)
    }

    fn execute(&self, _ctx: &Context, args: &[Value]) -> Result<Value> {
        Ok(match text_arg(&args[0])? {
            Some(s) => Value::I64(if self.chars {
                s.chars().count() as i64
            } else {
                s.len() as i64
            }),
            None => Value::Null,
        })
    }
}

struct Concat;

impl Function for Concat {
    fn signature(&self) -> &FunctionSignature {
        static SIG: FunctionSignature = FunctionSignature::new("CONCAT", 1, None);
        &SIG
    }

    fn validate(&self, _arg_types: &[DataType]) -> Result<DataType> {
        Ok(DataType::text())
    }

    fn execute(&self, _ctx: &Context, args: &[Value]) -> Result<Value> {
        let mut out = String::new();
        for arg in args {
            match text_arg(arg)? {
                Some(s) => out.push_str(&s),
                // CONCAT returns NULL if any argument is NULL.
                None => return Ok(Value::Null),
            }
        }
        Ok(Value::Str(out))
    }
}

/// SUBSTRING(str, pos [, len]); pos is 1-based, negative counts from the end.
struct Substring;

impl Function for Substring {
    fn signature(&self) -> &FunctionSignature {
        static SIG: FunctionSignature = FunctionSignature::new("SUBSTRING", 2, Some(3));
        &SIG
    }

    fn validate(&self, arg_types: &[DataType]) -> Result<DataType> {
        if !arg_types[1].is_numeric() {
            return Err(Error::TypeMismatch {
                expected: "numeric position".into(),
                found: arg_types[1].to_string(),
            });
        }
        Ok(DataType::text())
    }

    fn execute(&self, _ctx: &Context, args: &[Value]) -> Result<Value> {
        let Some(s) = text_arg(&args[0])? else {
            return Ok(Value::Null);
        };
        if args[1].is_null() {
            return Ok(Value::Null);
        }
        let chars: Vec<char> = s.chars().collect();
        let pos = args[1].to_i128()? as i64;
        let start = if pos > 0 {
            (pos - 1) as usize
        } else if pos < 0 {
            chars.len().saturating_sub((-pos) as usize)
        } else {
            return Ok(Value::Str(String::new()));
        };
        let len = match args.get(2) {
            Some(Value::Null) => return Ok(Value::Null),
            Some(v) => (v.to_i128()? as i64).max(0) as usize,
            None => chars.len(),
        };
        Ok(Value::Str(
            chars.iter().skip(start).take(len).collect::<String>(),
        ))
    }
}

struct Trim;

impl Function for Trim {
    fn signature(&self) -> &FunctionSignature {
        static SIG: FunctionSignature = FunctionSignature::new("TRIM", 1, Some(1));
        &SIG
    }

    fn validate(&self, arg_types: &[DataType]) -> Result<DataType> {
        Ok(arg_types[0].clone())
    }

    fn execute(&self, _ctx: &Context, args: &[Value]) -> Result<Value> {
        Ok(match text_arg(&args[0])? {
            Some(s) => Value::Str(s.trim().to_string()),
            None => Value::Null,
        })
    }
}

struct Replace;

impl Function for Replace {
    fn signature(&self) -> &FunctionSignature {
        static SIG: FunctionSignature = FunctionSignature::new("REPLACE", 3, Some(3));
        &SIG
    }

    fn validate(&self, _arg_types: &[DataType]) -> Result<DataType> {
        Ok(DataType::text())
    }

    fn execute(&self, _ctx: &Context, args: &[Value]) -> Result<Value> {
        match (
            text_arg(&args[0])?,
            text_arg(&args[1])?,
            text_arg(&args[2])?,
        ) {
            (Some(s), Some(from), Some(to)) => {
                if from.is_empty() {
                    Ok(Value::Str(s))
                } else {
                    Ok(Value::Str(s.replace(&from, &to)))
                }
            }
            _ => Ok(Value::Null),
        }
    }
}

struct Reverse;

impl Function for Reverse {
    fn signature(&self) -> &FunctionSignature {
        static SIG: FunctionSignature = FunctionSignature::new("REVERSE", 1, Some(1));
        &SIG
    }

    fn validate(&self, arg_types: &[DataType]) -> Result<DataType> {
        Ok(arg_types[0].clone())
    }

    fn execute(&self, _ctx: &Context, args: &[Value]) -> Result<Value> {
        Ok(match text_arg(&args[0])? {
            Some(s) => Value::Str(s.chars().rev().collect()),
            None => Value::Null,
        })
    }
}

pub fn register(registry: &mut FunctionRegistry) {
    registry.add(Box::new(Upper));
    registry.add(Box::new(Lower));
    registry.add(Box::new(Length {
        signature: FunctionSignature::new("LENGTH", 1, Some(1)),
        chars: false,
    }));
    registry.add(Box::new(Length {
        signature: FunctionSignature::new("CHAR_LENGTH", 1, Some(1)),
        chars: true,
    }));
    registry.add(Box::new(Concat));
    registry.add(Box::new(Substring));
    registry.add(Box::new(Trim));
    registry.add(Box::new(Replace));
    registry.add(Box::new(Reverse));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upper_lower() -> Result<()> {
        let ctx = Context::for_tests();
        assert_eq!(
            super::super::execute("UPPER", &[Value::Str("abc".into())], &ctx)?,
            Value::Str("ABC".into())
        );
        assert_eq!(
            super::super::execute("LOWER", &[Value::Null], &ctx)?,
            Value::Null
        );
        Ok(())
    }

    #[test]
    fn test_concat_null_propagates() -> Result<()> {
        let ctx = Context::for_tests();
        assert_eq!(
            super::super::execute(
                "CONCAT",
                &[Value::Str("a".into()), Value::Str("b".into())],
                &ctx
            )?,
            Value::Str("ab".into())
        );
        assert_eq!(
            super::super::execute("CONCAT", &[Value::Str("a".into()), Value::Null], &ctx)?,
            Value::Null
        );
        Ok(())
    }

    #[test]
    fn test_substring_positions() -> Result<()> {
        let ctx = Context::for_tests();
        let s = Value::Str("quadratically".into());
        assert_eq!(
            super::super::execute("SUBSTRING", &[s.clone(), Value::I64(5)], &ctx)?,
            Value::Str("ratically".into())
        );
        assert_eq!(
            super::super::execute(
                "SUBSTRING",
                &[s.clone(), Value::I64(-5), Value::I64(3)],
                &ctx
            )?,
            Value::Str("cal".into())
        );
        Ok(())
    }
}
