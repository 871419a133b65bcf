//! NULL-handling functions

use super::{Function, FunctionRegistry, FunctionSignature};
use crate::context::Context;
use crate::error::Result;
use crate::types::{DataType, Value};

struct Coalesce;

impl Function for Coalesce {
    fn signature(&self) -> &FunctionSignature {
        static SIG: FunctionSignature = FunctionSignature::new("COALESCE", 1, None);
        &SIG
    }

    fn validate(&self, arg_types: &[DataType]) -> Result<DataType> {
        Ok(arg_types
            .iter()
            .find(|t| **t != DataType::Null)
            .cloned()
            .unwrap_or(DataType::Null))
    }

    fn execute(&self, _ctx: &Context, args: &[Value]) -> Result<Value> {
        Ok(args
            .iter()
            .find(|v| !v.is_null())
            .cloned()
            .unwrap_or(Value::Null))
    }
}

struct IfNull;

impl Function for IfNull {
    fn signature(&self) -> &FunctionSignature {
        static SIG: FunctionSignature = FunctionSignature::new("IFNULL", 2, Some(2));
        &SIG
    }

    fn validate(&self, arg_types: &[DataType]) -> Result<DataType> {
        Ok(if arg_types[0] == DataType::Null {
            arg_types[1].clone()
        } else {
            arg_types[0].clone()
        })
    }

    fn execute(&self, _ctx: &Context, args: &[Value]) -> Result<Value> {
        Ok(if args[0].is_null() {
            args[1].clone()
        } else {
            args[0].clone()
        })
    }
}

struct NullIf;

impl Function for NullIf {
    fn signature(&self) -> &FunctionSignature {
        static SIG: FunctionSignature = FunctionSignature::new("NULLIF", 2, Some(2));
        &SIG
    }

    fn validate(&self, arg_types: &[DataType]) -> Result<DataType> {
        Ok(arg_types[0].clone())
    }

    fn execute(&self, _ctx: &Context, args: &[Value]) -> Result<Value> {
        if !args[0].is_null()
            && !args[1].is_null()
            && args[0].compare(&args[1])? == std::cmp::Ordering::Equal
        {
            Ok(Value::Null)
        } else {
            Ok(args[0].clone())
        }
    }
}

struct If;

impl Function for If {
    fn signature(&self) -> &FunctionSignature {
        static SIG: FunctionSignature = FunctionSignature::new("IF", 3, Some(3));
        &SIG
    }

    fn validate(&self, arg_types: &[DataType]) -> Result<DataType> {
        Ok(if arg_types[1] == DataType::Null {
            arg_types[2].clone()
        } else {
            arg_types[1].clone()
        })
    }

    fn execute(&self, _ctx: &Context, args: &[Value]) -> Result<Value> {
        let condition = !args[0].is_null() && args[0].is_true()?;
        Ok(if condition {
            args[1].clone()
        } else {
            args[2].clone()
        })
    }
}

pub fn register(registry: &mut FunctionRegistry) {
    registry.add(Box::new(Coalesce));
    registry.add(Box::new(IfNull));
    registry.add(Box::new(NullIf));
    registry.add(Box::new(If));
}
