//! Scalar function registry
//!
//! Functions separate metadata and validation from execution: `validate`
//! checks argument types during analysis and declares the return type,
//! `execute` runs against evaluated values. The registry is process-wide,
//! built once at startup; the analyzer resolves names through it and
//! callers execute through it.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::types::{DataType, Value};

mod math;
mod null;
mod string;
mod system;
mod temporal;

/// Metadata about a function's calling convention.
#[derive(Debug, Clone)]
pub struct FunctionSignature {
    /// Function name, uppercase.
    pub name: &'static str,
    pub min_args: usize,
    /// None means variadic.
    pub max_args: Option<usize>,
}

impl FunctionSignature {
    pub const fn new(name: &'static str, min_args: usize, max_args: Option<usize>) -> Self {
        FunctionSignature {
            name,
            min_args,
            max_args,
        }
    }

    fn check_arity(&self, actual: usize) -> Result<()> {
        let ok = actual >= self.min_args && self.max_args.map_or(true, |max| actual <= max);
        if ok {
            Ok(())
        } else {
            Err(Error::InvalidArgumentCount {
                name: self.name.to_string(),
                expected: self.min_args,
                actual,
            })
        }
    }
}

/// A scalar SQL function.
pub trait Function: Send + Sync {
    fn signature(&self) -> &FunctionSignature;

    /// Validate argument types and return the result type.
    fn validate(&self, arg_types: &[DataType]) -> Result<DataType>;

    /// Execute against evaluated argument values.
    fn execute(&self, ctx: &Context, args: &[Value]) -> Result<Value>;
}

pub struct FunctionRegistry {
    functions: HashMap<&'static str, Box<dyn Function>>,
}

impl FunctionRegistry {
    fn new() -> Self {
        let mut registry = FunctionRegistry {
            functions: HashMap::new(),
        };
        string::register(&mut registry);
        math::register(&mut registry);
        null::register(&mut registry);
        temporal::register(&mut registry);
        system::register(&mut registry);
        registry
    }

    pub(crate) fn add(&mut self, function: Box<dyn Function>) {
        self.functions.insert(function.signature().name, function);
    }
}

static REGISTRY: LazyLock<FunctionRegistry> = LazyLock::new(FunctionRegistry::new);

/// Look up a function by name, case-insensitively.
pub fn lookup(name: &str) -> Option<&'static dyn Function> {
    REGISTRY
        .functions
        .get(name.to_uppercase().as_str())
        .map(|f| f.as_ref())
}

/// Validate a call and compute its return type.
pub fn validate(name: &str, arg_types: &[DataType]) -> Result<DataType> {
    let function = lookup(name).ok_or_else(|| Error::FunctionNotFound(name.to_string()))?;
    function.signature().check_arity(arg_types.len())?;
    function.validate(arg_types)
}

/// Execute a resolved call.
pub fn execute(name: &str, args: &[Value], ctx: &Context) -> Result<Value> {
    let function = lookup(name).ok_or_else(|| Error::FunctionNotFound(name.to_string()))?;
    function.signature().check_arity(args.len())?;
    function.execute(ctx, args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert!(lookup("upper").is_some());
        assert!(lookup("UPPER").is_some());
        assert!(lookup("no_such_fn").is_none());
    }

    #[test]
    fn test_arity_is_enforced() {
        let ctx = Context::for_tests();
        assert!(matches!(
            execute("UPPER", &[], &ctx),
            Err(Error::InvalidArgumentCount { .. })
        ));
        assert!(matches!(
            validate("ABS", &[DataType::I64, DataType::I64]),
            Err(Error::InvalidArgumentCount { .. })
        ));
    }

    #[test]
    fn test_unknown_function() {
        assert!(matches!(
            validate("WAT", &[]),
            Err(Error::FunctionNotFound(_))
        ));
    }
}
