//! System and session functions

use std::time::Duration;

use super::{Function, FunctionRegistry, FunctionSignature};
use crate::context::Context;
use crate::error::Result;
use crate::types::{DataType, Value};

struct Version;

impl Function for Version {
    fn signature(&self) -> &FunctionSignature {
        static SIG: FunctionSignature = FunctionSignature::new("VERSION", 0, Some(0));
        &SIG
    }

    fn validate(&self, _arg_types: &[DataType]) -> Result<DataType> {
        Ok(DataType::text())
    }

    fn execute(&self, ctx: &Context, _args: &[Value]) -> Result<Value> {
        ctx.session().get_variable("version")
    }
}

struct CurrentDatabase {
    signature: FunctionSignature,
}

impl Function for CurrentDatabase {
    fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    fn validate(&self, _arg_types: &[DataType]) -> Result<DataType> {
        Ok(DataType::text())
    }

    fn execute(&self, ctx: &Context, _args: &[Value]) -> Result<Value> {
        Ok(match ctx.session().current_database() {
            Some(db) => Value::Str(db),
            None => Value::Null,
        })
    }
}

struct User {
    signature: FunctionSignature,
}

impl Function for User {
    fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    fn validate(&self, _arg_types: &[DataType]) -> Result<DataType> {
        Ok(DataType::text())
    }

    fn execute(&self, ctx: &Context, _args: &[Value]) -> Result<Value> {
        Ok(Value::Str(ctx.session().client().user.clone()))
    }
}

struct ConnectionId;

impl Function for ConnectionId {
    fn signature(&self) -> &FunctionSignature {
        static SIG: FunctionSignature = FunctionSignature::new("CONNECTION_ID", 0, Some(0));
        &SIG
    }

    fn validate(&self, _arg_types: &[DataType]) -> Result<DataType> {
        Ok(DataType::U32)
    }

    fn execute(&self, ctx: &Context, _args: &[Value]) -> Result<Value> {
        Ok(Value::U32(ctx.session().id()))
    }
}

/// SLEEP(seconds): sleeps in short slices so a kill is observed promptly.
struct Sleep;

impl Function for Sleep {
    fn signature(&self) -> &FunctionSignature {
        static SIG: FunctionSignature = FunctionSignature::new("SLEEP", 1, Some(1));
        &SIG
    }

    fn validate(&self, _arg_types: &[DataType]) -> Result<DataType> {
        Ok(DataType::I64)
    }

    fn execute(&self, ctx: &Context, args: &[Value]) -> Result<Value> {
        if args[0].is_null() {
            return Ok(Value::Null);
        }
        let seconds = args[0].to_f64()?.max(0.0);
        let deadline = std::time::Instant::now() + Duration::from_secs_f64(seconds);
        while std::time::Instant::now() < deadline {
            ctx.check_cancelled()?;
            std::thread::sleep(Duration::from_millis(50).min(
                deadline.saturating_duration_since(std::time::Instant::now()),
            ));
        }
        Ok(Value::I64(0))
    }
}

/// COLLATION and COERCIBILITY introspect the argument *expression*; the
/// evaluator computes them from the expression tree and never reaches these
/// bodies, which exist so resolution and typing find the names.
struct Collation;

impl Function for Collation {
    fn signature(&self) -> &FunctionSignature {
        static SIG: FunctionSignature = FunctionSignature::new("COLLATION", 1, Some(1));
        &SIG
    }

    fn validate(&self, _arg_types: &[DataType]) -> Result<DataType> {
        Ok(DataType::varchar(64))
    }

    fn execute(&self, _ctx: &Context, args: &[Value]) -> Result<Value> {
        Ok(Value::Str(
            match &args[0] {
                Value::Str(_) => crate::types::CollationId::DEFAULT,
                _ => crate::types::CollationId::BINARY,
            }
            .name()
            .to_string(),
        ))
    }
}

struct Coercibility;

impl Function for Coercibility {
    fn signature(&self) -> &FunctionSignature {
        static SIG: FunctionSignature = FunctionSignature::new("COERCIBILITY", 1, Some(1));
        &SIG
    }

    fn validate(&self, _arg_types: &[DataType]) -> Result<DataType> {
        Ok(DataType::I64)
    }

    fn execute(&self, _ctx: &Context, args: &[Value]) -> Result<Value> {
        Ok(Value::I64(match &args[0] {
            Value::Null => 6,
            Value::Str(_) => 4,
            _ => 5,
        }))
    }
}

pub fn register(registry: &mut FunctionRegistry) {
    registry.add(Box::new(Version));
    registry.add(Box::new(CurrentDatabase {
        signature: FunctionSignature::new("DATABASE", 0, Some(0)),
    }));
    registry.add(Box::new(CurrentDatabase {
        signature: FunctionSignature::new("SCHEMA", 0, Some(0)),
    }));
    registry.add(Box::new(User {
        signature: FunctionSignature::new("USER", 0, Some(0)),
    }));
    registry.add(Box::new(User {
        signature: FunctionSignature::new("CURRENT_USER", 0, Some(0)),
    }));
    registry.add(Box::new(ConnectionId));
    registry.add(Box::new(Sleep));
    registry.add(Box::new(Collation));
    registry.add(Box::new(Coercibility));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_sleep_zero_returns_immediately() -> Result<()> {
        let ctx = Context::for_tests();
        assert_eq!(
            super::super::execute("SLEEP", &[Value::F64(0.0)], &ctx)?,
            Value::I64(0)
        );
        Ok(())
    }

    #[test]
    fn test_sleep_observes_cancellation() {
        let ctx = Context::for_tests();
        ctx.cancel_token().cancel();
        let r = super::super::execute("SLEEP", &[Value::F64(10.0)], &ctx);
        assert_eq!(r, Err(Error::Cancelled));
    }

    #[test]
    fn test_connection_id() -> Result<()> {
        let ctx = Context::for_tests();
        assert_eq!(
            super::super::execute("CONNECTION_ID", &[], &ctx)?,
            Value::U32(1)
        );
        Ok(())
    }
}
