//! Date and time functions

use chrono::{Datelike, Timelike, Utc};

use super::{Function, FunctionRegistry, FunctionSignature};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::types::{DataType, Value};

/// NOW / CURRENT_TIMESTAMP / CURRENT_DATE / CURRENT_TIME
struct Now {
    signature: FunctionSignature,
    part: NowPart,
}

enum NowPart {
    Timestamp,
    Date,
    Time,
}

impl Function for Now {
    fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    fn validate(&self, _arg_types: &[DataType]) -> Result<DataType> {
        Ok(match self.part {
            NowPart::Timestamp => DataType::DateTime,
            NowPart::Date => DataType::Date,
            NowPart::Time => DataType::Time,
        })
    }

    fn execute(&self, _ctx: &Context, _args: &[Value]) -> Result<Value> {
        let now = Utc::now().naive_utc();
        Ok(match self.part {
            NowPart::Timestamp => Value::DateTime(now),
            NowPart::Date => Value::Date(now.date()),
            NowPart::Time => Value::Time(now.time()),
        })
    }
}

struct UnixTimestamp;

impl Function for UnixTimestamp {
    fn signature(&self) -> &FunctionSignature {
        static SIG: FunctionSignature = FunctionSignature::new("UNIX_TIMESTAMP", 0, Some(1));
        &SIG
    }

    fn validate(&self, _arg_types: &[DataType]) -> Result<DataType> {
        Ok(DataType::I64)
    }

    fn execute(&self, _ctx: &Context, args: &[Value]) -> Result<Value> {
        match args.first() {
            None => Ok(Value::I64(Utc::now().timestamp())),
            Some(Value::Null) => Ok(Value::Null),
            Some(v) => Ok(Value::I64(v.to_datetime()?.and_utc().timestamp())),
        }
    }
}

/// YEAR / MONTH / DAY / HOUR / MINUTE / SECOND extraction.
struct Extract {
    signature: FunctionSignature,
    part: DatePart,
}

#[derive(Clone, Copy)]
enum DatePart {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl Function for Extract {
    fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    fn validate(&self, arg_types: &[DataType]) -> Result<DataType> {
        let t = &arg_types[0];
        if !t.is_temporal() && !t.is_text() && *t != DataType::Null {
            return Err(Error::TypeMismatch {
                expected: "temporal value".into(),
                found: t.to_string(),
            });
        }
        Ok(DataType::I32)
    }

    fn execute(&self, _ctx: &Context, args: &[Value]) -> Result<Value> {
        if args[0].is_null() {
            return Ok(Value::Null);
        }
        let dt = args[0].to_datetime()?;
        let out = match self.part {
            DatePart::Year => dt.year(),
            DatePart::Month => dt.month() as i32,
            DatePart::Day => dt.day() as i32,
            DatePart::Hour => dt.hour() as i32,
            DatePart::Minute => dt.minute() as i32,
            DatePart::Second => dt.second() as i32,
        };
        Ok(Value::I32(out))
    }
}

pub fn register(registry: &mut FunctionRegistry) {
    registry.add(Box::new(Now {
        signature: FunctionSignature::new("NOW", 0, Some(0)),
        part: NowPart::Timestamp,
    }));
    registry.add(Box::new(Now {
        signature: FunctionSignature::new("CURRENT_TIMESTAMP", 0, Some(0)),
        part: NowPart::Timestamp,
    }));
    registry.add(Box::new(Now {
        signature: FunctionSignature::new("CURRENT_DATE", 0, Some(0)),
        part: NowPart::Date,
    }));
    registry.add(Box::new(Now {
        signature: FunctionSignature::new("CURRENT_TIME", 0, Some(0)),
        part: NowPart::Time,
    }));
    registry.add(Box::new(UnixTimestamp));
    for (name, part) in [
        ("YEAR", DatePart::Year),
        ("MONTH", DatePart::Month),
        ("DAY", DatePart::Day),
        ("HOUR", DatePart::Hour),
        ("MINUTE", DatePart::Minute),
        ("SECOND", DatePart::Second),
    ] {
        registry.add(Box::new(Extract {
            signature: FunctionSignature {
                name,
                min_args: 1,
                max_args: Some(1),
            },
            part,
        }));
    }
}
