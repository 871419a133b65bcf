//! An embeddable, MySQL-compatible SQL execution engine
//!
//! The engine takes a parsed logical plan, resolves and rewrites it through
//! a rule-based analyzer, and executes it as a tree of lazy row iterators.
//! Every query runs as a tracked, cancellable process with per-table and
//! per-partition progress. Storage, the SQL grammar parser, and the wire
//! protocol are external collaborators behind the interfaces in
//! [`catalog`]; [`memory`] ships an in-process reference implementation.

pub mod analyzer;
pub mod catalog;
pub mod context;
pub mod engine;
pub mod error;
pub mod execution;
pub mod expr;
pub mod functions;
pub mod memory;
pub mod plan;
pub mod process;
pub mod session;
pub mod types;

pub use context::Context;
pub use engine::{Config, Engine};
pub use error::{Error, Result};
pub use types::{DataType, Row, Schema, Value};
