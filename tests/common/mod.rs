//! Common test utilities for engine integration tests
#![allow(dead_code)]

use std::sync::Arc;

use opalsql::analyzer::Analyzer;
use opalsql::engine::Engine;
use opalsql::error::{Error, Result};
use opalsql::execution;
use opalsql::expr::Expression;
use opalsql::memory::{MemoryDatabase, MemoryProvider, MemoryTable};
use opalsql::plan::Node;
use opalsql::session::{Client, Session};
use opalsql::types::{Column, DataType, Row, Schema, Value};
use opalsql::Context;

/// Test harness owning an engine over an in-memory catalog with a default
/// database, plus a connected session.
pub struct TestContext {
    pub engine: Engine,
    pub provider: Arc<MemoryProvider>,
    pub db: Arc<MemoryDatabase>,
    pub session: Arc<Session>,
}

impl TestContext {
    pub fn new() -> TestContext {
        let db = MemoryDatabase::new("mydb");
        let provider = MemoryProvider::new().with_database(Arc::clone(&db));
        let provider_dyn: Arc<dyn opalsql::catalog::DatabaseProvider> =
            Arc::clone(&provider) as Arc<dyn opalsql::catalog::DatabaseProvider>;
        let engine = Engine::new(Analyzer::new(provider_dyn));
        engine.add_connection(1, "127.0.0.1:34567");
        let session = engine.connection_ready(
            1,
            Client {
                user: "root".into(),
                address: "127.0.0.1:34567".into(),
                capabilities: 0,
            },
        );
        session.set_current_database("mydb");
        TestContext {
            engine,
            provider,
            db,
            session,
        }
    }

    /// Open an additional connection with its own session.
    pub fn connect(&self, id: u32, addr: &str) -> Arc<Session> {
        self.engine.add_connection(id, addr);
        let session = self.engine.connection_ready(
            id,
            Client {
                user: "root".into(),
                address: addr.into(),
                capabilities: 0,
            },
        );
        session.set_current_database("mydb");
        session
    }

    /// Create a table and fill it with rows.
    pub fn create_table(&self, name: &str, schema: Schema, rows: Vec<Row>) -> Arc<MemoryTable> {
        let table = MemoryTable::new(name, schema);
        table.put_rows(rows);
        self.db.add_table(Arc::clone(&table));
        table
    }

    /// Run a plan to completion on the default session.
    pub fn query(&self, text: &str, plan: &Node) -> Result<Vec<Row>> {
        self.query_as(Arc::clone(&self.session), text, plan)
    }

    /// Run a plan to completion on a specific session.
    pub fn query_as(&self, session: Arc<Session>, text: &str, plan: &Node) -> Result<Vec<Row>> {
        let ctx = self.engine.context(session);
        let (_schema, iter, ctx) = self.engine.query(ctx, text, plan)?;
        execution::collect(&ctx, iter)
    }

    /// Run a plan expecting failure.
    pub fn query_err(&self, text: &str, plan: &Node) -> Error {
        match self.query(text, plan) {
            Ok(rows) => panic!("expected {text} to fail, got {} rows", rows.len()),
            Err(e) => e,
        }
    }

    pub fn assert_rows(&self, text: &str, plan: &Node, expected: Vec<Row>) {
        let rows = self
            .query(text, plan)
            .unwrap_or_else(|e| panic!("{text} failed: {e}"));
        assert_eq!(rows, expected, "rows for {text}");
    }
}

impl Default for TestContext {
    fn default() -> TestContext {
        TestContext::new()
    }
}

/// The standard two-column integer table used across suites.
pub fn int_table(ctx: &TestContext, name: &str, rows: &[(i64, i64)]) -> Arc<MemoryTable> {
    ctx.create_table(
        name,
        Schema::new(vec![
            Column::new("a", DataType::I64),
            Column::new("b", DataType::I64),
        ])
        .unwrap(),
        rows.iter()
            .map(|(a, b)| vec![Value::I64(*a), Value::I64(*b)])
            .collect(),
    )
}

pub fn col(name: &str) -> Expression {
    Expression::column(name)
}

pub fn lit(v: impl Into<Value>) -> Expression {
    Expression::Literal(v.into())
}

pub fn select(exprs: Vec<Expression>, from: Node) -> Node {
    Node::project(exprs, from)
}

pub fn ints(rows: &[Row]) -> Vec<Vec<i64>> {
    rows.iter()
        .map(|r| {
            r.iter()
                .map(|v| match v {
                    Value::I64(i) => *i,
                    Value::I32(i) => *i as i64,
                    Value::U64(i) => *i as i64,
                    Value::Null => i64::MIN,
                    other => panic!("unexpected value in row: {other:?}"),
                })
                .collect()
        })
        .collect()
}

/// A fresh throwaway context, for tests that drive iterators directly.
pub fn bare_context() -> Context {
    Context::new(Session::new(99, Client::default()))
}
