//! Per-query execution context
//!
//! Rather than ambient state, an explicit `Context` is threaded through
//! every rule application, expression `eval`, and iterator `next`. It
//! carries the session, the query pid, the cancellation token installed by
//! the process list, the optional deadline, the memory-manager handle, and
//! the outer-row chain used by correlated subqueries.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::catalog::DatabaseProvider;
use crate::error::{Error, Result};
use crate::process::ProcessList;
use crate::session::{LockRegistry, MemoryManager, Session, Warning};
use crate::types::Row;

#[derive(Clone)]
pub struct Context {
    session: Arc<Session>,
    pid: u64,
    query: String,
    cancel: CancellationToken,
    deadline: Option<Instant>,
    process_list: Option<Arc<ProcessList>>,
    lock_registry: Option<Arc<LockRegistry>>,
    catalog: Option<Arc<dyn DatabaseProvider>>,
    memory: Arc<MemoryManager>,
    /// Rows of enclosing queries, innermost last.
    outer_rows: Vec<Arc<Row>>,
}

impl Context {
    pub fn new(session: Arc<Session>) -> Context {
        let max_memory = session
            .get_variable("max_memory")
            .ok()
            .and_then(|v| v.to_i128().ok())
            .map(|v| v.max(0) as u64)
            .unwrap_or(u64::MAX);
        Context {
            session,
            pid: 0,
            query: String::new(),
            cancel: CancellationToken::new(),
            deadline: None,
            process_list: None,
            lock_registry: None,
            catalog: None,
            memory: MemoryManager::new(max_memory),
            outer_rows: vec![],
        }
    }

    pub fn with_pid(mut self, pid: u64) -> Context {
        self.pid = pid;
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Context {
        self.query = query.into();
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Context {
        self.cancel = cancel;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Context {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_process_list(mut self, list: Arc<ProcessList>) -> Context {
        self.process_list = Some(list);
        self
    }

    pub fn with_lock_registry(mut self, registry: Arc<LockRegistry>) -> Context {
        self.lock_registry = Some(registry);
        self
    }

    pub fn lock_registry(&self) -> Option<&Arc<LockRegistry>> {
        self.lock_registry.as_ref()
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn DatabaseProvider>) -> Context {
        self.catalog = Some(catalog);
        self
    }

    pub fn catalog(&self) -> Result<&Arc<dyn DatabaseProvider>> {
        self.catalog
            .as_ref()
            .ok_or_else(|| Error::Internal("no catalog attached to context".into()))
    }

    pub fn with_memory(mut self, memory: Arc<MemoryManager>) -> Context {
        self.memory = memory;
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn pid(&self) -> u64 {
        self.pid
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn process_list(&self) -> Option<&Arc<ProcessList>> {
        self.process_list.as_ref()
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    /// Errors once the query has been killed or its deadline has passed.
    /// Iterators call this at least once per row and per partition.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                self.cancel.cancel();
                return Err(Error::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Attach a warning to the session.
    pub fn warn(&self, code: u16, message: impl Into<String>) {
        self.session.warn(Warning::new(code, message));
    }

    /// A child context whose scope chain gains `row` as the innermost
    /// enclosing row; used when evaluating a correlated subquery.
    pub fn with_outer_row(&self, row: Row) -> Context {
        let mut ctx = self.clone();
        ctx.outer_rows.push(Arc::new(row));
        ctx
    }

    /// The enclosing row at the given depth; 0 is the innermost.
    pub fn outer_row(&self, depth: usize) -> Option<&Arc<Row>> {
        let len = self.outer_rows.len();
        if depth < len {
            self.outer_rows.get(len - 1 - depth)
        } else {
            None
        }
    }

    /// Report table-level progress for the current query.
    pub fn add_table_progress(&self, table: &str, total: i64) {
        if let Some(list) = &self.process_list {
            list.add_table_progress(self.pid, table, total);
        }
    }

    pub fn update_table_progress(&self, table: &str, delta: i64) {
        if let Some(list) = &self.process_list {
            list.update_table_progress(self.pid, table, delta);
        }
    }

    pub fn add_partition_progress(&self, table: &str, partition: &str, total: i64) {
        if let Some(list) = &self.process_list {
            list.add_partition_progress(self.pid, table, partition, total);
        }
    }

    pub fn update_partition_progress(&self, table: &str, partition: &str, delta: i64) {
        if let Some(list) = &self.process_list {
            list.update_partition_progress(self.pid, table, partition, delta);
        }
    }

    pub fn remove_table_progress(&self, table: &str) {
        if let Some(list) = &self.process_list {
            list.remove_table_progress(self.pid, table);
        }
    }

    pub fn remove_partition_progress(&self, table: &str, partition: &str) {
        if let Some(list) = &self.process_list {
            list.remove_partition_progress(self.pid, table, partition);
        }
    }

    /// A throwaway context for unit tests.
    #[cfg(test)]
    pub(crate) fn for_tests() -> Context {
        Context::new(Session::new(1, crate::session::Client::default()))
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("session", &self.session.id())
            .field("pid", &self.pid)
            .field("query", &self.query)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_is_observed() {
        let ctx = Context::for_tests();
        assert!(ctx.check_cancelled().is_ok());
        ctx.cancel_token().cancel();
        assert_eq!(ctx.check_cancelled(), Err(Error::Cancelled));
    }

    #[test]
    fn test_deadline_cancels() {
        let ctx = Context::for_tests().with_deadline(Instant::now());
        assert_eq!(ctx.check_cancelled(), Err(Error::DeadlineExceeded));
        // The deadline also trips the token for in-flight work.
        assert!(ctx.cancel_token().is_cancelled());
    }

    #[test]
    fn test_outer_row_chain_is_innermost_first() {
        let ctx = Context::for_tests();
        let ctx = ctx.with_outer_row(vec![crate::types::Value::I64(1)]);
        let ctx = ctx.with_outer_row(vec![crate::types::Value::I64(2)]);
        assert_eq!(ctx.outer_row(0).unwrap()[0], crate::types::Value::I64(2));
        assert_eq!(ctx.outer_row(1).unwrap()[0], crate::types::Value::I64(1));
        assert!(ctx.outer_row(2).is_none());
    }
}
