//! The embeddable engine
//!
//! Owns the analyzer, the process list, the lock registry, and the
//! prepared-statement cache. A query comes in as a parsed plan plus its
//! display text; it leaves as a schema and a live row iterator, with the
//! process entry registered and the kill token wired into the returned
//! context. The caller drives the iterator with that context.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::analyzer::{Analyzer, PreparedCache, PreparedPlan, Scope};
use crate::catalog::DatabaseProvider;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::execution::{self, BoxedRowIter};
use crate::plan::{transform_expressions, transform_up, Node};
use crate::process::ProcessList;
use crate::session::{Client, LockRegistry, Session};
use crate::types::Schema;

/// Engine-level knobs.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Per-query deadline; None disables it.
    pub query_deadline: Option<Duration>,
}

pub struct Engine {
    analyzer: Analyzer,
    config: Config,
    process_list: Arc<ProcessList>,
    lock_registry: Arc<LockRegistry>,
    prepared: Arc<PreparedCache>,
}

impl Engine {
    pub fn new(analyzer: Analyzer) -> Engine {
        Engine::with_config(analyzer, Config::default())
    }

    pub fn with_config(analyzer: Analyzer, config: Config) -> Engine {
        Engine {
            analyzer,
            config,
            process_list: ProcessList::new(),
            lock_registry: LockRegistry::new(),
            prepared: Arc::new(PreparedCache::default()),
        }
    }

    pub fn catalog(&self) -> &Arc<dyn DatabaseProvider> {
        self.analyzer.catalog()
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn process_list(&self) -> &Arc<ProcessList> {
        &self.process_list
    }

    /// Register a connection before its session exists.
    pub fn add_connection(&self, id: u32, addr: &str) {
        self.process_list.add_connection(id, addr);
    }

    /// Build a session and mark the connection idle.
    pub fn connection_ready(&self, id: u32, client: Client) -> Arc<Session> {
        let session = Session::new(id, client);
        self.process_list.connection_ready(&session);
        session
    }

    /// Kill the in-flight query, release held locks, drop prepared
    /// statements, and remove the process entry.
    pub fn close_connection(&self, ctx: &Context) {
        let id = ctx.session().id();
        self.process_list.remove_connection(id);
        if let Err(e) = self.lock_registry.release_all(ctx, id) {
            tracing::warn!(connection = id, error = %e, "failed to release locks at close");
        }
        self.prepared.clear_session(id);
    }

    /// A context bound to this engine's shared state, ready for `query`.
    pub fn context(&self, session: Arc<Session>) -> Context {
        Context::new(session)
            .with_catalog(Arc::clone(self.analyzer.catalog()))
            .with_lock_registry(Arc::clone(&self.lock_registry))
            .with_process_list(Arc::clone(&self.process_list))
    }

    /// Analyze and prepare a parsed plan for execution. The returned
    /// context carries the query pid and kill token; drive the iterator
    /// with it. The process entry is removed when the iterator ends or is
    /// closed, or when the query is killed.
    pub fn query(
        &self,
        ctx: Context,
        text: &str,
        plan: &Node,
    ) -> Result<(Schema, BoxedRowIter, Context)> {
        let span = tracing::debug_span!("query", text);
        let _guard = span.enter();

        // SHOW WARNINGS reports the previous statement's diagnostics, so it
        // must not clear them.
        if !matches!(plan, Node::ShowWarnings) {
            ctx.session().clear_warnings();
        }
        let ctx = if ctx.pid() == 0 {
            ctx.with_pid(self.process_list.reserve_pid())
        } else {
            ctx
        };
        let ctx = ctx
            .with_catalog(Arc::clone(self.analyzer.catalog()))
            .with_lock_registry(Arc::clone(&self.lock_registry));
        let mut ctx = self.process_list.begin_query(ctx, text)?;
        if let Some(deadline) = self.config.query_deadline {
            ctx = ctx.with_deadline(Instant::now() + deadline);
        }

        match self.dispatch(&ctx, text, plan) {
            Ok((schema, iter)) => Ok((schema, iter, ctx)),
            Err(e) => {
                self.process_list.end_query(&ctx);
                Err(e)
            }
        }
    }

    fn dispatch(&self, ctx: &Context, text: &str, plan: &Node) -> Result<(Schema, BoxedRowIter)> {
        match plan {
            Node::Prepare {
                name,
                statement_text,
                statement,
            } => {
                let resolved = self
                    .analyzer
                    .resolve_only(ctx, statement, &Scope::new())?;
                self.prepared.insert(
                    ctx.session().id(),
                    statement_text,
                    PreparedPlan {
                        name: name.clone(),
                        parameter_count: count_parameters(&resolved),
                        plan: resolved,
                    },
                );
                self.empty_result(ctx)
            }
            Node::ExecutePrepared { name, bindings } => {
                let prepared = self
                    .prepared
                    .get_named(ctx.session().id(), name)
                    .ok_or_else(|| Error::PreparedStatementNotFound(name.clone()))?;
                if bindings.len() != prepared.parameter_count {
                    return Err(Error::InvalidArgumentCount {
                        name: name.clone(),
                        expected: prepared.parameter_count,
                        actual: bindings.len(),
                    });
                }
                // Bind placeholders, then re-resolve whatever waited on them
                // (AS OF selectors, bounds) and finish the pipeline.
                let bound = bind_parameters(ctx, &prepared.plan, bindings)?;
                let resolved = self.analyzer.resolve_only(ctx, &bound, &Scope::new())?;
                let finished = self.analyzer.finish(ctx, &resolved, &Scope::new())?;
                let schema = finished.schema();
                let iter = execution::build(ctx, &finished)?;
                Ok((schema, iter))
            }
            Node::Deallocate { name } => {
                if !self.prepared.remove_named(ctx.session().id(), name) {
                    return Err(Error::PreparedStatementNotFound(name.clone()));
                }
                self.empty_result(ctx)
            }
            _ => {
                self.invalidate_on_ddl(plan);
                let analyzed = self.analyzer.analyze(ctx, plan)?;
                let schema = analyzed.schema();
                let iter = execution::build(ctx, &analyzed)?;
                tracing::debug!(text, "query prepared for execution");
                Ok((schema, iter))
            }
        }
    }

    /// Statement executed at dispatch; the process entry ends immediately.
    fn empty_result(&self, ctx: &Context) -> Result<(Schema, BoxedRowIter)> {
        self.process_list.end_query(ctx);
        Ok((Schema::empty(), execution::build(ctx, &Node::Nothing)?))
    }

    /// DDL invalidates prepared plans that reference the affected object.
    fn invalidate_on_ddl(&self, plan: &Node) {
        match plan {
            Node::CreateTable { name, .. } | Node::DropTable { name, .. } => {
                self.prepared.invalidate_table(name)
            }
            Node::CreateIndex { table, .. } | Node::DropIndex { table, .. } => {
                match table.as_ref() {
                    Node::UnresolvedTable { name, .. } => self.prepared.invalidate_table(name),
                    Node::ResolvedTable { table, .. } => {
                        self.prepared.invalidate_table(table.name())
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }
}

/// Replace placeholder expressions with their bound values.
fn bind_parameters(
    ctx: &Context,
    plan: &Node,
    bindings: &[crate::expr::Expression],
) -> Result<Node> {
    use crate::expr::Expression;
    let bound = transform_expressions(plan, &mut |e| match e {
        Expression::Parameter(i) => {
            let binding = bindings
                .get(*i)
                .ok_or_else(|| Error::Internal(format!("no binding for parameter ?{i}")))?;
            Ok(Some(Expression::Literal(binding.eval(ctx, &vec![])?)))
        }
        _ => Ok(None),
    })?;
    Ok(bound.unwrap_or_else(|| plan.clone()))
}

fn count_parameters(plan: &Node) -> usize {
    use crate::expr::Expression;
    let mut max: Option<usize> = None;
    let _ = transform_up(plan, &mut |n| {
        for expr in n.expressions() {
            let _ = expr.transform_up(&mut |e| {
                if let Expression::Parameter(i) = e {
                    max = Some(max.map_or(*i, |m| m.max(*i)));
                }
                Ok(None)
            });
        }
        Ok(None)
    });
    max.map_or(0, |m| m + 1)
}
