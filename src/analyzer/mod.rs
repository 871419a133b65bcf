//! Rule-based analyzer
//!
//! Analysis runs ordered batches of rules. A rule is a pure function from a
//! plan to an optionally rewritten plan; a batch applies its rules in order
//! and, under the fixed-point policy, repeats until a full pass changes
//! nothing (bounded to catch non-converging rules). Individual rules can be
//! disabled by id.

mod prepared;
mod rules;
mod scope;

pub use prepared::{PreparedCache, PreparedPlan};
pub use scope::Scope;

use std::collections::HashSet;
use std::sync::Arc;

use crate::catalog::DatabaseProvider;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::plan::Node;

/// How often a batch runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPolicy {
    /// A single pass.
    Once,
    /// A single pass, after everything else has converged.
    OnceAfter,
    /// Repeat until a pass changes nothing.
    FixedPoint,
}

/// The most passes a fixed-point batch may take before it is considered
/// non-converging.
const MAX_PASSES: usize = 8;

type RuleFn = fn(&Context, &Analyzer, &Node, &Scope) -> Result<Option<Node>>;

pub struct Rule {
    pub id: &'static str,
    apply: RuleFn,
}

pub struct Batch {
    pub name: &'static str,
    pub policy: BatchPolicy,
    rules: Vec<Rule>,
}

pub struct Analyzer {
    catalog: Arc<dyn DatabaseProvider>,
    batches: Vec<Batch>,
    disabled: HashSet<&'static str>,
}

impl Analyzer {
    /// The default batch pipeline over a catalog.
    pub fn new(catalog: Arc<dyn DatabaseProvider>) -> Analyzer {
        Analyzer {
            catalog,
            batches: rules::default_batches(),
            disabled: HashSet::new(),
        }
    }

    /// Disable a rule by id; unknown ids are ignored.
    pub fn disable_rule(mut self, id: &'static str) -> Analyzer {
        self.disabled.insert(id);
        self
    }

    pub fn catalog(&self) -> &Arc<dyn DatabaseProvider> {
        &self.catalog
    }

    /// Analyze a plan down to an executable, resolved tree.
    pub fn analyze(&self, ctx: &Context, node: &Node) -> Result<Node> {
        self.analyze_with_scope(ctx, node, &Scope::new())
    }

    /// Analysis entry point for subqueries, carrying the outer scope.
    pub fn analyze_with_scope(&self, ctx: &Context, node: &Node, scope: &Scope) -> Result<Node> {
        let span = tracing::debug_span!("analyze", query = ctx.query());
        let _guard = span.enter();

        let mut plan = node.clone();
        for batch in &self.batches {
            plan = self.run_batch(ctx, batch, plan, scope)?;
        }
        Ok(plan)
    }

    /// Resolution-only analysis; used for prepared statements, whose
    /// placeholders must survive until EXECUTE binds them.
    pub fn resolve_only(&self, ctx: &Context, node: &Node, scope: &Scope) -> Result<Node> {
        let mut plan = node.clone();
        for batch in &self.batches {
            if batch.policy == BatchPolicy::OnceAfter {
                continue;
            }
            plan = self.run_batch(ctx, batch, plan, scope)?;
        }
        Ok(plan)
    }

    /// The finishing batches skipped by `resolve_only`.
    pub fn finish(&self, ctx: &Context, node: &Node, scope: &Scope) -> Result<Node> {
        let mut plan = node.clone();
        for batch in &self.batches {
            if batch.policy != BatchPolicy::OnceAfter {
                continue;
            }
            plan = self.run_batch(ctx, batch, plan, scope)?;
        }
        Ok(plan)
    }

    fn run_batch(&self, ctx: &Context, batch: &Batch, mut plan: Node, scope: &Scope) -> Result<Node> {
        match batch.policy {
            BatchPolicy::Once | BatchPolicy::OnceAfter => {
                let (next, _) = self.run_pass(ctx, batch, plan, scope)?;
                plan = next;
            }
            BatchPolicy::FixedPoint => {
                for pass in 0.. {
                    if pass >= MAX_PASSES {
                        return Err(Error::Internal(format!(
                            "analyzer batch {:?} did not converge",
                            batch.name
                        )));
                    }
                    let (next, changed) = self.run_pass(ctx, batch, plan, scope)?;
                    plan = next;
                    if !changed {
                        break;
                    }
                }
            }
        }
        Ok(plan)
    }

    fn run_pass(
        &self,
        ctx: &Context,
        batch: &Batch,
        mut plan: Node,
        scope: &Scope,
    ) -> Result<(Node, bool)> {
        let mut changed = false;
        for rule in &batch.rules {
            if self.disabled.contains(rule.id) {
                continue;
            }
            if let Some(next) = (rule.apply)(ctx, self, &plan, scope)? {
                tracing::debug!(rule = rule.id, "plan rewritten");
                plan = next;
                changed = true;
            }
        }
        Ok((plan, changed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expression;
    use crate::memory::{MemoryDatabase, MemoryProvider, MemoryTable};
    use crate::types::{Column, DataType, Schema, Value};

    fn provider() -> Arc<MemoryProvider> {
        let db = MemoryDatabase::new("mydb");
        let table = MemoryTable::new(
            "t",
            Schema::new(vec![
                Column::new("a", DataType::I64),
                Column::new("b", DataType::I64),
            ])
            .unwrap(),
        );
        table.put_rows([vec![Value::I64(1), Value::I64(10)]]);
        db.add_table(table);
        MemoryProvider::new().with_database(db)
    }

    fn ctx() -> Context {
        let ctx = Context::for_tests();
        ctx.session().set_current_database("mydb");
        ctx
    }

    #[test]
    fn test_resolves_a_simple_select() -> Result<()> {
        let analyzer = Analyzer::new(provider());
        let plan = Node::project(vec![Expression::column("a")], Node::table("t"));
        let analyzed = analyzer.analyze(&ctx(), &plan)?;
        assert!(analyzed.resolved(), "plan: {analyzed}");
        // Process tracking wraps the root.
        assert!(matches!(analyzed, Node::QueryProcess { .. }));
        Ok(())
    }

    #[test]
    fn test_unknown_table_errors() {
        let analyzer = Analyzer::new(provider());
        let plan = Node::project(vec![Expression::column("a")], Node::table("missing"));
        assert!(matches!(
            analyzer.analyze(&ctx(), &plan),
            Err(Error::TableNotFound(_))
        ));
    }

    #[test]
    fn test_unknown_column_errors() {
        let analyzer = Analyzer::new(provider());
        let plan = Node::project(vec![Expression::column("nope")], Node::table("t"));
        assert!(matches!(
            analyzer.analyze(&ctx(), &plan),
            Err(Error::ColumnNotFound(_))
        ));
    }

    #[test]
    fn test_analysis_is_idempotent_at_fixed_point() -> Result<()> {
        let analyzer = Analyzer::new(provider());
        let ctx = ctx();
        let plan = Node::project(
            vec![Expression::column("a")],
            Node::filter(
                Expression::column("b").equals(Expression::literal(10i64)),
                Node::table("t"),
            ),
        );
        // Run resolution twice; the second run must be a no-op.
        let scope = Scope::new();
        let once = analyzer.resolve_only(&ctx, &plan, &scope)?;
        let twice = analyzer.resolve_only(&ctx, &once, &scope)?;
        assert_eq!(format!("{once:?}"), format!("{twice:?}"));
        Ok(())
    }

    #[test]
    fn test_disabled_rule_is_skipped() -> Result<()> {
        let analyzer = Analyzer::new(provider()).disable_rule("track_process");
        let plan = Node::project(vec![Expression::column("a")], Node::table("t"));
        let analyzed = analyzer.analyze(&ctx(), &plan)?;
        assert!(!matches!(analyzed, Node::QueryProcess { .. }));
        Ok(())
    }
}
