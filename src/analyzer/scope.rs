//! Name-resolution scope
//!
//! A scope is the chain of enclosing queries' schemas, used to resolve
//! correlated references inside subqueries: names resolve innermost-first.
//! The scope also carries the stack of view/procedure definitions currently
//! being expanded (for cycle detection) and the CTE names that may be
//! self-referenced by a recursive member.

use crate::error::{Error, Result};
use crate::types::Schema;

#[derive(Debug, Clone, Default)]
pub struct Scope {
    /// Schemas of enclosing queries, innermost last.
    outer: Vec<Schema>,
    /// `(kind, qualified name)` of definitions being expanded.
    resolving: Vec<(&'static str, String)>,
    /// Recursive CTEs in scope: name and working-table schema.
    ctes: Vec<(String, Schema)>,
}

impl Scope {
    pub fn new() -> Scope {
        Scope::default()
    }

    /// A child scope whose innermost enclosing row has `schema`.
    pub fn enter(&self, schema: Schema) -> Scope {
        let mut scope = self.clone();
        scope.outer.push(schema);
        scope
    }

    /// Enclosing schemas, innermost first, paired with their depth.
    pub fn outer_schemas(&self) -> impl Iterator<Item = (usize, &Schema)> {
        self.outer.iter().rev().enumerate()
    }

    pub fn is_empty(&self) -> bool {
        self.outer.is_empty()
    }

    /// Push a definition onto the resolution stack, failing on a cycle.
    pub fn resolving(&self, kind: &'static str, name: &str) -> Result<Scope> {
        let lower = name.to_lowercase();
        if self
            .resolving
            .iter()
            .any(|(k, n)| *k == kind && *n == lower)
        {
            return Err(Error::RecursiveDefinition {
                kind,
                name: name.to_string(),
            });
        }
        let mut scope = self.clone();
        scope.resolving.push((kind, lower));
        Ok(scope)
    }

    /// Register a recursive CTE whose name may be self-referenced.
    pub fn with_cte(&self, name: &str, schema: Schema) -> Scope {
        let mut scope = self.clone();
        scope.ctes.push((name.to_lowercase(), schema));
        scope
    }

    pub fn cte(&self, name: &str) -> Option<&Schema> {
        let lower = name.to_lowercase();
        self.ctes
            .iter()
            .rev()
            .find(|(n, _)| *n == lower)
            .map(|(_, s)| s)
    }
}
