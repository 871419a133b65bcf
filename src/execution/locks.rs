//! LOCK TABLES / UNLOCK TABLES execution
//!
//! Locks are acquired in declared order. If an acquisition fails, the
//! already-acquired tables are unlocked in reverse order and the error
//! surfaces. UNLOCK TABLES releases everything the connection recorded.

use std::sync::Arc;

use super::{BoxedRowIter, RowIter};
use crate::catalog::Table;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::plan::Node;
use crate::types::Row;

pub fn build_locks(ctx: &Context, node: &Node) -> Result<BoxedRowIter> {
    match node {
        Node::LockTables { locks } => {
            let mut targets = Vec::with_capacity(locks.len());
            for lock in locks {
                let Node::ResolvedTable { table, .. } = &lock.table else {
                    return Err(Error::Internal(
                        "LOCK TABLES over an unresolved table".into(),
                    ));
                };
                targets.push((Arc::clone(table), lock.write));
            }
            Ok(Box::new(LockTablesIter {
                targets,
                done: false,
            }))
        }
        Node::UnlockTables => Ok(Box::new(UnlockTablesIter { done: false })),
        other => Err(Error::Internal(format!(
            "build_locks on {} node",
            other.name()
        ))),
    }
}

struct LockTablesIter {
    targets: Vec<(Arc<dyn Table>, bool)>,
    done: bool,
}

impl RowIter for LockTablesIter {
    fn next(&mut self, ctx: &Context) -> Option<Result<Row>> {
        if self.done {
            return None;
        }
        self.done = true;

        let mut acquired: Vec<&(Arc<dyn Table>, bool)> = Vec::new();
        for target in &self.targets {
            let (table, write) = target;
            let Some(lockable) = table.as_lockable() else {
                release(ctx, &acquired);
                return Some(Err(Error::TableNotLockable(table.name().to_string())));
            };
            if let Err(e) = lockable.lock(ctx, *write) {
                release(ctx, &acquired);
                return Some(Err(e));
            }
            acquired.push(target);
        }

        if let Some(registry) = ctx.lock_registry() {
            for (table, write) in &self.targets {
                registry.register(ctx.session().id(), Arc::clone(table), *write);
            }
        }
        None
    }

    fn close(&mut self, _ctx: &Context) -> Result<()> {
        Ok(())
    }
}

/// Best-effort unlock of already-acquired tables, most recent first.
fn release(ctx: &Context, acquired: &[&(Arc<dyn Table>, bool)]) {
    for (table, _) in acquired.iter().rev() {
        if let Some(lockable) = table.as_lockable() {
            if let Err(e) = lockable.unlock(ctx, ctx.session().id()) {
                tracing::warn!(table = table.name(), error = %e, "failed to release lock");
            }
        }
    }
}

struct UnlockTablesIter {
    done: bool,
}

impl RowIter for UnlockTablesIter {
    fn next(&mut self, ctx: &Context) -> Option<Result<Row>> {
        if self.done {
            return None;
        }
        self.done = true;
        let Some(registry) = ctx.lock_registry() else {
            return None;
        };
        match registry.release_all(ctx, ctx.session().id()) {
            Ok(()) => None,
            Err(e) => Some(Err(e)),
        }
    }

    fn close(&mut self, _ctx: &Context) -> Result<()> {
        Ok(())
    }
}
