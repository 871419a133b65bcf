//! Connection lock table
//!
//! Records which tables each connection holds through LOCK TABLES, so
//! UNLOCK TABLES and connection teardown can release exactly what was
//! acquired. Guarded by a single mutex held per operation.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::catalog::Table;
use crate::context::Context;
use crate::error::Result;

struct HeldLock {
    table: Arc<dyn Table>,
    write: bool,
}

/// The engine-wide registry of held table locks, by connection id.
#[derive(Default)]
pub struct LockRegistry {
    held: Mutex<HashMap<u32, Vec<HeldLock>>>,
}

impl LockRegistry {
    pub fn new() -> Arc<LockRegistry> {
        Arc::new(LockRegistry::default())
    }

    /// Record an acquired lock.
    pub fn register(&self, connection_id: u32, table: Arc<dyn Table>, write: bool) {
        self.held
            .lock()
            .entry(connection_id)
            .or_default()
            .push(HeldLock { table, write });
    }

    /// Tables currently locked by a connection, with their modes.
    pub fn held_by(&self, connection_id: u32) -> Vec<(String, bool)> {
        self.held
            .lock()
            .get(&connection_id)
            .map(|locks| {
                locks
                    .iter()
                    .map(|l| (l.table.name().to_string(), l.write))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Release everything a connection holds, most recent first. The first
    /// unlock failure is reported after all tables were attempted.
    pub fn release_all(&self, ctx: &Context, connection_id: u32) -> Result<()> {
        let locks = self.held.lock().remove(&connection_id).unwrap_or_default();
        let mut first_error = None;
        for lock in locks.into_iter().rev() {
            if let Some(lockable) = lock.table.as_lockable() {
                if let Err(e) = lockable.unlock(ctx, connection_id) {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
