//! In-memory index driver

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::catalog::{Index, IndexDriver, IndexKeyValueIter, Lookup};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::types::{Row, Value};

pub const DRIVER_ID: &str = "memory";

/// A hash index from key tuples to row ids.
pub struct MemoryIndex {
    id: String,
    database: String,
    table: String,
    expressions: Vec<String>,
    entries: RwLock<HashMap<Row, Vec<u64>>>,
}

impl Index for MemoryIndex {
    fn driver_id(&self) -> &str {
        DRIVER_ID
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn database(&self) -> &str {
        &self.database
    }

    fn table(&self) -> &str {
        &self.table
    }

    fn expressions(&self) -> Vec<String> {
        self.expressions.clone()
    }

    fn get(&self, key: &[Value]) -> Result<Lookup> {
        Ok(self
            .entries
            .read()
            .get(key)
            .map(|rows| Lookup::of(rows.iter().copied()))
            .unwrap_or_else(Lookup::empty))
    }
}

/// Holds every index created through it, keyed by (database, table, id).
#[derive(Default)]
pub struct MemoryIndexDriver {
    indexes: RwLock<HashMap<(String, String, String), Arc<MemoryIndex>>>,
}

impl MemoryIndexDriver {
    pub fn new() -> Arc<MemoryIndexDriver> {
        Arc::new(MemoryIndexDriver::default())
    }

    pub fn index(&self, database: &str, table: &str, id: &str) -> Option<Arc<MemoryIndex>> {
        self.indexes
            .read()
            .get(&(database.to_string(), table.to_string(), id.to_string()))
            .cloned()
    }
}

impl IndexDriver for MemoryIndexDriver {
    fn id(&self) -> &str {
        DRIVER_ID
    }

    fn create(
        &self,
        database: &str,
        table: &str,
        id: &str,
        expressions: Vec<String>,
        _comment: &str,
    ) -> Result<Arc<dyn Index>> {
        let index = Arc::new(MemoryIndex {
            id: id.to_string(),
            database: database.to_string(),
            table: table.to_string(),
            expressions,
            entries: RwLock::new(HashMap::new()),
        });
        self.indexes.write().insert(
            (database.to_string(), table.to_string(), id.to_string()),
            Arc::clone(&index),
        );
        Ok(index)
    }

    fn load(&self, database: &str, table: &str, serialised: &[u8]) -> Result<Arc<dyn Index>> {
        let id = std::str::from_utf8(serialised)
            .map_err(|_| Error::Io("corrupt index id".into()))?;
        self.index(database, table, id)
            .map(|i| i as Arc<dyn Index>)
            .ok_or_else(|| Error::Io(format!("index not found: {id}")))
    }

    fn save(&self, ctx: &Context, index: &Arc<dyn Index>, rows: IndexKeyValueIter) -> Result<()> {
        let target = self
            .index(index.database(), index.table(), index.id())
            .ok_or_else(|| Error::Io(format!("index not found: {}", index.id())))?;
        let mut entries = HashMap::new();
        for item in rows {
            ctx.check_cancelled()?;
            let (key, row_id) = item?;
            entries.entry(key).or_insert_with(Vec::new).push(row_id);
        }
        *target.entries.write() = entries;
        Ok(())
    }

    fn delete(&self, index: &Arc<dyn Index>) -> Result<()> {
        self.indexes
            .write()
            .remove(&(
                index.database().to_string(),
                index.table().to_string(),
                index.id().to_string(),
            ))
            .map(|_| ())
            .ok_or_else(|| Error::Io(format!("index not found: {}", index.id())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_save_get() -> Result<()> {
        let ctx = Context::for_tests();
        let driver = MemoryIndexDriver::new();
        let index = driver.create("db", "t", "idx_a", vec!["t.a".into()], "")?;

        let rows: Vec<Result<(Row, u64)>> = vec![
            Ok((vec![Value::I64(1)], 0)),
            Ok((vec![Value::I64(2)], 1)),
            Ok((vec![Value::I64(1)], 2)),
        ];
        driver.save(&ctx, &index, Box::new(rows.into_iter()))?;

        let lookup = index.get(&[Value::I64(1)])?;
        assert_eq!(lookup.row_ids().collect::<Vec<_>>(), vec![0, 2]);
        assert!(index.has(&[Value::I64(2)])?);
        assert!(!index.has(&[Value::I64(9)])?);

        driver.delete(&index)?;
        assert!(driver.index("db", "t", "idx_a").is_none());
        Ok(())
    }
}
