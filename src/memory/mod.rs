//! In-memory reference catalog
//!
//! A complete in-process implementation of the storage interfaces, used by
//! the test suite and as a starting point for embedders. Tables hold their
//! rows in a fixed number of partitions; scans iterate partitions in order
//! and rows in insertion order within each partition. Lock and unlock calls
//! are counted so lock behaviour is observable from tests.

mod index;

pub use index::{MemoryIndex, MemoryIndexDriver};

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::catalog::{
    Database, DatabaseProvider, Deletable, Insertable, KeyValueIter, Lockable, Partition,
    ProcedureDefinition, RowIterator, Table, TableFunction, Truncatable, Updatable,
    VersionedTable, ViewDefinition,
};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::types::{Row, Schema, Value};

/// The provider at the root of an in-memory catalog.
#[derive(Default)]
pub struct MemoryProvider {
    databases: RwLock<HashMap<String, Arc<MemoryDatabase>>>,
    table_functions: RwLock<HashMap<String, Arc<dyn TableFunction>>>,
}

impl MemoryProvider {
    pub fn new() -> Arc<MemoryProvider> {
        Arc::new(MemoryProvider::default())
    }

    pub fn with_database(self: Arc<Self>, db: Arc<MemoryDatabase>) -> Arc<Self> {
        self.databases
            .write()
            .insert(db.name.to_lowercase(), db);
        self
    }

    pub fn add_table_function(&self, function: Arc<dyn TableFunction>) {
        self.table_functions
            .write()
            .insert(function.name().to_lowercase(), function);
    }
}

impl DatabaseProvider for MemoryProvider {
    fn databases(&self) -> Vec<Arc<dyn Database>> {
        let mut dbs: Vec<Arc<MemoryDatabase>> = self.databases.read().values().cloned().collect();
        dbs.sort_by(|a, b| a.name.cmp(&b.name));
        dbs.into_iter().map(|db| db as Arc<dyn Database>).collect()
    }

    fn database(&self, _ctx: &Context, name: &str) -> Result<Arc<dyn Database>> {
        self.databases
            .read()
            .get(&name.to_lowercase())
            .cloned()
            .map(|db| db as Arc<dyn Database>)
            .ok_or_else(|| Error::DatabaseNotFound(name.to_string()))
    }

    fn has_database(&self, name: &str) -> bool {
        self.databases.read().contains_key(&name.to_lowercase())
    }

    fn create_database(&self, _ctx: &Context, name: &str) -> Result<()> {
        let mut dbs = self.databases.write();
        if dbs.contains_key(&name.to_lowercase()) {
            return Err(Error::InvalidValue(format!("database exists: {name}")));
        }
        dbs.insert(name.to_lowercase(), MemoryDatabase::new(name));
        Ok(())
    }

    fn drop_database(&self, _ctx: &Context, name: &str) -> Result<()> {
        self.databases
            .write()
            .remove(&name.to_lowercase())
            .map(|_| ())
            .ok_or_else(|| Error::DatabaseNotFound(name.to_string()))
    }

    fn table_function(&self, _ctx: &Context, name: &str) -> Option<Arc<dyn TableFunction>> {
        self.table_functions
            .read()
            .get(&name.to_lowercase())
            .cloned()
    }
}

/// An in-memory database: tables plus view, trigger, and procedure
/// registries.
pub struct MemoryDatabase {
    name: String,
    tables: RwLock<HashMap<String, Arc<MemoryTable>>>,
    views: RwLock<HashMap<String, ViewDefinition>>,
    triggers: RwLock<Vec<crate::catalog::TriggerDefinition>>,
    procedures: RwLock<HashMap<String, ProcedureDefinition>>,
}

impl MemoryDatabase {
    pub fn new(name: &str) -> Arc<MemoryDatabase> {
        Arc::new(MemoryDatabase {
            name: name.to_string(),
            tables: RwLock::new(HashMap::new()),
            views: RwLock::new(HashMap::new()),
            triggers: RwLock::new(Vec::new()),
            procedures: RwLock::new(HashMap::new()),
        })
    }

    pub fn add_table(&self, table: Arc<MemoryTable>) {
        self.tables
            .write()
            .insert(table.name.to_lowercase(), table);
    }

    pub fn add_view(&self, view: ViewDefinition) {
        self.views.write().insert(view.name.to_lowercase(), view);
    }

    pub fn add_trigger(&self, trigger: crate::catalog::TriggerDefinition) {
        self.triggers.write().push(trigger);
    }

    pub fn add_procedure(&self, procedure: ProcedureDefinition) {
        self.procedures
            .write()
            .insert(procedure.name.to_lowercase(), procedure);
    }

    /// The concrete table, for tests that inspect counters.
    pub fn memory_table(&self, name: &str) -> Option<Arc<MemoryTable>> {
        self.tables.read().get(&name.to_lowercase()).cloned()
    }
}

impl Database for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn table_names(&self, _ctx: &Context) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .tables
            .read()
            .values()
            .map(|t| t.name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    fn table_insensitive(&self, _ctx: &Context, name: &str) -> Result<Option<Arc<dyn Table>>> {
        Ok(self
            .tables
            .read()
            .get(&name.to_lowercase())
            .cloned()
            .map(|t| t as Arc<dyn Table>))
    }

    fn create_table(&self, _ctx: &Context, name: &str, schema: Schema) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.contains_key(&name.to_lowercase()) {
            return Err(Error::InvalidValue(format!("table exists: {name}")));
        }
        tables.insert(name.to_lowercase(), MemoryTable::new(name, schema));
        Ok(())
    }

    fn drop_table(&self, _ctx: &Context, name: &str) -> Result<()> {
        self.tables
            .write()
            .remove(&name.to_lowercase())
            .map(|_| ())
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    fn rename_table(&self, _ctx: &Context, from: &str, to: &str) -> Result<()> {
        let mut tables = self.tables.write();
        let table = tables
            .remove(&from.to_lowercase())
            .ok_or_else(|| Error::TableNotFound(from.to_string()))?;
        let renamed = Arc::new(MemoryTable {
            name: to.to_string(),
            ..table.as_ref().clone_shallow()
        });
        tables.insert(to.to_lowercase(), renamed);
        Ok(())
    }

    fn view(&self, _ctx: &Context, name: &str) -> Result<Option<ViewDefinition>> {
        Ok(self.views.read().get(&name.to_lowercase()).cloned())
    }

    fn triggers(&self, _ctx: &Context, table: &str) -> Result<Vec<crate::catalog::TriggerDefinition>> {
        Ok(self
            .triggers
            .read()
            .iter()
            .filter(|t| t.table.eq_ignore_ascii_case(table))
            .cloned()
            .collect())
    }

    fn procedure(&self, _ctx: &Context, name: &str) -> Result<Option<ProcedureDefinition>> {
        Ok(self.procedures.read().get(&name.to_lowercase()).cloned())
    }
}

#[derive(Debug, Default)]
pub struct LockCounters {
    pub read_locks: AtomicU64,
    pub write_locks: AtomicU64,
    pub unlocks: AtomicU64,
}

/// A partitioned, lockable, versioned in-memory table.
pub struct MemoryTable {
    name: String,
    schema: Schema,
    partitions: RwLock<Vec<Vec<Row>>>,
    /// Historical snapshots by as-of tag, ascending.
    snapshots: RwLock<BTreeMap<String, (Schema, Vec<Vec<Row>>)>>,
    indexes: RwLock<Vec<Arc<dyn crate::catalog::Index>>>,
    pub locks: LockCounters,
    auto_increment: AtomicU64,
    insert_counter: AtomicU64,
}

impl std::fmt::Debug for MemoryTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTable")
            .field("name", &self.name)
            .field("partitions", &self.partitions.read().len())
            .finish()
    }
}

impl MemoryTable {
    pub fn new(name: &str, schema: Schema) -> Arc<MemoryTable> {
        Self::partitioned(name, schema, 1)
    }

    pub fn partitioned(name: &str, schema: Schema, partitions: usize) -> Arc<MemoryTable> {
        Arc::new(MemoryTable {
            name: name.to_string(),
            schema,
            partitions: RwLock::new(vec![Vec::new(); partitions.max(1)]),
            snapshots: RwLock::new(BTreeMap::new()),
            indexes: RwLock::new(Vec::new()),
            locks: LockCounters::default(),
            auto_increment: AtomicU64::new(1),
            insert_counter: AtomicU64::new(0),
        })
    }

    fn clone_shallow(&self) -> MemoryTable {
        MemoryTable {
            name: self.name.clone(),
            schema: self.schema.clone(),
            partitions: RwLock::new(self.partitions.read().clone()),
            snapshots: RwLock::new(self.snapshots.read().clone()),
            indexes: RwLock::new(self.indexes.read().clone()),
            locks: LockCounters::default(),
            auto_increment: AtomicU64::new(self.auto_increment.load(Ordering::Relaxed)),
            insert_counter: AtomicU64::new(self.insert_counter.load(Ordering::Relaxed)),
        }
    }

    /// Attach an externally built index; the analyzer consults it for
    /// equality filters.
    pub fn attach_index(&self, index: Arc<dyn crate::catalog::Index>) {
        self.indexes.write().push(index);
    }

    /// Append rows without going through the Insertable interface.
    pub fn put_rows(&self, rows: impl IntoIterator<Item = Row>) {
        for row in rows {
            self.append(row);
        }
    }

    fn append(&self, row: Row) {
        let mut partitions = self.partitions.write();
        let n = partitions.len() as u64;
        let slot = (self.insert_counter.fetch_add(1, Ordering::Relaxed) % n) as usize;
        partitions[slot].push(row);
    }

    /// Freeze the current contents as the snapshot for `tag`.
    pub fn snapshot_as_of(&self, tag: &str) {
        let data = self.partitions.read().clone();
        self.snapshots
            .write()
            .insert(tag.to_string(), (self.schema.clone(), data));
    }

    /// Freeze explicit contents (possibly a different schema) for `tag`.
    pub fn snapshot_with(&self, tag: &str, schema: Schema, rows: Vec<Row>) {
        self.snapshots
            .write()
            .insert(tag.to_string(), (schema, vec![rows]));
    }

    fn partition_name(&self, index: usize) -> String {
        format!("{}-{}", self.name, index)
    }
}

impl Table for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> Schema {
        self.schema.with_source(&self.name)
    }

    fn partitions(&self, _ctx: &Context) -> Result<Vec<Partition>> {
        Ok((0..self.partitions.read().len())
            .map(|i| Partition::new(self.partition_name(i)))
            .collect())
    }

    fn partition_rows(&self, _ctx: &Context, partition: &Partition) -> Result<RowIterator> {
        let partitions = self.partitions.read();
        let index = partition
            .key
            .rsplit('-')
            .next()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|i| *i < partitions.len())
            .ok_or_else(|| Error::Io(format!("unknown partition: {}", partition.key)))?;
        let rows = partitions[index].clone();
        Ok(Box::new(rows.into_iter().map(Ok)))
    }

    fn as_lockable(&self) -> Option<&dyn Lockable> {
        Some(self)
    }

    fn as_insertable(&self) -> Option<&dyn Insertable> {
        Some(self)
    }

    fn as_updatable(&self) -> Option<&dyn Updatable> {
        Some(self)
    }

    fn as_deletable(&self) -> Option<&dyn Deletable> {
        Some(self)
    }

    fn as_truncatable(&self) -> Option<&dyn Truncatable> {
        Some(self)
    }

    fn as_versioned(&self) -> Option<&dyn VersionedTable> {
        Some(self)
    }

    fn as_indexable(&self) -> Option<&dyn crate::catalog::Indexable> {
        Some(self)
    }

    fn as_auto_incrementable(&self) -> Option<&dyn crate::catalog::AutoIncrementable> {
        Some(self)
    }
}

impl Lockable for MemoryTable {
    fn lock(&self, _ctx: &Context, write: bool) -> Result<()> {
        if write {
            self.locks.write_locks.fetch_add(1, Ordering::Relaxed);
        } else {
            self.locks.read_locks.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn unlock(&self, _ctx: &Context, _connection_id: u32) -> Result<()> {
        self.locks.unlocks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl Insertable for MemoryTable {
    fn insert(&self, _ctx: &Context, row: Row) -> Result<()> {
        if row.len() != self.schema.len() {
            return Err(Error::InvalidValue(format!(
                "row width {} does not match table {} width {}",
                row.len(),
                self.name,
                self.schema.len()
            )));
        }
        for (value, column) in row.iter().zip(self.schema.columns()) {
            if value.is_null() && !column.nullable {
                return Err(Error::NotNullViolation(column.name.clone()));
            }
        }
        self.append(row);
        Ok(())
    }
}

impl Updatable for MemoryTable {
    fn update(&self, _ctx: &Context, old: &Row, new: Row) -> Result<()> {
        let mut partitions = self.partitions.write();
        for partition in partitions.iter_mut() {
            if let Some(slot) = partition.iter_mut().find(|r| *r == old) {
                *slot = new;
                return Ok(());
            }
        }
        Err(Error::Io("row to update not found".into()))
    }
}

impl Deletable for MemoryTable {
    fn delete(&self, _ctx: &Context, row: &Row) -> Result<()> {
        let mut partitions = self.partitions.write();
        for partition in partitions.iter_mut() {
            if let Some(pos) = partition.iter().position(|r| r == row) {
                partition.remove(pos);
                return Ok(());
            }
        }
        Err(Error::Io("row to delete not found".into()))
    }
}

impl Truncatable for MemoryTable {
    fn truncate(&self, _ctx: &Context) -> Result<u64> {
        let mut partitions = self.partitions.write();
        let dropped = partitions.iter().map(|p| p.len() as u64).sum();
        for partition in partitions.iter_mut() {
            partition.clear();
        }
        Ok(dropped)
    }
}

impl crate::catalog::AutoIncrementable for MemoryTable {
    fn peek_next_auto_increment(&self, _ctx: &Context) -> Result<u64> {
        Ok(self.auto_increment.load(Ordering::Relaxed))
    }

    fn next_auto_increment(&self, _ctx: &Context) -> Result<u64> {
        Ok(self.auto_increment.fetch_add(1, Ordering::Relaxed))
    }
}

impl VersionedTable for MemoryTable {
    fn table_as_of(&self, _ctx: &Context, selector: &Value) -> Result<Arc<dyn Table>> {
        let tag = selector.to_display_string();
        let snapshots = self.snapshots.read();
        // The newest snapshot at or before the selector.
        let found = snapshots
            .range(..=tag.clone())
            .next_back()
            .map(|(_, v)| v.clone());
        match found {
            Some((schema, data)) => Ok(Arc::new(SnapshotTable {
                name: self.name.clone(),
                schema,
                data,
            })),
            None => Err(Error::InvalidValue(format!(
                "no snapshot of {} as of {tag}",
                self.name
            ))),
        }
    }
}

impl crate::catalog::Indexable for MemoryTable {
    fn indexes(&self, _ctx: &Context) -> Result<Vec<Arc<dyn crate::catalog::Index>>> {
        Ok(self.indexes.read().clone())
    }

    fn create_index(
        &self,
        ctx: &Context,
        name: &str,
        expressions: Vec<String>,
        comment: &str,
    ) -> Result<()> {
        use crate::catalog::{Indexable, IndexDriver};
        let driver = index::MemoryIndexDriver::new();
        let created = driver.create("", &self.name, name, expressions.clone(), comment)?;
        driver.save(ctx, &created, self.index_key_values(ctx, &expressions)?)?;
        self.attach_index(created);
        Ok(())
    }

    fn index_key_values(&self, _ctx: &Context, expressions: &[String]) -> Result<KeyValueIter> {
        let schema = self.schema();
        let mut columns = Vec::new();
        for expr in expressions {
            let name = expr.rsplit('.').next().unwrap_or(expr);
            let index = schema
                .index_of(name)
                .ok_or_else(|| Error::ColumnNotFound(expr.clone()))?;
            columns.push(index);
        }
        let partitions = self.partitions.read();
        let mut out = Vec::new();
        for (p, rows) in partitions.iter().enumerate() {
            for (i, row) in rows.iter().enumerate() {
                let key: Row = columns.iter().map(|c| row[*c].clone()).collect();
                out.push(Ok((key, ((p as u64) << 32) | i as u64)));
            }
        }
        Ok(Box::new(out.into_iter()))
    }

    fn with_index_lookup(
        &self,
        _ctx: &Context,
        lookup: crate::catalog::Lookup,
    ) -> Result<Arc<dyn Table>> {
        let partitions = self.partitions.read();
        let mut rows = Vec::new();
        for (p, partition) in partitions.iter().enumerate() {
            for (i, row) in partition.iter().enumerate() {
                if lookup.contains(((p as u64) << 32) | i as u64) {
                    rows.push(row.clone());
                }
            }
        }
        Ok(Arc::new(SnapshotTable {
            name: self.name.clone(),
            schema: self.schema.clone(),
            data: vec![rows],
        }))
    }
}

/// A frozen, single-source view of table data: historical snapshots and
/// index-restricted scans.
struct SnapshotTable {
    name: String,
    schema: Schema,
    data: Vec<Vec<Row>>,
}

impl std::fmt::Debug for SnapshotTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotTable")
            .field("name", &self.name)
            .finish()
    }
}

impl Table for SnapshotTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> Schema {
        self.schema.with_source(&self.name)
    }

    fn partitions(&self, _ctx: &Context) -> Result<Vec<Partition>> {
        Ok((0..self.data.len())
            .map(|i| Partition::new(format!("{}-{}", self.name, i)))
            .collect())
    }

    fn partition_rows(&self, _ctx: &Context, partition: &Partition) -> Result<RowIterator> {
        let index = partition
            .key
            .rsplit('-')
            .next()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|i| *i < self.data.len())
            .ok_or_else(|| Error::Io(format!("unknown partition: {}", partition.key)))?;
        let rows = self.data[index].clone();
        Ok(Box::new(rows.into_iter().map(Ok)))
    }
}
