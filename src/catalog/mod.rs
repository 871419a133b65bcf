//! External collaborator interfaces
//!
//! The engine consumes storage through these traits and never assumes an
//! implementation. A `Table` yields partitions and per-partition row
//! iterators; optional capabilities (insert, update, locking, indexing,
//! versioned snapshots) are discovered through `as_*` accessors, keeping
//! the base contract minimal for read-only providers.

pub mod index;

pub use index::{Index, IndexDriver, IndexKeyValueIter, KeyValueIter, Lookup};

use std::fmt::Debug;
use std::sync::Arc;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::types::{Row, Schema, Value};

/// An opaque handle a table uses to chunk its row stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub key: String,
}

impl Partition {
    pub fn new(key: impl Into<String>) -> Partition {
        Partition { key: key.into() }
    }
}

/// A stream of rows.
pub type RowIterator = Box<dyn Iterator<Item = Result<Row>> + Send>;

/// The root of a storage driver: a set of databases.
pub trait DatabaseProvider: Send + Sync {
    fn databases(&self) -> Vec<Arc<dyn Database>>;
    fn database(&self, ctx: &Context, name: &str) -> Result<Arc<dyn Database>>;
    fn has_database(&self, name: &str) -> bool;

    fn create_database(&self, _ctx: &Context, name: &str) -> Result<()> {
        Err(Error::Unsupported(format!("create database {name}")))
    }

    fn drop_database(&self, _ctx: &Context, name: &str) -> Result<()> {
        Err(Error::Unsupported(format!("drop database {name}")))
    }

    /// Table-valued functions exposed by the provider.
    fn table_function(&self, _ctx: &Context, _name: &str) -> Option<Arc<dyn TableFunction>> {
        None
    }
}

/// A view stored in a database: its body is a plan produced by the parser.
#[derive(Debug, Clone)]
pub struct ViewDefinition {
    pub name: String,
    pub definition: crate::plan::Node,
}

/// A trigger attached to a table.
#[derive(Debug, Clone)]
pub struct TriggerDefinition {
    pub name: String,
    pub table: String,
    pub definition: crate::plan::Node,
}

/// A stored procedure; `CALL` substitutes arguments for parameters.
#[derive(Debug, Clone)]
pub struct ProcedureDefinition {
    pub name: String,
    pub params: Vec<String>,
    pub body: crate::plan::Node,
}

pub trait Database: Send + Sync {
    fn name(&self) -> &str;
    fn table_names(&self, ctx: &Context) -> Result<Vec<String>>;
    /// Case-insensitive table lookup.
    fn table_insensitive(&self, ctx: &Context, name: &str) -> Result<Option<Arc<dyn Table>>>;

    fn create_table(&self, _ctx: &Context, name: &str, _schema: Schema) -> Result<()> {
        Err(Error::Unsupported(format!("create table {name}")))
    }

    fn drop_table(&self, _ctx: &Context, name: &str) -> Result<()> {
        Err(Error::Unsupported(format!("drop table {name}")))
    }

    fn rename_table(&self, _ctx: &Context, from: &str, _to: &str) -> Result<()> {
        Err(Error::Unsupported(format!("rename table {from}")))
    }

    /// Views registered in this database.
    fn view(&self, _ctx: &Context, _name: &str) -> Result<Option<ViewDefinition>> {
        Ok(None)
    }

    /// Triggers defined on the given table.
    fn triggers(&self, _ctx: &Context, _table: &str) -> Result<Vec<TriggerDefinition>> {
        Ok(vec![])
    }

    /// Stored procedures.
    fn procedure(&self, _ctx: &Context, _name: &str) -> Result<Option<ProcedureDefinition>> {
        Ok(None)
    }
}

/// A relation: named, typed, and iterable partition by partition.
pub trait Table: Debug + Send + Sync {
    fn name(&self) -> &str;
    fn schema(&self) -> Schema;
    fn partitions(&self, ctx: &Context) -> Result<Vec<Partition>>;
    fn partition_rows(&self, ctx: &Context, partition: &Partition) -> Result<RowIterator>;

    /// Number of partitions, when cheaply known.
    fn partition_count(&self, ctx: &Context) -> Result<i64> {
        Ok(self.partitions(ctx)?.len() as i64)
    }

    fn as_lockable(&self) -> Option<&dyn Lockable> {
        None
    }
    fn as_insertable(&self) -> Option<&dyn Insertable> {
        None
    }
    fn as_updatable(&self) -> Option<&dyn Updatable> {
        None
    }
    fn as_deletable(&self) -> Option<&dyn Deletable> {
        None
    }
    fn as_truncatable(&self) -> Option<&dyn Truncatable> {
        None
    }
    fn as_indexable(&self) -> Option<&dyn Indexable> {
        None
    }
    fn as_auto_incrementable(&self) -> Option<&dyn AutoIncrementable> {
        None
    }
    fn as_versioned(&self) -> Option<&dyn VersionedTable> {
        None
    }
}

pub trait Insertable {
    fn insert(&self, ctx: &Context, row: Row) -> Result<()>;
}

pub trait Updatable {
    fn update(&self, ctx: &Context, old: &Row, new: Row) -> Result<()>;
}

pub trait Deletable {
    fn delete(&self, ctx: &Context, row: &Row) -> Result<()>;
}

pub trait Truncatable {
    /// Remove all rows, returning how many were dropped.
    fn truncate(&self, ctx: &Context) -> Result<u64>;
}

/// Tables that honour LOCK TABLES.
pub trait Lockable {
    fn lock(&self, ctx: &Context, write: bool) -> Result<()>;
    fn unlock(&self, ctx: &Context, connection_id: u32) -> Result<()>;
}

pub trait AutoIncrementable {
    fn peek_next_auto_increment(&self, ctx: &Context) -> Result<u64>;
    fn next_auto_increment(&self, ctx: &Context) -> Result<u64>;
}

/// Tables that can serve historical snapshots for AS OF.
pub trait VersionedTable {
    /// The table as of the given selector (a timestamp or a string tag).
    fn table_as_of(&self, ctx: &Context, selector: &Value) -> Result<Arc<dyn Table>>;
}

/// Tables with secondary indexes.
pub trait Indexable {
    fn indexes(&self, ctx: &Context) -> Result<Vec<Arc<dyn Index>>>;

    fn create_index(
        &self,
        _ctx: &Context,
        name: &str,
        _expressions: Vec<String>,
        _comment: &str,
    ) -> Result<()> {
        Err(Error::Unsupported(format!("create index {name}")))
    }

    /// The key/row-id pairs for the given indexed expressions, used by
    /// drivers to build and persist indexes.
    fn index_key_values(&self, ctx: &Context, expressions: &[String]) -> Result<KeyValueIter>;

    /// A view of the table restricted to the rows of a lookup.
    fn with_index_lookup(&self, ctx: &Context, lookup: Lookup) -> Result<Arc<dyn Table>>;
}

/// A table-valued function, used as a lateral row source.
pub trait TableFunction: Debug + Send + Sync {
    fn name(&self) -> &str;
    fn schema(&self, args: &[Value]) -> Result<Schema>;
    fn rows(&self, ctx: &Context, args: &[Value]) -> Result<RowIterator>;
}
