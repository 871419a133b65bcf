//! Index drivers
//!
//! Secondary indexes live outside the engine, behind a driver interface.
//! An index maps key tuples to row ids; lookups are sets of row ids that
//! combine algebraically, so the analyzer can merge several indexed
//! predicates into one probe.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Result;
use crate::types::{Row, Value};

/// A set of index entries, combinable with other lookups over the same
/// table. `negated` flips membership against the whole table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lookup {
    rows: BTreeSet<u64>,
    negated: bool,
}

impl Lookup {
    pub fn of(rows: impl IntoIterator<Item = u64>) -> Lookup {
        Lookup {
            rows: rows.into_iter().collect(),
            negated: false,
        }
    }

    pub fn empty() -> Lookup {
        Lookup::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && !self.negated
    }

    /// Whether a row id is part of the lookup.
    pub fn contains(&self, row_id: u64) -> bool {
        self.rows.contains(&row_id) != self.negated
    }

    /// Two lookups merge only when they agree on polarity.
    pub fn is_mergeable(&self, other: &Lookup) -> bool {
        self.negated == other.negated
    }

    pub fn union(&self, other: &Lookup) -> Lookup {
        Lookup {
            rows: self.rows.union(&other.rows).copied().collect(),
            negated: self.negated && other.negated,
        }
    }

    pub fn intersection(&self, other: &Lookup) -> Lookup {
        if self.negated == other.negated {
            Lookup {
                rows: if self.negated {
                    self.rows.union(&other.rows).copied().collect()
                } else {
                    self.rows.intersection(&other.rows).copied().collect()
                },
                negated: self.negated,
            }
        } else {
            let (positive, negative) = if self.negated {
                (other, self)
            } else {
                (self, other)
            };
            Lookup {
                rows: positive
                    .rows
                    .difference(&negative.rows)
                    .copied()
                    .collect(),
                negated: false,
            }
        }
    }

    pub fn difference(&self, other: &Lookup) -> Lookup {
        self.intersection(&other.negate())
    }

    pub fn negate(&self) -> Lookup {
        Lookup {
            rows: self.rows.clone(),
            negated: !self.negated,
        }
    }

    /// Row ids in ascending order, for positive lookups.
    pub fn row_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.rows.iter().copied()
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }
}

/// A secondary index over a table's expressions.
pub trait Index: Send + Sync {
    /// The driver that owns this index.
    fn driver_id(&self) -> &str;
    fn id(&self) -> &str;
    fn database(&self) -> &str;
    fn table(&self) -> &str;
    /// The stringified expressions the index covers, in key order.
    fn expressions(&self) -> Vec<String>;
    /// All row ids whose key equals `key`.
    fn get(&self, key: &[Value]) -> Result<Lookup>;
    fn has(&self, key: &[Value]) -> Result<bool> {
        Ok(!self.get(key)?.is_empty())
    }
}

/// The key/row-id stream a driver consumes when saving an index.
pub type IndexKeyValueIter = Box<dyn Iterator<Item = Result<(Vec<Value>, u64)>> + Send>;

/// A pluggable index backend.
pub trait IndexDriver: Send + Sync {
    fn id(&self) -> &str;
    fn create(
        &self,
        database: &str,
        table: &str,
        id: &str,
        expressions: Vec<String>,
        comment: &str,
    ) -> Result<Arc<dyn Index>>;
    fn load(&self, database: &str, table: &str, serialised: &[u8]) -> Result<Arc<dyn Index>>;
    fn save(&self, ctx: &Context, index: &Arc<dyn Index>, rows: IndexKeyValueIter) -> Result<()>;
    fn delete(&self, index: &Arc<dyn Index>) -> Result<()>;
}

/// The key/row-id pairs a table exposes for index maintenance.
pub type KeyValueIter = Box<dyn Iterator<Item = Result<(Row, u64)>> + Send>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_and_intersection() {
        let a = Lookup::of([1, 2, 3]);
        let b = Lookup::of([2, 3, 4]);
        assert_eq!(a.union(&b), Lookup::of([1, 2, 3, 4]));
        assert_eq!(a.intersection(&b), Lookup::of([2, 3]));
        assert_eq!(a.difference(&b), Lookup::of([1]));
    }

    #[test]
    fn test_negation() {
        let a = Lookup::of([1, 2]);
        let n = a.negate();
        assert!(!n.contains(1));
        assert!(n.contains(5));
        assert!(!a.is_mergeable(&n));
        assert!(a.is_mergeable(&a));
    }

    #[test]
    fn test_intersection_with_negated() {
        let a = Lookup::of([1, 2, 3]);
        let not_b = Lookup::of([2]).negate();
        // a ∩ ¬{2} = {1, 3}
        assert_eq!(a.intersection(&not_b), Lookup::of([1, 3]));
    }
}
