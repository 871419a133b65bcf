//! Prepared-statement cache
//!
//! Post-resolution plans are memoised per session, keyed by the normalised
//! statement text; EXECUTE retrieves the plan and substitutes bound values
//! for its placeholders. DDL against an object invalidates every cached
//! plan that references it.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use crate::plan::{transform_up, Node};

const DEFAULT_CAPACITY: usize = 256;

/// A cached prepared statement.
#[derive(Clone)]
pub struct PreparedPlan {
    pub name: String,
    pub plan: Node,
    pub parameter_count: usize,
}

pub struct PreparedCache {
    cache: Mutex<LruCache<(u32, String), PreparedPlan>>,
}

impl Default for PreparedCache {
    fn default() -> Self {
        PreparedCache::new(DEFAULT_CAPACITY)
    }
}

impl PreparedCache {
    pub fn new(capacity: usize) -> PreparedCache {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("non-zero by construction");
        PreparedCache {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Collapse whitespace and case so textual variants share an entry.
    pub fn normalise(text: &str) -> String {
        text.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    pub fn insert(&self, session_id: u32, text: &str, prepared: PreparedPlan) {
        self.cache
            .lock()
            .put((session_id, Self::normalise(text)), prepared);
    }

    pub fn get(&self, session_id: u32, text: &str) -> Option<PreparedPlan> {
        self.cache
            .lock()
            .get(&(session_id, Self::normalise(text)))
            .cloned()
    }

    /// Look up by statement name rather than text.
    pub fn get_named(&self, session_id: u32, name: &str) -> Option<PreparedPlan> {
        let cache = self.cache.lock();
        cache
            .iter()
            .find(|((sid, _), p)| *sid == session_id && p.name.eq_ignore_ascii_case(name))
            .map(|(_, p)| p.clone())
    }

    pub fn remove_named(&self, session_id: u32, name: &str) -> bool {
        let mut cache = self.cache.lock();
        let key = cache
            .iter()
            .find(|((sid, _), p)| *sid == session_id && p.name.eq_ignore_ascii_case(name))
            .map(|(k, _)| k.clone());
        match key {
            Some(k) => cache.pop(&k).is_some(),
            None => false,
        }
    }

    /// Drop every cached plan that references the given table.
    pub fn invalidate_table(&self, table: &str) {
        let mut cache = self.cache.lock();
        let stale: Vec<(u32, String)> = cache
            .iter()
            .filter(|(_, p)| references_table(&p.plan, table))
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            cache.pop(&key);
        }
    }

    pub fn clear_session(&self, session_id: u32) {
        let mut cache = self.cache.lock();
        let keys: Vec<(u32, String)> = cache
            .iter()
            .filter(|((sid, _), _)| *sid == session_id)
            .map(|(k, _)| k.clone())
            .collect();
        for key in keys {
            cache.pop(&key);
        }
    }
}

fn references_table(plan: &Node, table: &str) -> bool {
    let mut found = false;
    let _ = transform_up(plan, &mut |n| {
        match n {
            Node::ResolvedTable { table: t, .. } if t.name().eq_ignore_ascii_case(table) => {
                found = true;
            }
            Node::UnresolvedTable { name, .. } if name.eq_ignore_ascii_case(table) => {
                found = true;
            }
            _ => {}
        }
        Ok(None)
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepared(name: &str, plan: Node) -> PreparedPlan {
        PreparedPlan {
            name: name.to_string(),
            plan,
            parameter_count: 0,
        }
    }

    #[test]
    fn test_normalised_text_shares_entries() {
        let cache = PreparedCache::default();
        cache.insert(1, "SELECT  * FROM t", prepared("s1", Node::table("t")));
        assert!(cache.get(1, "select * from t").is_some());
        assert!(cache.get(2, "select * from t").is_none());
    }

    #[test]
    fn test_named_lookup_and_removal() {
        let cache = PreparedCache::default();
        cache.insert(1, "SELECT 1", prepared("s1", Node::Nothing));
        assert!(cache.get_named(1, "S1").is_some());
        assert!(cache.remove_named(1, "s1"));
        assert!(cache.get_named(1, "s1").is_none());
        assert!(!cache.remove_named(1, "s1"));
    }

    #[test]
    fn test_ddl_invalidation() {
        let cache = PreparedCache::default();
        cache.insert(1, "SELECT * FROM t", prepared("s1", Node::table("t")));
        cache.insert(1, "SELECT * FROM u", prepared("s2", Node::table("u")));
        cache.invalidate_table("T");
        assert!(cache.get(1, "SELECT * FROM t").is_none());
        assert!(cache.get(1, "SELECT * FROM u").is_some());
    }
}
