//! Memory manager
//!
//! A central registry of revocable caches. Iterators that materialise rows
//! (aggregation buffers, sort runs, distinct sets) register their cache and
//! report reservations; once the total passes the configured threshold the
//! manager asks every registered cache to dispose. Disposal is cooperative:
//! a cache drops its contents and the owning iterator recomputes or fails.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// A cache that can drop its contents on demand.
pub trait Disposable: Send + Sync {
    fn dispose(&self);
    /// Current size in bytes, best effort.
    fn size(&self) -> u64;
}

/// Registration handle; dropping it unregisters the cache.
pub struct CacheHandle {
    id: u64,
    manager: Arc<MemoryManager>,
}

impl Drop for CacheHandle {
    fn drop(&mut self) {
        self.manager.unregister(self.id);
    }
}

pub struct MemoryManager {
    caches: Mutex<HashMap<u64, Weak<dyn Disposable>>>,
    next_id: AtomicU64,
    /// Byte threshold past which caches are asked to dispose.
    max_memory: AtomicU64,
}

impl MemoryManager {
    pub fn new(max_memory: u64) -> Arc<MemoryManager> {
        Arc::new(MemoryManager {
            caches: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            max_memory: AtomicU64::new(max_memory),
        })
    }

    pub fn set_max_memory(&self, bytes: u64) {
        self.max_memory.store(bytes, Ordering::Relaxed);
    }

    pub fn register(self: &Arc<Self>, cache: Weak<dyn Disposable>) -> CacheHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.caches.lock().insert(id, cache);
        CacheHandle {
            id,
            manager: Arc::clone(self),
        }
    }

    fn unregister(&self, id: u64) {
        self.caches.lock().remove(&id);
    }

    /// Total reported size of all live caches.
    pub fn in_use(&self) -> u64 {
        self.caches
            .lock()
            .values()
            .filter_map(|w| w.upgrade())
            .map(|c| c.size())
            .sum()
    }

    /// Ask every cache to dispose if the threshold has been crossed.
    /// Returns whether disposal ran.
    pub fn maybe_free(&self) -> bool {
        if self.in_use() <= self.max_memory.load(Ordering::Relaxed) {
            return false;
        }
        self.free();
        true
    }

    /// Unconditionally ask every registered cache to dispose.
    pub fn free(&self) {
        let caches: Vec<Arc<dyn Disposable>> = self
            .caches
            .lock()
            .values()
            .filter_map(|w| w.upgrade())
            .collect();
        tracing::debug!(caches = caches.len(), "memory manager disposing caches");
        for cache in caches {
            cache.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    struct TestCache {
        disposed: AtomicBool,
        size: u64,
    }

    impl Disposable for TestCache {
        fn dispose(&self) {
            self.disposed.store(true, Ordering::Relaxed);
        }
        fn size(&self) -> u64 {
            self.size
        }
    }

    #[test]
    fn test_free_runs_past_threshold() {
        let manager = MemoryManager::new(100);
        let cache = Arc::new(TestCache {
            disposed: AtomicBool::new(false),
            size: 200,
        });
        let weak: Weak<dyn Disposable> = Arc::downgrade(&(Arc::clone(&cache) as Arc<dyn Disposable>));
        let _handle = manager.register(weak);

        assert_eq!(manager.in_use(), 200);
        assert!(manager.maybe_free());
        assert!(cache.disposed.load(Ordering::Relaxed));
    }

    #[test]
    fn test_under_threshold_is_left_alone() {
        let manager = MemoryManager::new(1000);
        let cache = Arc::new(TestCache {
            disposed: AtomicBool::new(false),
            size: 10,
        });
        let weak: Weak<dyn Disposable> = Arc::downgrade(&(Arc::clone(&cache) as Arc<dyn Disposable>));
        let _handle = manager.register(weak);

        assert!(!manager.maybe_free());
        assert!(!cache.disposed.load(Ordering::Relaxed));
    }

    #[test]
    fn test_dropping_handle_unregisters() {
        let manager = MemoryManager::new(0);
        let cache = Arc::new(TestCache {
            disposed: AtomicBool::new(false),
            size: 10,
        });
        let weak: Weak<dyn Disposable> = Arc::downgrade(&(Arc::clone(&cache) as Arc<dyn Disposable>));
        let handle = manager.register(weak);
        drop(handle);
        assert_eq!(manager.in_use(), 0);
    }
}
