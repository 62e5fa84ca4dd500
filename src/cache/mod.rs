//! Per-connection state caches
//!
//! Both pieces of shared mutable state the engine keeps, the sticky
//! protocol verdict and the pending MySQL header, live in a
//! [`BoundedStore`]: a capacity-bounded map with least-recently-used
//! eviction. Eviction is a normal event; it only means a connection is
//! classified again from scratch.

mod partial_header;
mod protocol_cache;

pub use partial_header::{PartialHeaderStore, PendingMySqlHeader, PENDING_HEADER_SIZE};
pub use protocol_cache::ProtocolCache;

use lru::LruCache;
use parking_lot::Mutex;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Capacity-bounded associative store with LRU eviction
///
/// Every operation holds the internal lock only for the duration of a
/// single map operation.
#[derive(Debug)]
pub struct BoundedStore<K: Hash + Eq, V> {
    entries: Mutex<LruCache<K, V>>,
    capacity: NonZeroUsize,
    evictions: AtomicU64,
}

impl<K: Hash + Eq, V: Clone> BoundedStore<K, V> {
    /// Create a store holding at most `capacity` entries (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            capacity,
            evictions: AtomicU64::new(0),
        }
    }

    /// Read an entry and mark it most recently used
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.lock().get(key).cloned()
    }

    /// Read an entry without touching its recency
    pub fn peek(&self, key: &K) -> Option<V> {
        self.entries.lock().peek(key).cloned()
    }

    /// Insert or replace an entry, evicting the least recently used one if full
    pub fn put(&self, key: K, value: V) {
        let mut entries = self.entries.lock();
        self.record_eviction(&entries, &key);
        entries.put(key, value);
    }

    /// Insert `value` only if `allow` approves the current entry
    ///
    /// The check and the write happen under one lock. Returns whether the
    /// value was written.
    pub fn put_if<F>(&self, key: K, value: V, allow: F) -> bool
    where
        F: FnOnce(Option<&V>) -> bool,
    {
        let mut entries = self.entries.lock();
        if !allow(entries.peek(&key)) {
            return false;
        }
        self.record_eviction(&entries, &key);
        entries.put(key, value);
        true
    }

    /// Remove an entry and return it
    pub fn take(&self, key: &K) -> Option<V> {
        self.entries.lock().pop(key)
    }

    /// Remove an entry, reporting whether one was present
    pub fn evict(&self, key: &K) -> bool {
        self.take(key).is_some()
    }

    /// Number of entries currently held
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Entries pushed out by capacity pressure since creation
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Remove every entry
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn record_eviction(&self, entries: &LruCache<K, V>, key: &K) {
        if entries.len() == self.capacity.get() && !entries.contains(key) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }
}
