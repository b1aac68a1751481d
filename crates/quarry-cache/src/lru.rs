//! LRU (Least Recently Used) cache.
//!
//! Entries live in a slab of slots linked into a recency list by index, so
//! get, insert and eviction are all O(1) without any unsafe pointer work.
//! The head of the list is the most recently used entry, the tail the next
//! eviction candidate.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::Mutex;

use crate::stats::{CacheStats, CacheStatsSnapshot};

const NIL: usize = usize::MAX;

struct Slot<K, V> {
    entry: Option<(K, V)>,
    prev: usize,
    next: usize,
}

/// A bounded LRU cache.
///
/// # Example
///
/// ```
/// use quarry_cache::lru::LruCache;
///
/// let mut cache = LruCache::new(2);
/// cache.insert("a", 1);
/// cache.insert("b", 2);
/// assert_eq!(cache.get(&"a"), Some(&1));
///
/// // "b" is now the least recently used entry and makes room for "c".
/// cache.insert("c", 3);
/// assert_eq!(cache.get(&"b"), None);
/// ```
pub struct LruCache<K, V> {
    capacity: usize,
    map: HashMap<K, usize>,
    slots: Vec<Slot<K, V>>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
    stats: CacheStats,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    /// Creates a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            map: HashMap::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
            stats: CacheStats::new(),
        }
    }

    /// Returns the current number of entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the maximum capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Looks up `key` and marks the entry as most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.stats.record_access();

        match self.map.get(key).copied() {
            Some(idx) => {
                self.stats.record_hit();
                self.move_to_front(idx);
                self.slots[idx].entry.as_ref().map(|(_, v)| v)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Looks up `key` without touching recency or statistics.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.slots[idx].entry.as_ref().map(|(_, v)| v)
    }

    /// Checks if the cache contains the given key without updating recency.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Inserts a key-value pair as the most recently used entry.
    ///
    /// Returns the entry that left the cache because of this insert: the
    /// previous pair stored under the same key, or the least recently used
    /// pair when the cache was full.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        self.stats.record_insert();

        if let Some(idx) = self.map.get(&key).copied() {
            self.move_to_front(idx);
            return self.slots[idx].entry.replace((key, value));
        }

        let evicted = if self.map.len() >= self.capacity {
            self.pop_lru()
        } else {
            None
        };

        let idx = self.allocate(key.clone(), value);
        self.push_front(idx);
        self.map.insert(key, idx);

        evicted
    }

    /// Removes an entry from the cache.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = self.map.remove(key)?;
        self.unlink(idx);
        self.free.push(idx);
        self.stats.record_removal();
        self.slots[idx].entry.take().map(|(_, v)| v)
    }

    /// Clears all entries. Statistics are kept.
    pub fn clear(&mut self) {
        self.map.clear();
        self.slots.clear();
        self.free.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    /// Iterates entries from most to least recently used.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        let first = Some(self.head).filter(|&idx| idx != NIL);
        std::iter::successors(first, move |&idx| {
            Some(self.slots[idx].next).filter(|&next| next != NIL)
        })
        .filter_map(move |idx| self.slots[idx].entry.as_ref().map(|(k, v)| (k, v)))
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn allocate(&mut self, key: K, value: V) -> usize {
        let slot = Slot {
            entry: Some((key, value)),
            prev: NIL,
            next: NIL,
        };
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = slot;
                idx
            }
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        }
    }

    fn move_to_front(&mut self, idx: usize) {
        if idx == self.head {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }

    fn push_front(&mut self, idx: usize) {
        self.slots[idx].prev = NIL;
        self.slots[idx].next = self.head;

        if self.head != NIL {
            self.slots[self.head].prev = idx;
        }
        self.head = idx;

        if self.tail == NIL {
            self.tail = idx;
        }
    }

    fn unlink(&mut self, idx: usize) {
        let prev = self.slots[idx].prev;
        let next = self.slots[idx].next;

        if prev != NIL {
            self.slots[prev].next = next;
        } else {
            self.head = next;
        }

        if next != NIL {
            self.slots[next].prev = prev;
        } else {
            self.tail = prev;
        }

        self.slots[idx].prev = NIL;
        self.slots[idx].next = NIL;
    }

    fn pop_lru(&mut self) -> Option<(K, V)> {
        let idx = self.tail;
        if idx == NIL {
            return None;
        }

        self.unlink(idx);
        self.free.push(idx);
        let entry = self.slots[idx].entry.take()?;
        self.map.remove(&entry.0);
        self.stats.record_eviction();
        Some(entry)
    }
}

/// A thread-safe wrapper around [`LruCache`].
///
/// Readers and writers serialize on one mutex; the critical sections are a
/// hash lookup plus a few index swaps. Two threads inserting the same key
/// race benignly: the last insert wins and the size bound still holds.
pub struct SyncLruCache<K, V> {
    inner: Mutex<LruCache<K, V>>,
}

impl<K: Hash + Eq + Clone, V: Clone> SyncLruCache<K, V> {
    /// Creates a new synchronized LRU cache.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Gets a value from the cache, marking it most recently used.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().get(key).cloned()
    }

    /// Inserts a value, returning the entry it pushed out if any.
    pub fn insert(&self, key: K, value: V) -> Option<(K, V)> {
        self.inner.lock().insert(key, value)
    }

    /// Removes a value from the cache.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().remove(key)
    }

    /// Checks membership without updating recency.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().contains(key)
    }

    /// Returns the current size.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns true if empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Returns the capacity bound.
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }

    /// Clears the cache.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Copies the keys from most to least recently used.
    pub fn keys(&self) -> Vec<K> {
        self.inner.lock().iter().map(|(k, _)| k.clone()).collect()
    }

    /// Gets cache statistics.
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.inner.lock().stats().snapshot()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_basic_operations() {
        let mut cache = LruCache::new(3);

        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("c", 3);

        assert_eq!(cache.get(&"a"), Some(&1));
        assert_eq!(cache.get(&"b"), Some(&2));
        assert_eq!(cache.get(&"c"), Some(&3));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_eviction_returns_lru_entry() {
        let mut cache = LruCache::new(2);

        assert_eq!(cache.insert("a", 1), None);
        assert_eq!(cache.insert("b", 2), None);
        assert_eq!(cache.insert("c", 3), Some(("a", 1)));

        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(&2));
        assert_eq!(cache.get(&"c"), Some(&3));
        assert_eq!(cache.stats().evictions(), 1);
    }

    #[test]
    fn test_access_updates_recency() {
        let mut cache = LruCache::new(2);

        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.get(&"a");

        assert_eq!(cache.insert("c", 3), Some(("b", 2)));
        assert_eq!(cache.get(&"a"), Some(&1));
        assert_eq!(cache.get(&"c"), Some(&3));
    }

    #[test]
    fn test_peek_does_not_update_recency() {
        let mut cache = LruCache::new(2);

        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.peek(&"a"), Some(&1));

        assert_eq!(cache.insert("c", 3), Some(("a", 1)));
    }

    #[test]
    fn test_update_existing() {
        let mut cache = LruCache::new(2);

        cache.insert("a", 1);
        let old = cache.insert("a", 10);

        assert_eq!(old, Some(("a", 1)));
        assert_eq!(cache.get(&"a"), Some(&10));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove_reuses_slot() {
        let mut cache = LruCache::new(3);

        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.remove(&"a"), Some(1));
        assert_eq!(cache.remove(&"a"), None);

        cache.insert("c", 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.slots.len(), 2);
        let keys: Vec<_> = cache.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["c", "b"]);
    }

    #[test]
    fn test_clear() {
        let mut cache = LruCache::new(3);

        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.iter().count(), 0);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut cache = LruCache::new(0);
        cache.insert(1, "x");
        cache.insert(2, "y");
        assert_eq!(cache.capacity(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.peek(&2), Some(&"y"));
    }

    #[test]
    fn test_statistics() {
        let mut cache = LruCache::new(2);

        cache.insert("a", 1);
        cache.get(&"a");
        cache.get(&"b");
        cache.insert("b", 2);
        cache.insert("c", 3);

        let stats = cache.stats().snapshot();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.inserts, 3);
        assert_eq!(stats.evictions, 1);
    }

    #[test]
    fn test_sync_cache_concurrent_inserts_stay_bounded() {
        let cache = Arc::new(SyncLruCache::new(16));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        cache.insert(i % 32, t);
                        let _ = cache.get(&(i % 7));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 16);
        assert_eq!(cache.keys().len(), 16);
    }
}
