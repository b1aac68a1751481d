//! Bounded caches for quarry.
//!
//! The execution layer keeps one mutable shared structure, the compilation
//! cache, and it is built from the pieces in this crate:
//!
//! - **LRU Cache**: least recently used eviction with O(1) get and insert
//! - **Sync LRU Cache**: a mutex-guarded wrapper safe to share across threads
//! - **Cache Stats**: lock-free counters for hits, misses and evictions
//!
//! # Example
//!
//! ```rust
//! use quarry_cache::lru::LruCache;
//!
//! let mut cache = LruCache::new(100);
//! cache.insert("key1", "value1");
//! assert_eq!(cache.get(&"key1"), Some(&"value1"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod lru;
pub mod stats;

pub use lru::{LruCache, SyncLruCache};
pub use stats::{CacheStats, CacheStatsSnapshot};

/// Default capacity of a compilation cache.
pub const DEFAULT_CAPACITY: usize = 100;
