//! Cache statistics for monitoring and debugging.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters for cache operations.
///
/// Counters only ever grow until [`CacheStats::reset`] is called. Use
/// [`CacheStats::snapshot`] to read a consistent-enough copy for reporting.
#[derive(Debug, Default)]
pub struct CacheStats {
    accesses: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
    removals: AtomicU64,
}

/// A point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    /// Total lookups.
    pub accesses: u64,
    /// Lookups that found an entry.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Insertions, including overwrites.
    pub inserts: u64,
    /// Entries dropped to respect the capacity bound.
    pub evictions: u64,
    /// Entries removed explicitly.
    pub removals: u64,
}

impl CacheStatsSnapshot {
    /// Returns the hit ratio (0.0 to 1.0).
    pub fn hit_ratio(&self) -> f64 {
        if self.accesses == 0 {
            0.0
        } else {
            self.hits as f64 / self.accesses as f64
        }
    }
}

impl CacheStats {
    /// Creates zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_access(&self) {
        self.accesses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_removal(&self) {
        self.removals.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns cache hits.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Returns cache misses.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Returns evictions.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Copies every counter.
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            accesses: self.accesses.load(Ordering::Relaxed),
            hits: self.hits(),
            misses: self.misses(),
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions(),
            removals: self.removals.load(Ordering::Relaxed),
        }
    }

    /// Resets all counters to zero.
    pub fn reset(&self) {
        for counter in [
            &self.accesses,
            &self.hits,
            &self.misses,
            &self.inserts,
            &self.evictions,
            &self.removals,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl fmt::Display for CacheStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "accesses={} hits={} misses={} hit_ratio={:.2}% inserts={} evictions={}",
            self.accesses,
            self.hits,
            self.misses,
            self.hit_ratio() * 100.0,
            self.inserts,
            self.evictions
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let stats = CacheStats::new();

        stats.record_access();
        stats.record_hit();
        stats.record_access();
        stats.record_miss();
        stats.record_insert();

        let snap = stats.snapshot();
        assert_eq!(snap.accesses, 2);
        assert_eq!(snap.hits, 1);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.inserts, 1);
        assert!((snap.hit_ratio() - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_reset() {
        let stats = CacheStats::new();
        stats.record_access();
        stats.record_eviction();
        stats.reset();

        assert_eq!(stats.snapshot(), CacheStatsSnapshot::default());
    }

    #[test]
    fn test_empty_ratio() {
        assert_eq!(CacheStatsSnapshot::default().hit_ratio(), 0.0);
    }
}
