//! Keyspace counters reported by INFO.
//!
//! The engine is single-writer, but the counters are atomics so the
//! connection layer can read them without taking the store lock.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters for one store.
#[derive(Debug, Default)]
pub struct KeyspaceStats {
    /// Live keys in the store.
    keys: AtomicU64,

    /// Reads that found a live key.
    keyspace_hits: AtomicU64,

    /// Reads that found nothing, including expired keys.
    keyspace_misses: AtomicU64,

    /// Keys removed because their TTL passed (lazily or by the sweeper).
    expired_keys: AtomicU64,

    /// Keys removed by an eviction pass.
    evicted_keys: AtomicU64,
}

impl KeyspaceStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.keyspace_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.keyspace_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expired(&self) {
        self.expired_keys.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evicted(&self) {
        self.evicted_keys.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_keys(&self, keys: u64) {
        self.keys.store(keys, Ordering::Relaxed);
    }

    pub fn keys(&self) -> u64 {
        self.keys.load(Ordering::Relaxed)
    }

    pub fn keyspace_hits(&self) -> u64 {
        self.keyspace_hits.load(Ordering::Relaxed)
    }

    pub fn keyspace_misses(&self) -> u64 {
        self.keyspace_misses.load(Ordering::Relaxed)
    }

    pub fn expired_keys(&self) -> u64 {
        self.expired_keys.load(Ordering::Relaxed)
    }

    pub fn evicted_keys(&self) -> u64 {
        self.evicted_keys.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            keys: self.keys(),
            keyspace_hits: self.keyspace_hits(),
            keyspace_misses: self.keyspace_misses(),
            expired_keys: self.expired_keys(),
            evicted_keys: self.evicted_keys(),
        }
    }
}

/// Plain copy of the counters at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub keys: u64,
    pub keyspace_hits: u64,
    pub keyspace_misses: u64,
    pub expired_keys: u64,
    pub evicted_keys: u64,
}

impl StatsSnapshot {
    /// Render the INFO body.
    ///
    /// `expires` is the number of keys that currently carry a TTL.
    pub fn render_info(&self, expires: usize) -> String {
        let mut out = String::new();
        let _ = write!(
            out,
            "# Keyspace\r\ndb0:keys={},expires={},avg_ttl=0\r\n",
            self.keys, expires
        );
        let _ = write!(
            out,
            "# Stats\r\nkeyspace_hits:{}\r\nkeyspace_misses:{}\r\nexpired_keys:{}\r\nevicted_keys:{}\r\n",
            self.keyspace_hits, self.keyspace_misses, self.expired_keys, self.evicted_keys
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_stats() {
        let stats = KeyspaceStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot {
            keys: 0,
            keyspace_hits: 0,
            keyspace_misses: 0,
            expired_keys: 0,
            evicted_keys: 0,
        });
    }

    #[test]
    fn test_record_operations() {
        let stats = KeyspaceStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_evicted();
        stats.set_keys(7);

        let snap = stats.snapshot();
        assert_eq!(snap.keyspace_hits, 2);
        assert_eq!(snap.keyspace_misses, 1);
        assert_eq!(snap.evicted_keys, 1);
        assert_eq!(snap.keys, 7);
    }

    #[test]
    fn test_render_info() {
        let stats = KeyspaceStats::new();
        stats.set_keys(3);
        stats.record_expired();

        let info = stats.snapshot().render_info(1);
        assert!(info.starts_with("# Keyspace\r\ndb0:keys=3,expires=1,avg_ttl=0\r\n"));
        assert!(info.contains("expired_keys:1\r\n"));
    }
}
