//! Time sources and the 20-bit LRU clock.
//!
//! Every object remembers when it was last touched as a 20-bit sample of the
//! wall clock in milliseconds. The sample wraps every 2^20 ms (about 17.5
//! minutes), so idle times must be computed with [`idle_time`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Largest value the LRU clock can hold.
pub const LRU_CLOCK_MAX: u32 = (1 << 20) - 1;

/// Number of distinct LRU clock values.
const LRU_CLOCK_RANGE: u32 = 1 << 20;

/// Source of the current time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_ms(&self) -> u64;

    /// Current 20-bit LRU clock sample.
    fn lru_clock(&self) -> u32 {
        lru_clock_from_ms(self.now_ms())
    }
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a test can keep one handle and give the
/// other to a [`Store`](crate::store::Store).
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn advance_ms(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance_ms(secs * 1000);
    }

    pub fn set_ms(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Truncate a millisecond timestamp to the 20-bit LRU clock.
pub fn lru_clock_from_ms(ms: u64) -> u32 {
    (ms & u64::from(LRU_CLOCK_MAX)) as u32
}

/// Milliseconds between `last_accessed` and `current`, across one wrap.
pub fn idle_time(current: u32, last_accessed: u32) -> u32 {
    if current >= last_accessed {
        current - last_accessed
    } else {
        (LRU_CLOCK_RANGE - last_accessed) + current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_truncates_to_20_bits() {
        assert_eq!(lru_clock_from_ms(0), 0);
        assert_eq!(lru_clock_from_ms(u64::from(LRU_CLOCK_MAX)), LRU_CLOCK_MAX);
        assert_eq!(lru_clock_from_ms(1 << 20), 0);
        assert_eq!(lru_clock_from_ms((1 << 20) + 5), 5);
    }

    #[test]
    fn test_idle_time_without_wrap() {
        assert_eq!(idle_time(0, 0), 0);
        assert_eq!(idle_time(100, 40), 60);
        assert_eq!(idle_time(LRU_CLOCK_MAX, 0), LRU_CLOCK_MAX);
        assert_eq!(idle_time(LRU_CLOCK_MAX, LRU_CLOCK_MAX), 0);
    }

    #[test]
    fn test_idle_time_across_wrap() {
        // Touched one tick before the wrap, read right after it.
        assert_eq!(idle_time(0, LRU_CLOCK_MAX), 1);
        assert_eq!(idle_time(9, LRU_CLOCK_MAX - 10), 20);
    }

    #[test]
    fn test_manual_clock_shares_time() {
        let clock = ManualClock::new(1_000);
        let handle = clock.clone();
        handle.advance_secs(2);
        assert_eq!(clock.now_ms(), 3_000);
        clock.set_ms(5);
        assert_eq!(handle.now_ms(), 5);
    }
}
