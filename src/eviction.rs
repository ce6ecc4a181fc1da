//! Eviction passes, run when a new key would exceed the key limit.
//!
//! - `simple-first` drops one key.
//! - `allkeys-random` drops `ceil(ratio * limit)` randomly chosen keys.
//! - `allkeys-lru` samples a few keys into a candidate pool and drops the
//!   most idle candidates, `ceil(ratio * limit)` of them.

use rand::seq::index;

use crate::clock::idle_time;
use crate::config::EvictionStrategy;
use crate::store::Store;

/// Keys sampled into the pool per LRU pass.
pub const EVICTION_SAMPLE_SIZE: usize = 5;

/// Most candidates the LRU pool holds at once.
pub const EVICTION_POOL_SIZE: usize = 16;

/// A key considered for LRU eviction, with its clock at sampling time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolItem {
    pub key: String,
    pub last_accessed_at: u32,
}

/// Bounded set of LRU eviction candidates.
#[derive(Debug)]
pub struct EvictionPool {
    items: Vec<PoolItem>,
    capacity: usize,
}

impl EvictionPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add a candidate, or refresh its clock if it is already pooled.
    ///
    /// A full pool gives up its freshest candidate, but only to one that has
    /// been idle longer.
    pub fn push(&mut self, key: String, last_accessed_at: u32, now: u32) {
        if let Some(item) = self.items.iter_mut().find(|item| item.key == key) {
            item.last_accessed_at = last_accessed_at;
            return;
        }

        if self.items.len() >= self.capacity {
            let freshest = self
                .items
                .iter()
                .enumerate()
                .min_by_key(|(_, item)| idle_time(now, item.last_accessed_at));
            match freshest {
                Some((idx, item))
                    if idle_time(now, last_accessed_at) > idle_time(now, item.last_accessed_at) =>
                {
                    self.items.swap_remove(idx);
                }
                _ => return,
            }
        }

        self.items.push(PoolItem {
            key,
            last_accessed_at,
        });
    }

    /// Keep only the candidates for which `keep` returns true.
    pub fn retain(&mut self, keep: impl FnMut(&PoolItem) -> bool) {
        self.items.retain(keep);
    }

    /// Remove and return the candidate with the largest idle time.
    pub fn pop(&mut self, now: u32) -> Option<PoolItem> {
        let idx = self
            .items
            .iter()
            .enumerate()
            .max_by_key(|(_, item)| idle_time(now, item.last_accessed_at))
            .map(|(idx, _)| idx)?;
        Some(self.items.swap_remove(idx))
    }
}

/// Run one eviction pass with the store's configured strategy.
///
/// Returns the number of keys removed.
pub fn evict(store: &mut Store) -> usize {
    let strategy = store.config().get_eviction_strategy();
    let evicted = match strategy {
        EvictionStrategy::SimpleFirst => evict_first(store),
        EvictionStrategy::AllKeysRandom => evict_all_keys_random(store),
        EvictionStrategy::AllKeysLru => evict_all_keys_lru(store),
    };
    tracing::debug!(%strategy, evicted, keys = store.len(), "eviction pass");
    evicted
}

/// Drop a single key, whichever the map yields first.
pub fn evict_first(store: &mut Store) -> usize {
    let Some(key) = store.entries().keys().next().cloned() else {
        return 0;
    };
    usize::from(store.delete_evicted(&key))
}

/// Drop `ceil(ratio * limit)` distinct keys picked uniformly at random.
pub fn evict_all_keys_random(store: &mut Store) -> usize {
    let len = store.len();
    let amount = store.config().eviction_count().min(len);
    if amount == 0 {
        return 0;
    }

    let mut rng = rand::rng();
    let victims: Vec<String> = index::sample(&mut rng, len, amount)
        .into_iter()
        .filter_map(|idx| store.entries().get_index(idx).map(|(key, _)| key.clone()))
        .collect();

    victims
        .iter()
        .filter(|key| store.delete_evicted(key))
        .count()
}

/// Sample up to [`EVICTION_SAMPLE_SIZE`] random keys into the pool.
pub fn populate_eviction_pool(store: &mut Store) {
    let len = store.len();
    let amount = EVICTION_SAMPLE_SIZE.min(len);
    if amount == 0 {
        return;
    }

    let mut rng = rand::rng();
    let sampled: Vec<(String, u32)> = index::sample(&mut rng, len, amount)
        .into_iter()
        .filter_map(|idx| {
            store
                .entries()
                .get_index(idx)
                .map(|(key, obj)| (key.clone(), obj.last_accessed_at()))
        })
        .collect();

    let now = store.lru_clock();
    let pool = store.pool_mut();
    for (key, last_accessed_at) in sampled {
        pool.push(key, last_accessed_at, now);
    }
}

/// Refill the pool, then drop the most idle candidates until
/// `ceil(ratio * limit)` keys are gone or the pool runs dry.
///
/// Candidates whose key has since been deleted are dropped before sampling,
/// so they cannot crowd fresh samples out of a full pool. A candidate whose
/// key was touched or replaced since it was pooled is put back with its
/// current clock instead of being evicted.
pub fn evict_all_keys_lru(store: &mut Store) -> usize {
    store.prune_eviction_pool();
    populate_eviction_pool(store);

    let target = store.config().eviction_count();
    let now = store.lru_clock();
    let mut evicted = 0;

    while evicted < target {
        let Some(candidate) = store.pool_mut().pop(now) else {
            break;
        };

        let current = store
            .entries()
            .get(&candidate.key)
            .map(|obj| obj.last_accessed_at());
        match current {
            None => continue,
            Some(clock) if clock != candidate.last_accessed_at => {
                store.pool_mut().push(candidate.key, clock, now);
            }
            Some(_) => {
                if store.delete_evicted(&candidate.key) {
                    evicted += 1;
                }
            }
        }
    }

    evicted
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::{ManualClock, LRU_CLOCK_MAX};
    use crate::config::Config;
    use crate::object::Obj;

    fn lru_store(limit: usize, ratio: f64) -> (Store, ManualClock) {
        let config = Config::new()
            .keys_limit(limit)
            .eviction_strategy(EvictionStrategy::AllKeysLru)
            .eviction_ratio(ratio)
            .build();
        let clock = ManualClock::new(0);
        (Store::with_clock(config, Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_pool_pops_most_idle() {
        let mut pool = EvictionPool::new(4);
        pool.push("a".into(), 90, 100);
        pool.push("b".into(), 10, 100);
        pool.push("c".into(), 50, 100);

        assert_eq!(pool.pop(100).map(|item| item.key), Some("b".to_string()));
        assert_eq!(pool.pop(100).map(|item| item.key), Some("c".to_string()));
        assert_eq!(pool.pop(100).map(|item| item.key), Some("a".to_string()));
        assert!(pool.pop(100).is_none());
    }

    #[test]
    fn test_pool_refreshes_existing_key() {
        let mut pool = EvictionPool::new(4);
        pool.push("a".into(), 10, 100);
        pool.push("a".into(), 95, 100);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.pop(100).map(|item| item.last_accessed_at), Some(95));
    }

    #[test]
    fn test_full_pool_keeps_most_idle() {
        let mut pool = EvictionPool::new(2);
        pool.push("a".into(), 10, 100);
        pool.push("b".into(), 80, 100);

        // Fresher than everything pooled; ignored.
        pool.push("c".into(), 99, 100);
        assert_eq!(pool.len(), 2);

        // More idle than "b"; replaces it.
        pool.push("d".into(), 0, 100);
        let mut keys: Vec<String> = std::iter::from_fn(|| pool.pop(100))
            .map(|item| item.key)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "d".to_string()]);
    }

    #[test]
    fn test_lru_evicts_least_recently_used() {
        let (mut store, clock) = lru_store(10, 0.1);
        clock.set_ms(1_000);
        store.put("old", Obj::from_string("v"));
        for i in 0..4 {
            clock.advance_ms(100);
            store.put(format!("k{}", i), Obj::from_string("v"));
        }

        // Five keys: the sample covers all of them.
        assert_eq!(evict_all_keys_lru(&mut store), 1);
        assert!(store.get("old").is_none());
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn test_lru_respects_recent_access() {
        let (mut store, clock) = lru_store(10, 0.1);
        clock.set_ms(1_000);
        store.put("a", Obj::from_string("v"));
        clock.advance_ms(100);
        store.put("b", Obj::from_string("v"));
        clock.advance_ms(100);
        let _ = store.get("a");

        assert_eq!(evict_all_keys_lru(&mut store), 1);
        assert!(store.entries().contains_key("a"));
        assert!(!store.entries().contains_key("b"));
    }

    #[test]
    fn test_lru_idle_time_across_clock_wrap() {
        let (mut store, clock) = lru_store(10, 0.1);
        clock.set_ms(u64::from(LRU_CLOCK_MAX) - 5);
        store.put("before_wrap", Obj::from_string("v"));

        clock.set_ms((1 << 20) + 10);
        for i in 0..3 {
            store.put(format!("after{}", i), Obj::from_string("v"));
        }

        clock.set_ms((1 << 20) + 20);
        assert_eq!(evict_all_keys_lru(&mut store), 1);
        assert!(!store.entries().contains_key("before_wrap"));
    }

    #[test]
    fn test_lru_uses_current_clock_of_pooled_key() {
        let (mut store, clock) = lru_store(10, 0.1);
        clock.set_ms(1_000);
        store.put("a", Obj::from_string("v"));
        clock.advance_ms(100);
        store.put("b", Obj::from_string("v"));

        populate_eviction_pool(&mut store);
        clock.advance_ms(100);
        let _ = store.get("a");

        // "a" was pooled as the most idle but has since been read.
        assert_eq!(evict_all_keys_lru(&mut store), 1);
        assert!(store.entries().contains_key("a"));
    }

    #[test]
    fn test_lru_drops_deleted_candidates_before_sampling() {
        let (mut store, clock) = lru_store(16, 0.01);
        clock.set_ms(1_000);
        for i in 0..16 {
            store.put(format!("old{}", i), Obj::from_string("v"));
        }
        for _ in 0..1_000 {
            if store.pool_mut().len() == EVICTION_POOL_SIZE {
                break;
            }
            populate_eviction_pool(&mut store);
        }
        assert_eq!(store.pool_mut().len(), EVICTION_POOL_SIZE);

        for i in 0..16 {
            assert!(store.del(&format!("old{}", i)));
        }
        clock.advance_ms(10_000);
        for i in 0..16 {
            store.put(format!("new{}", i), Obj::from_string("v"));
        }
        assert_eq!(store.len(), 16);

        assert_eq!(evict_all_keys_lru(&mut store), 1);
        assert_eq!(store.len(), 15);
        let now = store.lru_clock();
        while let Some(item) = store.pool_mut().pop(now) {
            assert!(item.key.starts_with("new"), "stale candidate {}", item.key);
        }
    }

    #[test]
    fn test_lru_put_stays_within_limit_after_deletes() {
        let (mut store, clock) = lru_store(16, 0.01);
        clock.set_ms(1_000);
        for i in 0..16 {
            store.put(format!("old{}", i), Obj::from_string("v"));
        }
        for _ in 0..100 {
            populate_eviction_pool(&mut store);
        }
        for i in 0..16 {
            store.del(&format!("old{}", i));
        }

        clock.advance_ms(10_000);
        for i in 0..17 {
            store.put(format!("new{}", i), Obj::from_string("v"));
            assert!(store.len() <= 16, "len {} over limit", store.len());
        }
        assert_eq!(store.len(), 16);
    }

    #[test]
    fn test_pool_retain() {
        let mut pool = EvictionPool::new(4);
        pool.push("a".into(), 10, 100);
        pool.push("b".into(), 20, 100);
        pool.retain(|item| item.key == "b");
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.pop(100).map(|item| item.key), Some("b".to_string()));
    }

    #[test]
    fn test_random_evicts_ratio_of_limit() {
        let config = Config::new()
            .keys_limit(10)
            .eviction_strategy(EvictionStrategy::AllKeysRandom)
            .eviction_ratio(0.4)
            .build();
        let mut store = Store::new(config);
        for i in 0..10 {
            store.put(format!("k{}", i), Obj::from_string("v"));
        }

        assert_eq!(evict_all_keys_random(&mut store), 4);
        assert_eq!(store.len(), 6);
        assert_eq!(store.stats().evicted_keys(), 4);
    }

    #[test]
    fn test_simple_first_evicts_one() {
        let config = Config::new()
            .keys_limit(2)
            .eviction_strategy(EvictionStrategy::SimpleFirst)
            .build();
        let mut store = Store::new(config);
        store.put("a", Obj::from_string("1"));
        store.put("b", Obj::from_string("2"));

        assert_eq!(evict_first(&mut store), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_evict_on_empty_store() {
        let mut store = Store::default();
        assert_eq!(evict_first(&mut store), 0);
        assert_eq!(evict_all_keys_random(&mut store), 0);
        assert_eq!(evict_all_keys_lru(&mut store), 0);
    }
}
