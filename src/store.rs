//! The keyspace: key -> object bindings plus the expiry index.
//!
//! This module owns both maps and keeps them consistent. The expiry index is
//! keyed by object identity; whenever a binding is removed or replaced, the
//! old object's expiry entry goes with it, so the index never refers to an
//! object that is no longer reachable. Each expiry entry also records the
//! key its object is bound to, so the sweeper can sample the index directly
//! without walking persistent keys.
//!
//! The store has no internal locking. Callers that share it across tasks
//! must serialize access (the server keeps it behind one mutex).

use std::sync::Arc;

use indexmap::IndexMap;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::eviction::{self, EvictionPool, EVICTION_POOL_SIZE};
use crate::object::{Obj, ObjId};
use crate::stats::KeyspaceStats;

/// Remaining lifetime of a key, as reported by TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// No such key.
    Missing,
    /// The key exists and has no expiry.
    Persistent,
    /// The key had already expired; it has now been removed.
    Expired,
    /// Milliseconds until the key expires.
    Remaining(u64),
}

/// One expiry index entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Expiry {
    /// Absolute expiry, epoch ms.
    pub(crate) at: u64,
    /// Key the object is bound to.
    pub(crate) key: String,
}

/// The engine's keyspace.
#[derive(Debug)]
pub struct Store {
    /// Live bindings. `IndexMap` gives O(1) access by position, which the
    /// samplers use to pick keys without walking the map.
    entries: IndexMap<String, Obj>,

    /// Expiry per object identity. Positional access lets the sweeper
    /// sample it.
    expires: IndexMap<ObjId, Expiry>,

    /// Candidates for approximate LRU eviction.
    pool: EvictionPool,

    config: Config,

    clock: Arc<dyn Clock>,

    stats: Arc<KeyspaceStats>,
}

impl Store {
    /// Create an empty store on the wall clock.
    pub fn new(config: Config) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an empty store on the given time source.
    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: IndexMap::new(),
            expires: IndexMap::new(),
            pool: EvictionPool::new(EVICTION_POOL_SIZE),
            config,
            clock,
            stats: Arc::new(KeyspaceStats::new()),
        }
    }

    /// Bind `key` to `obj`, returning the object's identity.
    ///
    /// When a new key would push the store past its limit, an eviction pass
    /// runs first. Replacing a key drops the old object and its expiry.
    pub fn put(&mut self, key: impl Into<String>, mut obj: Obj) -> ObjId {
        let key = key.into();

        if let Some(limit) = self.keys_limit() {
            if !self.entries.contains_key(&key) {
                while self.entries.len() >= limit {
                    if eviction::evict(self) == 0 && eviction::evict_first(self) == 0 {
                        break;
                    }
                }
            }
        }

        obj.touch(self.clock.lru_clock());
        let id = obj.id();
        if let Some(prev) = self.entries.insert(key, obj) {
            self.expires.swap_remove(&prev.id());
        }
        self.sync_key_count();
        id
    }

    /// Look up a live key and mark it as accessed.
    ///
    /// An expired key is removed here and reported as absent.
    pub fn get(&mut self, key: &str) -> Option<&mut Obj> {
        if !self.reclaim_if_expired(key) {
            self.stats.record_miss();
            return None;
        }

        let lru_clock = self.clock.lru_clock();
        let obj = self.entries.get_mut(key)?;
        obj.touch(lru_clock);
        self.stats.record_hit();
        Some(obj)
    }

    /// Like [`Store::get`], but binds `key` to `default()` when it is absent.
    ///
    /// Counts as a single hit or a single miss.
    pub fn get_or_put(&mut self, key: &str, default: impl FnOnce() -> Obj) -> Option<&mut Obj> {
        if self.reclaim_if_expired(key) {
            return self.get(key);
        }

        self.stats.record_miss();
        self.put(key, default());
        self.entries.get_mut(key)
    }

    /// Remove a key and its expiry. Returns whether the key existed.
    pub fn del(&mut self, key: &str) -> bool {
        match self.entries.swap_remove(key) {
            Some(obj) => {
                self.expires.swap_remove(&obj.id());
                self.sync_key_count();
                true
            }
            None => false,
        }
    }

    /// Expire the object bound to `key` in `relative_ms` milliseconds.
    ///
    /// The entry is keyed by that object's identity, which is returned;
    /// `None` when `key` is not bound. A non-positive delay makes the key
    /// expire immediately.
    pub fn set_expiry(&mut self, key: &str, relative_ms: i64) -> Option<ObjId> {
        let id = self.entries.get(key)?.id();
        let now = self.clock.now_ms() as i64;
        let at = now.saturating_add(relative_ms).max(0) as u64;
        self.expires.insert(
            id,
            Expiry {
                at,
                key: key.to_string(),
            },
        );
        Some(id)
    }

    /// Absolute expiry (epoch ms) of an object, if it has one.
    pub fn expiry_of(&self, id: ObjId) -> Option<u64> {
        self.expires.get(&id).map(|expiry| expiry.at)
    }

    /// Whether the object's expiry has passed.
    pub fn has_expired(&self, obj: &Obj) -> bool {
        self.expiry_of(obj.id())
            .is_some_and(|at| at <= self.clock.now_ms())
    }

    /// Remaining lifetime of `key`. Does not count as an access.
    pub fn ttl(&mut self, key: &str) -> Ttl {
        let Some(obj) = self.entries.get(key) else {
            return Ttl::Missing;
        };
        let Some(at) = self.expiry_of(obj.id()) else {
            return Ttl::Persistent;
        };

        let now = self.clock.now_ms();
        if at <= now {
            self.delete_expired(key);
            return Ttl::Expired;
        }
        Ttl::Remaining(at - now)
    }

    /// Number of keys, including expired ones not yet reclaimed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of keys carrying a TTL.
    pub fn expires_count(&self) -> usize {
        self.expires.len()
    }

    /// Maximum number of keys, `None` when unlimited.
    pub fn keys_limit(&self) -> Option<usize> {
        self.config.keys_limit
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> Arc<KeyspaceStats> {
        Arc::clone(&self.stats)
    }

    /// Current time in epoch milliseconds, from the store's clock.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Current 20-bit LRU clock, from the store's clock.
    pub fn lru_clock(&self) -> u32 {
        self.clock.lru_clock()
    }

    /// Live `(key, value)` pairs, for the snapshot rewrite.
    pub fn snapshot_entries(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .filter(|(_, obj)| !self.has_expired(obj))
            .map(|(key, obj)| (key.clone(), obj.value().to_string()))
            .collect()
    }

    // Crate-internal access for the eviction and expiration passes.

    pub(crate) fn entries(&self) -> &IndexMap<String, Obj> {
        &self.entries
    }

    pub(crate) fn expires(&self) -> &IndexMap<ObjId, Expiry> {
        &self.expires
    }

    pub(crate) fn pool_mut(&mut self) -> &mut EvictionPool {
        &mut self.pool
    }

    /// Drop pool candidates whose key is no longer bound.
    pub(crate) fn prune_eviction_pool(&mut self) {
        let entries = &self.entries;
        self.pool.retain(|item| entries.contains_key(&item.key));
    }

    /// Remove a key on behalf of an eviction pass.
    pub(crate) fn delete_evicted(&mut self, key: &str) -> bool {
        let existed = self.del(key);
        if existed {
            self.stats.record_evicted();
        }
        existed
    }

    /// Remove a key whose TTL has passed.
    pub(crate) fn delete_expired(&mut self, key: &str) -> bool {
        let existed = self.del(key);
        if existed {
            self.stats.record_expired();
        }
        existed
    }

    /// Remove `key` if its TTL has passed. Returns whether a live binding
    /// remains.
    fn reclaim_if_expired(&mut self, key: &str) -> bool {
        let expired = match self.entries.get(key) {
            Some(obj) => self.has_expired(obj),
            None => return false,
        };
        if expired {
            self.delete_expired(key);
        }
        !expired
    }

    fn sync_key_count(&self) {
        self.stats.set_keys(self.entries.len() as u64);
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
