//! Active expiration.
//!
//! Lazy expiry on read only reclaims keys somebody asks for. The sweeper
//! runs on a timer and samples TTL-bearing keys, repeating while a large
//! share of each sample turns out to be stale.

use rand::Rng;

use crate::store::Store;

/// Most TTL-bearing keys inspected per sample.
pub const EXPIRE_SAMPLE_LIMIT: usize = 20;

/// Keep sweeping while at least this fraction of a sample was stale.
pub const EXPIRE_STALE_THRESHOLD: f32 = 0.25;

/// Inspect up to [`EXPIRE_SAMPLE_LIMIT`] keys that carry a TTL, delete the
/// stale ones, and return the stale fraction of those inspected.
///
/// Returns 0.0 when nothing was inspected.
pub fn expire_sample(store: &mut Store) -> f32 {
    sample_once(store).0
}

/// Sweep until a sample comes back mostly fresh. Returns the number of keys
/// removed.
pub fn delete_expired_keys(store: &mut Store) -> usize {
    let mut removed = 0;
    loop {
        let (fraction, deleted) = sample_once(store);
        removed += deleted;
        if fraction < EXPIRE_STALE_THRESHOLD {
            break;
        }
    }

    if removed > 0 {
        tracing::debug!(removed, keys = store.len(), "deleted expired keys");
    } else {
        tracing::trace!(keys = store.len(), "no expired keys");
    }
    removed
}

/// Inspect up to [`EXPIRE_SAMPLE_LIMIT`] consecutive expiry index entries
/// from a random offset. Persistent keys are never visited.
fn sample_once(store: &mut Store) -> (f32, usize) {
    let len = store.expires_count();
    if len == 0 {
        return (0.0, 0);
    }

    let now = store.now_ms();
    let start = rand::rng().random_range(0..len);
    let inspected = EXPIRE_SAMPLE_LIMIT.min(len);
    let stale: Vec<String> = (0..inspected)
        .filter_map(|offset| store.expires().get_index((start + offset) % len))
        .filter(|(_, expiry)| expiry.at <= now)
        .map(|(_, expiry)| expiry.key.clone())
        .collect();

    let deleted = stale
        .iter()
        .filter(|key| store.delete_expired(key))
        .count();
    (stale.len() as f32 / inspected as f32, deleted)
}
