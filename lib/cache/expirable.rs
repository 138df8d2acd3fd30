//! A key/value cache that expires as a whole.
//!
//! [`ExpirableCache`] keeps a single flush timer for the entire map. Every observation (read,
//! size query, removal, computation) first checks whether `flush_interval` has elapsed since the
//! last flush; if so the whole map is dropped and the timer restarts. There is no per-entry TTL:
//! all entries inserted within one window disappear together, which keeps related entries
//! consistent in time with one another.
//!
//! The cache is single-owner. Every method that can observe or mutate the map takes `&mut self`,
//! so a compute callback cannot re-enter the cache it is populating.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::hash::Hash;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::cache::clock::{Clock, SystemClock};
use crate::cache::traits::{SyncReadableCache, SyncWritableCache};

/// A time-windowed cache which flushes all of its entries at once.
pub struct ExpirableCache<K, V, C = SystemClock> {
    map: HashMap<K, V>,
    flush_interval: Duration,
    last_flush: Instant,
    clock: C,
}

impl<K: Eq + Hash, V> ExpirableCache<K, V, SystemClock> {
    /// Create an empty cache that flushes every `flush_interval`, using the system clock.
    #[must_use]
    pub fn new(flush_interval: Duration) -> Self {
        Self::with_clock(flush_interval, SystemClock)
    }
}

impl<K: Eq + Hash, V, C: Clock> ExpirableCache<K, V, C> {
    /// Create an empty cache that reads time from `clock`.
    ///
    /// The first window starts now.
    pub fn with_clock(flush_interval: Duration, clock: C) -> Self {
        let last_flush = clock.now();
        Self {
            map: HashMap::new(),
            flush_interval,
            last_flush,
            clock,
        }
    }

    /// The length of one cache window.
    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// Number of live entries. Flushes first if the window has elapsed.
    pub fn len(&mut self) -> usize {
        self.recycle();
        self.map.len()
    }

    /// Returns `true` if there are no live entries.
    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    /// Return the value cached under `key`, computing and caching it if it is absent or the cache
    /// has expired.
    ///
    /// A value that is already present is returned as is, even if it represents "nothing" (for
    /// example a cached `None`); `compute` only runs for keys that have no entry at all.
    pub fn compute_if_expired_or_absent<F>(&mut self, key: K, compute: F) -> V
    where
        F: FnOnce(&K) -> V,
        V: Clone,
    {
        self.recycle();
        match self.map.entry(key) {
            Entry::Occupied(occ) => occ.get().clone(),
            Entry::Vacant(vac) => {
                let value = compute(vac.key());
                vac.insert(value).clone()
            }
        }
    }

    /// Like [`compute_if_expired_or_absent`](Self::compute_if_expired_or_absent), but for
    /// fallible computations.
    ///
    /// If `compute` fails, **nothing is cached** and the error is returned to the caller. The
    /// next call for the same key will run a fresh computation.
    pub fn try_compute_if_expired_or_absent<F, E>(&mut self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce(&K) -> Result<V, E>,
        V: Clone,
    {
        self.recycle();
        match self.map.entry(key) {
            Entry::Occupied(occ) => Ok(occ.get().clone()),
            Entry::Vacant(vac) => {
                let value = compute(vac.key())?;
                Ok(vac.insert(value).clone())
            }
        }
    }

    /// Drop every entry if the current window has elapsed, and start a new window.
    fn recycle(&mut self) {
        let now = self.clock.now();
        if now.saturating_duration_since(self.last_flush) < self.flush_interval {
            return;
        }
        if !self.map.is_empty() {
            trace!(entries = self.map.len(), "flushing expired cache");
        }
        self.last_flush = now;
        self.map.clear();
    }
}

impl<K: Eq + Hash, V: Clone, C: Clock> SyncReadableCache<K, V> for ExpirableCache<K, V, C> {
    fn get(&mut self, key: &K) -> Option<V> {
        self.recycle();
        self.map.get(key).cloned()
    }

    fn contains(&mut self, key: &K) -> bool {
        self.recycle();
        self.map.contains_key(key)
    }
}

impl<K: Eq + Hash, V, C: Clock> SyncWritableCache<K, V> for ExpirableCache<K, V, C> {
    /// Blind insert: does not flush and does not restart the window.
    fn insert(&mut self, key: K, value: V) {
        self.map.insert(key, value);
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        self.recycle();
        self.map.remove(key)
    }

    fn clear(&mut self) {
        self.map.clear();
    }
}

impl<K, V, C> fmt::Debug for ExpirableCache<K, V, C>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpirableCache")
            .field("map", &self.map)
            .field("flush_interval", &self.flush_interval)
            .field("last_flush", &self.last_flush)
            .finish_non_exhaustive()
    }
}
