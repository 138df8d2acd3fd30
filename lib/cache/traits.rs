use std::hash::Hash;

/// Read access to a synchronous cache.
///
/// Reads take `&mut self`: an expiring cache may flush itself on observation.
pub trait SyncReadableCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Get a clone of the value cached under `key`, if any.
    fn get(&mut self, key: &K) -> Option<V>;

    /// Whether `key` currently has a cached value.
    fn contains(&mut self, key: &K) -> bool;
}

/// Write access to a synchronous cache.
pub trait SyncWritableCache<K, V>
where
    K: Eq + Hash,
{
    /// Insert `value` under `key`, overwriting any existing entry.
    fn insert(&mut self, key: K, value: V);

    /// Remove the entry for `key`, returning its value if one was cached.
    fn remove(&mut self, key: &K) -> Option<V>;

    /// Drop every entry.
    fn clear(&mut self);
}
