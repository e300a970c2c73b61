use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;

/// Concurrent keyed state shared by the in-memory collaborators.
///
/// Closures passed to `update`/`modify` run while the key's shard is locked,
/// which makes read-check-write sequences on a single key atomic.
pub struct StateStore<K, V> {
    data: Arc<DashMap<K, V>>,
}

impl<K, V> StateStore<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            data: Arc::new(DashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.data.get(key).map(|entry| entry.value().clone())
    }

    pub fn put(&self, key: K, value: V) {
        self.data.insert(key, value);
    }

    /// Insert only when the key is vacant. Returns true if inserted.
    pub fn insert_if_absent(&self, key: K, value: V) -> bool {
        match self.data.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(value);
                true
            }
        }
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.data.remove(key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.data.contains_key(key)
    }

    /// Apply `f` to the value at `key`, creating it from `Default` first if needed.
    pub fn update<R>(&self, key: K, f: impl FnOnce(&mut V) -> R) -> R
    where
        V: Default,
    {
        let mut entry = self.data.entry(key).or_default();
        f(entry.value_mut())
    }

    /// Apply `f` to an existing value. Returns None when the key is absent.
    pub fn modify<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        self.data.get_mut(key).map(|mut entry| f(entry.value_mut()))
    }

    /// Keep only the entries for which `f` returns true. Returns how many were dropped.
    pub fn retain(&self, mut f: impl FnMut(&K, &V) -> bool) -> usize {
        let mut dropped = 0;
        self.data.retain(|k, v| {
            let keep = f(k, &*v);
            if !keep {
                dropped += 1;
            }
            keep
        });
        dropped
    }

    pub fn values(&self) -> Vec<V> {
        self.data.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<K, V> Default for StateStore<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for StateStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}
