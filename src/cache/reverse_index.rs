use crate::StateStore;
use std::collections::HashSet;

/// Entity id -> cache keys whose cached value mentions that entity.
///
/// A lookup aid for targeted eviction, never a source of truth.
#[derive(Clone, Default)]
pub struct CacheKeyIndex {
    keys: StateStore<i64, HashSet<String>>,
}

impl CacheKeyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entity_id: i64, cache_key: &str) {
        self.keys.update(entity_id, |keys| {
            keys.insert(cache_key.to_string());
        });
    }

    pub fn record_all<'a>(&self, entity_id: i64, cache_keys: impl IntoIterator<Item = &'a String>) {
        self.keys.update(entity_id, |keys| {
            keys.extend(cache_keys.into_iter().cloned());
        });
    }

    /// Remove and return the keys for `entity_id` in one atomic step.
    pub fn take(&self, entity_id: i64) -> HashSet<String> {
        self.keys.remove(&entity_id).unwrap_or_default()
    }

    pub fn keys_for(&self, entity_id: i64) -> HashSet<String> {
        self.keys.get(&entity_id).unwrap_or_default()
    }
}
