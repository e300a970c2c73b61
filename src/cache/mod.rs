pub mod reverse_index;
pub mod search_cache;

pub use reverse_index::*;
pub use search_cache::*;

use crate::{Result, StateStore};
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Key-value cache with per-entry TTL.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<bool>;
    /// Remove every key starting with `prefix`. Returns the number removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize>;
}

#[derive(Debug, Clone)]
struct CachedValue {
    value: String,
    expires_at: Instant,
}

#[derive(Clone, Default)]
pub struct InMemoryCache {
    entries: StateStore<String, CachedValue>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(&key.to_string())
            .map_or(false, |v| v.expires_at > Instant::now())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        match self.entries.get(&key) {
            Some(cached) if cached.expires_at > Instant::now() => Ok(Some(cached.value)),
            Some(_) => {
                self.entries.remove(&key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.entries.put(
            key.to_string(),
            CachedValue {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(&key.to_string()).is_some())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        Ok(self.entries.retain(|key, _| !key.starts_with(prefix)))
    }
}
