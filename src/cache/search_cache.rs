use super::{CacheKeyIndex, CacheStore};
use crate::search::{SearchFilter, SearchIndex};
use crate::{Result, StoreDocument};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DETAIL_CACHE_PREFIX: &str = "stores:detail:";

/// Read-through cache in front of the search index.
///
/// Every cached page is recorded in the reverse index under each store it
/// contains, so an update to that store can evict exactly those pages.
pub struct SearchCache {
    index: Arc<dyn SearchIndex>,
    cache: Arc<dyn CacheStore>,
    keys: Arc<CacheKeyIndex>,
    listing_prefix: String,
    ttl: Duration,
}

impl SearchCache {
    pub fn new(
        index: Arc<dyn SearchIndex>,
        cache: Arc<dyn CacheStore>,
        keys: Arc<CacheKeyIndex>,
        listing_prefix: &str,
        ttl: Duration,
    ) -> Self {
        Self {
            index,
            cache,
            keys,
            listing_prefix: listing_prefix.to_string(),
            ttl,
        }
    }

    pub fn detail_key(store_id: i64) -> String {
        format!("{}{}", DETAIL_CACHE_PREFIX, store_id)
    }

    async fn cached<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.cache.get(key).await? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    warn!("Dropping undecodable cache entry '{}': {}", key, e);
                    self.cache.delete(key).await?;
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    pub async fn search(&self, filter: &SearchFilter) -> Result<Vec<StoreDocument>> {
        let key = filter.cache_key(&self.listing_prefix);
        if let Some(hit) = self.cached(&key).await? {
            debug!("Cache hit for '{}'", key);
            return Ok(hit);
        }

        let results = self.index.query(filter).await?;
        // Recorded before the write so an eviction racing with us still finds the key.
        for doc in &results {
            self.keys.record(doc.store_id, &key);
        }
        self.cache.set(&key, serde_json::to_string(&results)?, self.ttl).await?;
        Ok(results)
    }

    pub async fn store_detail(&self, store_id: i64) -> Result<Option<StoreDocument>> {
        let key = Self::detail_key(store_id);
        if let Some(hit) = self.cached(&key).await? {
            return Ok(Some(hit));
        }

        let document = self.index.get(store_id).await?;
        if let Some(doc) = &document {
            self.keys.record(store_id, &key);
            self.cache.set(&key, serde_json::to_string(doc)?, self.ttl).await?;
        }
        Ok(document)
    }
}
