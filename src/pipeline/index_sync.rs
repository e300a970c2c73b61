//! Keeps the search index and the result cache in step with store writes.
//!
//! Every mutation carries a full snapshot and a per-entity version, so
//! applying events in any order converges on the newest snapshot. The cache
//! is evicted after the index write; a reader in between sees the old page
//! until eviction or TTL, whichever comes first.

use crate::broker::{publish_json, Broker, Delivery, MessageHandler};
use crate::cache::{CacheKeyIndex, CacheStore};
use crate::search::SearchIndex;
use crate::{Metrics, MutationEvent, Operation, PipelineError, Result, TopologyConfig};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct MutationPublisher {
    broker: Arc<dyn Broker>,
    exchange: String,
}

impl MutationPublisher {
    pub fn new(broker: Arc<dyn Broker>, topology: &TopologyConfig) -> Self {
        Self {
            broker,
            exchange: topology.store_mutation_exchange.clone(),
        }
    }

    pub async fn publish(&self, event: &MutationEvent) -> Result<()> {
        publish_json(self.broker.as_ref(), &self.exchange, event.operation.routing_key(), event).await?;
        debug!("Published {:?} for store {} v{}", event.operation, event.entity_id, event.version);
        Ok(())
    }
}

pub struct IndexSynchronizer {
    index: Arc<dyn SearchIndex>,
    cache: Arc<dyn CacheStore>,
    keys: Arc<CacheKeyIndex>,
    listing_prefix: String,
    metrics: Arc<Metrics>,
}

impl IndexSynchronizer {
    pub fn new(
        index: Arc<dyn SearchIndex>,
        cache: Arc<dyn CacheStore>,
        keys: Arc<CacheKeyIndex>,
        listing_prefix: &str,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            index,
            cache,
            keys,
            listing_prefix: listing_prefix.to_string(),
            metrics,
        }
    }

    async fn upsert(&self, event: &MutationEvent) -> Result<bool> {
        let document = event.document.as_ref().ok_or_else(|| {
            PipelineError::malformed("store-mutation", format!("{:?} without a document", event.operation))
        })?;
        if document.store_id != event.entity_id {
            return Err(PipelineError::malformed(
                "store-mutation",
                format!("document id {} does not match entity {}", document.store_id, event.entity_id),
            ));
        }

        let applied = self.index.upsert(document, event.version).await?;
        self.record_index_write(event, applied);
        Ok(applied)
    }

    fn record_index_write(&self, event: &MutationEvent, applied: bool) {
        if applied {
            self.metrics.index_writes.inc();
        } else {
            self.metrics.duplicates_skipped.inc();
            debug!(
                "Store {} v{} is older than the indexed version, skipped",
                event.entity_id, event.version
            );
        }
    }

    /// A new store may belong on any cached listing page, and no page references
    /// it yet, so every listing page goes.
    async fn evict_all_listings(&self) -> Result<usize> {
        let evicted = self.cache.delete_prefix(&self.listing_prefix).await?;
        self.metrics.cache_keys_evicted.inc_by(evicted as f64);
        Ok(evicted)
    }

    /// Evict only the pages known to contain `entity_id`.
    async fn evict_dependents(&self, entity_id: i64) -> Result<usize> {
        let keys: Vec<String> = self.keys.take(entity_id).into_iter().collect();
        let mut evicted = 0;

        for (i, key) in keys.iter().enumerate() {
            if let Err(e) = self.cache.delete(key).await {
                // Put back what is still cached so the retry can find it.
                self.keys.record_all(entity_id, &keys[i..]);
                return Err(e);
            }
            evicted += 1;
        }

        self.metrics.cache_keys_evicted.inc_by(evicted as f64);
        Ok(evicted)
    }

    pub async fn on_created(&self, event: &MutationEvent) -> Result<()> {
        self.upsert(event).await?;
        let evicted = self.evict_all_listings().await?;
        info!("Indexed new store {}, evicted {} listing pages", event.entity_id, evicted);
        Ok(())
    }

    pub async fn on_updated(&self, event: &MutationEvent) -> Result<()> {
        self.upsert(event).await?;
        let evicted = self.evict_dependents(event.entity_id).await?;
        info!("Reindexed store {}, evicted {} cached pages", event.entity_id, evicted);
        Ok(())
    }

    pub async fn on_deleted(&self, entity_id: i64, version: u64) -> Result<()> {
        let applied = self.index.delete(entity_id, version).await?;
        if applied {
            self.metrics.index_writes.inc();
        } else {
            self.metrics.duplicates_skipped.inc();
        }
        let evicted = self.evict_dependents(entity_id).await?;
        info!("Removed store {} from index, evicted {} cached pages", entity_id, evicted);
        Ok(())
    }

    pub async fn apply(&self, event: &MutationEvent) -> Result<()> {
        match event.operation {
            Operation::Create => self.on_created(event).await,
            Operation::Update => self.on_updated(event).await,
            Operation::Delete => self.on_deleted(event.entity_id, event.version).await,
        }
    }
}

#[async_trait]
impl MessageHandler for IndexSynchronizer {
    async fn handle(&self, delivery: &Delivery) -> Result<()> {
        let event: MutationEvent = delivery.decode()?;

        // Failures go back to the broker: retried, then dead-lettered.
        self.apply(&event).await.map_err(|e| {
            error!(
                "Index sync failed for store {} ({:?} v{}): {}",
                event.entity_id, event.operation, event.version, e
            );
            e
        })
    }

    fn name(&self) -> &str {
        "index-synchronizer"
    }
}
