use reservation_pipeline::broker::{Broker, HandlerRegistry};
use reservation_pipeline::cache::{CacheKeyIndex, InMemoryCache};
use reservation_pipeline::kafka::KafkaBroker;
use reservation_pipeline::metrics::ops_router;
use reservation_pipeline::pipeline::{DeadLetterReprocessor, IndexSynchronizer};
use reservation_pipeline::search::InMemorySearchIndex;
use reservation_pipeline::{Metrics, Result, ServiceConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

pub struct IndexSyncService {
    config: ServiceConfig,
    broker: Arc<KafkaBroker>,
    metrics: Arc<Metrics>,
    synchronizer: Arc<IndexSynchronizer>,
}

impl IndexSyncService {
    pub fn new(config: ServiceConfig, broker: Arc<KafkaBroker>, metrics: Arc<Metrics>) -> Self {
        let synchronizer = Arc::new(IndexSynchronizer::new(
            Arc::new(InMemorySearchIndex::new()),
            Arc::new(InMemoryCache::new()),
            Arc::new(CacheKeyIndex::new()),
            &config.settings.listing_cache_prefix,
            Arc::clone(&metrics),
        ));

        Self {
            config,
            broker,
            metrics,
            synchronizer,
        }
    }

    /// Bind the synchronizer to its queue and the reprocessor to its dead-letter queue.
    pub async fn start(&self) -> Result<()> {
        let topology = &self.config.topology;

        let mut primary = HandlerRegistry::new();
        primary.register(&topology.index_sync_queue, self.synchronizer.clone());

        let mut handlers = primary.clone();
        handlers.register(
            &topology.index_sync_dlq,
            Arc::new(DeadLetterReprocessor::new(primary, Arc::clone(&self.metrics))),
        );

        handlers.subscribe_all(self.broker.as_ref() as &dyn Broker).await
    }

    pub async fn serve_ops(&self, port: u16) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        info!("Ops endpoints listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, ops_router(Arc::clone(&self.metrics))).await?;
        Ok(())
    }
}
