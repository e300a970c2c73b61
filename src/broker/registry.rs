use super::{Broker, Delivery, MessageHandler};
use crate::{PipelineError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Startup table mapping queue name to its handler.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, queue: &str, handler: Arc<dyn MessageHandler>) -> &mut Self {
        self.handlers.insert(queue.to_string(), handler);
        self
    }

    pub fn get(&self, queue: &str) -> Option<&Arc<dyn MessageHandler>> {
        self.handlers.get(queue)
    }

    /// Invoke the handler registered for `delivery.queue` directly.
    pub async fn dispatch(&self, delivery: &Delivery) -> Result<()> {
        let handler = self
            .get(&delivery.queue)
            .ok_or_else(|| PipelineError::UnknownQueue(delivery.queue.clone()))?;
        handler.handle(delivery).await
    }

    /// Subscribe every registered handler on `broker`.
    pub async fn subscribe_all(&self, broker: &dyn Broker) -> Result<()> {
        for (queue, handler) in &self.handlers {
            info!("Binding handler '{}' to queue '{}'", handler.name(), queue);
            broker.subscribe(queue, Arc::clone(handler)).await?;
        }
        Ok(())
    }
}
