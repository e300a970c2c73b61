use crate::broker::{Delivery, HandlerRegistry, MessageHandler};
use crate::{DeadLetterRecord, Metrics, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

/// Gives each dead-lettered message one more run through the handler of the
/// queue it failed in. A second failure is final and left for an operator.
pub struct DeadLetterReprocessor {
    handlers: HandlerRegistry,
    metrics: Arc<Metrics>,
}

impl DeadLetterReprocessor {
    /// `handlers` maps source queue names to the handlers that originally consumed them.
    pub fn new(handlers: HandlerRegistry, metrics: Arc<Metrics>) -> Self {
        Self { handlers, metrics }
    }

    pub async fn reprocess(&self, record: &DeadLetterRecord) -> Result<()> {
        let delivery = Delivery {
            queue: record.source_queue.clone(),
            exchange: record.exchange.clone(),
            routing_key: record.routing_key.clone(),
            payload: record.original_payload.clone(),
            attempt: record.failure_count + 1,
        };

        self.handlers.dispatch(&delivery).await
    }
}

#[async_trait]
impl MessageHandler for DeadLetterReprocessor {
    async fn handle(&self, delivery: &Delivery) -> Result<()> {
        let record: DeadLetterRecord = match delivery.decode() {
            Ok(record) => record,
            Err(e) => {
                self.metrics.dead_letters_abandoned.inc();
                error!("Unreadable dead letter on '{}', dropping: {}", delivery.queue, e);
                return Ok(());
            }
        };

        match self.reprocess(&record).await {
            Ok(()) => {
                self.metrics.dead_letters_reprocessed.inc();
                info!(
                    "Recovered dead letter {} from '{}' after {} failures",
                    record.message_id, record.source_queue, record.failure_count
                );
            }
            Err(e) => {
                self.metrics.dead_letters_abandoned.inc();
                error!(
                    "Dead letter {} from '{}' failed again, needs manual intervention: {} (payload: {})",
                    record.message_id, record.source_queue, e, record.original_payload
                );
            }
        }

        // Never hand the message back to the broker.
        Ok(())
    }

    fn name(&self) -> &str {
        "dead-letter-reprocessor"
    }
}
