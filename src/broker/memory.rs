use super::{disposition, Broker, Delivery, Disposition, MessageHandler, QueueSpec, Topology};
use crate::{DeadLetterRecord, Metrics, PipelineError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Debug, Clone)]
struct Pending {
    exchange: String,
    routing_key: String,
    payload: String,
    failures: u32,
}

/// In-process broker with the same routing, redelivery and dead-letter rules as Kafka.
///
/// Nothing runs in the background: `run_until_idle` drains every subscribed queue,
/// which keeps tests deterministic.
pub struct InMemoryBroker {
    topology: Topology,
    queues: DashMap<String, VecDeque<Pending>>,
    handlers: DashMap<String, Arc<dyn MessageHandler>>,
    metrics: Arc<Metrics>,
}

impl InMemoryBroker {
    pub fn new(topology: Topology, metrics: Arc<Metrics>) -> Self {
        let queues = DashMap::new();
        for queue in &topology.queues {
            queues.insert(queue.name.clone(), VecDeque::new());
        }

        Self {
            topology,
            queues,
            handlers: DashMap::new(),
            metrics,
        }
    }

    pub fn queue_depth(&self, queue: &str) -> usize {
        self.queues.get(queue).map(|q| q.len()).unwrap_or(0)
    }

    /// Payloads waiting in `queue`, oldest first.
    pub fn pending_payloads(&self, queue: &str) -> Vec<String> {
        self.queues
            .get(queue)
            .map(|q| q.iter().map(|p| p.payload.clone()).collect())
            .unwrap_or_default()
    }

    fn route(&self, exchange: &str, routing_key: &str, payload: &str) -> Result<usize> {
        let spec = self
            .topology
            .exchange(exchange)
            .ok_or_else(|| PipelineError::InvalidArgument(format!("Unknown exchange: {}", exchange)))?;

        let mut routed = 0;
        for queue in self.topology.route(spec, routing_key) {
            if let Some(mut pending) = self.queues.get_mut(&queue.name) {
                pending.push_back(Pending {
                    exchange: exchange.to_string(),
                    routing_key: routing_key.to_string(),
                    payload: payload.to_string(),
                    failures: 0,
                });
                routed += 1;
            }
        }

        if routed == 0 {
            warn!("Message on '{}' with key '{}' matched no queue", exchange, routing_key);
        }
        Ok(routed)
    }

    fn dead_letter(&self, spec: &QueueSpec, pending: &Pending, failure_count: u32, error: &PipelineError) {
        let Some(dlq) = &spec.dead_letter_queue else {
            error!(
                "Discarding message from '{}' after {} failures, no dead-letter queue: {}",
                spec.name, failure_count, error
            );
            return;
        };

        let record = DeadLetterRecord::new(
            &spec.name,
            &pending.exchange,
            &pending.routing_key,
            &pending.payload,
            failure_count,
            &error.to_string(),
        );

        let routed = serde_json::to_string(&record)
            .map_err(PipelineError::from)
            .and_then(|payload| self.route(&self.topology.dead_letter_exchange, &spec.name, &payload));

        match routed {
            Ok(_) => {
                self.metrics.dead_lettered.inc();
                error!(
                    "Moved message from '{}' to '{}' after {} failures: {}",
                    spec.name, dlq, failure_count, error
                );
            }
            Err(e) => error!("Failed to dead-letter message from '{}': {}", spec.name, e),
        }
    }

    /// Deliver the oldest message of `queue`. Returns false when nothing was delivered.
    pub async fn deliver_next(&self, queue: &str) -> Result<bool> {
        let handler = match self.handlers.get(queue) {
            Some(handler) => Arc::clone(handler.value()),
            None => return Ok(false),
        };
        let spec = self
            .topology
            .queue(queue)
            .ok_or_else(|| PipelineError::UnknownQueue(queue.to_string()))?;

        let pending = match self.queues.get_mut(queue).and_then(|mut q| q.pop_front()) {
            Some(pending) => pending,
            None => return Ok(false),
        };

        let delivery = Delivery {
            queue: queue.to_string(),
            exchange: pending.exchange.clone(),
            routing_key: pending.routing_key.clone(),
            payload: pending.payload.clone(),
            attempt: pending.failures + 1,
        };

        match handler.handle(&delivery).await {
            Ok(()) => {
                self.metrics.messages_consumed.inc();
                debug!("'{}' handled message on '{}'", handler.name(), queue);
            }
            Err(e) => {
                self.metrics.handler_failures.inc();
                warn!(
                    "'{}' failed on '{}' (attempt {}): {}",
                    handler.name(),
                    queue,
                    delivery.attempt,
                    e
                );

                match disposition(&e, delivery.attempt, spec.max_deliveries) {
                    Disposition::Redeliver => {
                        self.metrics.redeliveries.inc();
                        if let Some(mut q) = self.queues.get_mut(queue) {
                            q.push_back(Pending {
                                failures: pending.failures + 1,
                                ..pending
                            });
                        }
                    }
                    Disposition::DeadLetter => self.dead_letter(spec, &pending, delivery.attempt, &e),
                }
            }
        }

        Ok(true)
    }

    /// Deliver until every subscribed queue is empty. Returns the number of deliveries.
    pub async fn run_until_idle(&self) -> usize {
        let mut delivered = 0;

        loop {
            let queues: Vec<String> = self.handlers.iter().map(|h| h.key().clone()).collect();
            let mut progressed = false;

            for queue in &queues {
                match self.deliver_next(queue).await {
                    Ok(true) => {
                        delivered += 1;
                        progressed = true;
                    }
                    Ok(false) => {}
                    Err(e) => error!("Delivery on '{}' failed: {}", queue, e),
                }
            }

            if !progressed {
                return delivered;
            }
        }
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, exchange: &str, routing_key: &str, payload: &str) -> Result<()> {
        self.route(exchange, routing_key, payload)?;
        self.metrics.messages_published.inc();
        Ok(())
    }

    async fn subscribe(&self, queue: &str, handler: Arc<dyn MessageHandler>) -> Result<()> {
        if self.topology.queue(queue).is_none() {
            return Err(PipelineError::UnknownQueue(queue.to_string()));
        }
        self.handlers.insert(queue.to_string(), handler);
        Ok(())
    }
}
