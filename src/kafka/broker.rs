use super::{KafkaConsumer, KafkaMessage, KafkaProducer, RecordSink};
use crate::broker::{disposition, Broker, Delivery, Disposition, ExchangeKind, ExchangeSpec, MessageHandler, QueueSpec, Topology};
use crate::retry::{retry_kafka_operation, RetryConfig};
use crate::{DeadLetterRecord, Metrics, PipelineError, Result, ServiceConfig};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Kafka topic carrying messages published to `exchange` with `routing_key`.
///
/// Direct exchanges get one topic per key; fanout exchanges are a single topic
/// that every bound queue reads with its own consumer group.
pub fn kafka_topic(exchange: &ExchangeSpec, routing_key: &str) -> String {
    match exchange.kind {
        ExchangeKind::Direct => format!("{}.{}", exchange.name, routing_key),
        ExchangeKind::Fanout => exchange.name.clone(),
    }
}

/// Topics a queue reads, each mapped back to the (exchange, routing key) it represents.
pub fn queue_topics(topology: &Topology, queue: &QueueSpec) -> Result<HashMap<String, (String, String)>> {
    let exchange = topology
        .exchange(&queue.exchange)
        .ok_or_else(|| PipelineError::InvalidArgument(format!("Unknown exchange: {}", queue.exchange)))?;

    let topics = match exchange.kind {
        ExchangeKind::Direct => queue
            .routing_keys
            .iter()
            .map(|key| (kafka_topic(exchange, key), (exchange.name.clone(), key.clone())))
            .collect(),
        ExchangeKind::Fanout => {
            HashMap::from([(exchange.name.clone(), (exchange.name.clone(), String::new()))])
        }
    };

    Ok(topics)
}

pub struct KafkaBroker {
    config: ServiceConfig,
    topology: Topology,
    producer: KafkaProducer,
    metrics: Arc<Metrics>,
    shutdown_tx: broadcast::Sender<()>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl KafkaBroker {
    pub fn new(config: ServiceConfig, metrics: Arc<Metrics>) -> Result<Self> {
        let topology = Topology::from_config(&config.topology, &config.settings);
        let producer = KafkaProducer::new(config.to_producer_config(), config.settings.ack_timeout())?;
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            topology,
            producer,
            metrics,
            shutdown_tx,
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Stop every queue worker and flush pending publishes.
    pub async fn shutdown(&self) -> Result<()> {
        let _ = self.shutdown_tx.send(());

        let mut workers = self.workers.lock().await;
        for worker in workers.drain(..) {
            if let Err(e) = worker.await {
                error!("Queue worker ended abnormally: {}", e);
            }
        }

        self.producer.flush(Duration::from_secs(10)).await
    }
}

#[async_trait]
impl Broker for KafkaBroker {
    async fn publish(&self, exchange: &str, routing_key: &str, payload: &str) -> Result<()> {
        let spec = self
            .topology
            .exchange(exchange)
            .ok_or_else(|| PipelineError::InvalidArgument(format!("Unknown exchange: {}", exchange)))?;

        let topic = kafka_topic(spec, routing_key);
        let producer = &self.producer;
        let topic_ref = topic.as_str();

        retry_kafka_operation("publish", move || {
            producer.send(topic_ref, routing_key, payload)
        })
        .await?;

        self.metrics.messages_published.inc();
        debug!("Published to '{}'", topic);
        Ok(())
    }

    async fn subscribe(&self, queue: &str, handler: Arc<dyn MessageHandler>) -> Result<()> {
        let spec = self
            .topology
            .queue(queue)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownQueue(queue.to_string()))?;

        let routes = queue_topics(&self.topology, &spec)?;
        let consumer = KafkaConsumer::new(self.config.to_consumer_config(queue))?;
        let topics: Vec<&str> = routes.keys().map(String::as_str).collect();
        consumer.subscribe(&topics)?;

        info!("Queue '{}' consuming topics {:?}", queue, topics);

        let worker = QueueWorker {
            retry: RetryConfig::redelivery(spec.max_deliveries),
            spec,
            routes,
            consumer,
            handler,
            producer: self.producer.clone(),
            dead_letter_exchange: self.topology.dead_letter_exchange.clone(),
            metrics: Arc::clone(&self.metrics),
        };

        let shutdown_rx = self.shutdown_tx.subscribe();
        self.workers.lock().await.push(tokio::spawn(worker.run(shutdown_rx)));
        Ok(())
    }
}

/// Consumes one queue. Failed messages are redelivered in place with backoff,
/// then dead-lettered; the offset is committed once the message is settled.
struct QueueWorker {
    spec: QueueSpec,
    routes: HashMap<String, (String, String)>,
    consumer: KafkaConsumer,
    handler: Arc<dyn MessageHandler>,
    producer: KafkaProducer,
    dead_letter_exchange: String,
    retry: RetryConfig,
    metrics: Arc<Metrics>,
}

impl QueueWorker {
    async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!("Worker '{}' started on '{}'", self.handler.name(), self.spec.name);

        loop {
            let received = tokio::select! {
                _ = shutdown.recv() => {
                    info!("Worker on '{}' received shutdown signal", self.spec.name);
                    break;
                }
                received = self.consumer.recv_message(Duration::from_millis(500)) => received,
            };

            match received {
                Ok(Some(message)) => {
                    if !self.process(message, &mut shutdown).await {
                        // Commits are cumulative: reading past the record would lose it.
                        warn!("Worker on '{}' stopped with an unsettled message", self.spec.name);
                        break;
                    }
                }
                Ok(None) => continue,
                Err(e) => {
                    error!("Receive failed on '{}': {}", self.spec.name, e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Handle one record. Returns false when it could not be settled.
    async fn process(&self, message: KafkaMessage, shutdown: &mut broadcast::Receiver<()>) -> bool {
        let (exchange, routing_key) = self
            .routes
            .get(&message.topic)
            .cloned()
            .unwrap_or_else(|| (message.topic.clone(), message.key.clone().unwrap_or_default()));

        let mut delivery = Delivery {
            queue: self.spec.name.clone(),
            exchange,
            routing_key,
            payload: message.payload.clone().unwrap_or_default(),
            attempt: 1,
        };

        let settled = loop {
            match self.handler.handle(&delivery).await {
                Ok(()) => {
                    self.metrics.messages_consumed.inc();
                    break true;
                }
                Err(e) => {
                    self.metrics.handler_failures.inc();
                    warn!(
                        "'{}' failed on '{}' (attempt {}): {}",
                        self.handler.name(),
                        self.spec.name,
                        delivery.attempt,
                        e
                    );

                    match disposition(&e, delivery.attempt, self.spec.max_deliveries) {
                        Disposition::Redeliver => {
                            self.metrics.redeliveries.inc();
                            tokio::time::sleep(self.retry.delay_after(delivery.attempt)).await;
                            delivery.attempt += 1;
                        }
                        Disposition::DeadLetter => break self.dead_letter(&delivery, &e, shutdown).await,
                    }
                }
            }
        };

        if settled {
            if let Err(e) = self.consumer.commit_message(&message) {
                error!("Error committing message on '{}': {}", self.spec.name, e);
            }
        }
        settled
    }

    async fn dead_letter(
        &self,
        delivery: &Delivery,
        error: &PipelineError,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> bool {
        let Some(dlq) = &self.spec.dead_letter_queue else {
            error!(
                "Discarding message from '{}' after {} failures, no dead-letter queue: {}",
                self.spec.name, delivery.attempt, error
            );
            return true;
        };

        let record = DeadLetterRecord::new(
            &self.spec.name,
            &delivery.exchange,
            &delivery.routing_key,
            &delivery.payload,
            delivery.attempt,
            &error.to_string(),
        );

        let payload = match serde_json::to_string(&record) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode dead letter from '{}': {}", self.spec.name, e);
                return false;
            }
        };

        let topic = format!("{}.{}", self.dead_letter_exchange, self.spec.name);
        if !deliver_dead_letter(&self.producer, &topic, &self.spec.name, &payload, &self.retry, shutdown).await {
            return false;
        }

        self.metrics.dead_lettered.inc();
        error!(
            "Moved message from '{}' to '{}' after {} failures: {}",
            self.spec.name, dlq, delivery.attempt, error
        );
        true
    }
}

/// Write a dead letter, retrying with backoff until it is accepted.
///
/// Gives up only when shutdown is signalled, returning false. The caller must
/// then leave the source record uncommitted and stop consuming.
pub async fn deliver_dead_letter(
    sink: &dyn RecordSink,
    topic: &str,
    key: &str,
    payload: &str,
    retry: &RetryConfig,
    shutdown: &mut broadcast::Receiver<()>,
) -> bool {
    let mut attempt = 1;

    loop {
        let failure = match sink.send_record(topic, key, payload).await {
            Ok(()) => return true,
            Err(e) => e,
        };

        let delay = retry.delay_after(attempt.min(retry.max_attempts.max(1)));
        warn!(
            "Dead-letter publish to '{}' failed (attempt {}): {}. Retrying in {:?}",
            topic, attempt, failure, delay
        );

        tokio::select! {
            _ = shutdown.recv() => {
                error!("Shutdown while dead-lettering to '{}', leaving the record uncommitted", topic);
                return false;
            }
            _ = tokio::time::sleep(delay) => attempt += 1,
        }
    }
}
