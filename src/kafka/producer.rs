use crate::{PipelineError, Result};
use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::ClientConfig;
use std::time::Duration;

#[derive(Clone)]
pub struct KafkaProducer {
    producer: FutureProducer,
    ack_timeout: Duration,
}

impl KafkaProducer {
    pub fn new(config: ClientConfig, ack_timeout: Duration) -> Result<Self> {
        let producer: FutureProducer = config.create()?;
        Ok(Self { producer, ack_timeout })
    }

    /// Send one record and wait for the broker acknowledgment, bounded by the ack timeout.
    pub async fn send(&self, topic: &str, key: &str, payload: &str) -> Result<()> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        self.producer
            .send(record, self.ack_timeout)
            .await
            .map_err(|(kafka_err, _)| PipelineError::TransientBroker(format!("{} ({})", kafka_err, topic)))?;

        Ok(())
    }

    pub async fn flush(&self, timeout: Duration) -> Result<()> {
        self.producer.flush(timeout)?;
        Ok(())
    }
}

/// Where a queue worker writes records it produces itself, such as dead letters.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn send_record(&self, topic: &str, key: &str, payload: &str) -> Result<()>;
}

#[async_trait]
impl RecordSink for KafkaProducer {
    async fn send_record(&self, topic: &str, key: &str, payload: &str) -> Result<()> {
        self.send(topic, key, payload).await
    }
}
