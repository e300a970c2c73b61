//! Topic-routed publish/subscribe with retry and dead-letter handling.
//!
//! Delivery is at-least-once. Every handler must tolerate seeing the same
//! message twice.

pub mod memory;
pub mod registry;
pub mod topology;

pub use memory::*;
pub use registry::*;
pub use topology::*;

use crate::{PipelineError, Result, SCHEMA_VERSION};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// One delivery of a message to a queue.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    pub payload: String,
    /// 1 on first delivery.
    pub attempt: u32,
}

impl Delivery {
    /// Decode the JSON payload. Any failure is a malformed message.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let value: serde_json::Value =
            serde_json::from_str(&self.payload).map_err(|e| PipelineError::malformed(&self.queue, e))?;

        if let Some(version) = value.get("schema_version").and_then(|v| v.as_u64()) {
            if version > u64::from(SCHEMA_VERSION) {
                return Err(PipelineError::malformed(
                    &self.queue,
                    format!("unsupported schema version {}", version),
                ));
            }
        }

        serde_json::from_value(value).map_err(|e| PipelineError::malformed(&self.queue, e))
    }
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, delivery: &Delivery) -> Result<()>;
    fn name(&self) -> &str;
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Durable publish. Returns once the broker has acknowledged the message.
    async fn publish(&self, exchange: &str, routing_key: &str, payload: &str) -> Result<()>;

    /// Register `handler` as the consumer of `queue`.
    async fn subscribe(&self, queue: &str, handler: Arc<dyn MessageHandler>) -> Result<()>;
}

/// Serialize `value` as JSON and publish it.
pub async fn publish_json<T: Serialize>(
    broker: &dyn Broker,
    exchange: &str,
    routing_key: &str,
    value: &T,
) -> Result<()> {
    let payload = serde_json::to_string(value)?;
    broker.publish(exchange, routing_key, &payload).await
}

/// What to do with a delivery after its handler failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Redeliver,
    DeadLetter,
}

pub fn disposition(error: &PipelineError, attempt: u32, max_deliveries: u32) -> Disposition {
    if error.is_retryable() && attempt < max_deliveries {
        Disposition::Redeliver
    } else {
        Disposition::DeadLetter
    }
}
