use super::schemas::{current_schema_version, SCHEMA_VERSION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message that exhausted its deliveries in `source_queue`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeadLetterRecord {
    #[serde(default = "current_schema_version")]
    pub schema_version: u16,
    pub message_id: Uuid,
    pub source_queue: String,
    pub exchange: String,
    pub routing_key: String,
    pub original_payload: String,
    pub failure_count: u32,
    pub last_error: String,
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetterRecord {
    pub fn new(
        source_queue: &str,
        exchange: &str,
        routing_key: &str,
        original_payload: &str,
        failure_count: u32,
        last_error: &str,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            message_id: Uuid::new_v4(),
            source_queue: source_queue.to_string(),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            original_payload: original_payload.to_string(),
            failure_count,
            last_error: last_error.to_string(),
            dead_lettered_at: Utc::now(),
        }
    }
}
