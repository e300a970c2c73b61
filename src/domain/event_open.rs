use super::schemas::{current_schema_version, SCHEMA_VERSION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitedEvent {
    pub event_id: i64,
    pub store_id: i64,
    pub store_name: String,
    pub open_at: DateTime<Utc>,
    pub announced: bool,
}

/// Broadcast once when a limited event opens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventOpenMessage {
    #[serde(default = "current_schema_version")]
    pub schema_version: u16,
    pub message_id: Uuid,
    pub event_id: i64,
    pub store_id: i64,
    pub store_name: String,
    pub open_at: DateTime<Utc>,
}

impl From<&LimitedEvent> for EventOpenMessage {
    fn from(event: &LimitedEvent) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            message_id: Uuid::new_v4(),
            event_id: event.event_id,
            store_id: event.store_id,
            store_name: event.store_name.clone(),
            open_at: event.open_at,
        }
    }
}
