use super::schemas::{current_schema_version, MutationKeys, SCHEMA_VERSION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn routing_key(&self) -> &'static str {
        match self {
            Self::Create => MutationKeys::CREATED,
            Self::Update => MutationKeys::UPDATED,
            Self::Delete => MutationKeys::DELETED,
        }
    }
}

/// Full snapshot of a store record as the search index sees it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreDocument {
    pub store_id: i64,
    pub name: String,
    pub category: String,
    pub region: String,
    pub description: String,
}

/// Emitted on every store write. Carries the whole document, never a diff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationEvent {
    #[serde(default = "current_schema_version")]
    pub schema_version: u16,
    pub message_id: Uuid,
    pub entity_id: i64,
    pub operation: Operation,
    /// Monotonic per entity; the store bumps it on every write.
    pub version: u64,
    pub document: Option<StoreDocument>,
    pub produced_at: DateTime<Utc>,
}

impl MutationEvent {
    fn new(entity_id: i64, operation: Operation, version: u64, document: Option<StoreDocument>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            message_id: Uuid::new_v4(),
            entity_id,
            operation,
            version,
            document,
            produced_at: Utc::now(),
        }
    }

    pub fn created(document: StoreDocument, version: u64) -> Self {
        Self::new(document.store_id, Operation::Create, version, Some(document))
    }

    pub fn updated(document: StoreDocument, version: u64) -> Self {
        Self::new(document.store_id, Operation::Update, version, Some(document))
    }

    pub fn deleted(entity_id: i64, version: u64) -> Self {
        Self::new(entity_id, Operation::Delete, version, None)
    }
}
