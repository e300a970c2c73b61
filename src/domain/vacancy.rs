use super::schemas::{current_schema_version, SCHEMA_VERSION};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A seat was freed on `(store_id, date)`; the partition must be re-checked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VacancyEvent {
    #[serde(default = "current_schema_version")]
    pub schema_version: u16,
    pub message_id: Uuid,
    pub store_id: i64,
    pub date: NaiveDate,
}

impl VacancyEvent {
    pub fn new(store_id: i64, date: NaiveDate) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            message_id: Uuid::new_v4(),
            store_id,
            date,
        }
    }
}

/// `Waiting` only ever moves to `Notified`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WaitlistState {
    Waiting,
    Notified,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub entry_id: Uuid,
    pub user_id: i64,
    pub store_id: i64,
    pub date: NaiveDate,
    pub state: WaitlistState,
    pub registered_at: DateTime<Utc>,
}

impl WaitlistEntry {
    pub fn new(user_id: i64, store_id: i64, date: NaiveDate, registered_at: DateTime<Utc>) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            user_id,
            store_id,
            date,
            state: WaitlistState::Waiting,
            registered_at,
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.state == WaitlistState::Waiting
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserContact {
    pub user_id: i64,
    pub name: String,
    pub email: String,
}

/// A waiting entry joined with the contact details needed to notify its owner.
#[derive(Debug, Clone)]
pub struct WaitingParty {
    pub entry: WaitlistEntry,
    pub contact: UserContact,
}
