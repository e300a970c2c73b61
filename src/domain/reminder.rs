use super::schemas::{current_schema_version, SCHEMA_VERSION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ReservationState {
    Confirmed,
    Canceled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub reservation_id: String,
    pub user_id: i64,
    pub store_id: i64,
    pub store_name: String,
    pub reserved_at: DateTime<Utc>,
    pub state: ReservationState,
    /// Shared by the message path and the sweep; set exactly once.
    pub reminder_sent: bool,
}

impl Reservation {
    pub fn remind_at(&self, lead: chrono::Duration) -> DateTime<Utc> {
        self.reserved_at - lead
    }
}

/// Register phase: published when the reservation is made.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReminderIntent {
    #[serde(default = "current_schema_version")]
    pub schema_version: u16,
    pub message_id: Uuid,
    pub reservation_id: String,
    pub user_id: i64,
    pub store_id: i64,
    pub store_name: String,
    pub reserved_at: DateTime<Utc>,
    pub remind_at: DateTime<Utc>,
}

impl ReminderIntent {
    pub fn for_reservation(reservation: &Reservation, lead: chrono::Duration) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            message_id: Uuid::new_v4(),
            reservation_id: reservation.reservation_id.clone(),
            user_id: reservation.user_id,
            store_id: reservation.store_id,
            store_name: reservation.store_name.clone(),
            reserved_at: reservation.reserved_at,
            remind_at: reservation.remind_at(lead),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReminderSource {
    Scheduled,
    Sweep,
}

/// Send phase: the reminder should go out now.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReminderDue {
    #[serde(default = "current_schema_version")]
    pub schema_version: u16,
    pub message_id: Uuid,
    pub reservation_id: String,
    pub user_id: i64,
    pub store_id: i64,
    pub store_name: String,
    pub reserved_at: DateTime<Utc>,
    pub remind_at: DateTime<Utc>,
    pub source: ReminderSource,
}

impl ReminderDue {
    pub fn from_intent(intent: &ReminderIntent) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            message_id: Uuid::new_v4(),
            reservation_id: intent.reservation_id.clone(),
            user_id: intent.user_id,
            store_id: intent.store_id,
            store_name: intent.store_name.clone(),
            reserved_at: intent.reserved_at,
            remind_at: intent.remind_at,
            source: ReminderSource::Scheduled,
        }
    }

    pub fn from_sweep(reservation: &Reservation, lead: chrono::Duration) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            message_id: Uuid::new_v4(),
            reservation_id: reservation.reservation_id.clone(),
            user_id: reservation.user_id,
            store_id: reservation.store_id,
            store_name: reservation.store_name.clone(),
            reserved_at: reservation.reserved_at,
            remind_at: reservation.remind_at(lead),
            source: ReminderSource::Sweep,
        }
    }
}
