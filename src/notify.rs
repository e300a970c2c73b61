use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Notification {
    SeatVacated {
        user_id: i64,
        email: String,
        store_id: i64,
        date: NaiveDate,
    },
    EventOpened {
        user_id: i64,
        email: String,
        event_id: i64,
        store_id: i64,
        store_name: String,
        open_at: DateTime<Utc>,
    },
    ReservationReminder {
        user_id: i64,
        reservation_id: String,
        store_id: i64,
        store_name: String,
        reserved_at: DateTime<Utc>,
    },
}

impl Notification {
    pub fn user_id(&self) -> i64 {
        match self {
            Self::SeatVacated { user_id, .. }
            | Self::EventOpened { user_id, .. }
            | Self::ReservationReminder { user_id, .. } => *user_id,
        }
    }
}

/// Delivers a notification to its end user (push, mail, ...).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to the log.
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        info!(user_id = notification.user_id(), "Notification: {:?}", notification);
        Ok(())
    }
}

/// Keeps every notification in memory, in dispatch order.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn recipients(&self) -> Vec<i64> {
        self.sent().iter().map(Notification::user_id).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification.clone());
        Ok(())
    }
}
