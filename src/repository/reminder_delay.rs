use crate::{ReminderIntent, Result, StateStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Holding area for reminder intents between registration and `remind_at`.
///
/// Must outlive the consuming process: the register message is acknowledged as
/// soon as the intent is held.
#[async_trait]
pub trait ReminderDelayStore: Send + Sync {
    /// Keep `intent` until it is due. A second intent for the same reservation replaces the first.
    async fn hold(&self, intent: ReminderIntent) -> Result<()>;

    /// Held intents with `remind_at <= now`, earliest first. They stay held until removed.
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<ReminderIntent>>;

    async fn remove(&self, reservation_id: &str) -> Result<()>;

    async fn pending_count(&self) -> Result<usize>;
}

#[derive(Clone, Default)]
pub struct InMemoryReminderDelayStore {
    intents: StateStore<String, ReminderIntent>,
}

impl InMemoryReminderDelayStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReminderDelayStore for InMemoryReminderDelayStore {
    async fn hold(&self, intent: ReminderIntent) -> Result<()> {
        self.intents.put(intent.reservation_id.clone(), intent);
        Ok(())
    }

    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<ReminderIntent>> {
        let mut due: Vec<ReminderIntent> = self
            .intents
            .values()
            .into_iter()
            .filter(|intent| intent.remind_at <= now)
            .collect();
        due.sort_by_key(|intent| intent.remind_at);
        Ok(due)
    }

    async fn remove(&self, reservation_id: &str) -> Result<()> {
        self.intents.remove(&reservation_id.to_string());
        Ok(())
    }

    async fn pending_count(&self) -> Result<usize> {
        Ok(self.intents.len())
    }
}
