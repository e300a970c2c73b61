use crate::{LimitedEvent, Result, StateStore, UserContact};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn save(&self, event: LimitedEvent) -> Result<()>;

    /// Events whose `open_at` has passed and that were never announced.
    async fn find_opening(&self, now: DateTime<Utc>) -> Result<Vec<LimitedEvent>>;

    /// Atomically mark the event announced. False if it already was.
    async fn claim_announcement(&self, event_id: i64) -> Result<bool>;

    async fn release_announcement(&self, event_id: i64) -> Result<()>;
}

/// Users who asked to hear about a store's limited events.
#[async_trait]
pub trait InterestRegistry: Send + Sync {
    async fn interested_users(&self, store_id: i64) -> Result<Vec<UserContact>>;
}

#[derive(Clone, Default)]
pub struct InMemoryEventRepository {
    events: StateStore<i64, LimitedEvent>,
}

impl InMemoryEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_by_id(&self, event_id: i64) -> Option<LimitedEvent> {
        self.events.get(&event_id)
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn save(&self, event: LimitedEvent) -> Result<()> {
        self.events.put(event.event_id, event);
        Ok(())
    }

    async fn find_opening(&self, now: DateTime<Utc>) -> Result<Vec<LimitedEvent>> {
        let mut opening: Vec<LimitedEvent> = self
            .events
            .values()
            .into_iter()
            .filter(|e| !e.announced && e.open_at <= now)
            .collect();
        opening.sort_by_key(|e| e.open_at);
        Ok(opening)
    }

    async fn claim_announcement(&self, event_id: i64) -> Result<bool> {
        Ok(self
            .events
            .modify(&event_id, |e| !std::mem::replace(&mut e.announced, true))
            .unwrap_or(false))
    }

    async fn release_announcement(&self, event_id: i64) -> Result<()> {
        self.events.modify(&event_id, |e| e.announced = false);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryInterestRegistry {
    interests: StateStore<i64, Vec<UserContact>>,
}

impl InMemoryInterestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_interest(&self, store_id: i64, contact: UserContact) {
        self.interests.update(store_id, |users| {
            if !users.iter().any(|u| u.user_id == contact.user_id) {
                users.push(contact);
            }
        });
    }
}

#[async_trait]
impl InterestRegistry for InMemoryInterestRegistry {
    async fn interested_users(&self, store_id: i64) -> Result<Vec<UserContact>> {
        Ok(self.interests.get(&store_id).unwrap_or_default())
    }
}
