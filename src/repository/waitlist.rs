use crate::{PipelineError, Result, StateStore, UserContact, WaitingParty, WaitlistEntry, WaitlistState};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::warn;
use uuid::Uuid;

#[async_trait]
pub trait WaitlistRepository: Send + Sync {
    /// Insert a `Waiting` entry unless the user is already waiting for the store
    /// or the store already has `capacity` waiting entries. Check and insert are atomic.
    async fn register(
        &self,
        user_id: i64,
        store_id: i64,
        date: NaiveDate,
        registered_at: DateTime<Utc>,
        capacity: usize,
    ) -> Result<WaitlistEntry>;

    /// Waiting entries for the partition joined with their owners' contacts,
    /// oldest registration first.
    async fn find_waiting(&self, store_id: i64, date: NaiveDate) -> Result<Vec<WaitingParty>>;

    /// Take the exclusive right to notify a still-waiting entry. False if the entry
    /// is no longer waiting or another worker holds the lease.
    async fn try_begin_notify(&self, store_id: i64, entry_id: Uuid) -> Result<bool>;

    /// Drop the lease taken by `try_begin_notify`, whatever the outcome.
    async fn end_notify(&self, store_id: i64, entry_id: Uuid) -> Result<()>;

    /// `Waiting -> Notified`, only if the entry is still waiting.
    async fn mark_notified(&self, store_id: i64, entry_id: Uuid) -> Result<bool>;

    async fn count_waiting(&self, store_id: i64) -> Result<usize>;
}

/// Entries are grouped per store so every store-level check runs under one lock.
#[derive(Clone, Default)]
pub struct InMemoryWaitlistRepository {
    entries: StateStore<i64, Vec<WaitlistEntry>>,
    contacts: StateStore<i64, UserContact>,
    leases: StateStore<Uuid, ()>,
}

impl InMemoryWaitlistRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_contact(&self, contact: UserContact) {
        self.contacts.put(contact.user_id, contact);
    }

    pub fn entries_for(&self, store_id: i64) -> Vec<WaitlistEntry> {
        self.entries.get(&store_id).unwrap_or_default()
    }
}

#[async_trait]
impl WaitlistRepository for InMemoryWaitlistRepository {
    async fn register(
        &self,
        user_id: i64,
        store_id: i64,
        date: NaiveDate,
        registered_at: DateTime<Utc>,
        capacity: usize,
    ) -> Result<WaitlistEntry> {
        self.entries.update(store_id, |entries| {
            if entries.iter().any(|e| e.user_id == user_id && e.is_waiting()) {
                return Err(PipelineError::AlreadyWaiting { user_id, store_id });
            }
            if entries.iter().filter(|e| e.is_waiting()).count() >= capacity {
                return Err(PipelineError::WaitlistFull { store_id });
            }

            let entry = WaitlistEntry::new(user_id, store_id, date, registered_at);
            entries.push(entry.clone());
            Ok(entry)
        })
    }

    async fn find_waiting(&self, store_id: i64, date: NaiveDate) -> Result<Vec<WaitingParty>> {
        let mut waiting: Vec<WaitlistEntry> = self
            .entries
            .get(&store_id)
            .unwrap_or_default()
            .into_iter()
            .filter(|e| e.date == date && e.is_waiting())
            .collect();
        waiting.sort_by_key(|e| e.registered_at);

        Ok(waiting
            .into_iter()
            .map(|entry| {
                let contact = self.contacts.get(&entry.user_id).unwrap_or_else(|| {
                    warn!("No contact on file for user {}", entry.user_id);
                    UserContact {
                        user_id: entry.user_id,
                        name: String::new(),
                        email: String::new(),
                    }
                });
                WaitingParty { entry, contact }
            })
            .collect())
    }

    async fn try_begin_notify(&self, store_id: i64, entry_id: Uuid) -> Result<bool> {
        // Checked under the store's lock, so a finished notification cannot slip in between.
        Ok(self
            .entries
            .modify(&store_id, |entries| {
                entries.iter().any(|e| e.entry_id == entry_id && e.is_waiting())
                    && self.leases.insert_if_absent(entry_id, ())
            })
            .unwrap_or(false))
    }

    async fn end_notify(&self, _store_id: i64, entry_id: Uuid) -> Result<()> {
        self.leases.remove(&entry_id);
        Ok(())
    }

    async fn mark_notified(&self, store_id: i64, entry_id: Uuid) -> Result<bool> {
        Ok(self
            .entries
            .modify(&store_id, |entries| {
                match entries.iter_mut().find(|e| e.entry_id == entry_id) {
                    Some(entry) if entry.is_waiting() => {
                        entry.state = WaitlistState::Notified;
                        true
                    }
                    _ => false,
                }
            })
            .unwrap_or(false))
    }

    async fn count_waiting(&self, store_id: i64) -> Result<usize> {
        Ok(self
            .entries
            .get(&store_id)
            .map_or(0, |entries| entries.iter().filter(|e| e.is_waiting()).count()))
    }
}
