use crate::{Reservation, ReservationState, Result, StateStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait ReservationRepository: Send + Sync {
    async fn save(&self, reservation: Reservation) -> Result<()>;

    async fn find_by_id(&self, reservation_id: &str) -> Result<Option<Reservation>>;

    /// Confirmed reservations in `(from, until]` whose reminder has not been sent.
    async fn find_unreminded(&self, from: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<Reservation>>;

    /// Atomically flip `reminder_sent` to true. False if already set or not confirmed.
    async fn claim_reminder(&self, reservation_id: &str) -> Result<bool>;

    /// Undo a claim whose notification could not be delivered.
    async fn release_reminder(&self, reservation_id: &str) -> Result<()>;
}

#[derive(Clone, Default)]
pub struct InMemoryReservationRepository {
    reservations: StateStore<String, Reservation>,
}

impl InMemoryReservationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReservationRepository for InMemoryReservationRepository {
    async fn save(&self, reservation: Reservation) -> Result<()> {
        self.reservations.put(reservation.reservation_id.clone(), reservation);
        Ok(())
    }

    async fn find_by_id(&self, reservation_id: &str) -> Result<Option<Reservation>> {
        Ok(self.reservations.get(&reservation_id.to_string()))
    }

    async fn find_unreminded(&self, from: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<Reservation>> {
        let mut found: Vec<Reservation> = self
            .reservations
            .values()
            .into_iter()
            .filter(|r| {
                r.state == ReservationState::Confirmed
                    && !r.reminder_sent
                    && r.reserved_at > from
                    && r.reserved_at <= until
            })
            .collect();
        found.sort_by_key(|r| r.reserved_at);
        Ok(found)
    }

    async fn claim_reminder(&self, reservation_id: &str) -> Result<bool> {
        Ok(self
            .reservations
            .modify(&reservation_id.to_string(), |r| {
                if r.state == ReservationState::Confirmed && !r.reminder_sent {
                    r.reminder_sent = true;
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false))
    }

    async fn release_reminder(&self, reservation_id: &str) -> Result<()> {
        self.reservations
            .modify(&reservation_id.to_string(), |r| r.reminder_sent = false);
        Ok(())
    }
}
