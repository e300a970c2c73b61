use crate::broker::{publish_json, Broker, Delivery, MessageHandler};
use crate::notify::{Notification, Notifier};
use crate::repository::WaitlistRepository;
use crate::{Metrics, PipelineError, Result, TopologyConfig, VacancyEvent, WaitingParty, WaitlistEntry};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct VacancyPublisher {
    broker: Arc<dyn Broker>,
    exchange: String,
    routing_key: String,
}

impl VacancyPublisher {
    pub fn new(broker: Arc<dyn Broker>, topology: &TopologyConfig) -> Self {
        Self {
            broker,
            exchange: topology.vacancy_exchange.clone(),
            routing_key: topology.vacancy_routing_key.clone(),
        }
    }

    /// Called when a reservation on `(store_id, date)` is canceled.
    pub async fn seat_vacated(&self, store_id: i64, date: NaiveDate) -> Result<VacancyEvent> {
        let event = VacancyEvent::new(store_id, date);
        publish_json(self.broker.as_ref(), &self.exchange, &self.routing_key, &event).await?;
        info!("Published vacancy for store {} on {}", store_id, date);
        Ok(event)
    }
}

/// Registration side of the waitlist.
pub struct WaitlistService {
    repository: Arc<dyn WaitlistRepository>,
    capacity: usize,
    metrics: Arc<Metrics>,
}

impl WaitlistService {
    pub fn new(repository: Arc<dyn WaitlistRepository>, capacity: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            repository,
            capacity,
            metrics,
        }
    }

    /// Fails with `WaitlistFull` once the store has `capacity` waiting entries,
    /// and with `AlreadyWaiting` if the user already waits for this store.
    pub async fn register(
        &self,
        user_id: i64,
        store_id: i64,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<WaitlistEntry> {
        match self
            .repository
            .register(user_id, store_id, date, now, self.capacity)
            .await
        {
            Ok(entry) => {
                info!("User {} joined the waitlist of store {} for {}", user_id, store_id, date);
                Ok(entry)
            }
            Err(e @ (PipelineError::WaitlistFull { .. } | PipelineError::AlreadyWaiting { .. })) => {
                self.metrics.waitlist_rejections.inc();
                warn!("Waitlist registration rejected: {}", e);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

/// Notifies everyone waiting on a partition when a seat frees up.
pub struct VacancyNotifier {
    repository: Arc<dyn WaitlistRepository>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<Metrics>,
}

impl VacancyNotifier {
    pub fn new(repository: Arc<dyn WaitlistRepository>, notifier: Arc<dyn Notifier>, metrics: Arc<Metrics>) -> Self {
        Self {
            repository,
            notifier,
            metrics,
        }
    }

    /// Notify waiters oldest first. Returns how many entries this call moved to `Notified`.
    ///
    /// Each entry is leased before its notification goes out, so two deliveries of
    /// the same vacancy never notify the same waiter twice. An entry that is leased
    /// elsewhere or already notified is skipped.
    pub async fn on_vacancy(&self, event: &VacancyEvent) -> Result<usize> {
        let mut waiting = self.repository.find_waiting(event.store_id, event.date).await?;
        waiting.sort_by_key(|party| party.entry.registered_at);

        if waiting.is_empty() {
            debug!("Nobody waiting on store {} for {}", event.store_id, event.date);
            return Ok(0);
        }

        let mut notified = 0;
        for party in waiting {
            let entry_id = party.entry.entry_id;
            if !self.repository.try_begin_notify(event.store_id, entry_id).await? {
                self.metrics.duplicates_skipped.inc();
                debug!("Entry {} is notified or being notified elsewhere", entry_id);
                continue;
            }

            let outcome = self.notify_party(event, &party).await;
            self.repository.end_notify(event.store_id, entry_id).await?;

            if outcome? {
                notified += 1;
                self.metrics.notifications_sent.inc();
            }
        }

        info!(
            "Vacancy on store {} for {}: notified {} waiters",
            event.store_id, event.date, notified
        );
        Ok(notified)
    }

    async fn notify_party(&self, event: &VacancyEvent, party: &WaitingParty) -> Result<bool> {
        let notification = Notification::SeatVacated {
            user_id: party.entry.user_id,
            email: party.contact.email.clone(),
            store_id: event.store_id,
            date: event.date,
        };
        self.notifier.notify(&notification).await?;

        self.repository.mark_notified(event.store_id, party.entry.entry_id).await
    }
}

#[async_trait]
impl MessageHandler for VacancyNotifier {
    async fn handle(&self, delivery: &Delivery) -> Result<()> {
        let event: VacancyEvent = delivery.decode()?;
        self.on_vacancy(&event).await.map(|_| ())
    }

    fn name(&self) -> &str {
        "vacancy-notifier"
    }
}
