use crate::broker::{publish_json, Broker, Delivery, MessageHandler};
use crate::notify::{Notification, Notifier};
use crate::repository::{EventRepository, InterestRegistry};
use crate::{EventOpenMessage, LimitedEvent, Metrics, Result, StateStore, TopologyConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct EventOpenPublisher {
    broker: Arc<dyn Broker>,
    events: Arc<dyn EventRepository>,
    exchange: String,
}

impl EventOpenPublisher {
    pub fn new(broker: Arc<dyn Broker>, events: Arc<dyn EventRepository>, topology: &TopologyConfig) -> Self {
        Self {
            broker,
            events,
            exchange: topology.event_open_exchange.clone(),
        }
    }

    pub async fn publish_opened(&self, event: &LimitedEvent) -> Result<EventOpenMessage> {
        let message = EventOpenMessage::from(event);
        // Fanout: the routing key is ignored.
        publish_json(self.broker.as_ref(), &self.exchange, "", &message).await?;
        info!("Announced opening of event {} at store {}", event.event_id, event.store_id);
        Ok(message)
    }

    /// Announce every event whose opening time has passed, each exactly once.
    ///
    /// Invoked by the scheduler. An event is claimed before it is published and
    /// released again if the publish fails, so the next tick retries it.
    pub async fn announce_due(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut announced = 0;

        for event in self.events.find_opening(now).await? {
            if !self.events.claim_announcement(event.event_id).await? {
                debug!("Event {} already announced", event.event_id);
                continue;
            }

            match self.publish_opened(&event).await {
                Ok(_) => announced += 1,
                Err(e) => {
                    error!("Failed to announce event {}: {}", event.event_id, e);
                    self.events.release_announcement(event.event_id).await?;
                }
            }
        }

        Ok(announced)
    }
}

/// Tells every interested user that an event opened.
pub struct EventOpenNotificationConsumer {
    interests: Arc<dyn InterestRegistry>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<Metrics>,
    /// (event_id, user_id) pairs already notified by this consumer.
    delivered: StateStore<(i64, i64), ()>,
}

impl EventOpenNotificationConsumer {
    pub fn new(interests: Arc<dyn InterestRegistry>, notifier: Arc<dyn Notifier>, metrics: Arc<Metrics>) -> Self {
        Self {
            interests,
            notifier,
            metrics,
            delivered: StateStore::new(),
        }
    }

    pub async fn on_event_opened(&self, message: &EventOpenMessage) -> Result<usize> {
        let users = self.interests.interested_users(message.store_id).await?;
        let mut sent = 0;

        for user in users {
            let key = (message.event_id, user.user_id);
            if !self.delivered.insert_if_absent(key, ()) {
                self.metrics.duplicates_skipped.inc();
                continue;
            }

            let notification = Notification::EventOpened {
                user_id: user.user_id,
                email: user.email.clone(),
                event_id: message.event_id,
                store_id: message.store_id,
                store_name: message.store_name.clone(),
                open_at: message.open_at,
            };

            if let Err(e) = self.notifier.notify(&notification).await {
                self.delivered.remove(&key);
                return Err(e);
            }
            sent += 1;
            self.metrics.notifications_sent.inc();
        }

        info!("Event {} opened: notified {} users", message.event_id, sent);
        Ok(sent)
    }
}

#[async_trait]
impl MessageHandler for EventOpenNotificationConsumer {
    async fn handle(&self, delivery: &Delivery) -> Result<()> {
        let message: EventOpenMessage = delivery.decode()?;
        self.on_event_opened(&message).await.map(|_| ())
    }

    fn name(&self) -> &str {
        "event-open-notifier"
    }
}

/// Counts event openings per store.
#[derive(Default)]
pub struct EventOpenAnalyticsConsumer {
    seen: StateStore<i64, ()>,
    opens_by_store: StateStore<i64, u64>,
}

impl EventOpenAnalyticsConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opens_for(&self, store_id: i64) -> u64 {
        self.opens_by_store.get(&store_id).unwrap_or(0)
    }

    pub fn record(&self, message: &EventOpenMessage) -> bool {
        if !self.seen.insert_if_absent(message.event_id, ()) {
            return false;
        }
        self.opens_by_store.update(message.store_id, |count| *count += 1);
        true
    }
}

#[async_trait]
impl MessageHandler for EventOpenAnalyticsConsumer {
    async fn handle(&self, delivery: &Delivery) -> Result<()> {
        let message: EventOpenMessage = delivery.decode()?;
        if self.record(&message) {
            debug!("Recorded opening of event {} for store {}", message.event_id, message.store_id);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "event-open-analytics"
    }
}
