//! Reservation reminders in two phases.
//!
//! Register: a `ReminderIntent` is published when the reservation is made.
//! Delay: `ReminderDelayQueue` keeps intents in a `ReminderDelayStore` until `remind_at`.
//! Send: a `ReminderDue` goes to `ReminderSender`, which claims the
//! reservation's `reminder_sent` flag before notifying.
//!
//! `ReminderSweep` re-checks upcoming reservations and emits `ReminderDue`
//! for any still unreminded. Both paths go through the same flag, so a user
//! gets one reminder whichever path fires first.

use crate::broker::{publish_json, Broker, Delivery, MessageHandler};
use crate::notify::{Notification, Notifier};
use crate::repository::{ReminderDelayStore, ReservationRepository};
use crate::{Metrics, ReminderDue, ReminderIntent, Reservation, Result, TopologyConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info};

struct ReminderRoute {
    exchange: String,
    register_key: String,
    due_key: String,
}

impl ReminderRoute {
    fn new(topology: &TopologyConfig) -> Self {
        Self {
            exchange: topology.reminder_exchange.clone(),
            register_key: topology.reminder_register_key.clone(),
            due_key: topology.reminder_due_key.clone(),
        }
    }
}

pub struct ReminderPublisher {
    broker: Arc<dyn Broker>,
    route: ReminderRoute,
    lead: chrono::Duration,
}

impl ReminderPublisher {
    pub fn new(broker: Arc<dyn Broker>, topology: &TopologyConfig, lead: chrono::Duration) -> Self {
        Self {
            broker,
            route: ReminderRoute::new(topology),
            lead,
        }
    }

    pub async fn register(&self, reservation: &Reservation) -> Result<ReminderIntent> {
        let intent = ReminderIntent::for_reservation(reservation, self.lead);
        publish_json(self.broker.as_ref(), &self.route.exchange, &self.route.register_key, &intent).await?;
        debug!(
            "Registered reminder for reservation {} at {}",
            intent.reservation_id, intent.remind_at
        );
        Ok(intent)
    }
}

/// Delay phase: holds intents in a `ReminderDelayStore` until they are due.
pub struct ReminderDelayQueue {
    broker: Arc<dyn Broker>,
    store: Arc<dyn ReminderDelayStore>,
    route: ReminderRoute,
}

impl ReminderDelayQueue {
    pub fn new(broker: Arc<dyn Broker>, store: Arc<dyn ReminderDelayStore>, topology: &TopologyConfig) -> Self {
        Self {
            broker,
            store,
            route: ReminderRoute::new(topology),
        }
    }

    pub async fn hold(&self, intent: ReminderIntent) -> Result<()> {
        self.store.hold(intent).await
    }

    pub async fn pending_count(&self) -> Result<usize> {
        self.store.pending_count().await
    }

    /// Publish `ReminderDue` for every held intent with `remind_at <= now`.
    /// An intent leaves the store only after its due message is published.
    pub async fn release_due(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut released = 0;

        for intent in self.store.find_due(now).await? {
            let message = ReminderDue::from_intent(&intent);
            match publish_json(self.broker.as_ref(), &self.route.exchange, &self.route.due_key, &message).await {
                Ok(()) => {
                    self.store.remove(&intent.reservation_id).await?;
                    released += 1;
                }
                Err(e) => error!("Failed to release reminder for {}: {}", intent.reservation_id, e),
            }
        }

        Ok(released)
    }
}

#[async_trait]
impl MessageHandler for ReminderDelayQueue {
    async fn handle(&self, delivery: &Delivery) -> Result<()> {
        let intent: ReminderIntent = delivery.decode()?;
        debug!("Holding reminder for {} until {}", intent.reservation_id, intent.remind_at);
        self.hold(intent).await
    }

    fn name(&self) -> &str {
        "reminder-delay-queue"
    }
}

/// Final delivery of a due reminder.
pub struct ReminderSender {
    reservations: Arc<dyn ReservationRepository>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<Metrics>,
}

impl ReminderSender {
    pub fn new(
        reservations: Arc<dyn ReservationRepository>,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            reservations,
            notifier,
            metrics,
        }
    }

    /// Returns false when the reminder was already sent or the reservation is gone.
    pub async fn send(&self, due: &ReminderDue) -> Result<bool> {
        if !self.reservations.claim_reminder(&due.reservation_id).await? {
            self.metrics.duplicates_skipped.inc();
            debug!("Reminder for {} already sent or no longer needed", due.reservation_id);
            return Ok(false);
        }

        let notification = Notification::ReservationReminder {
            user_id: due.user_id,
            reservation_id: due.reservation_id.clone(),
            store_id: due.store_id,
            store_name: due.store_name.clone(),
            reserved_at: due.reserved_at,
        };

        if let Err(e) = self.notifier.notify(&notification).await {
            self.reservations.release_reminder(&due.reservation_id).await?;
            return Err(e);
        }

        self.metrics.notifications_sent.inc();
        info!("Sent reminder for reservation {} ({:?})", due.reservation_id, due.source);
        Ok(true)
    }
}

#[async_trait]
impl MessageHandler for ReminderSender {
    async fn handle(&self, delivery: &Delivery) -> Result<()> {
        let due: ReminderDue = delivery.decode()?;
        self.send(&due).await.map(|_| ())
    }

    fn name(&self) -> &str {
        "reminder-sender"
    }
}

/// Periodic reconciliation for reminders whose register phase was lost.
pub struct ReminderSweep {
    reservations: Arc<dyn ReservationRepository>,
    broker: Arc<dyn Broker>,
    route: ReminderRoute,
    lead: chrono::Duration,
    metrics: Arc<Metrics>,
}

impl ReminderSweep {
    pub fn new(
        reservations: Arc<dyn ReservationRepository>,
        broker: Arc<dyn Broker>,
        topology: &TopologyConfig,
        lead: chrono::Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            reservations,
            broker,
            route: ReminderRoute::new(topology),
            lead,
            metrics,
        }
    }

    /// Emit `ReminderDue` for every upcoming reservation inside the reminder lead
    /// whose flag is still unset. Returns how many were emitted.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<usize> {
        let unreminded = self.reservations.find_unreminded(now, now + self.lead).await?;
        let mut emitted = 0;

        for reservation in &unreminded {
            let message = ReminderDue::from_sweep(reservation, self.lead);
            publish_json(self.broker.as_ref(), &self.route.exchange, &self.route.due_key, &message).await?;
            emitted += 1;
            self.metrics.reminders_swept.inc();
        }

        if emitted > 0 {
            info!("Reminder sweep emitted {} reminders", emitted);
        }
        Ok(emitted)
    }
}
