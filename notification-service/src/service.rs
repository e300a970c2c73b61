use chrono::Utc;
use reservation_pipeline::broker::{Broker, HandlerRegistry};
use reservation_pipeline::kafka::KafkaBroker;
use reservation_pipeline::metrics::ops_router;
use reservation_pipeline::notify::{Notifier, TracingNotifier};
use reservation_pipeline::pipeline::{
    DeadLetterReprocessor, EventOpenAnalyticsConsumer, EventOpenNotificationConsumer, EventOpenPublisher,
    ReminderDelayQueue, ReminderSender, ReminderSweep, VacancyNotifier,
};
use reservation_pipeline::repository::{
    InMemoryEventRepository, InMemoryInterestRegistry, InMemoryReminderDelayStore, InMemoryReservationRepository,
    InMemoryWaitlistRepository,
};
use reservation_pipeline::shutdown::ShutdownCoordinator;
use reservation_pipeline::{Metrics, Result, ServiceConfig};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};

pub struct NotificationService {
    config: ServiceConfig,
    broker: Arc<KafkaBroker>,
    metrics: Arc<Metrics>,
    vacancy_notifier: Arc<VacancyNotifier>,
    event_notifications: Arc<EventOpenNotificationConsumer>,
    event_analytics: Arc<EventOpenAnalyticsConsumer>,
    delay_queue: Arc<ReminderDelayQueue>,
    reminder_sender: Arc<ReminderSender>,
    reminder_sweep: Arc<ReminderSweep>,
    event_publisher: Arc<EventOpenPublisher>,
}

impl NotificationService {
    pub fn new(config: ServiceConfig, broker: Arc<KafkaBroker>, metrics: Arc<Metrics>) -> Self {
        let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier);
        let waitlist = Arc::new(InMemoryWaitlistRepository::new());
        let reservations = Arc::new(InMemoryReservationRepository::new());
        let events = Arc::new(InMemoryEventRepository::new());
        let interests = Arc::new(InMemoryInterestRegistry::new());
        let dyn_broker: Arc<dyn Broker> = broker.clone();
        let topology = &config.topology;
        let lead = config.settings.reminder_lead();

        Self {
            vacancy_notifier: Arc::new(VacancyNotifier::new(waitlist, notifier.clone(), Arc::clone(&metrics))),
            event_notifications: Arc::new(EventOpenNotificationConsumer::new(
                interests,
                notifier.clone(),
                Arc::clone(&metrics),
            )),
            event_analytics: Arc::new(EventOpenAnalyticsConsumer::new()),
            delay_queue: Arc::new(ReminderDelayQueue::new(
                dyn_broker.clone(),
                Arc::new(InMemoryReminderDelayStore::new()),
                topology,
            )),
            reminder_sender: Arc::new(ReminderSender::new(
                reservations.clone(),
                notifier,
                Arc::clone(&metrics),
            )),
            reminder_sweep: Arc::new(ReminderSweep::new(
                reservations,
                dyn_broker.clone(),
                topology,
                lead,
                Arc::clone(&metrics),
            )),
            event_publisher: Arc::new(EventOpenPublisher::new(dyn_broker, events, topology)),
            config,
            broker,
            metrics,
        }
    }

    pub async fn start(&self) -> Result<()> {
        let topology = &self.config.topology;

        let mut primary = HandlerRegistry::new();
        primary
            .register(&topology.vacancy_queue, self.vacancy_notifier.clone())
            .register(&topology.event_open_notification_queue, self.event_notifications.clone())
            .register(&topology.event_open_analytics_queue, self.event_analytics.clone())
            .register(&topology.reminder_register_queue, self.delay_queue.clone())
            .register(&topology.reminder_due_queue, self.reminder_sender.clone());

        let mut handlers = primary.clone();
        handlers.register(
            &topology.vacancy_dlq,
            Arc::new(DeadLetterReprocessor::new(primary, Arc::clone(&self.metrics))),
        );

        handlers.subscribe_all(self.broker.as_ref() as &dyn Broker).await
    }

    /// Start the delay-queue release, event announcement and reminder sweep loops.
    pub fn spawn_schedulers(&self, coordinator: &ShutdownCoordinator) {
        let settings = &self.config.settings;

        let delay_queue = self.delay_queue.clone();
        spawn_periodic("reminder-release", settings.release_interval(), coordinator.subscribe(), move || {
            let delay_queue = delay_queue.clone();
            async move { delay_queue.release_due(Utc::now()).await }
        });

        let publisher = self.event_publisher.clone();
        spawn_periodic("event-announce", settings.release_interval(), coordinator.subscribe(), move || {
            let publisher = publisher.clone();
            async move { publisher.announce_due(Utc::now()).await }
        });

        let sweep = self.reminder_sweep.clone();
        spawn_periodic("reminder-sweep", settings.sweep_interval(), coordinator.subscribe(), move || {
            let sweep = sweep.clone();
            async move { sweep.run(Utc::now()).await }
        });
    }

    pub async fn serve_ops(&self, port: u16) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        info!("Ops endpoints listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, ops_router(Arc::clone(&self.metrics))).await?;
        Ok(())
    }
}

fn spawn_periodic<F, Fut>(name: &'static str, period: Duration, mut shutdown: broadcast::Receiver<()>, mut tick: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<usize>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match tick().await {
                        Ok(0) => {}
                        Ok(count) => info!("{}: processed {}", name, count),
                        Err(e) => error!("{} failed: {}", name, e),
                    }
                }
                _ = shutdown.recv() => {
                    info!("{} stopped", name);
                    break;
                }
            }
        }
    });
}
