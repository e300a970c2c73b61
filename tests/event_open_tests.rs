mod common;

use chrono::{Duration, Utc};
use common::{contact, Harness};
use reservation_pipeline::broker::Broker;
use reservation_pipeline::notify::{Notification, RecordingNotifier};
use reservation_pipeline::pipeline::{EventOpenAnalyticsConsumer, EventOpenNotificationConsumer, EventOpenPublisher};
use reservation_pipeline::repository::{EventRepository, InMemoryEventRepository, InMemoryInterestRegistry};
use reservation_pipeline::*;
use std::sync::Arc;

struct Fixture {
    h: Harness,
    events: Arc<InMemoryEventRepository>,
    recorder: Arc<RecordingNotifier>,
    analytics: Arc<EventOpenAnalyticsConsumer>,
    publisher: EventOpenPublisher,
}

async fn fixture() -> Fixture {
    let h = Harness::new();
    let topo = &h.config.topology;

    let events = Arc::new(InMemoryEventRepository::new());
    let interests = Arc::new(InMemoryInterestRegistry::new());
    interests.add_interest(10, contact(1));
    interests.add_interest(10, contact(2));
    interests.add_interest(20, contact(3));

    let recorder = Arc::new(RecordingNotifier::new());
    let notifications = Arc::new(EventOpenNotificationConsumer::new(
        interests,
        recorder.clone(),
        Arc::clone(&h.metrics),
    ));
    let analytics = Arc::new(EventOpenAnalyticsConsumer::new());

    h.broker
        .subscribe(&topo.event_open_notification_queue, notifications)
        .await
        .unwrap();
    h.broker
        .subscribe(&topo.event_open_analytics_queue, analytics.clone())
        .await
        .unwrap();

    let publisher = EventOpenPublisher::new(h.dyn_broker(), events.clone(), topo);

    Fixture {
        h,
        events,
        recorder,
        analytics,
        publisher,
    }
}

fn limited_event(event_id: i64, store_id: i64, open_in: Duration) -> LimitedEvent {
    LimitedEvent {
        event_id,
        store_id,
        store_name: format!("store-{}", store_id),
        open_at: Utc::now() + open_in,
        announced: false,
    }
}

#[tokio::test]
async fn test_opened_event_reaches_both_consumers() {
    let f = fixture().await;
    f.events.save(limited_event(100, 10, Duration::minutes(-1))).await.unwrap();
    f.events.save(limited_event(101, 20, Duration::hours(2))).await.unwrap();

    assert_eq!(f.publisher.announce_due(Utc::now()).await.unwrap(), 1);
    f.h.broker.run_until_idle().await;

    let mut recipients = f.recorder.recipients();
    recipients.sort();
    assert_eq!(recipients, vec![1, 2]);
    assert!(f
        .recorder
        .sent()
        .iter()
        .all(|n| matches!(n, Notification::EventOpened { event_id: 100, .. })));

    assert_eq!(f.analytics.opens_for(10), 1);
    assert_eq!(f.analytics.opens_for(20), 0);
    assert!(f.events.find_by_id(100).unwrap().announced);
    assert!(!f.events.find_by_id(101).unwrap().announced);
}

#[tokio::test]
async fn test_event_is_announced_once() {
    let f = fixture().await;
    f.events.save(limited_event(100, 10, Duration::minutes(-5))).await.unwrap();

    assert_eq!(f.publisher.announce_due(Utc::now()).await.unwrap(), 1);
    assert_eq!(f.publisher.announce_due(Utc::now()).await.unwrap(), 0);

    let topo = &f.h.config.topology;
    assert_eq!(f.h.broker.queue_depth(&topo.event_open_notification_queue), 1);
    assert_eq!(f.h.broker.queue_depth(&topo.event_open_analytics_queue), 1);
}

#[tokio::test]
async fn test_redelivered_open_is_idempotent_for_both_consumers() {
    let f = fixture().await;
    let event = limited_event(200, 10, Duration::zero());

    f.publisher.publish_opened(&event).await.unwrap();
    f.publisher.publish_opened(&event).await.unwrap();
    f.h.broker.run_until_idle().await;

    assert_eq!(f.recorder.sent().len(), 2);
    assert_eq!(f.analytics.opens_for(10), 1);
    assert_eq!(f.h.metrics.duplicates_skipped.get() as u64, 2);
}
