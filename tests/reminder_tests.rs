mod common;

use chrono::{DateTime, Duration, TimeZone, Utc};
use common::{FlakyNotifier, Harness};
use reservation_pipeline::broker::Broker;
use reservation_pipeline::notify::{Notification, Notifier, RecordingNotifier};
use reservation_pipeline::pipeline::{ReminderDelayQueue, ReminderPublisher, ReminderSender, ReminderSweep};
use reservation_pipeline::repository::{
    InMemoryReminderDelayStore, InMemoryReservationRepository, ReminderDelayStore, ReservationRepository,
};
use reservation_pipeline::*;
use std::sync::Arc;

struct Fixture {
    h: Harness,
    reservations: Arc<InMemoryReservationRepository>,
    publisher: ReminderPublisher,
    delay_store: Arc<InMemoryReminderDelayStore>,
    delay_queue: Arc<ReminderDelayQueue>,
    sweep: ReminderSweep,
}

async fn fixture(notifier: Arc<dyn Notifier>) -> Fixture {
    let h = Harness::new();
    let topo = &h.config.topology;
    let lead = h.config.settings.reminder_lead();
    let reservations = Arc::new(InMemoryReservationRepository::new());

    let delay_store = Arc::new(InMemoryReminderDelayStore::new());
    let delay_queue = Arc::new(ReminderDelayQueue::new(h.dyn_broker(), delay_store.clone(), topo));
    let sender = Arc::new(ReminderSender::new(reservations.clone(), notifier, Arc::clone(&h.metrics)));
    h.broker
        .subscribe(&topo.reminder_register_queue, delay_queue.clone())
        .await
        .unwrap();
    h.broker.subscribe(&topo.reminder_due_queue, sender).await.unwrap();

    Fixture {
        publisher: ReminderPublisher::new(h.dyn_broker(), topo, lead),
        sweep: ReminderSweep::new(reservations.clone(), h.dyn_broker(), topo, lead, Arc::clone(&h.metrics)),
        delay_store,
        delay_queue,
        reservations,
        h,
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 11, 20, 12, 0, 0).unwrap()
}

fn reservation(id: &str, reserved_at: DateTime<Utc>) -> Reservation {
    Reservation {
        reservation_id: id.to_string(),
        user_id: 77,
        store_id: 5,
        store_name: "Mingles".to_string(),
        reserved_at,
        state: ReservationState::Confirmed,
        reminder_sent: false,
    }
}

#[tokio::test]
async fn test_scheduled_reminder_is_sent_once_and_sweep_finds_nothing() {
    let recorder = Arc::new(RecordingNotifier::new());
    let f = fixture(recorder.clone()).await;
    let booking = reservation("r-1", now() + Duration::hours(30));
    f.reservations.save(booking.clone()).await.unwrap();

    let intent = f.publisher.register(&booking).await.unwrap();
    assert_eq!(intent.remind_at, now() + Duration::hours(6));
    f.h.broker.run_until_idle().await;
    assert_eq!(f.delay_queue.pending_count().await.unwrap(), 1);

    // Not due yet.
    assert_eq!(f.delay_queue.release_due(now()).await.unwrap(), 0);

    let later = now() + Duration::hours(7);
    assert_eq!(f.delay_queue.release_due(later).await.unwrap(), 1);
    assert_eq!(f.delay_queue.pending_count().await.unwrap(), 0);
    f.h.broker.run_until_idle().await;

    assert_eq!(recorder.sent().len(), 1);
    assert!(matches!(
        &recorder.sent()[0],
        Notification::ReservationReminder { reservation_id, user_id: 77, .. } if reservation_id == "r-1"
    ));
    assert!(f.reservations.find_by_id("r-1").await.unwrap().unwrap().reminder_sent);
    assert_eq!(f.sweep.run(later).await.unwrap(), 0);
}

#[tokio::test]
async fn test_sweep_recovers_lost_register_phase() {
    let recorder = Arc::new(RecordingNotifier::new());
    let f = fixture(recorder.clone()).await;

    f.reservations.save(reservation("lost", now() + Duration::hours(3))).await.unwrap();
    f.reservations.save(reservation("far", now() + Duration::days(3))).await.unwrap();
    f.reservations.save(reservation("past", now() - Duration::hours(1))).await.unwrap();
    let mut canceled = reservation("canceled", now() + Duration::hours(2));
    canceled.state = ReservationState::Canceled;
    f.reservations.save(canceled).await.unwrap();

    assert_eq!(f.sweep.run(now()).await.unwrap(), 1);
    f.h.broker.run_until_idle().await;

    assert_eq!(recorder.sent().len(), 1);
    assert_eq!(f.h.metrics.reminders_swept.get() as u64, 1);
    assert_eq!(f.sweep.run(now()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_sweep_and_scheduled_path_together_send_one_reminder() {
    let recorder = Arc::new(RecordingNotifier::new());
    let f = fixture(recorder.clone()).await;
    let booking = reservation("r-2", now() + Duration::hours(2));
    f.reservations.save(booking.clone()).await.unwrap();

    f.publisher.register(&booking).await.unwrap();
    f.h.broker.run_until_idle().await;

    // Both paths emit before either is consumed.
    assert_eq!(f.delay_queue.release_due(now()).await.unwrap(), 1);
    assert_eq!(f.sweep.run(now()).await.unwrap(), 1);
    assert_eq!(f.h.broker.queue_depth(&f.h.config.topology.reminder_due_queue), 2);
    f.h.broker.run_until_idle().await;

    assert_eq!(recorder.sent().len(), 1);
    assert_eq!(f.h.metrics.duplicates_skipped.get() as u64, 1);
}

#[tokio::test]
async fn test_failed_send_releases_the_claim() {
    let mailer = Arc::new(FlakyNotifier::always_failing());
    let f = fixture(mailer.clone()).await;
    f.reservations.save(reservation("r-3", now() + Duration::hours(1))).await.unwrap();

    assert_eq!(f.sweep.run(now()).await.unwrap(), 1);
    f.h.broker.run_until_idle().await;

    assert_eq!(mailer.attempts(), 2);
    assert!(!f.reservations.find_by_id("r-3").await.unwrap().unwrap().reminder_sent);
    // Still eligible for the next sweep.
    assert_eq!(f.sweep.run(now()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_redelivered_intent_is_held_once() {
    let recorder = Arc::new(RecordingNotifier::new());
    let f = fixture(recorder.clone()).await;
    let booking = reservation("r-4", now() + Duration::hours(48));

    f.publisher.register(&booking).await.unwrap();
    f.publisher.register(&booking).await.unwrap();
    f.h.broker.run_until_idle().await;

    assert_eq!(f.delay_queue.pending_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_held_intent_survives_a_queue_restart() {
    let recorder = Arc::new(RecordingNotifier::new());
    let f = fixture(recorder.clone()).await;
    let booking = reservation("r-5", now() + Duration::hours(8));
    f.reservations.save(booking.clone()).await.unwrap();

    f.publisher.register(&booking).await.unwrap();
    f.h.broker.run_until_idle().await;
    assert_eq!(f.delay_store.pending_count().await.unwrap(), 1);

    // A new process picks up the same store.
    let restarted = ReminderDelayQueue::new(f.h.dyn_broker(), f.delay_store.clone(), &f.h.config.topology);
    assert_eq!(restarted.pending_count().await.unwrap(), 1);
    assert_eq!(restarted.release_due(now() + Duration::hours(3)).await.unwrap(), 1);
    assert_eq!(f.delay_store.pending_count().await.unwrap(), 0);
    f.h.broker.run_until_idle().await;

    assert_eq!(recorder.sent().len(), 1);
    assert!(f.reservations.find_by_id("r-5").await.unwrap().unwrap().reminder_sent);
}

#[tokio::test]
async fn test_delay_store_lists_due_intents_earliest_first() {
    let store = InMemoryReminderDelayStore::new();
    let lead = Duration::hours(2);
    for (id, hours) in [("late", 7), ("early", 3), ("future", 32)] {
        let booking = reservation(id, now() + Duration::hours(hours));
        store.hold(ReminderIntent::for_reservation(&booking, lead)).await.unwrap();
    }

    let due = store.find_due(now() + Duration::hours(6)).await.unwrap();
    let ids: Vec<&str> = due.iter().map(|intent| intent.reservation_id.as_str()).collect();
    assert_eq!(ids, vec!["early", "late"]);
    // Listing does not remove.
    assert_eq!(store.pending_count().await.unwrap(), 3);
}
