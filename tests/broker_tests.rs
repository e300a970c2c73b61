mod common;

use async_trait::async_trait;
use common::Harness;
use reservation_pipeline::broker::*;
use reservation_pipeline::kafka::{deliver_dead_letter, kafka_topic, queue_topics, RecordSink};
use reservation_pipeline::retry::{retry_with_backoff, RetryConfig};
use reservation_pipeline::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Fails every delivery with the error `make_error` builds.
struct FailingHandler {
    calls: AtomicU32,
    make_error: fn() -> PipelineError,
}

impl FailingHandler {
    fn new(make_error: fn() -> PipelineError) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            make_error,
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageHandler for FailingHandler {
    async fn handle(&self, _delivery: &Delivery) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err((self.make_error)())
    }

    fn name(&self) -> &str {
        "failing"
    }
}

fn dead_letters(h: &Harness, dlq: &str) -> Vec<DeadLetterRecord> {
    h.broker
        .pending_payloads(dlq)
        .iter()
        .map(|p| serde_json::from_str(p).unwrap())
        .collect()
}

#[tokio::test]
async fn test_direct_exchange_routes_by_key() {
    let h = Harness::new();
    let topo = &h.config.topology;

    h.broker.publish(&topo.store_mutation_exchange, "updated", "{}").await.unwrap();
    h.broker.publish(&topo.reminder_exchange, &topo.reminder_due_key, "{}").await.unwrap();
    h.broker.publish(&topo.vacancy_exchange, "no-such-key", "{}").await.unwrap();

    assert_eq!(h.broker.queue_depth(&topo.index_sync_queue), 1);
    assert_eq!(h.broker.queue_depth(&topo.reminder_due_queue), 1);
    assert_eq!(h.broker.queue_depth(&topo.reminder_register_queue), 0);
    assert_eq!(h.broker.queue_depth(&topo.vacancy_queue), 0);
}

#[tokio::test]
async fn test_fanout_exchange_copies_to_every_queue() {
    let h = Harness::new();
    let topo = &h.config.topology;

    h.broker.publish(&topo.event_open_exchange, "ignored", "{}").await.unwrap();

    assert_eq!(h.broker.queue_depth(&topo.event_open_notification_queue), 1);
    assert_eq!(h.broker.queue_depth(&topo.event_open_analytics_queue), 1);
}

#[tokio::test]
async fn test_unknown_exchange_and_queue_are_errors() {
    let h = Harness::new();

    assert!(h.broker.publish("nowhere", "key", "{}").await.is_err());

    let handler = FailingHandler::new(|| PipelineError::downstream("x", "y"));
    assert!(matches!(
        h.broker.subscribe("no.such.queue", handler).await,
        Err(PipelineError::UnknownQueue(_))
    ));
}

#[tokio::test]
async fn test_transient_failure_is_retried_then_dead_lettered() {
    let h = Harness::new();
    let topo = &h.config.topology;
    let handler = FailingHandler::new(|| PipelineError::downstream("search-index", "connection refused"));
    h.broker.subscribe(&topo.index_sync_queue, handler.clone()).await.unwrap();

    let event = MutationEvent::deleted(7, 3);
    publish_json(h.broker.as_ref(), &topo.store_mutation_exchange, "deleted", &event)
        .await
        .unwrap();
    h.broker.run_until_idle().await;

    assert_eq!(handler.calls(), h.config.settings.max_deliveries);
    assert_eq!(h.broker.queue_depth(&topo.index_sync_queue), 0);

    let records = dead_letters(&h, &topo.index_sync_dlq);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].source_queue, topo.index_sync_queue);
    assert_eq!(records[0].routing_key, "deleted");
    assert_eq!(records[0].failure_count, 2);
    assert!(records[0].last_error.contains("connection refused"));

    let original: MutationEvent = serde_json::from_str(&records[0].original_payload).unwrap();
    assert_eq!(original.entity_id, 7);
    assert_eq!(h.metrics.redeliveries.get() as u64, 1);
    assert_eq!(h.metrics.dead_lettered.get() as u64, 1);
}

#[tokio::test]
async fn test_malformed_payload_is_dead_lettered_immediately() {
    let h = Harness::new();
    let topo = &h.config.topology;
    let handler = FailingHandler::new(|| PipelineError::malformed("waitlist.vacancy.notify", "expected value"));
    h.broker.subscribe(&topo.vacancy_queue, handler.clone()).await.unwrap();

    h.broker
        .publish(&topo.vacancy_exchange, &topo.vacancy_routing_key, "not json")
        .await
        .unwrap();
    h.broker.run_until_idle().await;

    assert_eq!(handler.calls(), 1);
    let records = dead_letters(&h, &topo.vacancy_dlq);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].original_payload, "not json");
    assert_eq!(records[0].failure_count, 1);
    assert_eq!(h.metrics.redeliveries.get() as u64, 0);
}

#[tokio::test]
async fn test_queue_without_dead_letter_queue_discards_after_max_deliveries() {
    let h = Harness::new();
    let topo = &h.config.topology;
    let handler = FailingHandler::new(|| PipelineError::downstream("analytics", "timeout"));
    h.broker
        .subscribe(&topo.event_open_analytics_queue, handler.clone())
        .await
        .unwrap();

    h.broker.publish(&topo.event_open_exchange, "", "{}").await.unwrap();
    h.broker.run_until_idle().await;

    assert_eq!(handler.calls(), 2);
    assert_eq!(h.broker.queue_depth(&topo.event_open_analytics_queue), 0);
    assert_eq!(h.metrics.dead_lettered.get() as u64, 0);
}

#[test]
fn test_decode_rejects_garbage_and_future_schema() {
    let delivery = |payload: &str| Delivery {
        queue: "waitlist.vacancy.notify".to_string(),
        exchange: "waitlist.vacancy".to_string(),
        routing_key: "seat-vacated".to_string(),
        payload: payload.to_string(),
        attempt: 1,
    };

    let event = VacancyEvent::new(3, chrono::NaiveDate::from_ymd_opt(2026, 11, 2).unwrap());
    let good = serde_json::to_string(&event).unwrap();
    assert_eq!(delivery(&good).decode::<VacancyEvent>().unwrap(), event);

    let legacy = r#"{"message_id":"6c1f5a3e-8f5b-4c4e-9a55-0b1c2d3e4f50","store_id":3,"date":"2026-11-02"}"#;
    let decoded: VacancyEvent = delivery(legacy).decode().unwrap();
    assert_eq!(decoded.schema_version, SCHEMA_VERSION);

    let future = good.replace("\"schema_version\":1", "\"schema_version\":99");
    assert!(matches!(
        delivery(&future).decode::<VacancyEvent>(),
        Err(PipelineError::MalformedMessage { .. })
    ));
    assert!(matches!(
        delivery("{\"store_id\":").decode::<VacancyEvent>(),
        Err(PipelineError::MalformedMessage { .. })
    ));
}

#[test]
fn test_disposition() {
    let transient = PipelineError::downstream("cache", "down");
    let malformed = PipelineError::malformed("q", "bad");

    assert_eq!(disposition(&transient, 1, 2), Disposition::Redeliver);
    assert_eq!(disposition(&transient, 2, 2), Disposition::DeadLetter);
    assert_eq!(disposition(&malformed, 1, 2), Disposition::DeadLetter);
}

#[test]
fn test_kafka_topic_mapping() {
    let config = ServiceConfig::new("svc");
    let topology = Topology::from_config(&config.topology, &config.settings);

    let mutations = topology.exchange("store.mutation").unwrap();
    assert_eq!(kafka_topic(mutations, "updated"), "store.mutation.updated");

    let opened = topology.exchange("event.opened").unwrap();
    assert_eq!(kafka_topic(opened, "whatever"), "event.opened");

    let index_sync = topology.queue("store.index-sync").unwrap();
    let topics = queue_topics(&topology, index_sync).unwrap();
    assert_eq!(topics.len(), 3);
    assert_eq!(
        topics.get("store.mutation.created"),
        Some(&("store.mutation".to_string(), "created".to_string()))
    );

    let dlq = topology.queue("store.index-sync.dlq").unwrap();
    let topics = queue_topics(&topology, dlq).unwrap();
    assert!(topics.contains_key("pipeline.dead-letter.store.index-sync"));
}

#[tokio::test]
async fn test_retry_with_backoff_stops_on_non_retryable() {
    let config = RetryConfig {
        max_attempts: 4,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        jitter: false,
    };

    let counter = AtomicU32::new(0);
    let attempts = &counter;
    let result: Result<()> = retry_with_backoff(&config, "decode", || async move {
        attempts.fetch_add(1, Ordering::SeqCst);
        Err(PipelineError::malformed("q", "bad"))
    })
    .await;
    assert!(result.is_err());
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    let counter = AtomicU32::new(0);
    let attempts = &counter;
    let result = retry_with_backoff(&config, "publish", || async move {
        if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
            Err(PipelineError::TransientBroker("not leader".to_string()))
        } else {
            Ok(42)
        }
    })
    .await;
    assert_eq!(result.unwrap(), 42);
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

/// Rejects the first `failures` records, then accepts and keeps them.
struct UnreliableSink {
    failures: u32,
    attempts: AtomicU32,
    accepted: Mutex<Vec<(String, String)>>,
}

impl UnreliableSink {
    fn new(failures: u32) -> Self {
        Self {
            failures,
            attempts: AtomicU32::new(0),
            accepted: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RecordSink for UnreliableSink {
    async fn send_record(&self, topic: &str, _key: &str, payload: &str) -> Result<()> {
        if self.attempts.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(PipelineError::TransientBroker("broker unreachable".to_string()));
        }
        self.accepted
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_string()));
        Ok(())
    }
}

fn quick_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

#[tokio::test]
async fn test_dead_letter_publish_keeps_retrying_until_accepted() {
    // More failures than the retry config's attempt budget.
    let sink = UnreliableSink::new(6);
    let (_tx, mut shutdown) = broadcast::channel(1);

    let delivered = deliver_dead_letter(
        &sink,
        "pipeline.dead-letter.store.index-sync",
        "store.index-sync",
        "{\"failure_count\":2}",
        &quick_retry(),
        &mut shutdown,
    )
    .await;

    assert!(delivered);
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 7);
    let accepted = sink.accepted.lock().unwrap();
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].0, "pipeline.dead-letter.store.index-sync");
}

#[tokio::test]
async fn test_dead_letter_publish_gives_up_only_on_shutdown() {
    let sink = UnreliableSink::new(u32::MAX);
    let (tx, mut shutdown) = broadcast::channel(1);
    tx.send(()).unwrap();

    let delivered = deliver_dead_letter(
        &sink,
        "pipeline.dead-letter.waitlist.vacancy.notify",
        "waitlist.vacancy.notify",
        "{}",
        &quick_retry(),
        &mut shutdown,
    )
    .await;

    assert!(!delivered);
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 1);
    assert!(sink.accepted.lock().unwrap().is_empty());
}
