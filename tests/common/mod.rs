#![allow(dead_code)]

use async_trait::async_trait;
use reservation_pipeline::broker::{Broker, InMemoryBroker, Topology};
use reservation_pipeline::notify::{Notification, Notifier};
use reservation_pipeline::{Metrics, PipelineError, Result, ServiceConfig, StoreDocument, UserContact};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub struct Harness {
    pub config: ServiceConfig,
    pub metrics: Arc<Metrics>,
    pub broker: Arc<InMemoryBroker>,
}

impl Harness {
    pub fn new() -> Self {
        let config = ServiceConfig::new("test-pipeline");
        let metrics = Arc::new(Metrics::new().unwrap());
        let topology = Topology::from_config(&config.topology, &config.settings);
        let broker = Arc::new(InMemoryBroker::new(topology, Arc::clone(&metrics)));

        Self {
            config,
            metrics,
            broker,
        }
    }

    pub fn dyn_broker(&self) -> Arc<dyn Broker> {
        self.broker.clone()
    }
}

pub fn contact(user_id: i64) -> UserContact {
    UserContact {
        user_id,
        name: format!("user-{}", user_id),
        email: format!("user-{}@example.com", user_id),
    }
}

pub fn store(store_id: i64, name: &str, category: &str) -> StoreDocument {
    StoreDocument {
        store_id,
        name: name.to_string(),
        category: category.to_string(),
        region: "seoul".to_string(),
        description: format!("{} in seoul", name),
    }
}

/// Fails the first `failures` calls, then succeeds. Counts every attempt.
pub struct FlakyNotifier {
    failures: usize,
    attempts: AtomicUsize,
}

impl FlakyNotifier {
    pub fn failing_first(failures: usize) -> Self {
        Self {
            failures,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn always_failing() -> Self {
        Self::failing_first(usize::MAX)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for FlakyNotifier {
    async fn notify(&self, _notification: &Notification) -> Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(PipelineError::downstream("mailer", "smtp connection refused"));
        }
        Ok(())
    }
}
