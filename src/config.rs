use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    pub bootstrap_servers: String,
    pub security_protocol: Option<String>,
    pub sasl_mechanism: Option<String>,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
    pub ssl_ca_location: Option<String>,
    pub additional_properties: HashMap<String, String>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:29092,localhost:39092,localhost:49092".to_string(),
            security_protocol: None,
            sasl_mechanism: None,
            sasl_username: None,
            sasl_password: None,
            ssl_ca_location: None,
            additional_properties: HashMap::new(),
        }
    }
}

/// Every exchange, queue and routing key the pipeline uses.
///
/// Injected at startup so no component hardcodes a topic name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyConfig {
    pub store_mutation_exchange: String,
    pub index_sync_queue: String,
    pub index_sync_dlq: String,

    pub vacancy_exchange: String,
    pub vacancy_routing_key: String,
    pub vacancy_queue: String,
    pub vacancy_dlq: String,

    pub event_open_exchange: String,
    pub event_open_notification_queue: String,
    pub event_open_analytics_queue: String,

    pub reminder_exchange: String,
    pub reminder_register_key: String,
    pub reminder_due_key: String,
    pub reminder_register_queue: String,
    pub reminder_due_queue: String,

    pub dead_letter_exchange: String,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            store_mutation_exchange: "store.mutation".to_string(),
            index_sync_queue: "store.index-sync".to_string(),
            index_sync_dlq: "store.index-sync.dlq".to_string(),
            vacancy_exchange: "waitlist.vacancy".to_string(),
            vacancy_routing_key: "seat-vacated".to_string(),
            vacancy_queue: "waitlist.vacancy.notify".to_string(),
            vacancy_dlq: "waitlist.vacancy.dlq".to_string(),
            event_open_exchange: "event.opened".to_string(),
            event_open_notification_queue: "event.opened.notify".to_string(),
            event_open_analytics_queue: "event.opened.analytics".to_string(),
            reminder_exchange: "reservation.reminder".to_string(),
            reminder_register_key: "register".to_string(),
            reminder_due_key: "due".to_string(),
            reminder_register_queue: "reservation.reminder.register".to_string(),
            reminder_due_queue: "reservation.reminder.due".to_string(),
            dead_letter_exchange: "pipeline.dead-letter".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Deliveries a message gets in its primary queue before it is dead-lettered.
    pub max_deliveries: u32,
    pub waitlist_capacity: usize,
    pub reminder_lead_minutes: i64,
    pub sweep_interval_secs: u64,
    pub release_interval_secs: u64,
    pub cache_ttl_secs: u64,
    pub listing_cache_prefix: String,
    pub ack_timeout_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_deliveries: 2,
            waitlist_capacity: 100,
            reminder_lead_minutes: 24 * 60,
            sweep_interval_secs: 30 * 60,
            release_interval_secs: 60,
            cache_ttl_secs: 600,
            listing_cache_prefix: "stores:search:".to_string(),
            ack_timeout_ms: 10_000,
        }
    }
}

impl PipelineSettings {
    pub fn reminder_lead(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.reminder_lead_minutes)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn release_interval(&self) -> Duration {
        Duration::from_secs(self.release_interval_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub application_id: String,
    pub kafka: KafkaConfig,
    pub topology: TopologyConfig,
    pub settings: PipelineSettings,
}

impl ServiceConfig {
    pub fn new(application_id: &str) -> Self {
        Self {
            application_id: application_id.to_string(),
            kafka: KafkaConfig::default(),
            topology: TopologyConfig::default(),
            settings: PipelineSettings::default(),
        }
    }

    fn base_kafka_config(&self) -> rdkafka::ClientConfig {
        let mut config = rdkafka::ClientConfig::new();

        config.set("bootstrap.servers", &self.kafka.bootstrap_servers);

        if let Some(security_protocol) = &self.kafka.security_protocol {
            config.set("security.protocol", security_protocol);
        }

        if let Some(sasl_mechanism) = &self.kafka.sasl_mechanism {
            config.set("sasl.mechanism", sasl_mechanism);
        }

        if let Some(sasl_username) = &self.kafka.sasl_username {
            config.set("sasl.username", sasl_username);
        }

        if let Some(sasl_password) = &self.kafka.sasl_password {
            config.set("sasl.password", sasl_password);
        }

        if let Some(ssl_ca_location) = &self.kafka.ssl_ca_location {
            config.set("ssl.ca.location", ssl_ca_location);
        }

        for (key, value) in &self.kafka.additional_properties {
            config.set(key, value);
        }

        config
    }

    /// Producer settings: every accepted message is replicated before it is acknowledged.
    pub fn to_producer_config(&self) -> rdkafka::ClientConfig {
        let mut config = self.base_kafka_config();
        config.set("acks", "all");
        config.set("enable.idempotence", "true");
        config.set("message.timeout.ms", self.settings.ack_timeout_ms.to_string());
        config
    }

    /// Consumer settings for one queue. Each queue is its own consumer group.
    pub fn to_consumer_config(&self, queue: &str) -> rdkafka::ClientConfig {
        let mut config = self.base_kafka_config();
        config.set("group.id", format!("{}.{}", self.application_id, queue));
        config.set("auto.offset.reset", "earliest");
        config.set("enable.auto.commit", "false");
        config.set("enable.partition.eof", "false");
        config
    }
}
