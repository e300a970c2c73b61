use crate::{MutationKeys, PipelineSettings, TopologyConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    /// Exact routing-key match.
    Direct,
    /// Every bound queue gets a copy; routing keys are ignored.
    Fanout,
}

#[derive(Debug, Clone)]
pub struct ExchangeSpec {
    pub name: String,
    pub kind: ExchangeKind,
}

#[derive(Debug, Clone)]
pub struct QueueSpec {
    pub name: String,
    pub exchange: String,
    /// Ignored when the exchange is fanout.
    pub routing_keys: Vec<String>,
    pub max_deliveries: u32,
    /// Queue that receives this queue's dead letters, if any.
    pub dead_letter_queue: Option<String>,
}

impl QueueSpec {
    fn new(name: &str, exchange: &str, routing_keys: &[&str], max_deliveries: u32) -> Self {
        Self {
            name: name.to_string(),
            exchange: exchange.to_string(),
            routing_keys: routing_keys.iter().map(|k| k.to_string()).collect(),
            max_deliveries,
            dead_letter_queue: None,
        }
    }

    fn with_dead_letter(mut self, dlq: &str) -> Self {
        self.dead_letter_queue = Some(dlq.to_string());
        self
    }
}

/// Typed routing table: exchanges and the queues bound to them.
#[derive(Debug, Clone)]
pub struct Topology {
    pub exchanges: Vec<ExchangeSpec>,
    pub queues: Vec<QueueSpec>,
    pub dead_letter_exchange: String,
}

impl Topology {
    pub fn from_config(config: &TopologyConfig, settings: &PipelineSettings) -> Self {
        let max = settings.max_deliveries;
        let direct = |name: &str| ExchangeSpec {
            name: name.to_string(),
            kind: ExchangeKind::Direct,
        };

        let exchanges = vec![
            direct(&config.store_mutation_exchange),
            direct(&config.vacancy_exchange),
            ExchangeSpec {
                name: config.event_open_exchange.clone(),
                kind: ExchangeKind::Fanout,
            },
            direct(&config.reminder_exchange),
            direct(&config.dead_letter_exchange),
        ];

        let dlx = &config.dead_letter_exchange;
        let queues = vec![
            QueueSpec::new(&config.index_sync_queue, &config.store_mutation_exchange, &MutationKeys::ALL, max)
                .with_dead_letter(&config.index_sync_dlq),
            QueueSpec::new(&config.index_sync_dlq, dlx, &[config.index_sync_queue.as_str()], 1),
            QueueSpec::new(&config.vacancy_queue, &config.vacancy_exchange, &[config.vacancy_routing_key.as_str()], max)
                .with_dead_letter(&config.vacancy_dlq),
            QueueSpec::new(&config.vacancy_dlq, dlx, &[config.vacancy_queue.as_str()], 1),
            QueueSpec::new(&config.event_open_notification_queue, &config.event_open_exchange, &[], max),
            QueueSpec::new(&config.event_open_analytics_queue, &config.event_open_exchange, &[], max),
            QueueSpec::new(
                &config.reminder_register_queue,
                &config.reminder_exchange,
                &[config.reminder_register_key.as_str()],
                max,
            ),
            QueueSpec::new(&config.reminder_due_queue, &config.reminder_exchange, &[config.reminder_due_key.as_str()], max),
        ];

        Self {
            exchanges,
            queues,
            dead_letter_exchange: config.dead_letter_exchange.clone(),
        }
    }

    pub fn exchange(&self, name: &str) -> Option<&ExchangeSpec> {
        self.exchanges.iter().find(|e| e.name == name)
    }

    pub fn queue(&self, name: &str) -> Option<&QueueSpec> {
        self.queues.iter().find(|q| q.name == name)
    }

    /// Queues that receive a message published to `exchange` with `routing_key`.
    pub fn route<'a>(&'a self, exchange: &ExchangeSpec, routing_key: &'a str) -> impl Iterator<Item = &'a QueueSpec> + 'a {
        let exchange_name = exchange.name.clone();
        let kind = exchange.kind;
        self.queues.iter().filter(move |q| {
            q.exchange == exchange_name
                && (kind == ExchangeKind::Fanout || q.routing_keys.iter().any(|k| k == routing_key))
        })
    }
}
