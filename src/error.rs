use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Connection or acknowledgment failure talking to the broker.
    #[error("Transient broker error: {0}")]
    TransientBroker(String),

    /// Payload could not be decoded. Never retried.
    #[error("Malformed message on '{queue}': {reason}")]
    MalformedMessage { queue: String, reason: String },

    /// Index, cache or store unreachable. Retried, then dead-lettered.
    #[error("Downstream unavailable ({component}): {reason}")]
    DownstreamUnavailable { component: String, reason: String },

    #[error("Waitlist full for store {store_id}")]
    WaitlistFull { store_id: i64 },

    #[error("User {user_id} is already waiting for store {store_id}")]
    AlreadyWaiting { user_id: i64, store_id: i64 },

    #[error("Unknown queue: {0}")]
    UnknownQueue(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl PipelineError {
    pub fn downstream(component: &str, reason: impl ToString) -> Self {
        Self::DownstreamUnavailable {
            component: component.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(queue: &str, reason: impl ToString) -> Self {
        Self::MalformedMessage {
            queue: queue.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether a failed delivery should be attempted again before dead-lettering.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::MalformedMessage { .. } | Self::Json(_) | Self::UnknownQueue(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
