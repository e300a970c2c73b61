use crate::Result;
use prometheus::{register_counter_with_registry, Counter, Encoder, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics collector for the pipeline
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    // Broker metrics
    pub messages_published: Counter,
    pub messages_consumed: Counter,
    pub handler_failures: Counter,
    pub redeliveries: Counter,
    pub dead_lettered: Counter,
    pub dead_letters_reprocessed: Counter,
    pub dead_letters_abandoned: Counter,

    // Consumer side effects
    pub index_writes: Counter,
    pub cache_keys_evicted: Counter,
    pub notifications_sent: Counter,
    pub duplicates_skipped: Counter,
    pub waitlist_rejections: Counter,
    pub reminders_swept: Counter,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<Counter> {
    Ok(register_counter_with_registry!(Opts::new(name, help), registry)?)
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        let r = registry.as_ref();

        Ok(Self {
            messages_published: counter(r, "pipeline_messages_published_total", "Messages accepted by the broker")?,
            messages_consumed: counter(r, "pipeline_messages_consumed_total", "Messages handled successfully")?,
            handler_failures: counter(r, "pipeline_handler_failures_total", "Handler invocations that failed")?,
            redeliveries: counter(r, "pipeline_redeliveries_total", "Failed messages scheduled for redelivery")?,
            dead_lettered: counter(r, "pipeline_dead_lettered_total", "Messages moved to a dead-letter queue")?,
            dead_letters_reprocessed: counter(
                r,
                "pipeline_dead_letters_reprocessed_total",
                "Dead letters recovered by the reprocessor",
            )?,
            dead_letters_abandoned: counter(
                r,
                "pipeline_dead_letters_abandoned_total",
                "Dead letters that failed their final retry",
            )?,
            index_writes: counter(r, "pipeline_index_writes_total", "Search index upserts and deletes applied")?,
            cache_keys_evicted: counter(r, "pipeline_cache_keys_evicted_total", "Cache keys evicted by invalidation")?,
            notifications_sent: counter(r, "pipeline_notifications_sent_total", "Notifications dispatched")?,
            duplicates_skipped: counter(
                r,
                "pipeline_duplicates_skipped_total",
                "Redelivered messages ignored by idempotency guards",
            )?,
            waitlist_rejections: counter(
                r,
                "pipeline_waitlist_rejections_total",
                "Waitlist registrations rejected (full or duplicate)",
            )?,
            reminders_swept: counter(r, "pipeline_reminders_swept_total", "Reminders emitted by the reconciliation sweep")?,
            registry,
        })
    }

    /// Export metrics in Prometheus format
    pub fn export(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| crate::PipelineError::InvalidArgument(e.to_string()))
    }
}

/// Health check endpoint
pub async fn health_endpoint() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "reservation-pipeline"
    }))
}

/// Metrics endpoint for Prometheus scraping
pub async fn metrics_endpoint(
    axum::extract::State(metrics): axum::extract::State<Arc<Metrics>>,
) -> std::result::Result<String, axum::http::StatusCode> {
    metrics.export().map_err(|e| {
        tracing::error!("Failed to export metrics: {}", e);
        axum::http::StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// Router serving `/health` and `/metrics`.
pub fn ops_router(metrics: Arc<Metrics>) -> axum::Router {
    axum::Router::new()
        .route("/health", axum::routing::get(health_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .layer(
            tower::ServiceBuilder::new()
                .layer(tower_http::trace::TraceLayer::new_for_http())
                .layer(tower_http::cors::CorsLayer::permissive()),
        )
        .with_state(metrics)
}
