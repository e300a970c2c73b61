use crate::{PipelineError, Result, ServiceConfig};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::warn;

fn read_properties<P: AsRef<Path>>(path: P) -> Result<HashMap<String, String>> {
    let file = File::open(&path).map_err(|e| {
        PipelineError::InvalidArgument(format!("Failed to open config file {:?}: {}", path.as_ref(), e))
    })?;

    let reader = BufReader::new(file);
    java_properties::read(reader)
        .map_err(|e| PipelineError::InvalidArgument(format!("Failed to parse properties: {}", e)))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| PipelineError::InvalidArgument(format!("Invalid number for {}: {}", key, value)))
}

/// Apply one property to the config. Unrecognised keys are handed to librdkafka.
fn apply_property(config: &mut ServiceConfig, key: String, value: String) -> Result<()> {
    let topology = &mut config.topology;
    let settings = &mut config.settings;

    match key.as_str() {
        "bootstrap.servers" => config.kafka.bootstrap_servers = value,
        "security.protocol" => config.kafka.security_protocol = Some(value),
        "sasl.mechanism" => config.kafka.sasl_mechanism = Some(value),
        "sasl.username" => config.kafka.sasl_username = Some(value),
        "sasl.password" => config.kafka.sasl_password = Some(value),
        "ssl.ca.location" => config.kafka.ssl_ca_location = Some(value),

        "topic.store.mutation.exchange" => topology.store_mutation_exchange = value,
        "topic.store.index-sync.queue" => topology.index_sync_queue = value,
        "topic.store.index-sync.dlq" => topology.index_sync_dlq = value,
        "topic.vacancy.exchange" => topology.vacancy_exchange = value,
        "topic.vacancy.routing-key" => topology.vacancy_routing_key = value,
        "topic.vacancy.queue" => topology.vacancy_queue = value,
        "topic.vacancy.dlq" => topology.vacancy_dlq = value,
        "topic.event-open.exchange" => topology.event_open_exchange = value,
        "topic.event-open.notification.queue" => topology.event_open_notification_queue = value,
        "topic.event-open.analytics.queue" => topology.event_open_analytics_queue = value,
        "topic.reminder.exchange" => topology.reminder_exchange = value,
        "topic.reminder.register.key" => topology.reminder_register_key = value,
        "topic.reminder.due.key" => topology.reminder_due_key = value,
        "topic.reminder.register.queue" => topology.reminder_register_queue = value,
        "topic.reminder.due.queue" => topology.reminder_due_queue = value,
        "topic.dead-letter.exchange" => topology.dead_letter_exchange = value,

        "pipeline.max.deliveries" => settings.max_deliveries = parse_number(&key, &value)?,
        "pipeline.waitlist.capacity" => settings.waitlist_capacity = parse_number(&key, &value)?,
        "pipeline.reminder.lead.minutes" => {
            settings.reminder_lead_minutes = parse_number(&key, &value)?
        }
        "pipeline.sweep.interval.secs" => {
            settings.sweep_interval_secs = parse_number(&key, &value)?
        }
        "pipeline.release.interval.secs" => {
            settings.release_interval_secs = parse_number(&key, &value)?
        }
        "pipeline.cache.ttl.secs" => settings.cache_ttl_secs = parse_number(&key, &value)?,
        "pipeline.cache.listing.prefix" => settings.listing_cache_prefix = value,
        "pipeline.ack.timeout.ms" => settings.ack_timeout_ms = parse_number(&key, &value)?,

        _ if key.starts_with("topic.") || key.starts_with("pipeline.") => {
            warn!("Ignoring unknown pipeline property '{}'", key);
        }
        _ => {
            config.kafka.additional_properties.insert(key, value);
        }
    }

    Ok(())
}

/// Parse Java properties file into ServiceConfig
pub fn parse_properties_file<P: AsRef<Path>>(path: P, application_id: &str) -> Result<ServiceConfig> {
    let properties = read_properties(path)?;
    let mut config = ServiceConfig::new(application_id);

    for (key, value) in properties {
        apply_property(&mut config, key, value)?;
    }

    validate(&config)?;
    Ok(config)
}

/// Checks that hold for every loaded config, whichever files it came from.
fn validate(config: &ServiceConfig) -> Result<()> {
    if config.settings.max_deliveries == 0 {
        return Err(PipelineError::InvalidArgument(
            "pipeline.max.deliveries must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Parse an override properties file and merge it into an existing config
pub fn merge_stream_properties<P: AsRef<Path>>(mut config: ServiceConfig, path: P) -> Result<ServiceConfig> {
    let properties = read_properties(path)?;

    for (key, value) in properties {
        apply_property(&mut config, key, value)?;
    }

    validate(&config)?;
    Ok(config)
}
