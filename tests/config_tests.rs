use reservation_pipeline::*;
use tempfile::tempdir;

#[tokio::test]
async fn test_config_parsing_integration() {
    let config_content = r#"
bootstrap.servers=localhost:9092,localhost:9093
security.protocol=PLAINTEXT
auto.offset.reset=earliest
topic.vacancy.queue=prod.waitlist.vacancy.notify
topic.reminder.due.key=send-now
pipeline.max.deliveries=3
pipeline.waitlist.capacity=50
pipeline.reminder.lead.minutes=120
pipeline.cache.listing.prefix=prod:stores:search:
"#;

    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("test.properties");
    std::fs::write(&config_path, config_content).unwrap();

    let config = parse_properties_file(&config_path, "notification-service").unwrap();

    assert_eq!(config.application_id, "notification-service");
    assert_eq!(config.kafka.bootstrap_servers, "localhost:9092,localhost:9093");
    assert_eq!(config.kafka.security_protocol, Some("PLAINTEXT".to_string()));
    assert_eq!(
        config.kafka.additional_properties.get("auto.offset.reset"),
        Some(&"earliest".to_string())
    );

    assert_eq!(config.topology.vacancy_queue, "prod.waitlist.vacancy.notify");
    assert_eq!(config.topology.reminder_due_key, "send-now");
    // Untouched names keep their defaults.
    assert_eq!(config.topology.vacancy_exchange, "waitlist.vacancy");

    assert_eq!(config.settings.max_deliveries, 3);
    assert_eq!(config.settings.waitlist_capacity, 50);
    assert_eq!(config.settings.reminder_lead(), chrono::Duration::minutes(120));
    assert_eq!(config.settings.listing_cache_prefix, "prod:stores:search:");

    let override_content = r#"
pipeline.max.deliveries=5
linger.ms=5
"#;
    let override_path = temp_dir.path().join("override.properties");
    std::fs::write(&override_path, override_content).unwrap();

    let merged = merge_stream_properties(config, &override_path).unwrap();
    assert_eq!(merged.settings.max_deliveries, 5);
    assert_eq!(merged.settings.waitlist_capacity, 50);
    assert_eq!(merged.kafka.additional_properties.get("linger.ms"), Some(&"5".to_string()));
}

#[test]
fn test_defaults() {
    let config = ServiceConfig::new("index-sync-service");

    assert_eq!(config.settings.max_deliveries, 2);
    assert_eq!(config.settings.waitlist_capacity, 100);
    assert_eq!(config.settings.reminder_lead(), chrono::Duration::hours(24));
    assert_eq!(config.settings.sweep_interval(), std::time::Duration::from_secs(1800));
    assert_eq!(config.topology.store_mutation_exchange, "store.mutation");
    assert_eq!(config.topology.dead_letter_exchange, "pipeline.dead-letter");
}

#[test]
fn test_unknown_pipeline_keys_are_not_passed_to_kafka() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("typo.properties");
    std::fs::write(&path, "pipeline.max.delivery=4\ntopic.vacancy.qeue=x\n").unwrap();

    let config = parse_properties_file(&path, "svc").unwrap();

    assert_eq!(config.settings.max_deliveries, 2);
    assert!(config.kafka.additional_properties.is_empty());
}

#[test]
fn test_invalid_settings_are_rejected() {
    let temp_dir = tempdir().unwrap();

    let zero = temp_dir.path().join("zero.properties");
    std::fs::write(&zero, "pipeline.max.deliveries=0\n").unwrap();
    assert!(matches!(
        parse_properties_file(&zero, "svc"),
        Err(PipelineError::InvalidArgument(_))
    ));

    let garbage = temp_dir.path().join("garbage.properties");
    std::fs::write(&garbage, "pipeline.waitlist.capacity=lots\n").unwrap();
    assert!(matches!(
        parse_properties_file(&garbage, "svc"),
        Err(PipelineError::InvalidArgument(_))
    ));

    let missing = temp_dir.path().join("missing.properties");
    assert!(parse_properties_file(&missing, "svc").is_err());
}

#[test]
fn test_override_cannot_zero_max_deliveries() {
    let temp_dir = tempdir().unwrap();
    let base = temp_dir.path().join("base.properties");
    std::fs::write(&base, "bootstrap.servers=localhost:9092\npipeline.max.deliveries=3\n").unwrap();
    let override_path = temp_dir.path().join("override.properties");
    std::fs::write(&override_path, "pipeline.max.deliveries=0\n").unwrap();

    let config = parse_properties_file(&base, "svc").unwrap();
    assert!(matches!(
        merge_stream_properties(config, &override_path),
        Err(PipelineError::InvalidArgument(_))
    ));
}

#[test]
fn test_client_configs() {
    let mut config = ServiceConfig::new("notification-service");
    config.kafka.sasl_username = Some("pipeline".to_string());

    let consumer = config.to_consumer_config("waitlist.vacancy.notify");
    assert_eq!(consumer.get("group.id"), Some("notification-service.waitlist.vacancy.notify"));
    assert_eq!(consumer.get("enable.auto.commit"), Some("false"));
    assert_eq!(consumer.get("sasl.username"), Some("pipeline"));

    let producer = config.to_producer_config();
    assert_eq!(producer.get("acks"), Some("all"));
    assert_eq!(producer.get("enable.idempotence"), Some("true"));
    assert_eq!(producer.get("message.timeout.ms"), Some("10000"));
}
