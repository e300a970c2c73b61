use clap::Parser;
use reservation_pipeline::kafka::KafkaBroker;
use reservation_pipeline::shutdown::{run_with_graceful_shutdown, KafkaBrokerShutdown, ShutdownCoordinator};
use reservation_pipeline::{merge_stream_properties, parse_properties_file, Metrics, ServiceConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

mod service;

use service::IndexSyncService;

#[derive(Parser, Debug)]
#[command(name = "index-sync-service")]
#[command(about = "Keeps the store search index and result cache in sync with store writes")]
struct Args {
    /// Config file path
    #[arg(short = 'c', long = "config", default_value = "../client.dev.properties")]
    config: PathBuf,

    /// Override config file path
    #[arg(long = "override-config")]
    override_config: Option<PathBuf>,

    /// Port for /health and /metrics
    #[arg(short = 'p', long = "port", default_value = "9101")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    info!("Starting Index Sync Service");
    info!("Config file: {:?}", args.config);

    let config = load_config(&args)?;
    let metrics = Arc::new(Metrics::new()?);
    let broker = Arc::new(KafkaBroker::new(config.clone(), Arc::clone(&metrics))?);

    let coordinator = ShutdownCoordinator::default();
    coordinator
        .register_component(Box::new(KafkaBrokerShutdown::new(Arc::clone(&broker))))
        .await;

    let service = IndexSyncService::new(config, broker, metrics);
    service.start().await?;

    info!("Index Sync Service started successfully");

    run_with_graceful_shutdown("index-sync-service", || service.serve_ops(args.port), coordinator).await?;
    Ok(())
}

fn load_config(args: &Args) -> reservation_pipeline::Result<ServiceConfig> {
    let mut config = parse_properties_file(&args.config, "index-sync-service")?;

    if let Some(path) = &args.override_config {
        info!("Loading override config from: {:?}", path);
        config = merge_stream_properties(config, path)?;
    }

    Ok(config)
}
