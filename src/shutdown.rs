use crate::kafka::KafkaBroker;
use crate::{PipelineError, Result};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Duration;
use tracing::{error, info, warn};

/// Graceful shutdown coordinator
#[derive(Clone)]
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    components: Arc<Mutex<Vec<Box<dyn ShutdownComponent + Send + Sync>>>>,
    shutdown_timeout: Duration,
}

/// Trait for components that need graceful shutdown
#[async_trait::async_trait]
pub trait ShutdownComponent {
    async fn shutdown(&self) -> Result<()>;
    fn name(&self) -> &str;
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl ShutdownCoordinator {
    pub fn new(shutdown_timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            shutdown_tx,
            components: Arc::new(Mutex::new(Vec::new())),
            shutdown_timeout,
        }
    }

    /// Register a component for graceful shutdown
    pub async fn register_component(&self, component: Box<dyn ShutdownComponent + Send + Sync>) {
        let mut components = self.components.lock().await;
        info!("Registering component '{}' for graceful shutdown", component.name());
        components.push(component);
    }

    /// Get a shutdown signal receiver
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signal every subscriber, then shut components down in registration order.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Initiating graceful shutdown...");

        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("No one listening for the shutdown signal: {}", e);
        }

        let shutdown_all = async {
            let mut components = self.components.lock().await;
            for component in components.drain(..) {
                info!("Shutting down component '{}'", component.name());
                match component.shutdown().await {
                    Ok(()) => info!("Component '{}' shutdown successfully", component.name()),
                    Err(e) => error!("Component '{}' shutdown failed: {}", component.name(), e),
                }
            }
        };

        match tokio::time::timeout(self.shutdown_timeout, shutdown_all).await {
            Ok(()) => {
                info!("All components shutdown successfully");
                Ok(())
            }
            Err(_) => {
                error!("Shutdown timeout exceeded, forcing exit");
                Err(PipelineError::InvalidArgument("Shutdown timeout exceeded".to_string()))
            }
        }
    }
}

/// Stops the Kafka queue workers and flushes the producer.
pub struct KafkaBrokerShutdown {
    broker: Arc<KafkaBroker>,
}

impl KafkaBrokerShutdown {
    pub fn new(broker: Arc<KafkaBroker>) -> Self {
        Self { broker }
    }
}

#[async_trait::async_trait]
impl ShutdownComponent for KafkaBrokerShutdown {
    async fn shutdown(&self) -> Result<()> {
        info!("Stopping Kafka workers and flushing producer...");
        self.broker.shutdown().await?;
        info!("Kafka broker stopped");
        Ok(())
    }

    fn name(&self) -> &str {
        "kafka-broker"
    }
}

/// Resolves on SIGTERM or SIGINT (Ctrl+C elsewhere).
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
                    _ = sigint.recv() => info!("Received SIGINT (Ctrl+C), initiating graceful shutdown"),
                }
            }
            _ => {
                error!("Failed to install signal handlers, falling back to Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C, initiating graceful shutdown");
    }
}

/// Run `service_future` until it finishes or a signal arrives, then shut everything down.
pub async fn run_with_graceful_shutdown<F, Fut>(
    service_name: &str,
    service_future: F,
    shutdown_coordinator: ShutdownCoordinator,
) -> Result<()>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    info!("Starting service '{}'", service_name);

    let service_result = tokio::select! {
        result = service_future() => {
            info!("Service '{}' completed", service_name);
            result
        }
        _ = wait_for_signal() => {
            info!("Service '{}' received shutdown signal", service_name);
            Ok(())
        }
    };

    if let Err(e) = shutdown_coordinator.shutdown().await {
        error!("Failed to shutdown service '{}': {}", service_name, e);
        return Err(e);
    }

    service_result
}
