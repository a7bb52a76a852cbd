use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use notify_dispatch::{
    api::run_api_server,
    clients::{
        adapter::ConfiguredProviderFactory, queue::NotificationQueue, rbmq::RabbitMqClient,
        registry::ProviderRegistry,
    },
    config::Config,
    dispatcher::{DeferMode, Dispatcher},
    strategy::DispatchStrategy,
    utils::retry_with_backoff,
};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let strategy = Arc::new(DispatchStrategy::from_config(&config)?);
    let defer_mode = DeferMode::parse(&config.defer_mode, config.defer_tiers()?)?;

    let factory = Arc::new(ConfiguredProviderFactory::new(&config)?);
    let registry = Arc::new(ProviderRegistry::new(factory));

    let available = registry
        .list_available()
        .await
        .map_err(|e| anyhow!("Provider configuration is invalid: {}", e))?;
    info!(providers = ?available, "Providers available");

    let gateway = retry_with_backoff("broker connection", &config.retry_config(), || {
        RabbitMqClient::connect(&config)
    })
    .await
    .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;
    let gateway = Arc::new(gateway);

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&gateway) as Arc<dyn NotificationQueue>,
        strategy,
        registry,
        defer_mode,
    ));

    let consumer = {
        let gateway = Arc::clone(&gateway);
        let handler = Arc::clone(&dispatcher);

        tokio::spawn(async move {
            if let Err(e) = gateway.consume(handler).await {
                error!(error = %e, "Consumer stopped");
            }
        })
    };

    info!("Dispatcher is ready");

    run_api_server(config.server_port, dispatcher, shutdown_signal()).await?;

    gateway.close().await;
    consumer.abort();

    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!(error = %e, "Failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
