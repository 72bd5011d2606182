//! Conthesis Actions - Main Entry Point

mod telemetry;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use conthesis_api_bus::BusListener;
use conthesis_core::application::{shutdown_channel, ActionService, Manager};
use conthesis_core::port::time_provider::SystemTimeProvider;
use conthesis_core::port::{EntityStore, KvStore, MessageBus, TimeProvider};
use conthesis_infra_nats::{NatsBus, NatsEntityStore};

const VERSION: &str = env!("CARGO_PKG_VERSION");

const SWEEPER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging (JSON in production, pretty for development)
    let log_format = std::env::var("CONTHESIS_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .expect("Failed to create env filter");

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("Conthesis Actions v{} starting...", VERSION);

    // 1.1. Initialize OpenTelemetry (optional)
    if let Err(err) = telemetry::init_telemetry() {
        tracing::warn!(error = ?err, "Failed to initialize OpenTelemetry (continuing without it)");
    }

    // 2. Load configuration
    let nats_url = std::env::var("NATS_URL").context("NATS_URL must be set")?;
    let redis_url = std::env::var("REDIS_URL").context("REDIS_URL must be set")?;

    // 3. Connect external collaborators
    info!(url = %nats_url, "Connecting to bus...");
    let nats = async_nats::connect(&nats_url)
        .await
        .context("bus connection failed")?;

    info!("Connecting to store...");
    let store: Arc<dyn KvStore> = Arc::new(
        conthesis_infra_redis::connect(&redis_url)
            .await
            .map_err(|err| anyhow::anyhow!("store connection failed: {err}"))?,
    );

    // 4. Setup dependencies (DI wiring)
    let bus: Arc<dyn MessageBus> = Arc::new(NatsBus::new(nats.clone()));
    let entities: Arc<dyn EntityStore> = Arc::new(NatsEntityStore::new(nats.clone()));
    let time: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);

    let service = Arc::new(ActionService::new(bus, entities));
    let manager = Arc::new(Manager::new(Arc::clone(&service), store, time));

    // 5. Subscribe the inbound surface
    let listener = BusListener::new(nats.clone(), Arc::clone(&manager), service);
    let subscriptions = listener
        .setup()
        .await
        .map_err(|err| anyhow::anyhow!("bus subscription failed: {err}"))?;

    // 6. Start the sweeper
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let sweeper = manager.start_sweeper(shutdown_rx);

    info!("System ready. Waiting for triggers...");
    info!("Press Ctrl+C to shutdown");

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 8. Graceful shutdown: stop the sweeper, then drain the bus
    shutdown_tx.shutdown();
    let _ = tokio::time::timeout(SWEEPER_STOP_TIMEOUT, sweeper).await;
    for handle in subscriptions {
        handle.abort();
    }
    if let Err(err) = nats.drain().await {
        tracing::warn!(error = %err, "bus drain failed");
    }

    info!("Shutdown complete.");
    Ok(())
}
