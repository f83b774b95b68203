//! Docker Exporter - container CPU and memory metrics for Prometheus
//!
//! Polls the Docker Engine API on a fixed interval and serves per-container
//! and host-wide gauges on /metrics.

use anyhow::{Context, Result};
use exporter_lib::{
    api::{self, AppState},
    collector::PollLoopBuilder,
    engine::DockerClient,
    health::{components, HealthRegistry},
    ExporterMetrics, MetricRegistry, StructuredLogger,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const EXPORTER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = config::ExporterConfig::load()?;
    info!(docker_host = %config.docker_host, "Exporter configured");

    let engine = Arc::new(
        DockerClient::new(&config.docker_host, config.request_timeout())
            .context("Failed to create Docker client")?,
    );
    let logger = StructuredLogger::new(engine.base_url().as_str());

    let registry = Arc::new(MetricRegistry::new()?);
    let metrics = ExporterMetrics::register(registry.prometheus())?;

    let health_registry = HealthRegistry::new();
    health_registry.register(components::ENGINE).await;
    health_registry.register(components::POLLER).await;

    let poll_loop = PollLoopBuilder::new()
        .engine(engine)
        .registry(registry.clone())
        .interval(config.poll_interval())
        .cpu_workers(config.cpu_workers)
        .memory_workers(config.memory_workers)
        .metrics(metrics)
        .health(health_registry.clone())
        .logger(logger.clone())
        .build()?;

    logger.log_startup(EXPORTER_VERSION, config.listen_port);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let poll_handle = tokio::spawn(poll_loop.run(shutdown_tx.subscribe()));

    let app_state = Arc::new(AppState::new(registry, health_registry));
    let mut api_shutdown = shutdown_tx.subscribe();
    let mut api_handle = tokio::spawn(api::serve(config.listen_port, app_state, async move {
        let _ = api_shutdown.recv().await;
    }));

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
        served = &mut api_handle => {
            // The API only returns on its own if it could not start
            logger.log_shutdown("metrics endpoint stopped");
            let _ = shutdown_tx.send(());
            let _ = poll_handle.await;
            let served = served.context("Metrics endpoint task failed")?;
            return served;
        }
    }

    // Any in-flight cycle finishes before the loop observes this
    let _ = shutdown_tx.send(());
    if let Err(e) = poll_handle.await {
        error!(error = %e, "Poll loop task failed");
    }
    match api_handle.await {
        Ok(Err(e)) => error!(error = %e, "Metrics endpoint failed"),
        Err(e) => error!(error = %e, "Metrics endpoint task failed"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}
