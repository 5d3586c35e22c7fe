//! Telemetry Gateway - Main Entry Point
//!
//! Receives encrypted sensor datagrams over UDP, scores and stores them.

use anyhow::Context;
use telemetry_gateway::{config::GatewayConfig, Gateway};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::load().context("Loading gateway config")?;

    // Held until exit so buffered file logs are flushed
    let _guard = init_logging(&config);

    tracing::info!("Starting telemetry gateway");
    tracing::debug!(?config, "Effective configuration");

    let gateway = match Gateway::from_config(&config) {
        Ok(gateway) => gateway,
        Err(e) => {
            tracing::error!("Gateway failed to start: {}", e);
            return Err(e.into());
        }
    };

    tracing::info!("Listening on {}", gateway.local_addr()?);
    let stats = gateway.stats();
    gateway.run()?;

    let snapshot = stats.snapshot();
    tracing::info!(
        received = snapshot.received,
        accepted = snapshot.accepted,
        dropped = snapshot.dropped(),
        "Shutting down"
    );
    Ok(())
}

fn init_logging(config: &GatewayConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,telemetry_gateway=debug"));

    let (file_layer, guard) = match &config.logging.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "gateway.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}
