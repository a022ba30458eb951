//! zonelink relay broker
//!
//! Rendezvous point between the sensor pipeline and the actuator
//! renderer. Peers connect over TCP, declare a role, and state messages
//! flow sensor -> actuator while both ends are present.

use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use zonelink::infra::{Config, Metrics};
use zonelink::io::RelayServer;

/// zonelink - role-based relay between occupancy sensor and actuator
#[derive(Parser, Debug)]
#[command(name = "zonelink", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging, level via RUST_LOG (default INFO)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("zonelink relay starting");

    let args = Args::parse();

    // Malformed configuration (including bad zone definitions) is fatal
    let config = Config::from_file(&args.config)?;

    info!(
        config_file = %config.config_file(),
        bind_addr = %config.relay_bind_addr(),
        metrics_interval_secs = %config.metrics_interval_secs(),
        "config_loaded"
    );

    let metrics = Arc::new(Metrics::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    // Periodic metrics reporter
    let reporter_metrics = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            reporter_metrics.report().log();
        }
    });

    let server = RelayServer::bind(&config.relay_bind_addr(), metrics).await?;
    server.run(shutdown_rx).await;

    info!("zonelink relay shutdown complete");
    Ok(())
}
