//! zonelink sensor pipeline
//!
//! Ingests tracker frames from the feed listener, runs the occupancy
//! engine once per frame, and publishes the encoded zone light vector to
//! the relay under the sensor role whenever it changes or on the
//! periodic republish tick.

use clap::Parser;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use zonelink::domain::types::{Role, ZoneLights};
use zonelink::infra::{Config, Metrics};
use zonelink::io::{
    start_feed_listener, wire, FeedListenerConfig, RelayClient, RelayClientConfig,
};
use zonelink::services::OccupancyEngine;

/// zonelink-sensor - occupancy engine and state producer
#[derive(Parser, Debug)]
#[command(name = "zonelink-sensor", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("zonelink sensor starting");

    let args = Args::parse();
    let config = Config::from_file(&args.config)?;

    if config.zones().is_empty() {
        anyhow::bail!("no zones configured; the sensor needs at least one");
    }

    info!(
        config_file = %config.config_file(),
        relay_addr = %config.relay_addr(),
        feed_port = %config.feed_port(),
        zones = config.zones().len(),
        dwell_ms = %config.dwell_threshold().as_millis(),
        grace_ms = %config.grace_threshold().as_millis(),
        "config_loaded"
    );

    let metrics = Arc::new(Metrics::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    // Relay connection (producer role)
    let (client, mut client_events) = RelayClient::new(RelayClientConfig {
        addr: config.relay_addr().to_string(),
        role: Role::Sensor,
        dial_timeout: config.dial_timeout(),
        backoff_min: config.reconnect_min(),
        backoff_max: config.reconnect_max(),
    });
    let client = Arc::new(client);
    {
        let client = client.clone();
        let client_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            client.run(client_shutdown).await;
        });
    }
    // The sensor only produces; drain lifecycle events for the log
    tokio::spawn(async move {
        while let Some(event) = client_events.recv().await {
            debug!(event = ?event, "relay_client_event");
        }
    });

    // Tracker feed (bounded for backpressure)
    let (frame_tx, mut frame_rx) = mpsc::channel(1000);
    let feed_config =
        FeedListenerConfig { port: config.feed_port(), enabled: config.feed_enabled() };
    let feed_metrics = metrics.clone();
    let feed_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) =
            start_feed_listener(feed_config, frame_tx, feed_metrics, feed_shutdown).await
        {
            tracing::error!(error = %e, "feed_listener_error");
        }
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

    let mut engine = OccupancyEngine::new(
        config.zones().to_vec(),
        config.dwell_threshold(),
        config.grace_threshold(),
    );
    let mut last_sent: Option<ZoneLights> = None;
    let mut republish = tokio::time::interval(config.republish_interval());
    let mut shutdown = shutdown_rx;

    info!("sensor_pipeline_started");

    loop {
        tokio::select! {
            frame = frame_rx.recv() => {
                let Some(frame) = frame else { break };
                let lights = engine.update(Instant::now(), &frame.tracked_objects);
                if last_sent.as_ref() != Some(&lights) {
                    publish(&client, &metrics, &lights);
                    last_sent = Some(lights);
                }
            }
            // Resend the current vector so a freshly connected actuator
            // converges without waiting for a change. An empty update
            // runs the grace sweep, so lights expire between frames too.
            _ = republish.tick() => {
                let lights = engine.update(Instant::now(), &[]);
                publish(&client, &metrics, &lights);
                last_sent = Some(lights);
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("zonelink sensor shutdown complete");
    Ok(())
}

fn publish(client: &RelayClient, metrics: &Metrics, lights: &ZoneLights) {
    let message = wire::encode_lights(lights);
    match client.send_line(message) {
        Ok(()) => {
            metrics.record_state_published();
            debug!(lights = ?lights, "state_published");
        }
        Err(e) => {
            warn!(error = %e, "state_publish_failed");
        }
    }
}
