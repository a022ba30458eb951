//! zonelink actuator renderer
//!
//! Connects to the relay under the actuator role, keeps the last-known
//! occupancy flag for its zone of interest, and drives the boolean
//! output at a fixed render tick: toggling while occupied, forced off
//! otherwise. Rendering never blocks on the network; transport loss
//! forces the output off while the client reconnects with backoff.

use clap::Parser;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use zonelink::domain::types::Role;
use zonelink::infra::{Config, Metrics, OutputMode};
use zonelink::io::{
    wire, ClientEvent, FileOutput, LogOutput, OutputDriver, RelayClient, RelayClientConfig,
};
use zonelink::services::RenderState;

/// zonelink-actuator - state consumer and output renderer
#[derive(Parser, Debug)]
#[command(name = "zonelink-actuator", version, about)]
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

    info!("zonelink actuator starting");

    let args = Args::parse();
    let config = Config::from_file(&args.config)?;

    info!(
        config_file = %config.config_file(),
        relay_addr = %config.relay_addr(),
        zone = %config.render_zone(),
        toggle_interval_ms = %config.toggle_interval().as_millis(),
        staleness_timeout_ms = %config.staleness_timeout().map_or(0, |d| d.as_millis() as u64),
        "config_loaded"
    );

    let metrics = Arc::new(Metrics::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let (client, client_events) = RelayClient::new(RelayClientConfig {
        addr: config.relay_addr().to_string(),
        role: Role::Actuator,
        dial_timeout: config.dial_timeout(),
        backoff_min: config.reconnect_min(),
        backoff_max: config.reconnect_max(),
    });
    {
        let client_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            client.run(client_shutdown).await;
        });
    }

    // Shared between the receive path and the render tick
    let state = Arc::new(Mutex::new(RenderState::new(Instant::now())));

    {
        let state = state.clone();
        let metrics = metrics.clone();
        let zone = config.render_zone().to_string();
        tokio::spawn(async move {
            receive_loop(client_events, state, metrics, zone).await;
        });
    }

    let mut output: Box<dyn OutputDriver> = match config.output_mode() {
        OutputMode::Log => Box::new(LogOutput::new()),
        OutputMode::File => {
            // from_file guarantees the path is present in file mode
            let path = config.output_file().unwrap_or_default().to_string();
            Box::new(FileOutput::new(path))
        }
    };

    let staleness = config.staleness_timeout();
    let mut tick = tokio::time::interval(config.toggle_interval());
    let mut shutdown = shutdown_rx;

    info!("render_loop_started");

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let on = state.lock().tick(Instant::now(), staleness);
                output.set(on);
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    output.set(false);
    info!("zonelink actuator shutdown complete");
    Ok(())
}

/// Consume relay client events: state messages update the render state,
/// transport loss forces it off. Parse failures discard the message and
/// leave existing state untouched.
async fn receive_loop(
    mut events: tokio::sync::mpsc::Receiver<ClientEvent>,
    state: Arc<Mutex<RenderState>>,
    metrics: Arc<Metrics>,
    zone: String,
) {
    while let Some(event) = events.recv().await {
        match event {
            ClientEvent::Line(line) => match wire::parse_lights(&line) {
                Ok(pairs) => {
                    // Zone names other than ours are someone else's business
                    if let Some(&(_, occupied)) =
                        pairs.iter().find(|(name, _)| *name == zone)
                    {
                        state.lock().apply(occupied, Instant::now());
                        debug!(zone = %zone, occupied = occupied, "state_applied");
                    }
                }
                Err(e) => {
                    metrics.record_parse_error();
                    warn!(error = %e, "state_message_discarded");
                }
            },
            ClientEvent::Connected => {
                info!("relay_connection_up");
            }
            ClientEvent::Disconnected => {
                state.lock().force_off(Instant::now());
                warn!("relay_connection_lost: output forced off");
            }
        }
    }
}
