//! Tracker feed listener
//!
//! Accepts TCP connections from the external multi-object tracker and
//! reads frames as JSON lines:
//! `{"tracked_objects": [{"track_id": 7, "bbox": [x1, y1, x2, y2]}]}`.
//! Frames are timestamped at receipt from the monotonic clock by the
//! engine loop; this module only parses and hands them over without
//! blocking (drops are counted).

use crate::domain::types::FeedFrame;
use crate::infra::metrics::Metrics;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Feed listener configuration
#[derive(Debug, Clone)]
pub struct FeedListenerConfig {
    pub port: u16,
    pub enabled: bool,
}

impl Default for FeedListenerConfig {
    fn default() -> Self {
        Self { port: 25900, enabled: true }
    }
}

/// Start the tracker feed listener
pub async fn start_feed_listener(
    config: FeedListenerConfig,
    frame_tx: mpsc::Sender<FeedFrame>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if !config.enabled {
        info!("feed_listener_disabled");
        return Ok(());
    }

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;

    info!(port = %config.port, "feed_listener_started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("feed_listener_shutdown");
                    return Ok(());
                }
            }
            result = listener.accept() => {
                match result {
                    Ok((socket, addr)) => {
                        let tx = frame_tx.clone();
                        let m = metrics.clone();
                        tokio::spawn(async move {
                            handle_feed_connection(socket, addr, tx, m).await;
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "feed_accept_failed");
                    }
                }
            }
        }
    }
}

async fn handle_feed_connection(
    socket: tokio::net::TcpStream,
    addr: SocketAddr,
    frame_tx: mpsc::Sender<FeedFrame>,
    metrics: Arc<Metrics>,
) {
    debug!(peer = %addr, "feed_connection_accepted");

    let reader = BufReader::new(socket);
    let mut lines = reader.lines();

    // Rate-limit drop warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let frame: FeedFrame = match serde_json::from_str(line) {
            Ok(frame) => frame,
            Err(e) => {
                metrics.record_parse_error();
                warn!(peer = %addr, error = %e, "feed_frame_parse_failed");
                continue;
            }
        };

        metrics.record_frame_received();
        match frame_tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                metrics.record_frame_dropped();
                if last_drop_warn.elapsed() > Duration::from_secs(1) {
                    warn!(peer = %addr, "feed_frame_dropped: channel full");
                    last_drop_warn = Instant::now();
                }
            }
            Err(TrySendError::Closed(_)) => {
                warn!(peer = %addr, "feed_channel_closed");
                break;
            }
        }
    }

    debug!(peer = %addr, "feed_connection_closed");
}
