//! Reconnecting relay client, shared by the sensor and actuator binaries
//!
//! Maintains one persistent connection to the relay. On connect the role
//! handshake line is sent first, then reading and writing run as
//! independent halves. Transport loss surfaces as a `Disconnected` event
//! and the client reconnects with bounded exponential backoff; callers
//! never block on the network (sends go through a bounded outbound queue
//! via try_send).

use crate::domain::types::Role;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

/// Log connection failure (cold path)
#[cold]
fn log_connect_failed(addr: &str, e: &(dyn std::error::Error + Send + Sync)) {
    warn!(addr = %addr, error = %e, "relay_connect_failed");
}

#[derive(Debug, Clone)]
pub struct RelayClientConfig {
    pub addr: String,
    pub role: Role,
    pub dial_timeout: Duration,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
}

/// Connection lifecycle and inbound traffic, delivered to the owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Connected,
    /// One newline-framed message from the relay
    Line(String),
    Disconnected,
}

pub struct RelayClient {
    config: RelayClientConfig,
    outbound_tx: mpsc::Sender<String>,
    outbound_rx: Arc<Mutex<mpsc::Receiver<String>>>,
    event_tx: mpsc::Sender<ClientEvent>,
}

impl RelayClient {
    /// Create the client and the event receiver its owner consumes
    pub fn new(config: RelayClientConfig) -> (Self, mpsc::Receiver<ClientEvent>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(256);
        let client = Self {
            config,
            outbound_tx,
            outbound_rx: Arc::new(Mutex::new(outbound_rx)),
            event_tx,
        };
        (client, event_rx)
    }

    /// Queue one message for the relay without blocking
    ///
    /// Returns Err when the queue is full or the client is gone; the
    /// sensor treats that as a drop, the next state change resends.
    pub fn send_line(&self, line: String) -> Result<(), TrySendError<String>> {
        self.outbound_tx.try_send(line)
    }

    /// Connect-serve-reconnect loop; runs until shutdown
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = self.config.backoff_min;

        loop {
            if *shutdown.borrow() {
                return;
            }

            let stream = match self.connect().await {
                Ok(stream) => stream,
                Err(e) => {
                    log_connect_failed(&self.config.addr, e.as_ref());
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = shutdown.changed() => return,
                    }
                    backoff = (backoff * 2).min(self.config.backoff_max);
                    continue;
                }
            };
            backoff = self.config.backoff_min;

            let _ = self.event_tx.send(ClientEvent::Connected).await;

            let (read_half, write_half) = tokio::io::split(stream);

            let mut read_handle = {
                let event_tx = self.event_tx.clone();
                tokio::spawn(read_loop(read_half, event_tx))
            };
            let mut write_handle = {
                let outbound_rx = self.outbound_rx.clone();
                tokio::spawn(write_loop(write_half, outbound_rx))
            };

            tokio::select! {
                _ = &mut read_handle => {
                    debug!("relay_client_read_loop_exited");
                }
                _ = &mut write_handle => {
                    debug!("relay_client_write_loop_exited");
                }
                _ = shutdown.changed() => {
                    read_handle.abort();
                    write_handle.abort();
                    info!(role = %self.config.role, "relay_client_shutdown");
                    return;
                }
            }

            // The surviving half would otherwise pin the outbound queue
            // lock across the reconnect
            read_handle.abort();
            write_handle.abort();

            let _ = self.event_tx.send(ClientEvent::Disconnected).await;

            tokio::select! {
                _ = tokio::time::sleep(self.config.backoff_min) => {}
                _ = shutdown.changed() => return,
            }
        }
    }

    async fn connect(&self) -> Result<TcpStream, Box<dyn std::error::Error + Send + Sync>> {
        info!(addr = %self.config.addr, role = %self.config.role, "relay_connecting");

        let mut stream = tokio::time::timeout(
            self.config.dial_timeout,
            TcpStream::connect(&self.config.addr),
        )
        .await??;
        stream.set_nodelay(true)?;

        // Role handshake is the first line on the wire
        let handshake = format!("{}\n", self.config.role);
        stream.write_all(handshake.as_bytes()).await?;

        info!(addr = %self.config.addr, role = %self.config.role, "relay_connected");
        Ok(stream)
    }
}

async fn read_loop(read_half: ReadHalf<TcpStream>, event_tx: mpsc::Sender<ClientEvent>) {
    let reader = BufReader::new(read_half);
    let mut lines = reader.lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim_end_matches('\r').to_string();
                if line.is_empty() {
                    continue;
                }
                if let Err(TrySendError::Closed(_)) = event_tx.try_send(ClientEvent::Line(line)) {
                    return;
                }
                // Full queue: drop, the next message carries newer state
            }
            Ok(None) => {
                debug!("relay_client_connection_closed");
                return;
            }
            Err(e) => {
                warn!(error = %e, "relay_client_read_error");
                return;
            }
        }
    }
}

async fn write_loop(
    mut write_half: WriteHalf<TcpStream>,
    outbound_rx: Arc<Mutex<mpsc::Receiver<String>>>,
) {
    let mut outbound = outbound_rx.lock().await;

    while let Some(line) = outbound.recv().await {
        let framed = format!("{line}\n");
        if let Err(e) = write_half.write_all(framed.as_bytes()).await {
            warn!(error = %e, "relay_client_write_error");
            return;
        }
    }
}
