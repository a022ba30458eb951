//! Role-based relay broker
//!
//! Accepts TCP connections, reads a one-time newline-terminated role
//! handshake, and registers the connection under its role. Messages from
//! the sensor role are forwarded verbatim to the currently registered
//! actuator; messages from the actuator are observed and logged only.
//!
//! Delivery is best-effort: with no actuator registered a message is
//! dropped, never queued. A new connection for a role silently supersedes
//! the prior one. Registry mutation is atomic with respect to other
//! connections - registration, lookup, and forwarding all go through one
//! mutex so a superseded connection can never race its successor.

use crate::domain::types::Role;
use crate::infra::metrics::Metrics;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

/// Outbox depth per registered connection; forwarding never blocks on a
/// slow peer, excess messages are dropped
const OUTBOX_CAPACITY: usize = 64;

/// Registered connection slot: outbox plus the generation that owns it
struct RoleSlot {
    generation: u64,
    outbox: mpsc::Sender<String>,
}

#[derive(Default)]
struct RegistryInner {
    next_generation: u64,
    slots: HashMap<Role, RoleSlot>,
}

/// Outcome of forwarding one sensor message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// Queued on the actuator outbox
    Forwarded,
    /// No actuator registered - dropped
    NoConsumer,
    /// Actuator outbox full - dropped
    ConsumerBusy,
    /// Actuator outbox closed - unregistered, dropped
    ConsumerGone,
    /// Sender is no longer the registered sensor connection
    Superseded,
}

/// Role -> connection registry, at most one connection per role
///
/// Owned by the relay server and shared between connection tasks.
pub struct RoleRegistry {
    inner: Mutex<RegistryInner>,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self { inner: Mutex::new(RegistryInner::default()) }
    }

    /// Register a connection under a role, superseding any prior holder.
    /// Returns the generation identifying this registration.
    async fn register(&self, role: Role, outbox: mpsc::Sender<String>) -> u64 {
        let mut inner = self.inner.lock().await;
        inner.next_generation += 1;
        let generation = inner.next_generation;
        let superseded = inner.slots.insert(role, RoleSlot { generation, outbox }).is_some();
        if superseded {
            info!(role = %role, generation = generation, "role_superseded");
        }
        generation
    }

    /// Remove a registration, but only if it still belongs to the given
    /// generation; a superseded connection's cleanup must not evict its
    /// successor. Returns whether a slot was removed.
    async fn unregister(&self, role: Role, generation: u64) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.slots.get(&role) {
            Some(slot) if slot.generation == generation => {
                inner.slots.remove(&role);
                true
            }
            _ => false,
        }
    }

    /// Forward one message from the sensor connection identified by
    /// `sender_generation` to the registered actuator, if any
    async fn forward_from_sensor(&self, sender_generation: u64, line: &str) -> ForwardOutcome {
        let mut inner = self.inner.lock().await;

        let current = inner
            .slots
            .get(&Role::Sensor)
            .is_some_and(|slot| slot.generation == sender_generation);
        if !current {
            return ForwardOutcome::Superseded;
        }

        let Some(slot) = inner.slots.get(&Role::Actuator) else {
            return ForwardOutcome::NoConsumer;
        };

        match slot.outbox.try_send(line.to_string()) {
            Ok(()) => ForwardOutcome::Forwarded,
            Err(TrySendError::Full(_)) => ForwardOutcome::ConsumerBusy,
            Err(TrySendError::Closed(_)) => {
                // Writer task has died; treat the actuator as disconnected
                inner.slots.remove(&Role::Actuator);
                ForwardOutcome::ConsumerGone
            }
        }
    }

    #[cfg(test)]
    async fn registered(&self, role: Role) -> bool {
        self.inner.lock().await.slots.contains_key(&role)
    }
}

impl Default for RoleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The relay broker: TCP listener plus the shared role registry
pub struct RelayServer {
    listener: TcpListener,
    registry: Arc<RoleRegistry>,
    metrics: Arc<Metrics>,
}

impl RelayServer {
    /// Bind the listener; the registry starts empty
    pub async fn bind(addr: &str, metrics: Arc<Metrics>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, registry: Arc::new(RoleRegistry::new()), metrics })
    }

    /// Actual bound address (useful when binding port 0)
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until shutdown, one task per connection
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        match self.local_addr() {
            Ok(addr) => info!(addr = %addr, "relay_listener_started"),
            Err(_) => info!("relay_listener_started"),
        }

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("relay_listener_shutdown");
                        return;
                    }
                }
                result = self.listener.accept() => {
                    match result {
                        Ok((socket, addr)) => {
                            let registry = self.registry.clone();
                            let metrics = self.metrics.clone();
                            tokio::spawn(async move {
                                handle_connection(socket, addr, registry, metrics).await;
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "relay_accept_failed");
                        }
                    }
                }
            }
        }
    }
}

/// Serve a single peer: handshake, register, forward or observe, cleanup
///
/// Every exit path releases the role slot (generation-checked), and an
/// error here never touches the other role's connection task.
async fn handle_connection(
    socket: TcpStream,
    addr: SocketAddr,
    registry: Arc<RoleRegistry>,
    metrics: Arc<Metrics>,
) {
    debug!(peer = %addr, "relay_connection_accepted");

    if let Err(e) = socket.set_nodelay(true) {
        debug!(peer = %addr, error = %e, "relay_nodelay_failed");
    }

    let (read_half, write_half) = socket.into_split();
    let reader = BufReader::new(read_half);
    let mut lines = reader.lines();

    // One-time blocking read of the role token
    let role = match lines.next_line().await {
        Ok(Some(token)) => match Role::from_str(token.trim()) {
            Ok(role) => role,
            Err(e) => {
                warn!(peer = %addr, error = %e, "handshake_rejected");
                metrics.record_handshake_rejected();
                return;
            }
        },
        Ok(None) | Err(_) => {
            debug!(peer = %addr, "relay_closed_before_handshake");
            return;
        }
    };

    let (outbox_tx, outbox_rx) = mpsc::channel::<String>(OUTBOX_CAPACITY);
    let generation = registry.register(role, outbox_tx).await;
    metrics.record_handshake_accepted();
    info!(role = %role, peer = %addr, generation = generation, "role_registered");

    let writer = tokio::spawn(write_outbox(write_half, outbox_rx));

    // Rate-limit drop warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }

        match role {
            Role::Sensor => {
                match registry.forward_from_sensor(generation, line).await {
                    ForwardOutcome::Forwarded => {
                        metrics.record_message_forwarded();
                        debug!(len = line.len(), "relay_message_forwarded");
                    }
                    ForwardOutcome::NoConsumer => {
                        metrics.record_message_dropped();
                        debug!("relay_message_dropped: no actuator registered");
                    }
                    ForwardOutcome::ConsumerBusy => {
                        metrics.record_message_dropped();
                        if last_drop_warn.elapsed() > Duration::from_secs(1) {
                            warn!("relay_message_dropped: actuator outbox full");
                            last_drop_warn = Instant::now();
                        }
                    }
                    ForwardOutcome::ConsumerGone => {
                        metrics.record_message_dropped();
                        warn!("relay_actuator_unregistered: outbox closed");
                    }
                    ForwardOutcome::Superseded => {
                        metrics.record_message_dropped();
                        debug!("relay_message_ignored: sensor superseded");
                    }
                }
            }
            Role::Actuator => {
                // Unidirectional relay: observed, never forwarded
                debug!(peer = %addr, line = %line, "actuator_message_observed");
            }
        }
    }

    if registry.unregister(role, generation).await {
        info!(role = %role, peer = %addr, "role_unregistered");
    }
    writer.abort();
    debug!(peer = %addr, "relay_connection_closed");
}

/// Drain an outbox into the socket, newline-framing each message
async fn write_outbox(mut write_half: OwnedWriteHalf, mut outbox_rx: mpsc::Receiver<String>) {
    while let Some(line) = outbox_rx.recv().await {
        let framed = format!("{line}\n");
        if let Err(e) = write_half.write_all(framed.as_bytes()).await {
            debug!(error = %e, "relay_write_failed");
            return;
        }
    }
}
