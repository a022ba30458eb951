//! End-to-end relay broker tests over loopback TCP

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use zonelink::domain::types::Role;
use zonelink::infra::Metrics;
use zonelink::io::relay_client::{ClientEvent, RelayClient, RelayClientConfig};
use zonelink::io::RelayServer;

/// Time for the broker to process a handshake after connect
const SETTLE: Duration = Duration::from_millis(150);
const READ_TIMEOUT: Duration = Duration::from_secs(2);

async fn start_server() -> (SocketAddr, watch::Sender<bool>) {
    let metrics = Arc::new(Metrics::new());
    let server = RelayServer::bind("127.0.0.1:0", metrics).await.unwrap();
    let addr = server.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(server.run(shutdown_rx));
    (addr, shutdown_tx)
}

async fn connect(addr: SocketAddr, token: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(format!("{token}\n").as_bytes()).await.unwrap();
    stream
}

async fn send_line(stream: &mut TcpStream, line: &str) {
    stream.write_all(format!("{line}\n").as_bytes()).await.unwrap();
}

async fn read_line(reader: &mut tokio::io::Lines<BufReader<TcpStream>>) -> Option<String> {
    timeout(READ_TIMEOUT, reader.next_line()).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_messages_forwarded_verbatim_in_order() {
    let (addr, _shutdown) = start_server().await;

    let actuator = connect(addr, "actuator").await;
    let mut actuator_lines = BufReader::new(actuator).lines();
    sleep(SETTLE).await;

    let mut sensor = connect(addr, "sensor").await;
    sleep(SETTLE).await;

    send_line(&mut sensor, "zone_a=1 zone_b=0").await;
    send_line(&mut sensor, "zone_a=1 zone_b=1").await;
    send_line(&mut sensor, "zone_a=0 zone_b=1").await;

    assert_eq!(read_line(&mut actuator_lines).await.unwrap(), "zone_a=1 zone_b=0");
    assert_eq!(read_line(&mut actuator_lines).await.unwrap(), "zone_a=1 zone_b=1");
    assert_eq!(read_line(&mut actuator_lines).await.unwrap(), "zone_a=0 zone_b=1");
}

#[tokio::test]
async fn test_message_without_consumer_is_dropped_not_queued() {
    let (addr, _shutdown) = start_server().await;

    let mut sensor = connect(addr, "sensor").await;
    sleep(SETTLE).await;

    // No actuator yet - this message must never be delivered late
    send_line(&mut sensor, "zone_a=1").await;
    sleep(SETTLE).await;

    let actuator = connect(addr, "actuator").await;
    let mut actuator_lines = BufReader::new(actuator).lines();
    sleep(SETTLE).await;

    send_line(&mut sensor, "zone_a=0").await;

    assert_eq!(read_line(&mut actuator_lines).await.unwrap(), "zone_a=0");
}

#[tokio::test]
async fn test_new_consumer_supersedes_prior() {
    let (addr, _shutdown) = start_server().await;

    let first = connect(addr, "actuator").await;
    let mut first_lines = BufReader::new(first).lines();
    sleep(SETTLE).await;

    let second = connect(addr, "actuator").await;
    let mut second_lines = BufReader::new(second).lines();
    sleep(SETTLE).await;

    let mut sensor = connect(addr, "sensor").await;
    sleep(SETTLE).await;
    send_line(&mut sensor, "zone_a=1").await;

    assert_eq!(read_line(&mut second_lines).await.unwrap(), "zone_a=1");

    // The superseded connection stays silent
    let nothing = timeout(Duration::from_millis(300), first_lines.next_line()).await;
    assert!(nothing.is_err(), "superseded consumer must not receive messages");
}

#[tokio::test]
async fn test_new_producer_supersedes_prior() {
    let (addr, _shutdown) = start_server().await;

    let actuator = connect(addr, "actuator").await;
    let mut actuator_lines = BufReader::new(actuator).lines();
    sleep(SETTLE).await;

    let mut first_sensor = connect(addr, "sensor").await;
    sleep(SETTLE).await;
    let mut second_sensor = connect(addr, "sensor").await;
    sleep(SETTLE).await;

    // Superseded producer's messages are no longer forwarded
    send_line(&mut first_sensor, "zone_a=1").await;
    sleep(SETTLE).await;
    send_line(&mut second_sensor, "zone_a=0").await;

    assert_eq!(read_line(&mut actuator_lines).await.unwrap(), "zone_a=0");
}

#[tokio::test]
async fn test_unknown_handshake_rejected_without_side_effects() {
    let (addr, _shutdown) = start_server().await;

    let actuator = connect(addr, "actuator").await;
    let mut actuator_lines = BufReader::new(actuator).lines();
    sleep(SETTLE).await;

    // Unknown token: connection closed, nothing registered
    let unknown = connect(addr, "unknown").await;
    let mut unknown_lines = BufReader::new(unknown).lines();
    let closed = read_line(&mut unknown_lines).await;
    assert_eq!(closed, None, "broker should close unrecognized peers");

    // Existing registrations are untouched
    let mut sensor = connect(addr, "sensor").await;
    sleep(SETTLE).await;
    send_line(&mut sensor, "zone_a=1").await;
    assert_eq!(read_line(&mut actuator_lines).await.unwrap(), "zone_a=1");
}

#[tokio::test]
async fn test_consumer_disconnect_keeps_producer_serving() {
    let (addr, _shutdown) = start_server().await;

    let actuator = connect(addr, "actuator").await;
    sleep(SETTLE).await;

    let mut sensor = connect(addr, "sensor").await;
    sleep(SETTLE).await;

    drop(actuator);
    sleep(SETTLE).await;

    // Producer keeps going; messages are dropped, not an error
    send_line(&mut sensor, "zone_a=1").await;
    sleep(SETTLE).await;

    // A new actuator picks the stream back up
    let replacement = connect(addr, "actuator").await;
    let mut replacement_lines = BufReader::new(replacement).lines();
    sleep(SETTLE).await;

    send_line(&mut sensor, "zone_a=0").await;
    assert_eq!(read_line(&mut replacement_lines).await.unwrap(), "zone_a=0");
}

#[tokio::test]
async fn test_relay_client_receives_forwarded_state() {
    let (addr, _shutdown) = start_server().await;

    let (client, mut events) = RelayClient::new(RelayClientConfig {
        addr: addr.to_string(),
        role: Role::Actuator,
        dial_timeout: Duration::from_secs(2),
        backoff_min: Duration::from_millis(100),
        backoff_max: Duration::from_millis(500),
    });
    let (client_shutdown_tx, client_shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        client.run(client_shutdown_rx).await;
    });

    let connected = timeout(READ_TIMEOUT, events.recv()).await.unwrap().unwrap();
    assert_eq!(connected, ClientEvent::Connected);
    sleep(SETTLE).await;

    let mut sensor = connect(addr, "sensor").await;
    sleep(SETTLE).await;
    send_line(&mut sensor, "zone_a=1 zone_b=0").await;

    let event = timeout(READ_TIMEOUT, events.recv()).await.unwrap().unwrap();
    assert_eq!(event, ClientEvent::Line("zone_a=1 zone_b=0".to_string()));

    let _ = client_shutdown_tx.send(true);
}

#[tokio::test]
async fn test_relay_client_reports_disconnect_and_reconnects() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (client, mut events) = RelayClient::new(RelayClientConfig {
        addr: addr.to_string(),
        role: Role::Actuator,
        dial_timeout: Duration::from_secs(2),
        backoff_min: Duration::from_millis(100),
        backoff_max: Duration::from_millis(500),
    });
    let (_client_shutdown_tx, client_shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        client.run(client_shutdown_rx).await;
    });

    // First connection: the handshake arrives, then the peer hangs up
    let (socket, _) = listener.accept().await.unwrap();
    let mut lines = BufReader::new(socket).lines();
    let handshake = timeout(READ_TIMEOUT, lines.next_line()).await.unwrap().unwrap();
    assert_eq!(handshake.as_deref(), Some("actuator"));
    drop(lines);

    let connected = timeout(READ_TIMEOUT, events.recv()).await.unwrap().unwrap();
    assert_eq!(connected, ClientEvent::Connected);
    let event = timeout(READ_TIMEOUT, events.recv()).await.unwrap().unwrap();
    assert_eq!(event, ClientEvent::Disconnected);

    // Bounded backoff brings the client back with a fresh handshake
    let (socket, _) = timeout(READ_TIMEOUT, listener.accept()).await.unwrap().unwrap();
    let mut lines = BufReader::new(socket).lines();
    let handshake = timeout(READ_TIMEOUT, lines.next_line()).await.unwrap().unwrap();
    assert_eq!(handshake.as_deref(), Some("actuator"));
    let reconnected = timeout(READ_TIMEOUT, events.recv()).await.unwrap().unwrap();
    assert_eq!(reconnected, ClientEvent::Connected);
}
