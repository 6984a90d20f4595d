//! Relay Session Integration Tests
//!
//! End-to-end tests running a `ConnectionManager` against local Socket.IO
//! relays served by `tokio-tungstenite`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use hardware_bridge::{
    BridgeOptions, ConnectionManager, DeviceKey, EndpointId, MemoryStore, Notification,
    StaticCatalog,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_test::{assert_err, assert_ok};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

// ----------------------------------------------------------------------------
// Test Configuration
// ----------------------------------------------------------------------------

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const OPEN_PACKET: &str = r#"0{"sid":"relay","pingInterval":25000,"pingTimeout":5000}"#;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ----------------------------------------------------------------------------
// Local Relay
// ----------------------------------------------------------------------------

/// One-connection Socket.IO relay.
struct Relay {
    url: String,
    push: mpsc::UnboundedSender<String>,
    received: mpsc::UnboundedReceiver<String>,
}

impl Relay {
    async fn spawn() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("http://{}", listener.local_addr()?);
        let (push, mut outgoing) = mpsc::unbounded_channel::<String>();
        let (incoming, received) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let Ok(mut ws) = accept_async(stream).await else {
                return;
            };
            if ws.send(Message::Text(OPEN_PACKET.into())).await.is_err()
                || ws.send(Message::Text("40".into())).await.is_err()
            {
                return;
            }

            loop {
                tokio::select! {
                    frame = outgoing.recv() => {
                        let Some(frame) = frame else { break };
                        if ws.send(Message::Text(frame.into())).await.is_err() {
                            break;
                        }
                    }
                    message = ws.next() => match message {
                        Some(Ok(Message::Text(text))) if text.as_str() == "2" => {
                            let _ = ws.send(Message::Text("3".into())).await;
                        }
                        Some(Ok(Message::Text(text))) => {
                            let _ = incoming.send(text.to_string());
                        }
                        Some(Ok(_)) => {}
                        _ => break,
                    },
                }
            }
        });

        Ok(Self {
            url,
            push,
            received,
        })
    }

    /// Sends a Socket.IO event to the bridge.
    fn emit(&self, name: &str, arg: Value) -> anyhow::Result<()> {
        let frame = format!("42{}", serde_json::to_string(&json!([name, arg]))?);
        self.push.send(frame).context("relay connection closed")?;
        Ok(())
    }

    /// Waits for the next `message` event and returns its payload.
    async fn next_message(&mut self) -> anyhow::Result<Value> {
        loop {
            let frame = timeout(TEST_TIMEOUT, self.received.recv())
                .await
                .context("timed out waiting for bridge frame")?
                .context("relay stopped")?;

            let Some(body) = frame.strip_prefix("42") else {
                continue;
            };
            let event: Vec<Value> = serde_json::from_str(body)?;
            if event.first() == Some(&json!("message")) {
                return event.get(1).cloned().context("message without payload");
            }
        }
    }
}

/// Accepts TCP connections and hangs up before the WebSocket upgrade.
async fn spawn_dead_relay() -> anyhow::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("http://{}", listener.local_addr()?);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            drop(stream);
        }
    });
    Ok(url)
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

fn options(relays: &[&Relay]) -> BridgeOptions {
    BridgeOptions::new()
        .with_endpoints(relays.iter().map(|r| r.url.clone()))
        .with_backoff(Duration::from_millis(10), Duration::from_millis(20))
        .with_retry_budget(0)
}

fn manager(
    relays: &[&Relay],
    catalog: StaticCatalog,
) -> anyhow::Result<(ConnectionManager, mpsc::UnboundedReceiver<Notification>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let manager = ConnectionManager::builder()
        .options(options(relays))
        .sink(Arc::new(tx))
        .catalog(Arc::new(catalog))
        .store(Arc::new(MemoryStore::new()))
        .build()?;
    Ok((manager, rx))
}

async fn expect_notification(
    rx: &mut mpsc::UnboundedReceiver<Notification>,
    expected: &Notification,
) -> anyhow::Result<Vec<Notification>> {
    let mut seen = Vec::new();
    loop {
        let notification = timeout(TEST_TIMEOUT, rx.recv())
            .await
            .with_context(|| format!("timed out waiting for {expected:?}, saw {seen:?}"))?
            .context("sink closed")?;
        let done = &notification == expected;
        seen.push(notification);
        if done {
            return Ok(seen);
        }
    }
}

async fn eventually(mut condition: impl FnMut() -> bool) -> anyhow::Result<()> {
    timeout(TEST_TIMEOUT, async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .context("condition not reached")
}

fn payload(message: &Value) -> anyhow::Result<Value> {
    let data = message["data"].as_str().context("data is not a string")?;
    Ok(serde_json::from_str(data)?)
}

const CONNECTED: Notification = Notification::ConnectionStateChanged { connected: true };

// ----------------------------------------------------------------------------
// Session Tests
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_session_round_trip() -> anyhow::Result<()> {
    init_tracing();
    let mut relay = Relay::spawn().await?;
    let (manager, mut notifications) = manager(&[&relay], StaticCatalog::new())?;

    assert_ok!(manager.connect());
    expect_notification(&mut notifications, &CONNECTED).await?;
    assert_eq!(manager.active_endpoint(), Some(EndpointId::new(0)));

    relay.emit("data", json!({"company": 10, "model": 2, "3": 1, "a0": 512}))?;
    eventually(|| manager.devices().lock().selected().is_some()).await?;

    {
        let mut ports = manager.ports().lock();
        assert_eq!(ports.get_digital_port_value(3), 1.0);
        assert_eq!(ports.get_analog_port_value(0), 512.0);
        ports.set_digital_port_value(5, 1);
    }
    assert_eq!(
        manager.devices().lock().selected(),
        Some(&DeviceKey::new("a.2"))
    );

    // Driver request
    assert_ok!(manager.request_hardware_module("arduino"));
    let init = relay.next_message().await?;
    assert_eq!(init["action"], "init");
    assert_eq!(init["type"], "utf8");
    assert!(init.get("mode").is_none());
    assert_eq!(payload(&init)?, json!({"name": "arduino"}));

    // Send queue flush
    assert!(manager.update()?);
    let data = relay.next_message().await?;
    assert!(data.get("action").is_none());
    assert_eq!(payload(&data)?, json!({"5": 1, "readablePorts": [3]}));

    // Relay asks the editor to drop the session
    relay.emit("state", json!("disconnectHardware"))?;
    let seen = expect_notification(&mut notifications, &Notification::Disconnected).await?;
    assert!(seen.contains(&Notification::ConnectionStateChanged { connected: false }));
    assert!(!manager.is_connected());
    assert!(manager.devices().lock().selected().is_none());

    let unknown_driver_notices = seen
        .iter()
        .filter(|n| matches!(n, Notification::DeviceDriverChanged { .. }))
        .count();
    assert_eq!(unknown_driver_notices, 0);

    Ok(())
}

#[tokio::test]
async fn test_inbound_init_is_answered() -> anyhow::Result<()> {
    init_tracing();
    let mut relay = Relay::spawn().await?;
    let (manager, mut notifications) = manager(&[&relay], StaticCatalog::new())?;

    manager.connect()?;
    expect_notification(&mut notifications, &CONNECTED).await?;

    relay.emit("mode", json!(2))?;
    relay.emit("init", json!("microbit"))?;
    expect_notification(
        &mut notifications,
        &Notification::HardwareModuleRequested {
            name: "microbit".into(),
        },
    )
    .await?;

    let answer = relay.next_message().await?;
    assert_eq!(answer["action"], "init");
    assert_eq!(answer["mode"], 2);
    assert_eq!(payload(&answer)?, json!({"name": "microbit"}));

    manager.disconnect();
    Ok(())
}

#[tokio::test]
async fn test_mode_switch_disconnects_once() -> anyhow::Result<()> {
    init_tracing();
    let relay = Relay::spawn().await?;
    let (manager, mut notifications) = manager(&[&relay], StaticCatalog::new())?;

    manager.connect()?;
    expect_notification(&mut notifications, &CONNECTED).await?;

    relay.emit("mode", json!(0))?;
    relay.emit("mode", json!(1))?;
    expect_notification(&mut notifications, &Notification::Disconnected).await?;
    assert!(!manager.is_connected());

    manager.disconnect();
    sleep(Duration::from_millis(100)).await;
    let mut extra = Vec::new();
    while let Ok(notification) = notifications.try_recv() {
        extra.push(notification);
    }
    assert!(
        !extra.contains(&Notification::Disconnected),
        "second teardown: {extra:?}"
    );

    Ok(())
}

#[tokio::test]
async fn test_single_active_endpoint() -> anyhow::Result<()> {
    init_tracing();
    let first = Relay::spawn().await?;
    let second = Relay::spawn().await?;
    let (manager, mut notifications) = manager(&[&first, &second], StaticCatalog::new())?;

    manager.connect()?;
    expect_notification(&mut notifications, &CONNECTED).await?;
    let active = manager.active_endpoint().context("no active endpoint")?;

    // Give the other handshake time to finish; it must not take over.
    sleep(Duration::from_millis(200)).await;
    assert_eq!(manager.active_endpoint(), Some(active));
    assert!(notifications.try_recv().is_err());

    let standby = if active.index() == 0 { &second } else { &first };
    standby.emit("data", json!({"company": 11, "model": 1, "3": 1}))?;
    sleep(Duration::from_millis(100)).await;
    assert!(manager.devices().lock().selected().is_none());

    manager.disconnect();
    expect_notification(&mut notifications, &Notification::Disconnected).await?;
    assert_eq!(manager.endpoint_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_request_without_session_fails_fast() -> anyhow::Result<()> {
    let relay = Relay::spawn().await?;
    let (manager, mut notifications) = manager(&[&relay], StaticCatalog::new())?;

    let err = assert_err!(manager.request_hardware_module("arduino"));
    assert!(err.is_not_connected());
    assert_eq!(
        notifications.recv().await,
        Some(Notification::NotConnected {
            operation: "request_hardware_module".into()
        })
    );
    assert!(!manager.update()?);
    Ok(())
}

#[tokio::test]
async fn test_unreachable_relay_is_reported_once() -> anyhow::Result<()> {
    init_tracing();
    let mut urls = Vec::new();
    for _ in 0..3 {
        urls.push(spawn_dead_relay().await?);
    }

    let (tx, mut notifications) = mpsc::unbounded_channel();
    let manager = ConnectionManager::builder()
        .options(
            BridgeOptions::new()
                .with_endpoints(urls)
                .with_backoff(Duration::from_millis(10), Duration::from_millis(20))
                .with_retry_budget(1),
        )
        .sink(Arc::new(tx))
        .catalog(Arc::new(StaticCatalog::new()))
        .store(Arc::new(MemoryStore::new()))
        .build()?;

    manager.connect()?;
    let seen = expect_notification(&mut notifications, &Notification::RelayUnreachable).await?;
    assert_eq!(seen, vec![Notification::RelayUnreachable]);
    assert!(!manager.is_connected());
    assert_eq!(manager.endpoint_count(), 0);

    sleep(Duration::from_millis(100)).await;
    assert!(notifications.try_recv().is_err());

    // A manual retry starts a fresh round.
    manager.retry_connect()?;
    assert_eq!(manager.endpoint_count(), 3);
    expect_notification(&mut notifications, &Notification::RelayUnreachable).await?;
    Ok(())
}
