//! Transport endpoint and its event loop.
//!
//! Each endpoint spawns one tokio task that owns the WebSocket. The task:
//!
//! - Connects and waits for the Socket.IO handshake (bounded by the
//!   per-attempt timeout)
//! - Retries with capped backoff until the retry budget is spent
//! - Decodes relay packets and hands them to the endpoint's dispatcher
//! - Writes outbound frames and keeps the Engine.IO heartbeat going
//!
//! Lifecycle changes are dispatched as [`RelayEvent::Connected`],
//! [`RelayEvent::Closed`] and [`RelayEvent::RetriesExhausted`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::{EndpointId, SessionId};
use crate::protocol::{EnginePacket, OpenData, OutboundMessage, RelayEvent, SocketPacket};

use super::dispatcher::MessageDispatcher;
use super::retry::ReconnectPolicy;

// ============================================================================
// Constants
// ============================================================================

/// Socket.IO endpoint path.
const SOCKET_IO_PATH: &str = "/socket.io/";

/// Engine.IO protocol revision spoken by the relay.
const ENGINE_IO_VERSION: &str = "3";

/// Socket.IO namespace-leave packet, sent on graceful shutdown.
const NAMESPACE_DISCONNECT: &str = "41";

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;

/// Commands from the bridge to the event loop.
enum EndpointCommand {
    /// Write one text frame.
    Send(String),
}

/// Why a connected session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Shutdown requested locally.
    Shutdown,
    /// Remote closed, socket error, or heartbeat lost.
    Lost,
}

/// Result of handling one inbound text frame.
enum Inbound {
    Continue,
    Reply(String),
    Lost,
}

// ============================================================================
// EndpointState
// ============================================================================

/// Connection state of one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndpointState {
    /// Created, task not yet running.
    #[default]
    Idle,
    /// Handshake or backoff in progress.
    Connecting,
    /// Handshake completed; frames flow.
    Connected,
    /// Closed for good: shut down or retries exhausted.
    Disconnected,
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

// ============================================================================
// URL Helper
// ============================================================================

/// Builds the Socket.IO WebSocket URL for a relay base address.
///
/// `http`/`https` map to `ws`/`wss`; the query carries `client=true` and
/// the room id.
///
/// # Errors
///
/// Returns [`Error::Config`] for schemes other than http(s)/ws(s).
pub fn socket_url(base: &Url, session: &SessionId) -> Result<Url> {
    let scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(Error::config(format!(
                "Unsupported relay URL scheme: {other}"
            )));
        }
    };

    let mut url = base.clone();
    url.set_scheme(scheme)
        .map_err(|()| Error::config(format!("Cannot use scheme {scheme} for {base}")))?;
    url.set_path(SOCKET_IO_PATH);
    url.query_pairs_mut()
        .clear()
        .append_pair("EIO", ENGINE_IO_VERSION)
        .append_pair("transport", "websocket")
        .append_pair("client", "true")
        .append_pair("roomId", session.as_str());

    Ok(url)
}

// ============================================================================
// TransportEndpoint
// ============================================================================

/// One relay endpoint with its own reconnecting event loop.
///
/// Dropping the endpoint shuts its task down.
pub struct TransportEndpoint {
    id: EndpointId,
    url: Url,
    dispatcher: Arc<MessageDispatcher>,
    command_tx: mpsc::UnboundedSender<EndpointCommand>,
    shutdown_tx: watch::Sender<bool>,
    state: Arc<Mutex<EndpointState>>,
    attempts: Arc<AtomicU32>,
    task: JoinHandle<()>,
}

impl TransportEndpoint {
    /// Spawns the endpoint's event loop.
    ///
    /// Listeners should be registered on `dispatcher` before calling this,
    /// so the first lifecycle event is not missed.
    #[must_use]
    pub fn spawn(
        id: EndpointId,
        url: Url,
        policy: ReconnectPolicy,
        dispatcher: Arc<MessageDispatcher>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = Arc::new(Mutex::new(EndpointState::Idle));
        let attempts = Arc::new(AtomicU32::new(0));

        let event_loop = EventLoop {
            id,
            url: url.clone(),
            policy,
            dispatcher: Arc::clone(&dispatcher),
            state: Arc::clone(&state),
            attempts: Arc::clone(&attempts),
            command_rx,
            shutdown_rx,
        };

        let task = tokio::spawn(event_loop.run());

        debug!(endpoint = %id, %url, budget = policy.retry_budget, "Endpoint spawned");

        Self {
            id,
            url,
            dispatcher,
            command_tx,
            shutdown_tx,
            state,
            attempts,
            task,
        }
    }

    /// Returns the endpoint id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> EndpointId {
        self.id
    }

    /// Returns the WebSocket URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the endpoint's dispatcher.
    #[inline]
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<MessageDispatcher> {
        &self.dispatcher
    }

    /// Returns the current connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> EndpointState {
        *self.state.lock()
    }

    /// Returns `true` while the handshake is complete.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == EndpointState::Connected
    }

    /// Returns the total number of handshake attempts made so far.
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Returns `true` once the event loop has exited.
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Queues a message for the relay.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the endpoint is not connected
    /// - [`Error::Json`] if the message cannot be encoded
    pub fn send(&self, message: &OutboundMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::ConnectionClosed);
        }

        let frame = message.to_frame()?;
        self.command_tx
            .send(EndpointCommand::Send(frame))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Removes every dispatcher listener. Returns how many were removed.
    pub fn detach(&self) -> usize {
        self.dispatcher.detach_all()
    }

    /// Stops the event loop, closing the socket if connected.
    pub fn shutdown(&self) {
        // Receiver gone means the loop already exited.
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for TransportEndpoint {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for TransportEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportEndpoint")
            .field("id", &self.id)
            .field("url", &self.url.as_str())
            .field("state", &self.state())
            .field("attempts", &self.attempts())
            .finish()
    }
}

// ============================================================================
// EventLoop
// ============================================================================

/// State owned by the spawned task.
struct EventLoop {
    id: EndpointId,
    url: Url,
    policy: ReconnectPolicy,
    dispatcher: Arc<MessageDispatcher>,
    state: Arc<Mutex<EndpointState>>,
    attempts: Arc<AtomicU32>,
    command_rx: mpsc::UnboundedReceiver<EndpointCommand>,
    shutdown_rx: watch::Receiver<bool>,
}

impl EventLoop {
    /// Connect, serve, reconnect until shut down or out of budget.
    async fn run(mut self) {
        let mut reconnects: u32 = 0;

        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }

            self.set_state(EndpointState::Connecting);
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let attempt_timeout = self.policy.attempt_timeout;

            let handshake = tokio::select! {
                _ = self.shutdown_rx.changed() => break,
                result = timeout(attempt_timeout, Self::handshake(&self.url)) => {
                    result.unwrap_or_else(|_| {
                        Err(Error::connection_timeout(attempt_timeout.as_millis() as u64))
                    })
                }
            };

            match handshake {
                Ok((ws_stream, open)) => {
                    reconnects = 0;
                    self.set_state(EndpointState::Connected);
                    info!(endpoint = %self.id, attempt, "Relay handshake completed");

                    // Frames queued while disconnected are stale.
                    while self.command_rx.try_recv().is_ok() {}

                    self.dispatcher.dispatch(&RelayEvent::Connected);
                    let end = self.serve(ws_stream, &open).await;
                    self.set_state(EndpointState::Connecting);
                    self.dispatcher.dispatch(&RelayEvent::Closed);

                    if end == SessionEnd::Shutdown {
                        break;
                    }
                    info!(endpoint = %self.id, "Relay session lost");
                }
                Err(e) => {
                    debug!(endpoint = %self.id, attempt, error = %e, "Handshake failed");
                }
            }

            if !self.policy.allows(reconnects) {
                warn!(
                    endpoint = %self.id,
                    budget = self.policy.retry_budget,
                    "Reconnection budget exhausted"
                );
                self.set_state(EndpointState::Disconnected);
                self.dispatcher.dispatch(&RelayEvent::RetriesExhausted);
                break;
            }

            reconnects += 1;
            let delay = self.policy.delay_for(reconnects);
            trace!(endpoint = %self.id, reconnects, ?delay, "Waiting before reconnect");

            tokio::select! {
                _ = self.shutdown_rx.changed() => break,
                () = sleep(delay) => {}
            }
        }

        self.set_state(EndpointState::Disconnected);
        debug!(endpoint = %self.id, "Event loop terminated");
    }

    fn set_state(&self, state: EndpointState) {
        *self.state.lock() = state;
    }

    /// Opens the socket and waits for the namespace connect packet.
    async fn handshake(url: &Url) -> Result<(WsStream, OpenData)> {
        let (mut ws_stream, _response) = connect_async(url.as_str()).await?;
        let mut open = None;

        while let Some(message) = ws_stream.next().await {
            let text = match message? {
                Message::Text(text) => text,
                Message::Close(_) => return Err(Error::ConnectionClosed),
                _ => continue,
            };

            match EnginePacket::decode(&text)? {
                EnginePacket::Open(data) => open = Some(data),
                EnginePacket::Ping(probe) => {
                    ws_stream
                        .send(Message::Text(EnginePacket::Pong(probe).encode().into()))
                        .await?;
                }
                EnginePacket::Message(payload) => match SocketPacket::decode(&payload)? {
                    SocketPacket::Connect => return Ok((ws_stream, open.unwrap_or_default())),
                    SocketPacket::Error(reason) => {
                        return Err(Error::connection(format!("Relay refused namespace: {reason}")));
                    }
                    _ => {}
                },
                EnginePacket::Close => return Err(Error::ConnectionClosed),
                _ => {}
            }
        }

        Err(Error::connection("Relay hung up during handshake"))
    }

    /// Runs a connected session until it ends.
    async fn serve(&mut self, ws_stream: WsStream, open: &OpenData) -> SessionEnd {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        let ping_interval = Duration::from_millis(open.ping_interval_ms.max(1));
        let pong_deadline = ping_interval + Duration::from_millis(open.ping_timeout_ms);
        let mut heartbeat = interval_at(Instant::now() + ping_interval, ping_interval);
        let mut last_pong = Instant::now();

        loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    Self::close_gracefully(&mut ws_write).await;
                    return SessionEnd::Shutdown;
                }

                message = ws_read.next() => {
                    match self.handle_message(message, &mut last_pong) {
                        Inbound::Continue => {}
                        Inbound::Reply(frame) => {
                            if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                                warn!(endpoint = %self.id, error = %e, "Failed to send reply");
                                return SessionEnd::Lost;
                            }
                        }
                        Inbound::Lost => return SessionEnd::Lost,
                    }
                }

                command = self.command_rx.recv() => {
                    let Some(EndpointCommand::Send(frame)) = command else {
                        Self::close_gracefully(&mut ws_write).await;
                        return SessionEnd::Shutdown;
                    };
                    if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                        warn!(endpoint = %self.id, error = %e, "Failed to send frame");
                        return SessionEnd::Lost;
                    }
                    trace!(endpoint = %self.id, "Frame sent");
                }

                _ = heartbeat.tick() => {
                    if last_pong.elapsed() > pong_deadline {
                        warn!(endpoint = %self.id, "Heartbeat timed out");
                        return SessionEnd::Lost;
                    }
                    let ping = EnginePacket::Ping(String::new()).encode();
                    if let Err(e) = ws_write.send(Message::Text(ping.into())).await {
                        warn!(endpoint = %self.id, error = %e, "Failed to send ping");
                        return SessionEnd::Lost;
                    }
                }
            }
        }
    }

    /// Handles one item from the socket read half.
    fn handle_message(
        &self,
        message: Option<std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>,
        last_pong: &mut Instant,
    ) -> Inbound {
        let text = match message {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => {
                debug!(endpoint = %self.id, "WebSocket closed by relay");
                return Inbound::Lost;
            }
            Some(Err(e)) => {
                warn!(endpoint = %self.id, error = %e, "WebSocket error");
                return Inbound::Lost;
            }
            // Binary, Ping, Pong, Frame
            Some(Ok(_)) => return Inbound::Continue,
        };

        let packet = match EnginePacket::decode(&text) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(endpoint = %self.id, error = %e, "Dropping malformed packet");
                return Inbound::Continue;
            }
        };

        match packet {
            EnginePacket::Ping(probe) => Inbound::Reply(EnginePacket::Pong(probe).encode()),
            EnginePacket::Pong(_) => {
                *last_pong = Instant::now();
                Inbound::Continue
            }
            EnginePacket::Close => Inbound::Lost,
            EnginePacket::Message(payload) => self.handle_socket_packet(&payload),
            _ => Inbound::Continue,
        }
    }

    fn handle_socket_packet(&self, payload: &str) -> Inbound {
        match SocketPacket::decode(payload) {
            Ok(SocketPacket::Event { name, args }) => {
                self.dispatcher.dispatch_socket_event(&name, args);
                Inbound::Continue
            }
            Ok(SocketPacket::Disconnect) => {
                debug!(endpoint = %self.id, "Relay left namespace");
                Inbound::Lost
            }
            Ok(SocketPacket::Error(reason)) => {
                warn!(endpoint = %self.id, %reason, "Relay reported error");
                Inbound::Continue
            }
            Ok(_) => Inbound::Continue,
            Err(e) => {
                warn!(endpoint = %self.id, error = %e, "Dropping malformed socket packet");
                Inbound::Continue
            }
        }
    }

    async fn close_gracefully(ws_write: &mut WsWrite) {
        let _ = ws_write
            .send(Message::Text(NAMESPACE_DISCONNECT.into()))
            .await;
        let _ = ws_write.close().await;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_url_plaintext() {
        let base = Url::parse("http://127.0.0.1:23518").expect("url");
        let session = SessionId::parse("0123abcd9f").expect("session");

        let url = socket_url(&base, &session).expect("socket url");
        assert_eq!(
            url.as_str(),
            "ws://127.0.0.1:23518/socket.io/?EIO=3&transport=websocket&client=true&roomId=0123abcd9f"
        );
    }

    #[test]
    fn test_socket_url_tls() {
        let base = Url::parse("https://relay.example.org:23518").expect("url");
        let session = SessionId::parse("0123abcd9f").expect("session");

        let url = socket_url(&base, &session).expect("socket url");
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.host_str(), Some("relay.example.org"));
        assert_eq!(url.port(), Some(23518));
    }

    #[test]
    fn test_socket_url_rejects_other_schemes() {
        let base = Url::parse("ftp://relay.example.org").expect("url");
        let session = SessionId::generate();
        assert!(socket_url(&base, &session).is_err());
    }

    #[test]
    fn test_endpoint_state_display() {
        assert_eq!(EndpointState::default(), EndpointState::Idle);
        assert_eq!(EndpointState::Connected.to_string(), "connected");
    }

    // ------------------------------------------------------------------------
    // Local relay
    // ------------------------------------------------------------------------

    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    use crate::protocol::EventKind;

    fn fast_policy(retry_budget: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            retry_budget,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(10),
            attempt_timeout: Duration::from_millis(500),
        }
    }

    /// Accepts one client, completes the handshake, then pushes a data
    /// event and echoes every received frame back on `frames_tx`.
    async fn spawn_relay() -> (Url, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(stream).await.expect("upgrade");

            let open = r#"0{"sid":"abc","pingInterval":25000,"pingTimeout":5000}"#;
            ws.send(Message::Text(open.into())).await.expect("open");
            ws.send(Message::Text("40".into())).await.expect("connect");
            ws.send(Message::Text(r#"42["data",{"company":10,"model":2,"3":1}]"#.into()))
                .await
                .expect("data");

            while let Some(Ok(message)) = ws.next().await {
                if let Message::Text(text) = message {
                    let _ = frames_tx.send(text.to_string());
                }
            }
        });

        let url = Url::parse(&format!("ws://{addr}/socket.io/")).expect("url");
        (url, frames_rx)
    }

    #[tokio::test]
    async fn test_handshake_dispatches_lifecycle_and_data() {
        let (url, mut frames_rx) = spawn_relay().await;
        let dispatcher = Arc::new(MessageDispatcher::new());
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        for kind in [EventKind::Connected, EventKind::Data] {
            let tx = events_tx.clone();
            dispatcher.subscribe(kind, move |event| {
                let _ = tx.send(event.clone());
            });
        }

        let endpoint = TransportEndpoint::spawn(EndpointId::new(0), url, fast_policy(0), dispatcher);

        let first = timeout(Duration::from_secs(2), events_rx.recv())
            .await
            .expect("connected in time")
            .expect("event");
        assert_eq!(first, RelayEvent::Connected);
        assert!(endpoint.is_connected());

        let second = timeout(Duration::from_secs(2), events_rx.recv())
            .await
            .expect("data in time")
            .expect("event");
        let RelayEvent::Data(frame) = second else {
            panic!("expected data event, got {second:?}");
        };
        assert_eq!(frame.number("3"), Some(1.0));

        let message = OutboundMessage::data(&json!({"5": 1}), Some(1)).expect("message");
        endpoint.send(&message).expect("send");

        let sent = timeout(Duration::from_secs(2), frames_rx.recv())
            .await
            .expect("frame in time")
            .expect("frame");
        assert!(sent.starts_with(r#"42["message","#));

        endpoint.shutdown();
    }

    #[tokio::test]
    async fn test_retries_stop_after_budget() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        // Accept and drop: every handshake fails.
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                drop(stream);
            }
        });

        let dispatcher = Arc::new(MessageDispatcher::new());
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        dispatcher.subscribe(EventKind::RetriesExhausted, move |_| {
            let _ = done_tx.send(());
        });

        let url = Url::parse(&format!("ws://{addr}/socket.io/")).expect("url");
        let endpoint = TransportEndpoint::spawn(EndpointId::new(1), url, fast_policy(2), dispatcher);

        timeout(Duration::from_secs(5), done_rx.recv())
            .await
            .expect("exhausted in time")
            .expect("signal");

        assert_eq!(endpoint.attempts(), 3);
        assert_eq!(endpoint.state(), EndpointState::Disconnected);
    }

    #[tokio::test]
    async fn test_handshake_failures_are_connection_errors() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        // First client is refused by namespace, second sees a hang-up.
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(stream).await.expect("upgrade");
            let open = r#"0{"sid":"abc","pingInterval":25000,"pingTimeout":5000}"#;
            ws.send(Message::Text(open.into())).await.expect("open");
            ws.send(Message::Text(r#"44"Invalid namespace""#.into()))
                .await
                .expect("error");
            drop(ws);

            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(stream).await.expect("upgrade");
            ws.send(Message::Text(open.into())).await.expect("open");
            drop(ws);
        });

        let url = Url::parse(&format!("ws://{addr}/socket.io/")).expect("url");

        let Err(refused) = EventLoop::handshake(&url).await else {
            panic!("namespace refusal accepted");
        };
        assert!(matches!(refused, Error::Connection { .. }), "{refused:?}");
        assert!(refused.to_string().contains("Invalid namespace"));

        let Err(hung_up) = EventLoop::handshake(&url).await else {
            panic!("hang-up accepted");
        };
        assert!(hung_up.is_connection_error(), "{hung_up:?}");
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let dispatcher = Arc::new(MessageDispatcher::new());
        let url = Url::parse("ws://127.0.0.1:9/socket.io/").expect("url");
        let endpoint = TransportEndpoint::spawn(EndpointId::new(2), url, fast_policy(0), dispatcher);

        let message = OutboundMessage::data(&json!({}), None).expect("message");
        assert!(matches!(endpoint.send(&message), Err(Error::ConnectionClosed)));
        endpoint.shutdown();
    }
}
