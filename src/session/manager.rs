//! Session lifecycle against the hardware relay.
//!
//! [`ConnectionManager`] owns the session identity and every relay
//! endpoint. It decides which endpoint is active, routes relay events to
//! the [`PortDataStore`] and [`DeviceRegistry`], and reports lifecycle
//! changes through the [`NotificationSink`](super::NotificationSink).
//!
//! # Activation
//!
//! All endpoints connect concurrently. The first completed handshake wins
//! and becomes the only active transport; later handshakes stay open but
//! are never promoted. Only the active endpoint's relay events are acted on.
//!
//! # Teardown
//!
//! Explicit [`disconnect`](ConnectionManager::disconnect), loss of the
//! active endpoint, the `disconnectHardware` state, the legacy `disconnect`
//! event, and a mode change from 0 to 1 all run the same teardown. It
//! shuts down every endpoint, cancels a deferred connect, forgets the
//! device, and notifies the host once per live session.
//!
//! If every endpoint of a connect spends its retry budget without ever
//! activating, the host receives [`Notification::RelayUnreachable`].
//!
//! # Locking
//!
//! The device registry, port store and link state each have their own
//! lock, always taken in that order. Hosts holding the port store may
//! still query connection state; they must not lock the device registry
//! while holding the port store.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHashMap;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::BridgeOptions;
use crate::device::DeviceRegistry;
use crate::error::{Error, Result};
use crate::identifiers::{EndpointId, SessionId};
use crate::port::{Outbound, PortDataStore};
use crate::protocol::{EventKind, OutboundMessage, RelayEvent};
use crate::transport::{MessageDispatcher, TransportEndpoint, socket_url};

use super::context::BridgeContext;
use super::launcher::{RelayLauncher, launcher_url};
use super::notify::{DownloadAsset, Notification};

// ============================================================================
// Constants
// ============================================================================

/// Event kinds every endpoint listens for.
const SUBSCRIBED_KINDS: [EventKind; 8] = [
    EventKind::Connected,
    EventKind::Closed,
    EventKind::RetriesExhausted,
    EventKind::Init,
    EventKind::State,
    EventKind::Disconnect,
    EventKind::Data,
    EventKind::Mode,
];

// ============================================================================
// LinkState
// ============================================================================

/// Mutable connection state, guarded by one lock.
struct LinkState {
    /// Bumped on every connect and teardown; stale events are dropped.
    generation: u64,
    endpoints: Vec<TransportEndpoint>,
    /// Last mode announced per endpoint.
    modes: FxHashMap<EndpointId, u64>,
    active: Option<EndpointId>,
    connected: bool,
    retry_budget: u32,
    pending_connect: Option<PendingConnect>,
    /// Last ticket handed to a deferred connect.
    connect_tickets: u64,
}

/// A scheduled deferred connect.
struct PendingConnect {
    ticket: u64,
    handle: JoinHandle<()>,
}

impl LinkState {
    fn new(retry_budget: u32) -> Self {
        Self {
            generation: 0,
            endpoints: Vec::new(),
            modes: FxHashMap::default(),
            active: None,
            connected: false,
            retry_budget,
            pending_connect: None,
            connect_tickets: 0,
        }
    }

    fn cancel_pending_connect(&mut self) {
        if let Some(pending) = self.pending_connect.take() {
            pending.handle.abort();
        }
    }

    /// Detaches and stops every endpoint.
    fn close_endpoints(&mut self) {
        for endpoint in std::mem::take(&mut self.endpoints) {
            endpoint.detach();
            endpoint.shutdown();
        }
        self.modes.clear();
        self.active = None;
    }

    fn is_active(&self, endpoint: EndpointId) -> bool {
        self.connected && self.active == Some(endpoint)
    }

    fn active_transport(&self) -> Option<ActiveTransport<'_>> {
        if !self.connected {
            return None;
        }
        let id = self.active?;
        let endpoint = self.endpoints.iter().find(|e| e.id() == id)?;
        Some(ActiveTransport {
            endpoint,
            mode: self.modes.get(&id).copied(),
        })
    }
}

// ============================================================================
// ActiveTransport
// ============================================================================

/// Sending half of the active endpoint, lent to the port store.
struct ActiveTransport<'a> {
    endpoint: &'a TransportEndpoint,
    mode: Option<u64>,
}

impl Outbound for ActiveTransport<'_> {
    fn mode(&self) -> Option<u64> {
        self.mode
    }

    fn send(&self, message: OutboundMessage) -> Result<()> {
        self.endpoint.send(&message)
    }
}

// ============================================================================
// Locked
// ============================================================================

/// Every guard a session transition needs, taken in lock order.
struct Locked<'a> {
    devices: MutexGuard<'a, DeviceRegistry>,
    ports: MutexGuard<'a, PortDataStore>,
    state: MutexGuard<'a, LinkState>,
}

// ============================================================================
// Inner
// ============================================================================

struct Inner {
    options: BridgeOptions,
    context: BridgeContext,
    identity: Mutex<Option<SessionId>>,
    /// Lock order: `devices`, then `ports`, then `state`. Nothing else is
    /// locked while `state` is held.
    state: Mutex<LinkState>,
    devices: Arc<Mutex<DeviceRegistry>>,
    ports: Arc<Mutex<PortDataStore>>,
}

impl Inner {
    fn notify(&self, notification: Notification) {
        self.context.sink.notify(notification);
    }

    fn lock(&self) -> Locked<'_> {
        let devices = self.devices.lock();
        let ports = self.ports.lock();
        let state = self.state.lock();
        Locked {
            devices,
            ports,
            state,
        }
    }

    /// Routes one endpoint event.
    fn handle_event(&self, endpoint: EndpointId, generation: u64, event: &RelayEvent) {
        let mut locked = self.lock();
        if locked.state.generation != generation {
            debug!(endpoint = %endpoint, generation, kind = %event.kind(), "Dropping stale event");
            return;
        }

        match event {
            RelayEvent::Connected => self.activate(&mut locked, endpoint),

            RelayEvent::Closed => {
                locked.state.modes.remove(&endpoint);
                if locked.state.is_active(endpoint) {
                    info!(endpoint = %endpoint, "Active endpoint lost");
                    self.teardown(&mut locked);
                } else {
                    debug!(endpoint = %endpoint, "Standby endpoint closed");
                }
            }

            RelayEvent::RetriesExhausted => self.retire(&mut locked.state, endpoint),

            RelayEvent::Mode(mode) => {
                let previous = locked.state.modes.insert(endpoint, *mode);
                if locked.state.is_active(endpoint) && previous == Some(0) && *mode == 1 {
                    info!(endpoint = %endpoint, "Relay switched mode, dropping session");
                    self.teardown(&mut locked);
                }
            }

            _ if !locked.state.is_active(endpoint) => {
                debug!(endpoint = %endpoint, kind = %event.kind(), "Ignoring standby endpoint event");
            }

            RelayEvent::Init(name) => {
                // Answer outside the locks; request_hardware_module takes `state`.
                drop(locked);
                self.answer_init(name);
            }

            RelayEvent::State(_) if event.is_disconnect_request() => {
                info!(endpoint = %endpoint, "Relay requested disconnect");
                self.teardown(&mut locked);
            }

            RelayEvent::State(other) => {
                debug!(endpoint = %endpoint, state = %other, "Ignoring relay state");
            }

            // Relays before 1.7 signal shutdown this way.
            RelayEvent::Disconnect => {
                info!(endpoint = %endpoint, "Relay disconnected (legacy)");
                self.teardown(&mut locked);
            }

            RelayEvent::Data(frame) => {
                locked.devices.identify(frame);
                let driver = locked.devices.driver().cloned();
                locked.ports.ingest(frame.clone(), driver.as_deref());
            }
        }
    }

    /// First handshake wins.
    fn activate(&self, locked: &mut Locked<'_>, endpoint: EndpointId) {
        let state = &mut locked.state;
        if state.active.is_some() {
            debug!(endpoint = %endpoint, active = ?state.active, "Keeping endpoint on standby");
            return;
        }

        state.active = Some(endpoint);
        state.connected = true;
        locked.ports.set_connected(true);

        info!(endpoint = %endpoint, generation = state.generation, "Relay connected");
        self.notify(Notification::ConnectionStateChanged { connected: true });
    }

    /// Drops an endpoint whose event loop gave up. Reports the relay as
    /// unreachable once the last endpoint of a never-activated connect goes.
    fn retire(&self, state: &mut LinkState, endpoint: EndpointId) {
        let Some(index) = state.endpoints.iter().position(|e| e.id() == endpoint) else {
            return;
        };
        state.endpoints.remove(index).detach();
        state.modes.remove(&endpoint);
        debug!(endpoint = %endpoint, remaining = state.endpoints.len(), "Endpoint gave up");

        if state.endpoints.is_empty() && state.active.is_none() {
            warn!(generation = state.generation, "No relay endpoint reachable");
            self.notify(Notification::RelayUnreachable);
        }
    }

    fn answer_init(&self, name: &str) {
        info!(module = name, "Relay requested hardware module");
        self.notify(Notification::HardwareModuleRequested {
            name: name.to_string(),
        });
        if let Err(e) = self.request_hardware_module(name) {
            warn!(module = name, error = %e, "Failed to answer init");
        }
    }

    fn request_hardware_module(&self, name: &str) -> Result<()> {
        let state = self.state.lock();
        match state.active_transport() {
            Some(transport) => {
                let message = OutboundMessage::init(name, transport.mode)?;
                transport.send(message)
            }
            None => {
                self.notify(Notification::NotConnected {
                    operation: "request_hardware_module".to_string(),
                });
                Err(Error::not_connected("request_hardware_module"))
            }
        }
    }

    /// Shared teardown. Returns `true` if a live session ended.
    fn teardown(&self, locked: &mut Locked<'_>) -> bool {
        let state = &mut locked.state;
        state.cancel_pending_connect();
        state.generation += 1;
        state.close_endpoints();
        let was_connected = std::mem::replace(&mut state.connected, false);

        locked.devices.reset();
        locked.ports.reset();

        if was_connected {
            info!(generation = locked.state.generation, "Relay session closed");
            self.notify(Notification::ConnectionStateChanged { connected: false });
            self.notify(Notification::Disconnected);
        }

        was_connected
    }
}

// ============================================================================
// ConnectionManager
// ============================================================================

/// Session bridge between the editor and the hardware relay.
///
/// Cheap to clone; clones share the same session.
///
/// Methods that open endpoints must run inside a tokio runtime.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Creates a manager with fresh port and device state.
    #[must_use]
    pub fn new(options: BridgeOptions, context: BridgeContext) -> Self {
        let devices = Arc::new(Mutex::new(DeviceRegistry::from_context(&context)));
        let ports = Arc::new(Mutex::new(PortDataStore::new()));
        Self::with_shared(options, context, devices, ports)
    }

    /// Creates a manager around host-owned port and device state.
    #[must_use]
    pub fn with_shared(
        options: BridgeOptions,
        context: BridgeContext,
        devices: Arc<Mutex<DeviceRegistry>>,
        ports: Arc<Mutex<PortDataStore>>,
    ) -> Self {
        let retry_budget = options.retry_budget;
        Self {
            inner: Arc::new(Inner {
                options,
                context,
                identity: Mutex::new(None),
                state: Mutex::new(LinkState::new(retry_budget)),
                devices,
                ports,
            }),
        }
    }

    /// Creates a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> super::builder::ManagerBuilder {
        super::builder::ManagerBuilder::new()
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Returns the options in use.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &BridgeOptions {
        &self.inner.options
    }

    /// Returns the shared port store.
    ///
    /// Connection queries stay safe while it is held. Connecting,
    /// disconnecting, [`update`](Self::update) and [`stop`](Self::stop) lock
    /// it too. Lock [`devices`](Self::devices) first when both are needed.
    #[inline]
    #[must_use]
    pub fn ports(&self) -> &Arc<Mutex<PortDataStore>> {
        &self.inner.ports
    }

    /// Returns the shared device registry.
    #[inline]
    #[must_use]
    pub fn devices(&self) -> &Arc<Mutex<DeviceRegistry>> {
        &self.inner.devices
    }

    /// Returns `true` while an endpoint is active.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().connected
    }

    /// Returns the active endpoint.
    #[must_use]
    pub fn active_endpoint(&self) -> Option<EndpointId> {
        let state = self.inner.state.lock();
        if state.connected { state.active } else { None }
    }

    /// Returns the number of open endpoints.
    #[must_use]
    pub fn endpoint_count(&self) -> usize {
        self.inner.state.lock().endpoints.len()
    }

    /// Returns the current retry budget.
    #[must_use]
    pub fn retry_budget(&self) -> u32 {
        self.inner.state.lock().retry_budget
    }

    /// Returns the session identifier, if initialized.
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.inner.identity.lock().clone()
    }

    // ========================================================================
    // Session Identity
    // ========================================================================

    /// Loads the persisted session identifier or creates and persists one.
    ///
    /// Idempotent. A stored value that does not match the identifier
    /// template is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] or [`Error::Io`] if the store fails.
    pub fn initialize_session(&self) -> Result<SessionId> {
        let mut identity = self.inner.identity.lock();
        if let Some(session) = identity.as_ref() {
            return Ok(session.clone());
        }

        let key = &self.inner.options.storage_key;
        let store = &self.inner.context.store;

        let stored = match store.get(key)? {
            Some(value) => match SessionId::parse(&value) {
                Ok(session) => Some(session),
                Err(e) => {
                    warn!(error = %e, "Replacing invalid stored session id");
                    None
                }
            },
            None => None,
        };

        let session = match stored {
            Some(session) => session,
            None => {
                let session = SessionId::generate();
                store.set(key, session.as_str())?;
                debug!(session = %session, "Session id created");
                session
            }
        };

        *identity = Some(session.clone());
        Ok(session)
    }

    /// Clears the persisted session identifier.
    ///
    /// The next [`initialize_session`](Self::initialize_session) creates a
    /// new one. Open endpoints keep their room until the next connect.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn reset_session(&self) -> Result<()> {
        let mut identity = self.inner.identity.lock();
        self.inner.context.store.remove(&self.inner.options.storage_key)?;
        *identity = None;
        Ok(())
    }

    // ========================================================================
    // Connection
    // ========================================================================

    /// Replaces all endpoints with fresh ones and starts connecting.
    ///
    /// Listeners of the previous endpoints are detached before the new
    /// endpoints exist. A pending deferred connect is cancelled.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] or [`Error::Config`] for a bad endpoint address
    /// - Store errors from [`initialize_session`](Self::initialize_session)
    pub fn connect(&self) -> Result<()> {
        let session = self.initialize_session()?;
        let urls = self
            .inner
            .options
            .endpoint_urls()?
            .iter()
            .map(|base| socket_url(base, &session))
            .collect::<Result<Vec<_>>>()?;

        let mut locked = self.inner.lock();
        locked.state.cancel_pending_connect();
        locked.state.close_endpoints();
        if std::mem::replace(&mut locked.state.connected, false) {
            locked.devices.reset();
            locked.ports.reset();
            self.inner
                .notify(Notification::ConnectionStateChanged { connected: false });
        }
        let state = &mut locked.state;

        state.generation += 1;
        let generation = state.generation;
        let policy = self.inner.options.policy(state.retry_budget);

        for (index, url) in urls.into_iter().enumerate() {
            let id = EndpointId::new(index);
            let dispatcher = Arc::new(MessageDispatcher::new());
            self.subscribe(&dispatcher, id, generation);
            state
                .endpoints
                .push(TransportEndpoint::spawn(id, url, policy, dispatcher));
        }

        info!(
            generation,
            endpoints = state.endpoints.len(),
            budget = policy.retry_budget,
            room = %session,
            "Connecting to relay"
        );
        Ok(())
    }

    fn subscribe(&self, dispatcher: &MessageDispatcher, endpoint: EndpointId, generation: u64) {
        for kind in SUBSCRIBED_KINDS {
            let weak: Weak<Inner> = Arc::downgrade(&self.inner);
            dispatcher.subscribe(kind, move |event| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_event(endpoint, generation, event);
                }
            });
        }
    }

    /// User-initiated retry: raises the retry budget and reconnects.
    ///
    /// # Errors
    ///
    /// See [`connect`](Self::connect).
    pub fn retry_connect(&self) -> Result<()> {
        self.raise_retry_budget();
        self.connect()
    }

    /// Launches the relay program and reconnects shortly after.
    ///
    /// Raises the retry budget. Unless an endpoint is already active, a
    /// connect is scheduled after the configured delay; it is cancelled by
    /// [`disconnect`](Self::disconnect) or a newer connect.
    ///
    /// # Errors
    ///
    /// Returns the launcher's error. The deferred connect is scheduled
    /// either way.
    pub async fn open_relay_program(&self, launcher: &dyn RelayLauncher) -> Result<()> {
        let session = self.initialize_session()?;
        self.raise_retry_budget();

        let url = launcher_url(&self.inner.options.launcher_scheme, &session);
        let launched = launcher.launch(&url).await;
        if let Err(e) = &launched {
            warn!(error = %e, "Relay launcher failed");
        }

        if !self.is_connected() {
            self.schedule_connect();
        }

        launched
    }

    fn raise_retry_budget(&self) {
        self.inner.state.lock().retry_budget = self.inner.options.manual_retry_budget;
    }

    fn schedule_connect(&self) {
        let delay = self.inner.options.deferred_connect_delay;
        let weak = Arc::downgrade(&self.inner);

        // The task cannot observe `pending_connect` before it is stored.
        let mut state = self.inner.state.lock();
        state.cancel_pending_connect();
        state.connect_tickets += 1;
        let ticket = state.connect_tickets;

        let handle = tokio::spawn(async move {
            sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            {
                let mut state = inner.state.lock();
                if state.pending_connect.as_ref().map(|p| p.ticket) != Some(ticket) {
                    debug!(ticket, "Deferred connect superseded");
                    return;
                }
                state.pending_connect = None;
            }

            let manager = ConnectionManager { inner };
            if let Err(e) = manager.connect() {
                warn!(error = %e, "Deferred connect failed");
            }
        });

        state.pending_connect = Some(PendingConnect { ticket, handle });
        debug!(?delay, ticket, "Deferred connect scheduled");
    }

    /// Returns `true` while a deferred connect is pending.
    #[must_use]
    pub fn has_pending_connect(&self) -> bool {
        self.inner
            .state
            .lock()
            .pending_connect
            .as_ref()
            .is_some_and(|pending| !pending.handle.is_finished())
    }

    /// Closes every endpoint and forgets the device.
    ///
    /// The host is notified only if a session was live.
    pub fn disconnect(&self) {
        let mut locked = self.inner.lock();
        self.inner.teardown(&mut locked);
    }

    // ========================================================================
    // Relay Operations
    // ========================================================================

    /// Asks the relay to load the driver module `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] without an active endpoint; the
    /// host also receives [`Notification::NotConnected`]. Nothing is
    /// queued or retried.
    pub fn request_hardware_module(&self, name: &str) -> Result<()> {
        self.inner.request_hardware_module(name)
    }

    /// Flushes the send queue to the active endpoint.
    ///
    /// Returns `true` if a message was sent; a no-op without a session.
    ///
    /// # Errors
    ///
    /// Propagates encoding and transport errors.
    pub fn update(&self) -> Result<bool> {
        let driver = self.inner.devices.lock().driver().cloned();
        let ports = self.inner.ports.lock();
        let state = self.inner.state.lock();
        let transport = state.active_transport();

        ports.flush(
            transport.as_ref().map(|t| t as &dyn Outbound),
            driver.as_deref(),
        )
    }

    /// Program stopped: resets the send queue to the driver's idle values.
    ///
    /// Returns `true` if the active driver supports zero-reset.
    pub fn stop(&self) -> bool {
        let driver = self.inner.devices.lock().driver().cloned();
        match driver {
            Some(driver) => self.inner.ports.lock().set_zero(driver.as_ref()),
            None => false,
        }
    }

    // ========================================================================
    // Host Requests
    // ========================================================================

    /// Requests the relay program installer.
    pub fn download_connector(&self) {
        self.inner
            .notify(Notification::RelayDownloadRequested(DownloadAsset::Connector));
    }

    /// Requests the setup guide.
    pub fn download_guide(&self) {
        self.inner
            .notify(Notification::RelayDownloadRequested(DownloadAsset::Guide));
    }

    /// Requests the board firmware source.
    pub fn download_source(&self) {
        self.inner
            .notify(Notification::RelayDownloadRequested(DownloadAsset::Source));
    }

    /// Requests the module catalog page.
    pub fn request_module_page(&self) {
        self.inner.notify(Notification::ModuleCatalogRequested);
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ConnectionManager")
            .field("session", &*self.inner.identity.lock())
            .field("generation", &state.generation)
            .field("endpoints", &state.endpoints.len())
            .field("active", &state.active)
            .field("connected", &state.connected)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
