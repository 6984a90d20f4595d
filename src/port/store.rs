//! Port data store.
//!
//! Holds the last inbound [`PortFrame`] and the outbound [`SendQueue`].
//! The store never touches the network: [`PortDataStore::flush`] receives
//! the active transport from the caller.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;
use tracing::trace;

use crate::device::{Capabilities, DeviceDriver};
use crate::error::Result;
use crate::protocol::{OutboundMessage, PortFrame, PortId};

use super::queue::SendQueue;

// ============================================================================
// Outbound
// ============================================================================

/// Sending half of an active relay transport.
pub trait Outbound {
    /// Mode last announced by the relay on this transport.
    fn mode(&self) -> Option<u64>;

    /// Queues a message for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ConnectionClosed`] if the transport is gone.
    fn send(&self, message: OutboundMessage) -> Result<()>;
}

// ============================================================================
// PortMonitor
// ============================================================================

/// Port monitor view fed with every ingested frame.
pub trait PortMonitor: Send {
    /// Returns `true` while the view is on screen.
    fn is_displayed(&self) -> bool {
        true
    }

    /// Renders the latest frame and pending writes.
    fn update(&mut self, frame: &PortFrame, queue: &SendQueue);
}

// ============================================================================
// PortDataStore
// ============================================================================

/// Inbound readings and outbound writes for the connected board.
#[derive(Default)]
pub struct PortDataStore {
    frame: PortFrame,
    queue: SendQueue,
    connected: bool,
    monitor: Option<Box<dyn PortMonitor>>,
}

impl PortDataStore {
    /// Creates an empty, disconnected store.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Connection State
    // ========================================================================

    /// Records whether a relay session is live.
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Returns `true` while a relay session is live.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    // ========================================================================
    // Port Accessors
    // ========================================================================

    /// Queues a digital write and stops polling that port.
    pub fn set_digital_port_value(&mut self, port: u32, value: impl Into<Value>) {
        self.queue.set(PortId::Digital(port).key(), value);
        self.remove_port_readable(port);
    }

    /// Reads a digital port.
    ///
    /// Returns 0 while disconnected. While connected, reading a port also
    /// subscribes it (see [`subscribe_on_read`](Self::subscribe_on_read));
    /// a port never reported reads 0.
    pub fn get_digital_port_value(&mut self, port: u32) -> f64 {
        if !self.connected {
            return 0.0;
        }
        self.subscribe_on_read(port);
        self.frame.port(PortId::Digital(port)).unwrap_or_default()
    }

    /// Reads an analog port (`a<port>`).
    ///
    /// Returns 0 while disconnected or if never reported. Unlike digital
    /// reads this has no subscription side effect; the relay contract
    /// depends on that difference.
    #[must_use]
    pub fn get_analog_port_value(&self, port: u32) -> f64 {
        if !self.connected {
            return 0.0;
        }
        self.frame.port(PortId::Analog(port)).unwrap_or_default()
    }

    /// Adds a port to `readablePorts`; no-op if already present.
    pub fn set_port_readable(&mut self, port: u32) {
        self.queue.add_readable(port);
    }

    /// Removes a port from `readablePorts`, preserving the others' order.
    pub fn remove_port_readable(&mut self, port: u32) {
        self.queue.remove_readable(port);
    }

    /// Implicit subscription performed by digital reads.
    ///
    /// The relay only streams ports listed in `readablePorts`, so a digital
    /// read must register its port for the value to ever update. Writes
    /// undo this through [`set_digital_port_value`](Self::set_digital_port_value).
    fn subscribe_on_read(&mut self, port: u32) {
        self.set_port_readable(port);
    }

    // ========================================================================
    // Frame and Queue
    // ========================================================================

    /// Returns the last inbound frame.
    #[inline]
    #[must_use]
    pub fn frame(&self) -> &PortFrame {
        &self.frame
    }

    /// Returns the outbound queue.
    #[inline]
    #[must_use]
    pub fn queue(&self) -> &SendQueue {
        &self.queue
    }

    /// Returns the outbound queue for driver-specific writes.
    #[inline]
    pub fn queue_mut(&mut self) -> &mut SendQueue {
        &mut self.queue
    }

    /// Replaces the stored frame wholesale.
    ///
    /// A displayed monitor receives the new frame and queue; a driver with
    /// [`Capabilities::AFTER_RECEIVE`] is handed the frame afterwards.
    pub fn ingest(&mut self, frame: PortFrame, driver: Option<&dyn DeviceDriver>) {
        self.frame = frame;

        if let Some(monitor) = self.monitor.as_mut()
            && monitor.is_displayed()
        {
            monitor.update(&self.frame, &self.queue);
        }

        if let Some(driver) = driver
            && driver.capabilities().contains(Capabilities::AFTER_RECEIVE)
        {
            driver.after_receive(&self.frame);
        }
    }

    /// Sends the queue over the active transport.
    ///
    /// No-op without a transport. A driver with
    /// [`Capabilities::CUSTOM_SEND`] encodes the message itself; otherwise
    /// the whole queue goes out as one data message. Returns `true` if a
    /// message was handed to the transport.
    ///
    /// # Errors
    ///
    /// Propagates encoding failures and transport send failures.
    pub fn flush(
        &self,
        transport: Option<&dyn Outbound>,
        driver: Option<&dyn DeviceDriver>,
    ) -> Result<bool> {
        let Some(transport) = transport else {
            return Ok(false);
        };

        let mode = transport.mode();
        let message = match driver {
            Some(driver) if driver.capabilities().contains(Capabilities::CUSTOM_SEND) => {
                trace!(driver = driver.name(), "Driver encodes outbound message");
                driver.send_message(&self.queue, mode)?
            }
            _ => Some(OutboundMessage::data(&self.queue, mode)?),
        };

        match message {
            Some(message) => {
                transport.send(message)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Applies the driver's zero-reset to the queue, if it has one.
    pub fn set_zero(&mut self, driver: &dyn DeviceDriver) -> bool {
        if !driver.capabilities().contains(Capabilities::SET_ZERO) {
            return false;
        }
        driver.set_zero(&mut self.queue);
        true
    }

    /// Clears frame and queue at session teardown.
    pub fn reset(&mut self) {
        self.frame = PortFrame::new();
        self.queue.clear();
        self.connected = false;
    }

    // ========================================================================
    // Monitor
    // ========================================================================

    /// Attaches the monitor view fed by [`ingest`](Self::ingest).
    pub fn attach_monitor(&mut self, monitor: Box<dyn PortMonitor>) {
        self.monitor = Some(monitor);
    }

    /// Detaches and returns the monitor view.
    pub fn detach_monitor(&mut self) -> Option<Box<dyn PortMonitor>> {
        self.monitor.take()
    }
}

impl std::fmt::Debug for PortDataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortDataStore")
            .field("frame", &self.frame)
            .field("queue", &self.queue)
            .field("connected", &self.connected)
            .field("monitor", &self.monitor.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
