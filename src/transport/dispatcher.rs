//! Per-endpoint event channel.
//!
//! Every [`TransportEndpoint`](super::TransportEndpoint) owns one
//! [`MessageDispatcher`]. Listeners subscribe per [`EventKind`], run in
//! registration order, and are removed explicitly: one at a time with
//! [`unsubscribe`](MessageDispatcher::unsubscribe) or all at once with
//! [`detach_all`](MessageDispatcher::detach_all) at teardown.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::trace;

use crate::identifiers::SubscriptionId;
use crate::protocol::{EventKind, RelayEvent};

// ============================================================================
// Types
// ============================================================================

/// Listener callback.
pub type Listener = Arc<dyn Fn(&RelayEvent) + Send + Sync>;

/// One registered listener.
struct Registration {
    id: SubscriptionId,
    kind: EventKind,
    listener: Listener,
}

// ============================================================================
// MessageDispatcher
// ============================================================================

/// Typed listener registry for one endpoint.
#[derive(Default)]
pub struct MessageDispatcher {
    registrations: Mutex<Vec<Registration>>,
}

impl MessageDispatcher {
    /// Creates a dispatcher with no listeners.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for events of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> SubscriptionId
    where
        F: Fn(&RelayEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId::next();
        self.registrations.lock().push(Registration {
            id,
            kind,
            listener: Arc::new(listener),
        });
        trace!(%id, %kind, "Listener subscribed");
        id
    }

    /// Removes one listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registrations = self.registrations.lock();
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        registrations.len() != before
    }

    /// Removes every listener and returns how many there were.
    pub fn detach_all(&self) -> usize {
        let removed = std::mem::take(&mut *self.registrations.lock());
        removed.len()
    }

    /// Returns the number of registered listeners.
    #[inline]
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.registrations.lock().len()
    }

    /// Delivers `event` to every listener of its kind.
    ///
    /// Listeners run outside the registry lock, so they may subscribe or
    /// unsubscribe. Returns the number of listeners invoked.
    pub fn dispatch(&self, event: &RelayEvent) -> usize {
        let kind = event.kind();
        let listeners: Vec<Listener> = self
            .registrations
            .lock()
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| Arc::clone(&r.listener))
            .collect();

        for listener in &listeners {
            listener(event);
        }

        listeners.len()
    }

    /// Decodes a Socket.IO event and dispatches it.
    ///
    /// Unknown events are dropped and return `None`.
    pub fn dispatch_socket_event(&self, name: &str, args: Vec<Value>) -> Option<usize> {
        match RelayEvent::from_socket_event(name, args) {
            Some(event) => Some(self.dispatch(&event)),
            None => {
                trace!(name, "Ignoring unknown relay event");
                None
            }
        }
    }
}

impl fmt::Debug for MessageDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageDispatcher")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
