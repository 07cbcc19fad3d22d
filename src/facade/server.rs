//! Multi-connection server facade.
//!
//! The server listens on one address and path. Each accepted peer gets a
//! [`ConnectionId`] from the server's [`ConnectionRegistry`] and moves
//! through `on_connect → on_ready → on_receive* → on_close`.
//!
//! # Teardown
//!
//! Dropping the server:
//!
//! 1. Seals the registry; peers accepted from now on are dropped unseen
//! 2. Cancels every live connection
//! 3. Cancels the listener
//! 4. Waits for the listener to close, then for every `on_close` to run
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use websocket_tools::{Server, ServerHandlers, TokioTransport};
//!
//! # fn example() -> websocket_tools::Result<()> {
//! let handlers = ServerHandlers::new(
//!     |id, _: &()| println!("{id} connected"),
//!     |_, _: &()| {},
//!     |id, data: &[u8], _: &()| println!("{id}: {} bytes", data.len()),
//!     |id, _: &()| println!("{id} closed"),
//! );
//!
//! let timeout = Duration::from_millis(400);
//! let server = Server::<TokioTransport>::create(0, "/", handlers, (), timeout)?;
//! println!("listening on {}", server.port());
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::handlers::{EventSink, ServerDispatch, ServerHandlers};
use crate::identifiers::ConnectionId;
use crate::lifecycle::CompletionGate;
use crate::lifecycle::machine::{listener_state_handler, new_connection_handler};
use crate::queue::EventQueue;
use crate::registry::ConnectionRegistry;
use crate::transport::{
    Connection, ListenEndpoint, Listener, TokioTransport, Transport, TransportOptions,
};

use super::builder::ServerBuilder;
use super::options::DEFAULT_BIND_IP;
use super::timeout_millis;

// ============================================================================
// Server
// ============================================================================

/// A listening WebSocket server.
pub struct Server<B: Transport = TokioTransport> {
    listener: B::Listener,
    registry: Arc<ConnectionRegistry<B::Connection>>,
    gate: Arc<CompletionGate>,
    port: u16,
    queue: EventQueue,
    /// Kept alive for the listener's lifetime.
    _transport: B,
}

impl Server {
    /// Creates a builder for a tokio-backed server.
    #[inline]
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }
}

// ============================================================================
// Construction
// ============================================================================

impl<B: Transport> Server<B> {
    /// Listens on `127.0.0.1:port` for upgrades to `path`.
    ///
    /// Port `0` picks an ephemeral port; see [`port`](Self::port). A zero
    /// `timeout` waits indefinitely.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] for an invalid path
    /// - [`Error::ConnectionTimeout`] if the listener was not ready in time
    /// - [`Error::Connection`] if binding failed
    pub fn create<C>(
        port: u16,
        path: &str,
        handlers: ServerHandlers<C>,
        context: C,
        timeout: Duration,
    ) -> Result<Self>
    where
        C: Send + Sync + 'static,
    {
        let endpoint = ListenEndpoint::new(DEFAULT_BIND_IP, port, path)?;
        let transport = B::from_options(TransportOptions::default())?;
        Self::open(transport, &endpoint, handlers, context, timeout)
    }

    /// Listens over an existing backend.
    pub(crate) fn open<C>(
        transport: B,
        endpoint: &ListenEndpoint,
        handlers: ServerHandlers<C>,
        context: C,
        timeout: Duration,
    ) -> Result<Self>
    where
        C: Send + Sync + 'static,
    {
        let queue = EventQueue::new(format!("websocket-server-{}", endpoint.port()))?;
        let listener = transport.listener(endpoint, &queue)?;
        let gate = Arc::new(CompletionGate::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let sink: Arc<dyn EventSink> = Arc::new(ServerDispatch::new(handlers, context));

        listener.set_state_changed_handler(listener_state_handler(Arc::clone(&gate)));
        listener.set_new_connection_handler(new_connection_handler(Arc::clone(&registry), sink));

        debug!(addr = %endpoint.socket_addr(), path = endpoint.path(), "Starting listener");
        listener.start();

        let timeout = (!timeout.is_zero()).then_some(timeout);
        let timed_out = !gate.wait_for_completion(timeout);

        if timed_out || !gate.ready() {
            shutdown(&listener, &registry, &gate, &queue);
            return Err(if timed_out {
                Error::connection_timeout(timeout_millis(timeout))
            } else {
                Error::connection(format!("Failed to listen on {}", endpoint.socket_addr()))
            });
        }

        let port = listener.port();
        info!(port, path = endpoint.path(), "Server listening");

        Ok(Self {
            listener,
            registry,
            gate,
            port,
            queue,
            _transport: transport,
        })
    }
}

// ============================================================================
// Operations
// ============================================================================

impl<B: Transport> Server<B> {
    /// Resolved listening port.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Number of registered connections, including ones still handshaking.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Ids of registered connections, ascending.
    #[must_use]
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.registry.ids()
    }

    /// Sends one binary message to connection `id`.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionNotFound`] if `id` is not registered
    /// - [`Error::ConnectionClosed`] if the connection is shutting down
    pub fn send(&self, id: ConnectionId, data: &[u8]) -> Result<()> {
        let connection = self
            .registry
            .find(id)
            .ok_or_else(|| Error::connection_not_found(id))?;
        connection.send(data.to_vec())
    }

    /// Sends one binary message to every registered connection.
    ///
    /// Returns how many connections accepted the message.
    pub fn broadcast(&self, data: &[u8]) -> usize {
        let mut delivered = 0;
        let visited = self.registry.for_each(|id, connection| {
            match connection.send(data.to_vec()) {
                Ok(()) => delivered += 1,
                Err(e) => debug!(%id, error = %e, "Broadcast skipped connection"),
            }
        });
        trace!(visited, delivered, len = data.len(), "Broadcast");
        delivered
    }

    /// Stops the server and waits for every `on_close`.
    pub fn close(self) {
        drop(self);
    }
}

impl<B: Transport> Drop for Server<B> {
    fn drop(&mut self) {
        debug!(port = self.port, "Stopping server");
        if shutdown(&self.listener, &self.registry, &self.gate, &self.queue) {
            info!(port = self.port, "Server stopped");
        }
    }
}

impl<B: Transport> fmt::Debug for Server<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("port", &self.port)
            .field("state", &self.gate.state())
            .field("connections", &self.registry.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Teardown
// ============================================================================

/// Cancels the listener and every connection, then waits for them to close.
///
/// Returns `false` if the waits were skipped because the caller is running
/// on the server's own event queue.
fn shutdown<L: Listener>(
    listener: &L,
    registry: &ConnectionRegistry<L::Connection>,
    gate: &CompletionGate,
    queue: &EventQueue,
) -> bool {
    for connection in registry.seal() {
        connection.cancel();
    }
    if !gate.closed() {
        listener.cancel();
    }

    if queue.is_current() {
        warn!("Server dropped inside its own handler, not waiting for teardown");
        return false;
    }

    gate.wait_for_closed();
    registry.wait_until_empty();
    true
}
