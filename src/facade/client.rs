//! Single-connection client facade.
//!
//! Construction blocks until the connection is ready, fails or the timeout
//! elapses. Dropping the client cancels the connection and blocks until its
//! `on_close` handler has run.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use websocket_tools::{Client, ClientHandlers, TokioTransport};
//!
//! # fn example() -> websocket_tools::Result<()> {
//! let handlers = ClientHandlers::new(
//!     |id, data: &[u8], _: &()| println!("{id}: {} bytes", data.len()),
//!     |id, _: &()| println!("{id} closed"),
//! );
//!
//! let client = Client::<TokioTransport>::create(
//!     "127.0.0.1",
//!     9001,
//!     "/",
//!     handlers,
//!     (),
//!     Duration::from_millis(400),
//! )?;
//! client.send(b"hello")?;
//! client.close();
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::handlers::{ClientDispatch, ClientHandlers, EventSink};
use crate::identifiers::ConnectionId;
use crate::lifecycle::machine::client_state_handler;
use crate::lifecycle::CompletionGate;
use crate::queue::EventQueue;
use crate::transport::{Connection, Endpoint, TokioTransport, Transport, TransportOptions};

use super::builder::ClientBuilder;
use super::timeout_millis;

// ============================================================================
// Client
// ============================================================================

/// A connected WebSocket client.
pub struct Client<B: Transport = TokioTransport> {
    id: ConnectionId,
    connection: B::Connection,
    gate: Arc<CompletionGate>,
    queue: EventQueue,
    /// Kept alive for the connection's lifetime.
    _transport: B,
}

impl Client {
    /// Creates a builder for a tokio-backed client.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }
}

// ============================================================================
// Construction
// ============================================================================

impl<B: Transport> Client<B> {
    /// Connects to `ws://host:port/path` with default transport options.
    ///
    /// A zero `timeout` waits indefinitely.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] / [`Error::Url`] for an invalid address
    /// - [`Error::ConnectionTimeout`] if the connection was not ready in time
    /// - [`Error::Connection`] if the backend closed the connection first
    pub fn create<C>(
        host: &str,
        port: u16,
        path: &str,
        handlers: ClientHandlers<C>,
        context: C,
        timeout: Duration,
    ) -> Result<Self>
    where
        C: Send + Sync + 'static,
    {
        let endpoint = Endpoint::new(host, port, path)?;
        let transport = B::from_options(TransportOptions::default())?;
        Self::open(transport, &endpoint, handlers, context, timeout)
    }

    /// Connects over an existing backend.
    pub(crate) fn open<C>(
        transport: B,
        endpoint: &Endpoint,
        handlers: ClientHandlers<C>,
        context: C,
        timeout: Duration,
    ) -> Result<Self>
    where
        C: Send + Sync + 'static,
    {
        let id = ConnectionId::next();
        let queue = EventQueue::new(format!("websocket-client-{id}"))?;
        let connection = transport.connection(endpoint, &queue)?;
        let gate = Arc::new(CompletionGate::new());
        let sink: Arc<dyn EventSink> = Arc::new(ClientDispatch::new(handlers, context));

        connection.set_state_changed_handler(client_state_handler(
            connection.clone(),
            id,
            Arc::clone(&gate),
            sink,
        ));

        debug!(%id, url = %endpoint.url(), "Connecting");
        connection.start();

        let timeout = (!timeout.is_zero()).then_some(timeout);
        if !gate.wait_for_completion(timeout) {
            debug!(%id, "Connect timed out, cancelling");
            connection.cancel();
            gate.wait_for_closed();
            return Err(Error::connection_timeout(timeout_millis(timeout)));
        }

        if !gate.ready() {
            return Err(Error::connection(format!(
                "Failed to connect to {}",
                endpoint.url()
            )));
        }

        info!(%id, url = %endpoint.url(), "Client connected");

        Ok(Self {
            id,
            connection,
            gate,
            queue,
            _transport: transport,
        })
    }
}

// ============================================================================
// Operations
// ============================================================================

impl<B: Transport> Client<B> {
    /// This client's connection id, as passed to its handlers.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns `true` until the connection closes.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.gate.ready()
    }

    /// Sends one binary message.
    ///
    /// Delivery failures after hand-off close the connection and surface as
    /// `on_close`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the connection has closed.
    pub fn send(&self, data: &[u8]) -> Result<()> {
        if !self.gate.ready() {
            return Err(Error::ConnectionClosed);
        }
        self.connection.send(data.to_vec())
    }

    /// Closes the connection and waits for `on_close`.
    pub fn close(self) {
        drop(self);
    }
}

impl<B: Transport> Drop for Client<B> {
    fn drop(&mut self) {
        if self.gate.ready() {
            self.connection.cancel();
        }

        if self.queue.is_current() {
            warn!(id = %self.id, "Client dropped inside its own handler, not waiting for close");
            return;
        }

        self.gate.wait_for_closed();
        debug!(id = %self.id, "Client closed");
    }
}

impl<B: Transport> fmt::Debug for Client<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("state", &self.gate.state())
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}
