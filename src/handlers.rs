//! Application handler tables.
//!
//! A handler table is bound once when a facade is created and shared by
//! every connection of that facade. It is immutable afterwards. The owner
//! context `C` travels with it and is handed to each callback by reference.
//!
//! | Handler | Client | Server |
//! |---------|--------|--------|
//! | `on_connect(id, ctx)` | - | new inbound connection registered |
//! | `on_ready(id, ctx)` | - | handshake complete |
//! | `on_receive(id, bytes, ctx)` | yes | yes |
//! | `on_close(id, ctx)` | yes | yes |
//!
//! Client readiness is implied by successful construction, so client tables
//! carry only the receive and close handlers.
//!
//! # Example
//!
//! ```
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use websocket_tools::ServerHandlers;
//!
//! #[derive(Default)]
//! struct Stats {
//!     bytes: AtomicUsize,
//! }
//!
//! let handlers = ServerHandlers::new(
//!     |id, _: &Stats| println!("{id} connected"),
//!     |_, _: &Stats| {},
//!     |_, data: &[u8], stats: &Stats| {
//!         stats.bytes.fetch_add(data.len(), Ordering::Relaxed);
//!     },
//!     |id, _: &Stats| println!("{id} closed"),
//! );
//! # let _ = handlers;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::{error, trace};

use crate::identifiers::ConnectionId;

// ============================================================================
// Types
// ============================================================================

/// Handler taking only a connection id.
pub type IdHandler<C> = Box<dyn Fn(ConnectionId, &C) + Send + Sync>;

/// Handler receiving one complete application message.
pub type ReceiveHandler<C> = Box<dyn Fn(ConnectionId, &[u8], &C) + Send + Sync>;

// ============================================================================
// ClientHandlers
// ============================================================================

/// Handler table for a client facade.
pub struct ClientHandlers<C> {
    on_receive: ReceiveHandler<C>,
    on_close: IdHandler<C>,
}

impl<C> ClientHandlers<C> {
    /// Binds both client handlers.
    pub fn new(
        on_receive: impl Fn(ConnectionId, &[u8], &C) + Send + Sync + 'static,
        on_close: impl Fn(ConnectionId, &C) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_receive: Box::new(on_receive),
            on_close: Box::new(on_close),
        }
    }
}

impl<C> fmt::Debug for ClientHandlers<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandlers").finish_non_exhaustive()
    }
}

// ============================================================================
// ServerHandlers
// ============================================================================

/// Handler table for a server facade.
pub struct ServerHandlers<C> {
    on_connect: IdHandler<C>,
    on_ready: IdHandler<C>,
    on_receive: ReceiveHandler<C>,
    on_close: IdHandler<C>,
}

impl<C> ServerHandlers<C> {
    /// Binds all four server handlers.
    pub fn new(
        on_connect: impl Fn(ConnectionId, &C) + Send + Sync + 'static,
        on_ready: impl Fn(ConnectionId, &C) + Send + Sync + 'static,
        on_receive: impl Fn(ConnectionId, &[u8], &C) + Send + Sync + 'static,
        on_close: impl Fn(ConnectionId, &C) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_connect: Box::new(on_connect),
            on_ready: Box::new(on_ready),
            on_receive: Box::new(on_receive),
            on_close: Box::new(on_close),
        }
    }
}

impl<C> fmt::Debug for ServerHandlers<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerHandlers").finish_non_exhaustive()
    }
}

// ============================================================================
// EventSink
// ============================================================================

/// Type-erased destination for lifecycle events.
///
/// Lifecycle code only talks to this trait, so it does not need to be
/// generic over the owner context. Implementations never unwind: a panicking
/// application handler is contained and logged, and the lifecycle step that
/// follows the call still runs.
pub(crate) trait EventSink: Send + Sync + 'static {
    fn connect(&self, id: ConnectionId);
    fn ready(&self, id: ConnectionId);
    fn receive(&self, id: ConnectionId, data: &[u8]);
    fn close(&self, id: ConnectionId);
}

/// A client table bound to its owner context.
pub(crate) struct ClientDispatch<C> {
    handlers: ClientHandlers<C>,
    context: C,
}

impl<C> ClientDispatch<C> {
    pub(crate) fn new(handlers: ClientHandlers<C>, context: C) -> Self {
        Self { handlers, context }
    }
}

impl<C: Send + Sync + 'static> EventSink for ClientDispatch<C> {
    fn connect(&self, _id: ConnectionId) {}

    fn ready(&self, _id: ConnectionId) {}

    fn receive(&self, id: ConnectionId, data: &[u8]) {
        trace!(%id, len = data.len(), "Dispatching receive");
        contained("on_receive", id, || (self.handlers.on_receive)(id, data, &self.context));
    }

    fn close(&self, id: ConnectionId) {
        contained("on_close", id, || (self.handlers.on_close)(id, &self.context));
    }
}

/// A server table bound to its owner context.
pub(crate) struct ServerDispatch<C> {
    handlers: ServerHandlers<C>,
    context: C,
}

impl<C> ServerDispatch<C> {
    pub(crate) fn new(handlers: ServerHandlers<C>, context: C) -> Self {
        Self { handlers, context }
    }
}

impl<C: Send + Sync + 'static> EventSink for ServerDispatch<C> {
    fn connect(&self, id: ConnectionId) {
        contained("on_connect", id, || (self.handlers.on_connect)(id, &self.context));
    }

    fn ready(&self, id: ConnectionId) {
        contained("on_ready", id, || (self.handlers.on_ready)(id, &self.context));
    }

    fn receive(&self, id: ConnectionId, data: &[u8]) {
        trace!(%id, len = data.len(), "Dispatching receive");
        contained("on_receive", id, || (self.handlers.on_receive)(id, data, &self.context));
    }

    fn close(&self, id: ConnectionId) {
        contained("on_close", id, || (self.handlers.on_close)(id, &self.context));
    }
}

/// Runs one application handler, logging instead of unwinding if it panics.
fn contained(handler: &'static str, id: ConnectionId, call: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(call)).is_err() {
        error!(%id, handler, "Application handler panicked");
    }
}

// ============================================================================
// Tests
// ============================================================================
