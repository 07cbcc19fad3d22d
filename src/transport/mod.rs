//! Transport adapter interface.
//!
//! A transport wraps one networking library and exposes exactly what the
//! lifecycle code needs: create a handle, inject callbacks, start, receive
//! one message at a time, send, and cancel. WebSocket framing, the HTTP
//! upgrade and socket I/O all stay inside the backend.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐  set_*_handler / start / cancel  ┌─────────────────┐
//! │  Client / Server     │ ───────────────────────────────► │  Transport      │
//! │  (lifecycle, gate,   │                                  │  (tokio or      │
//! │   registry)          │ ◄─────────────────────────────── │   threaded)     │
//! └──────────────────────┘   jobs posted to EventQueue      └─────────────────┘
//! ```
//!
//! # Callback Contract
//!
//! - Every callback is posted to the [`EventQueue`] handed over at creation;
//!   none runs inline inside a trait method.
//! - State callbacks arrive in order. After `Cancelled` or `Failed` nothing
//!   more arrives and the backend drops every handler it stored.
//! - Each [`Connection::receive`] call produces exactly one completion,
//!   unless the connection terminates first.
//! - [`Connection::cancel`] is cooperative: the outcome is observed only when
//!   the terminal state callback arrives.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `nonblocking` | tokio + tokio-tungstenite adapter |
//! | `blocking` | thread-per-connection adapter over synchronous tungstenite |
//! | `endpoint` | Client and listener addresses |
//! | `options` | Backend tuning shared by both adapters |

// ============================================================================
// Submodules
// ============================================================================

/// Thread-per-connection adapter.
pub mod blocking;

/// Client and listener addresses.
pub mod endpoint;

/// tokio-based adapter.
pub mod nonblocking;

/// Transport tuning options.
pub mod options;

/// Plumbing shared by both adapters.
mod common;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::hash::Hash;

use crate::error::Result;
use crate::queue::EventQueue;

// ============================================================================
// Re-exports
// ============================================================================

pub use blocking::{ThreadedConnection, ThreadedListener, ThreadedTransport};
pub use endpoint::{Endpoint, ListenEndpoint};
pub use nonblocking::{TokioConnection, TokioListener, TokioTransport};
pub use options::TransportOptions;

// ============================================================================
// Types
// ============================================================================

/// State reported by a backend for a connection or listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportState {
    /// Established (connection) or bound (listener).
    Ready,
    /// Cannot make progress right now, e.g. the peer refused. Lifecycle code
    /// answers with a cancel.
    Waiting(String),
    /// Terminated after a cancel request.
    Cancelled,
    /// Terminated by an error.
    Failed(String),
}

impl TransportState {
    /// Returns `true` for `Cancelled` and `Failed`.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Failed(_))
    }
}

/// Why a receive completed without a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveError {
    /// No more data will arrive: the peer closed or the stream ended.
    NoData,
    /// Any other read failure.
    Failed(String),
}

impl fmt::Display for ReceiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoData => f.write_str("no more data"),
            Self::Failed(reason) => write!(f, "receive failed: {reason}"),
        }
    }
}

/// Outcome of one receive: a message, nothing (e.g. a control frame), or an error.
pub type ReceiveOutcome = std::result::Result<Option<Vec<u8>>, ReceiveError>;

/// State-changed callback.
pub type StateHandler = Box<dyn Fn(TransportState) + Send + Sync>;

/// New-connection callback for listeners.
pub type NewConnectionHandler<N> = Box<dyn Fn(N) + Send + Sync>;

/// One-shot receive completion.
pub type ReceiveCompletion = Box<dyn FnOnce(ReceiveOutcome) + Send>;

// ============================================================================
// Traits
// ============================================================================

/// Handle to one backend connection.
///
/// Clones refer to the same connection; equality and hashing follow that
/// identity so handles can key the [`ConnectionRegistry`].
///
/// [`ConnectionRegistry`]: crate::registry::ConnectionRegistry
pub trait Connection: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Injects the state-changed callback. Call before [`start`](Self::start).
    fn set_state_changed_handler(&self, handler: StateHandler);

    /// Begins connecting (outbound) or the upgrade handshake (inbound).
    fn start(&self);

    /// Requests the next complete message.
    fn receive(&self, completion: ReceiveCompletion);

    /// Hands one binary message to the backend.
    ///
    /// Messages sent before `Ready` are held and flushed once established.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`](crate::Error::ConnectionClosed) if
    /// the connection has already terminated.
    fn send(&self, payload: Vec<u8>) -> Result<()>;

    /// Requests teardown. Idempotent.
    fn cancel(&self);
}

/// Handle to one backend listener.
pub trait Listener: Send + Sync + 'static {
    /// Connection type produced for inbound peers.
    type Connection: Connection;

    /// Injects the state-changed callback. Call before [`start`](Self::start).
    fn set_state_changed_handler(&self, handler: StateHandler);

    /// Injects the new-connection callback. Call before [`start`](Self::start).
    ///
    /// Handed connections are not started.
    fn set_new_connection_handler(&self, handler: NewConnectionHandler<Self::Connection>);

    /// Binds and begins accepting.
    fn start(&self);

    /// Requests teardown. Idempotent.
    fn cancel(&self);

    /// Resolved listening port; `0` until `Ready`.
    fn port(&self) -> u16;
}

/// A networking backend.
pub trait Transport: Sized + Send + Sync + 'static {
    /// Connection handle type.
    type Connection: Connection;

    /// Listener handle type.
    type Listener: Listener<Connection = Self::Connection>;

    /// Creates the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid or backend resources
    /// (threads, runtime) cannot be created.
    fn from_options(options: TransportOptions) -> Result<Self>;

    /// Creates an outbound connection handle. Does not start it.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be expressed as a WebSocket URL.
    fn connection(&self, endpoint: &Endpoint, queue: &EventQueue) -> Result<Self::Connection>;

    /// Creates a listener handle. Does not start it.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the endpoint.
    fn listener(&self, endpoint: &ListenEndpoint, queue: &EventQueue) -> Result<Self::Listener>;
}

// ============================================================================
// Tests
// ============================================================================
