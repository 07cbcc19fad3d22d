//! WebSocket Tools - Backend-agnostic WebSocket clients and servers.
//!
//! This library opens and serves WebSocket connections through
//! interchangeable transport backends without changing call sites. Framing
//! and socket I/O belong to the backend; this crate owns the connection
//! lifecycle around it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  start / cancel   ┌──────────────┐
//! │ Client       │ ────────────────► │ Transport    │
//! │ Server       │                   │ (tokio or    │
//! │  + gate      │ ◄──────────────── │  threaded)   │
//! │  + registry  │  EventQueue jobs  └──────────────┘
//! └──────────────┘
//!        │ on_connect / on_ready / on_receive / on_close
//!        ▼
//!   application handlers
//! ```
//!
//! Key design principles:
//!
//! - Construction blocks until the connection or listener is ready, with a
//!   bounded timeout
//! - Destruction blocks until every close handler has run
//! - All callbacks of one facade run one at a time on its own event queue
//! - Servers address peers by small stable [`ConnectionId`]s
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use websocket_tools::{Client, ClientHandlers, Result, Server, ServerHandlers};
//!
//! fn main() -> Result<()> {
//!     let server = Server::builder().listen(
//!         ServerHandlers::new(
//!             |_, _: &()| {},
//!             |_, _: &()| {},
//!             |id, data: &[u8], _: &()| println!("{id} sent {} bytes", data.len()),
//!             |_, _: &()| {},
//!         ),
//!         (),
//!     )?;
//!
//!     let client = Client::builder()
//!         .host("127.0.0.1")
//!         .port(server.port())
//!         .timeout(Duration::from_secs(1))
//!         .connect(ClientHandlers::new(|_, _, _: &()| {}, |_, _: &()| {}), ())?;
//!
//!     client.send(b"hello")?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`facade`] | [`Client`], [`Server`] and their builders |
//! | [`handlers`] | Application handler tables |
//! | [`identifiers`] | [`ConnectionId`] |
//! | [`lifecycle`] | [`ConnectionState`] and [`CompletionGate`] |
//! | [`queue`] | Per-facade serialized [`EventQueue`] |
//! | [`registry`] | [`ConnectionRegistry`] |
//! | [`transport`] | Backend interface and the two bundled backends |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Client and server facades.
pub mod facade;

/// Application handler tables.
pub mod handlers;

/// Connection identifiers.
pub mod identifiers;

/// Connection lifecycle: state, completion gate, transport callbacks.
pub mod lifecycle;

/// Serialized callback queue.
pub mod queue;

/// Handle/id registry for servers.
pub mod registry;

/// Transport backends.
///
/// Defines the interface a backend implements and ships two of them.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Facade types
pub use facade::{Client, ClientBuilder, ClientOptions, Server, ServerBuilder, ServerOptions};

// Handler types
pub use handlers::{ClientHandlers, ServerHandlers};

// Lifecycle types
pub use lifecycle::{CompletionGate, ConnectionState};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::ConnectionId;

// Infrastructure
pub use queue::EventQueue;
pub use registry::ConnectionRegistry;

// Transport types
pub use transport::{
    Connection, Endpoint, ListenEndpoint, Listener, ReceiveError, ThreadedTransport,
    TokioTransport, Transport, TransportOptions, TransportState,
};
