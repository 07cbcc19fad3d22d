//! Public client and server objects.
//!
//! Both facades share one contract:
//!
//! - **Construction** starts the backend, then blocks on a
//!   [`CompletionGate`](crate::CompletionGate) until the connection or
//!   listener is ready, fails, or the timeout elapses. On timeout it cancels
//!   and waits for the cancellation to land before returning an error.
//! - **Destruction** cancels and blocks until every `on_close` has run, so no
//!   handler fires after the facade is gone.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `client` | [`Client`] |
//! | `server` | [`Server`] |
//! | `builder` | [`ClientBuilder`], [`ServerBuilder`] |
//! | `options` | [`ClientOptions`], [`ServerOptions`] |

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Submodules
// ============================================================================

/// Builders.
pub mod builder;

/// Client facade.
pub mod client;

/// Client and server options.
pub mod options;

/// Server facade.
pub mod server;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::{ClientBuilder, ServerBuilder};
pub use client::Client;
pub use options::{ClientOptions, ServerOptions};
pub use server::Server;

// ============================================================================
// Helpers
// ============================================================================

/// Milliseconds for error reporting; `0` for an unbounded wait.
fn timeout_millis(timeout: Option<Duration>) -> u64 {
    timeout.map_or(0, |t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX))
}
