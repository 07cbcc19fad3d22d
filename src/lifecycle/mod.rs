//! Connection lifecycle.
//!
//! Every client connection, server listener and accepted server connection
//! moves through the same forward-only progression:
//!
//! ```text
//! Connecting ──► Ready ──► Closed
//!      └───────────────────▲
//! ```
//!
//! The [`CompletionGate`] records that progression so facade constructors
//! and destructors can block on it; the state-changed handlers in `machine`
//! drive it from transport callbacks.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `state` | [`ConnectionState`] |
//! | `gate` | [`CompletionGate`] |
//! | `machine` | Transport callbacks, receive loop |

// ============================================================================
// Submodules
// ============================================================================

/// Completion gate.
pub mod gate;

/// Lifecycle state enum.
pub mod state;

/// Transport callbacks driving the gate and the handler table.
pub(crate) mod machine;

// ============================================================================
// Re-exports
// ============================================================================

pub use gate::CompletionGate;
pub use state::ConnectionState;
