//! Client and server options.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use websocket_tools::{ServerOptions, TransportOptions};
//!
//! let options = ServerOptions::new()
//!     .with_timeout(Duration::from_secs(1))
//!     .with_transport(TransportOptions::new().with_nodelay(false));
//!
//! assert!(options.validate().is_ok());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::transport::TransportOptions;

// ============================================================================
// Constants
// ============================================================================

/// Construction timeout for clients and servers.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(400);

/// Address servers bind to unless told otherwise.
pub const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

// ============================================================================
// ClientOptions
// ============================================================================

/// Options for a client facade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// How long construction waits for the connection. Zero waits forever.
    pub timeout: Duration,

    /// Backend tuning.
    pub transport: TransportOptions,
}

impl ClientOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            transport: TransportOptions::new(),
        }
    }

    /// Sets the construction timeout.
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the backend options.
    #[inline]
    #[must_use]
    pub fn with_transport(mut self, transport: TransportOptions) -> Self {
        self.transport = transport;
        self
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        self.transport.validate()
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// ServerOptions
// ============================================================================

/// Options for a server facade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// Local address to bind.
    pub bind_ip: IpAddr,

    /// How long construction waits for the listener. Zero waits forever.
    pub timeout: Duration,

    /// Backend tuning.
    pub transport: TransportOptions,
}

impl ServerOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bind_ip: DEFAULT_BIND_IP,
            timeout: DEFAULT_TIMEOUT,
            transport: TransportOptions::new(),
        }
    }

    /// Sets the bind address.
    #[inline]
    #[must_use]
    pub fn with_bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_ip = ip;
        self
    }

    /// Sets the construction timeout.
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the backend options.
    #[inline]
    #[must_use]
    pub fn with_transport(mut self, transport: TransportOptions) -> Self {
        self.transport = transport;
        self
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.bind_ip.is_multicast() {
            return Err(format!("Cannot bind to multicast address {}", self.bind_ip));
        }
        self.transport.validate()
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
