//! Transport tuning options.
//!
//! Fixed defaults suit local and LAN use; every field can be overridden.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use websocket_tools::TransportOptions;
//!
//! let options = TransportOptions::new()
//!     .with_connect_timeout(Duration::from_millis(500))
//!     .with_worker_threads(1);
//!
//! assert!(options.validate().is_ok());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// TCP connect and handshake budget.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// How often a blocking connection thread checks its command channel.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Worker threads for the tokio adapter's runtime.
pub const DEFAULT_WORKER_THREADS: usize = 2;

// ============================================================================
// TransportOptions
// ============================================================================

/// Options shared by both adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Disable Nagle's algorithm on every socket.
    pub nodelay: bool,

    /// Upper bound for TCP connect and the upgrade handshake.
    pub connect_timeout: Duration,

    /// Read timeout used by the blocking adapter between command checks.
    pub poll_interval: Duration,

    /// Runtime worker threads for the tokio adapter.
    pub worker_threads: usize,
}

// ============================================================================
// Constructors
// ============================================================================

impl TransportOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            nodelay: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            worker_threads: DEFAULT_WORKER_THREADS,
        }
    }
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl TransportOptions {
    /// Sets `TCP_NODELAY`.
    #[inline]
    #[must_use]
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// Sets the connect and handshake budget.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the blocking adapter's poll interval.
    #[inline]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the tokio adapter's worker thread count.
    #[inline]
    #[must_use]
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl TransportOptions {
    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.connect_timeout.is_zero() {
            return Err("Connect timeout must be greater than zero".to_string());
        }
        if self.poll_interval.is_zero() {
            return Err("Poll interval must be greater than zero".to_string());
        }
        if self.worker_threads == 0 {
            return Err("Worker thread count must be greater than zero".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
