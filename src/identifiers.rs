//! Type-safe connection identifiers.
//!
//! A [`ConnectionId`] is the small opaque handle the application sees for a
//! connection. Servers mint ids from their [`ConnectionRegistry`]; clients
//! have exactly one connection and draw a process-unique id at creation.
//!
//! [`ConnectionRegistry`]: crate::registry::ConnectionRegistry

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

// ============================================================================
// Constants
// ============================================================================

/// Counter for client identities. Starts at 1 so ids stay positive.
static NEXT_CLIENT_ID: AtomicUsize = AtomicUsize::new(1);

// ============================================================================
// ConnectionId
// ============================================================================

/// Identifier of one logical connection.
///
/// Unique among the live connections of one server. Never equal to
/// [`ConnectionId::INVALID`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(usize);

impl ConnectionId {
    /// Sentinel used where a lookup by handle has no result to report.
    pub const INVALID: Self = Self(usize::MAX);

    /// Wraps a raw value.
    #[inline]
    #[must_use]
    pub const fn new(value: usize) -> Self {
        Self(value)
    }

    /// Draws a fresh process-unique id for a client connection.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }

    /// Returns `true` unless this is the sentinel.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != usize::MAX
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            f.write_str("<invalid>")
        }
    }
}

impl From<ConnectionId> for usize {
    #[inline]
    fn from(id: ConnectionId) -> Self {
        id.0
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_is_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(a.is_valid());
        assert!(b.get() > 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionId::new(42).to_string(), "42");
        assert_eq!(ConnectionId::INVALID.to_string(), "<invalid>");
    }

    #[test]
    fn test_ordering_follows_value() {
        assert!(ConnectionId::new(1) < ConnectionId::new(2));
        assert_eq!(usize::from(ConnectionId::new(9)), 9);
    }
}
