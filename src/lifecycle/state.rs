//! Connection lifecycle states.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle of one connection attempt or listener.
///
/// Strictly forward-moving: `Connecting → Ready → Closed`, or
/// `Connecting → Closed`. Nothing leaves `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// Initial state of every attempt.
    Connecting = 0,
    /// Established and exchanging messages.
    Ready = 1,
    /// Terminal.
    Closed = 2,
}

impl ConnectionState {
    /// Returns `true` if `next` is a legal successor of `self`.
    #[inline]
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Ready)
                | (Self::Connecting, Self::Closed)
                | (Self::Ready, Self::Closed)
        )
    }

    /// Returns `true` for [`ConnectionState::Closed`].
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }

    #[inline]
    pub(crate) const fn as_u8(self) -> u8 {
        self as u8
    }

    #[inline]
    pub(crate) const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Ready,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use ConnectionState::{Closed, Connecting, Ready};

    #[test]
    fn test_forward_transitions() {
        assert!(Connecting.can_transition_to(Ready));
        assert!(Connecting.can_transition_to(Closed));
        assert!(Ready.can_transition_to(Closed));
    }

    #[test]
    fn test_no_backward_or_self_transitions() {
        for state in [Connecting, Ready, Closed] {
            assert!(!state.can_transition_to(state));
            assert!(!state.can_transition_to(Connecting));
        }
        assert!(!Closed.can_transition_to(Ready));
    }

    #[test]
    fn test_u8_roundtrip_and_terminal() {
        for state in [Connecting, Ready, Closed] {
            assert_eq!(ConnectionState::from_u8(state.as_u8()), state);
        }
        assert!(Closed.is_terminal());
        assert!(!Ready.is_terminal());
    }
}
