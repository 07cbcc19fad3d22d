//! Completion gate for synchronous construction over asynchronous backends.
//!
//! A facade constructor starts an asynchronous connect or listen, then parks
//! the calling thread on a [`CompletionGate`] until the backend's callback
//! context moves the gate out of [`ConnectionState::Connecting`]. The same
//! gate is later used by teardown to wait for [`ConnectionState::Closed`], so
//! no backend callback is still in flight when the facade's resources go away.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use websocket_tools::{CompletionGate, ConnectionState};
//!
//! let gate = Arc::new(CompletionGate::new());
//! let remote = Arc::clone(&gate);
//! std::thread::spawn(move || remote.set(ConnectionState::Ready));
//!
//! assert!(gate.wait_for_completion(Some(Duration::from_secs(5))));
//! assert!(gate.ready());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use super::state::ConnectionState;

// ============================================================================
// CompletionGate
// ============================================================================

/// Tri-state completion primitive shared between a constructing thread and
/// a backend's callback context.
///
/// The state only moves forward (see [`ConnectionState::can_transition_to`]).
/// Waiting uses a condition variable rather than spinning; the observable
/// contract is the same: block until the state leaves `Connecting`,
/// optionally bounded by a timeout.
pub struct CompletionGate {
    /// Current state, readable without the lock.
    state: AtomicU8,
    /// Guards the condition variable.
    lock: Mutex<()>,
    /// Signalled on every applied transition.
    changed: Condvar,
}

impl CompletionGate {
    /// Creates a gate in [`ConnectionState::Connecting`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Connecting.as_u8()),
            lock: Mutex::new(()),
            changed: Condvar::new(),
        }
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves the gate to `next` if that is a forward transition.
    ///
    /// Returns `true` if the transition was applied. Backward or repeated
    /// transitions are ignored.
    pub fn set(&self, next: ConnectionState) -> bool {
        let mut current = self.state.load(Ordering::Acquire);

        loop {
            let from = ConnectionState::from_u8(current);
            if !from.can_transition_to(next) {
                trace!(%from, to = %next, "Ignored gate transition");
                return false;
            }

            match self.state.compare_exchange_weak(
                current,
                next.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }

        let _guard = self.lock.lock();
        self.changed.notify_all();
        true
    }

    /// Returns `true` once the state is no longer `Connecting`.
    #[inline]
    #[must_use]
    pub fn completed(&self) -> bool {
        self.state() != ConnectionState::Connecting
    }

    /// Returns `true` only while the state is `Ready`.
    #[inline]
    #[must_use]
    pub fn ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Returns `true` once the state is `Closed`.
    #[inline]
    #[must_use]
    pub fn closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Blocks until the gate completes or `timeout` elapses.
    ///
    /// `None` or a zero duration waits indefinitely. Returns
    /// [`completed()`](Self::completed) at the time of return.
    pub fn wait_for_completion(&self, timeout: Option<Duration>) -> bool {
        self.wait_until(|gate| gate.completed(), timeout)
    }

    /// Blocks until the gate is `Closed`.
    pub fn wait_for_closed(&self) {
        self.wait_until(|gate| gate.closed(), None);
    }

    fn wait_until(&self, done: impl Fn(&Self) -> bool, timeout: Option<Duration>) -> bool {
        let deadline = timeout
            .filter(|t| !t.is_zero())
            .map(|t| Instant::now() + t);

        let mut guard = self.lock.lock();
        while !done(self) {
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(&mut guard, deadline).timed_out() {
                        return done(self);
                    }
                }
                None => self.changed.wait(&mut guard),
            }
        }
        true
    }
}

impl Default for CompletionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CompletionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionGate")
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
