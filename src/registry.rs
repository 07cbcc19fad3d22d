//! Bidirectional connection registry for multi-connection servers.
//!
//! Maps backend connection handles to small stable [`ConnectionId`]s and
//! back. Both directions live under one lock and are always mutated
//! together, so their sizes are equal after every operation.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │            ConnectionRegistry             │
//! │                                           │
//! │  handle A ──► 1        1 ──► handle A     │
//! │  handle B ──► 2        2 ──► handle B     │
//! │  handle D ──► 3        3 ──► handle D     │
//! │  (by_handle)           (by_id, ordered)   │
//! └───────────────────────────────────────────┘
//! ```
//!
//! Ids are the smallest positive value not currently live, so an id becomes
//! reusable only after its connection has been removed.
//!
//! The registry is mutated from the facade's event queue and read from the
//! application thread (targeted send, broadcast, size). The lock makes that
//! cross-thread read path sound for every backend.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;

// ============================================================================
// Maps
// ============================================================================

/// Both directions plus the seal flag, guarded together.
struct Maps<H> {
    by_handle: FxHashMap<H, ConnectionId>,
    by_id: BTreeMap<ConnectionId, H>,
    sealed: bool,
}

impl<H> Maps<H> {
    /// Smallest positive id not currently live.
    fn next_free_id(&self) -> ConnectionId {
        let mut candidate = 1;
        for id in self.by_id.keys() {
            if id.get() != candidate {
                break;
            }
            candidate += 1;
        }
        ConnectionId::new(candidate)
    }

    #[inline]
    fn check_invariant(&self) {
        debug_assert_eq!(
            self.by_handle.len(),
            self.by_id.len(),
            "registry maps out of sync"
        );
    }
}

// ============================================================================
// ConnectionRegistry
// ============================================================================

/// Thread-safe bidirectional map between handles and [`ConnectionId`]s.
///
/// The registry owns only the identity mapping; the handle's underlying
/// resource belongs to the backend.
pub struct ConnectionRegistry<H> {
    maps: Mutex<Maps<H>>,
    /// Signalled when the registry becomes empty.
    drained: Condvar,
}

impl<H> ConnectionRegistry<H>
where
    H: Clone + Eq + Hash,
{
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            maps: Mutex::new(Maps {
                by_handle: FxHashMap::default(),
                by_id: BTreeMap::new(),
                sealed: false,
            }),
            drained: Condvar::new(),
        }
    }

    /// Registers a handle and returns its freshly minted id.
    ///
    /// Registering a handle that is already present returns its existing id
    /// without creating a second entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegistrySealed`] after [`seal`](Self::seal).
    pub fn add(&self, handle: H) -> Result<ConnectionId> {
        let mut maps = self.maps.lock();

        if maps.sealed {
            return Err(Error::RegistrySealed);
        }

        if let Some(&existing) = maps.by_handle.get(&handle) {
            warn!(id = %existing, "Handle registered twice");
            return Ok(existing);
        }

        let id = maps.next_free_id();
        maps.by_handle.insert(handle.clone(), id);
        maps.by_id.insert(id, handle);
        maps.check_invariant();

        trace!(%id, live = maps.by_id.len(), "Connection registered");
        Ok(id)
    }

    /// Looks up the handle for `id`.
    #[must_use]
    pub fn find(&self, id: ConnectionId) -> Option<H> {
        self.maps.lock().by_id.get(&id).cloned()
    }

    /// Looks up the id for `handle`.
    #[must_use]
    pub fn find_id(&self, handle: &H) -> Option<ConnectionId> {
        self.maps.lock().by_handle.get(handle).copied()
    }

    /// Removes `handle` and returns the id it held.
    ///
    /// The caller forwards the id to the close handler; the id is eligible
    /// for reuse as soon as this returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionNotFound`] with [`ConnectionId::INVALID`]
    /// if the handle is not registered (for example, a second close).
    pub fn remove(&self, handle: &H) -> Result<ConnectionId> {
        let mut maps = self.maps.lock();

        let id = maps
            .by_handle
            .remove(handle)
            .ok_or_else(|| Error::connection_not_found(ConnectionId::INVALID))?;
        maps.by_id.remove(&id);
        maps.check_invariant();

        trace!(%id, live = maps.by_id.len(), "Connection unregistered");

        if maps.by_id.is_empty() {
            self.drained.notify_all();
        }
        Ok(id)
    }

    /// Applies `f` to every live handle, in id order.
    ///
    /// Registration and removal are blocked for the duration of the call, so
    /// no handle is visited twice or skipped. `f` must not call back into
    /// this registry. Returns the number of handles visited.
    pub fn for_each(&self, mut f: impl FnMut(ConnectionId, &H)) -> usize {
        let maps = self.maps.lock();
        for (id, handle) in &maps.by_id {
            f(*id, handle);
        }
        maps.by_id.len()
    }

    /// Returns the number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.maps.lock().by_id.len()
    }

    /// Returns `true` if no connection is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the live ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.maps.lock().by_id.keys().copied().collect()
    }

    /// Stops accepting registrations and returns a snapshot of live handles.
    pub fn seal(&self) -> Vec<H> {
        let mut maps = self.maps.lock();
        maps.sealed = true;
        maps.by_id.values().cloned().collect()
    }

    /// Returns `true` after [`seal`](Self::seal).
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.maps.lock().sealed
    }

    /// Blocks until every registered handle has been removed.
    pub fn wait_until_empty(&self) {
        let mut maps = self.maps.lock();
        while !maps.by_id.is_empty() {
            self.drained.wait(&mut maps);
        }
    }
}

impl<H> Default for ConnectionRegistry<H>
where
    H: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<H> fmt::Debug for ConnectionRegistry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let maps = self.maps.lock();
        f.debug_struct("ConnectionRegistry")
            .field("live", &maps.by_id.len())
            .field("sealed", &maps.sealed)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
