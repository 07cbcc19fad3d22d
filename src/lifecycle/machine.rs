//! Transport callbacks that drive the lifecycle.
//!
//! | Transport event | Action |
//! |-----------------|--------|
//! | `Ready` | gate → `Ready`; server: `on_ready`; start the receive loop |
//! | `Waiting` | cancel |
//! | `Cancelled` / `Failed` | `on_close`; gate → `Closed` |
//! | new inbound connection | register, `on_connect`, start it |
//!
//! All of these run on the facade's event queue, one at a time.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tracing::{debug, warn};

use crate::handlers::EventSink;
use crate::identifiers::ConnectionId;
use crate::registry::ConnectionRegistry;
use crate::transport::{
    Connection, NewConnectionHandler, ReceiveError, StateHandler, TransportState,
};

use super::{CompletionGate, ConnectionState};

// ============================================================================
// Receive Loop
// ============================================================================

/// Arms one receive on `connection`; each completion dispatches and re-arms.
///
/// Any receive error cancels the connection, so the loop always ends in a
/// terminal state callback.
pub(crate) fn arm_receive<N: Connection>(
    connection: &N,
    id: ConnectionId,
    sink: Arc<dyn EventSink>,
) {
    let next = connection.clone();
    connection.receive(Box::new(move |outcome| match outcome {
        Ok(Some(bytes)) => {
            sink.receive(id, &bytes);
            arm_receive(&next, id, sink);
        }
        Ok(None) => arm_receive(&next, id, sink),
        Err(ReceiveError::NoData) => {
            debug!(%id, "Peer finished sending, cancelling");
            next.cancel();
        }
        Err(ReceiveError::Failed(reason)) => {
            warn!(%id, reason = %reason, "Receive failed, cancelling");
            next.cancel();
        }
    }));
}

// ============================================================================
// Client
// ============================================================================

/// State handler for a client's single connection.
pub(crate) fn client_state_handler<N: Connection>(
    connection: N,
    id: ConnectionId,
    gate: Arc<CompletionGate>,
    sink: Arc<dyn EventSink>,
) -> StateHandler {
    Box::new(move |state| match state {
        TransportState::Ready => {
            if gate.set(ConnectionState::Ready) {
                debug!(%id, "Client connection ready");
                arm_receive(&connection, id, Arc::clone(&sink));
            }
        }
        TransportState::Waiting(reason) => {
            debug!(%id, reason = %reason, "Client connection waiting, cancelling");
            connection.cancel();
        }
        TransportState::Cancelled | TransportState::Failed(_) => {
            if let TransportState::Failed(reason) = &state {
                debug!(%id, reason = %reason, "Client connection failed");
            }
            let _closed = CloseOnExit(&gate);
            sink.close(id);
            debug!(%id, "Client connection closed");
        }
    })
}

/// Moves a gate to `Closed` when dropped, including while unwinding.
struct CloseOnExit<'a>(&'a CompletionGate);

impl Drop for CloseOnExit<'_> {
    fn drop(&mut self) {
        self.0.set(ConnectionState::Closed);
    }
}

// ============================================================================
// Server
// ============================================================================

/// State handler for a server's listener.
pub(crate) fn listener_state_handler(gate: Arc<CompletionGate>) -> StateHandler {
    Box::new(move |state| match state {
        TransportState::Ready => {
            if gate.set(ConnectionState::Ready) {
                debug!("Listener ready");
            }
        }
        TransportState::Waiting(reason) => debug!(reason = %reason, "Listener waiting"),
        TransportState::Cancelled | TransportState::Failed(_) => {
            if let TransportState::Failed(reason) = &state {
                warn!(reason = %reason, "Listener failed");
            }
            gate.set(ConnectionState::Closed);
        }
    })
}

/// New-connection handler for a server's listener.
///
/// Connections arriving after the registry is sealed are dropped without
/// `on_connect`.
pub(crate) fn new_connection_handler<N: Connection>(
    registry: Arc<ConnectionRegistry<N>>,
    sink: Arc<dyn EventSink>,
) -> NewConnectionHandler<N> {
    Box::new(move |connection: N| {
        let id = match registry.add(connection.clone()) {
            Ok(id) => id,
            Err(e) => {
                debug!(error = %e, "Rejecting inbound connection");
                connection.cancel();
                return;
            }
        };

        debug!(%id, "Inbound connection registered");
        sink.connect(id);

        connection.set_state_changed_handler(server_connection_handler(
            connection.clone(),
            id,
            Arc::new(CompletionGate::new()),
            Arc::clone(&registry),
            Arc::clone(&sink),
        ));
        connection.start();
    })
}

/// State handler for one accepted server connection.
fn server_connection_handler<N: Connection>(
    connection: N,
    id: ConnectionId,
    gate: Arc<CompletionGate>,
    registry: Arc<ConnectionRegistry<N>>,
    sink: Arc<dyn EventSink>,
) -> StateHandler {
    Box::new(move |state| match state {
        TransportState::Ready => {
            if gate.set(ConnectionState::Ready) {
                debug!(%id, "Inbound connection ready");
                sink.ready(id);
                arm_receive(&connection, id, Arc::clone(&sink));
            }
        }
        TransportState::Waiting(reason) => {
            debug!(%id, reason = %reason, "Inbound connection waiting, cancelling");
            connection.cancel();
        }
        TransportState::Cancelled | TransportState::Failed(_) => {
            if let TransportState::Failed(reason) = &state {
                debug!(%id, reason = %reason, "Inbound connection failed");
            }
            gate.set(ConnectionState::Closed);

            // The id stays reserved until on_close has returned.
            match registry.find_id(&connection) {
                Some(registered) => {
                    sink.close(registered);
                    if let Err(e) = registry.remove(&connection) {
                        warn!(%id, error = %e, "Connection vanished during close");
                    }
                }
                None => warn!(%id, "Close for unregistered connection"),
            }
        }
    })
}

// ============================================================================
// Tests
// ============================================================================
