//! Plumbing shared by both adapters: callback slots, the per-connection
//! command set, frame classification and the upgrade path guard.

// ============================================================================
// Imports
// ============================================================================

use std::io::{Error as IoError, ErrorKind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, trace};

use crate::queue::EventQueue;

use super::{ReceiveCompletion, ReceiveError, ReceiveOutcome, TransportState};

// ============================================================================
// Serials
// ============================================================================

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity for a backend handle.
pub(crate) fn next_serial() -> u64 {
    NEXT_SERIAL.fetch_add(1, Ordering::Relaxed)
}

// ============================================================================
// Command
// ============================================================================

/// Requests from lifecycle code to a connection's I/O owner.
pub(crate) enum Command {
    /// Write one binary message.
    Send(Vec<u8>),
    /// Arm the next receive.
    Receive(ReceiveCompletion),
    /// Tear down.
    Cancel,
}

/// Why establishing a connection stopped short of `Ready`.
pub(crate) enum Establish {
    /// Transient refusal; reported as `Waiting`, then awaits a cancel.
    Waiting(String),
    /// Hard failure; reported as `Failed`.
    Failed(String),
}

// ============================================================================
// CallbackSlot
// ============================================================================

/// Holds an injected callback and posts invocations to the event queue.
pub(crate) struct CallbackSlot<T> {
    handler: Mutex<Option<Arc<dyn Fn(T) + Send + Sync>>>,
}

impl<T: Send + 'static> CallbackSlot<T> {
    pub(crate) fn new() -> Self {
        Self {
            handler: Mutex::new(None),
        }
    }

    pub(crate) fn install(&self, handler: Box<dyn Fn(T) + Send + Sync>) {
        *self.handler.lock() = Some(Arc::from(handler));
    }

    /// Posts `value` to the handler, keeping the handler installed.
    pub(crate) fn post(&self, queue: &EventQueue, value: T) {
        let handler = self.handler.lock().clone();
        Self::dispatch(queue, handler, value);
    }

    /// Posts `value` to the handler and releases it.
    pub(crate) fn post_final(&self, queue: &EventQueue, value: T) {
        let handler = self.handler.lock().take();
        Self::dispatch(queue, handler, value);
    }

    /// Releases the handler without invoking it.
    pub(crate) fn clear(&self) {
        self.handler.lock().take();
    }

    fn dispatch(queue: &EventQueue, handler: Option<Arc<dyn Fn(T) + Send + Sync>>, value: T) {
        match handler {
            Some(handler) => {
                if !queue.post(move || handler(value)) {
                    debug!("Event queue gone; callback dropped");
                }
            }
            None => trace!("No handler installed; callback dropped"),
        }
    }
}

/// Emits a state through `slot`, releasing the handler on terminal states.
pub(crate) fn emit_state(
    slot: &CallbackSlot<TransportState>,
    queue: &EventQueue,
    state: TransportState,
) {
    if state.is_terminal() {
        slot.post_final(queue, state);
    } else {
        slot.post(queue, state);
    }
}

/// Posts a receive completion to the event queue.
pub(crate) fn deliver(queue: &EventQueue, completion: ReceiveCompletion, outcome: ReceiveOutcome) {
    if !queue.post(move || completion(outcome)) {
        debug!("Event queue gone; receive completion dropped");
    }
}

// ============================================================================
// Frames
// ============================================================================

/// What one read from the socket amounts to.
pub(crate) enum Incoming {
    /// A complete application message.
    Message(Vec<u8>),
    /// Ping, pong or raw frame; the receive stays armed.
    Control,
    /// Close frame from the peer.
    Closed,
}

pub(crate) fn incoming(message: Message) -> Incoming {
    match message {
        Message::Binary(bytes) => Incoming::Message(bytes.to_vec()),
        Message::Text(text) => Incoming::Message(text.as_str().as_bytes().to_vec()),
        Message::Close(_) => Incoming::Closed,
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Incoming::Control,
    }
}

/// Maps a read error to the receive error vocabulary.
pub(crate) fn classify(error: &WsError) -> ReceiveError {
    match error {
        WsError::ConnectionClosed
        | WsError::AlreadyClosed
        | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => ReceiveError::NoData,
        WsError::Io(e) if is_end_of_stream(e) => ReceiveError::NoData,
        other => ReceiveError::Failed(other.to_string()),
    }
}

fn is_end_of_stream(error: &IoError) -> bool {
    matches!(
        error.kind(),
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
    )
}

/// Returns `true` for connect errors reported as `Waiting` rather than `Failed`.
pub(crate) fn is_transient(error: &IoError) -> bool {
    matches!(
        error.kind(),
        ErrorKind::ConnectionRefused | ErrorKind::HostUnreachable | ErrorKind::NetworkUnreachable
    )
}

// ============================================================================
// Handshake
// ============================================================================

/// Upgrade callback accepting only requests for `expected`.
pub(crate) fn path_guard(
    expected: String,
) -> impl FnOnce(&Request, Response) -> Result<Response, ErrorResponse> + Unpin {
    move |request: &Request, response: Response| {
        let path = request.uri().path();
        if path == expected {
            Ok(response)
        } else {
            debug!(path, expected = %expected, "Rejected upgrade for unknown path");
            let body = format!("No WebSocket endpoint at {path}");
            let mut rejection = ErrorResponse::new(Some(body));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            Err(rejection)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
