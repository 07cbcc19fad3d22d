#![allow(dead_code)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```ignore
//! mod common;
//! use common::*;
//! ```

pub mod mock;
pub mod scenarios;

use std::sync::{Arc, Once};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing_subscriber::EnvFilter;
use websocket_tools::{ClientHandlers, ConnectionId, ServerHandlers};

static INIT_LOGGING: Once = Once::new();

/// Generous bound for anything that should happen "soon".
pub const WAIT: Duration = Duration::from_secs(5);

/// Installs a test-writer subscriber; honours `RUST_LOG`.
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_test_writer()
            .with_thread_names(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

// ============================================================================
// Event Recorder
// ============================================================================

/// One handler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect(ConnectionId),
    Ready(ConnectionId),
    Receive(ConnectionId, Vec<u8>),
    Close(ConnectionId),
}

impl Event {
    pub fn id(&self) -> ConnectionId {
        match self {
            Self::Connect(id) | Self::Ready(id) | Self::Receive(id, _) | Self::Close(id) => *id,
        }
    }
}

/// Owner context that records every handler call.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
    changed: Condvar,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, event: Event) {
        self.events.lock().push(event);
        self.changed.notify_all();
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    pub fn closes(&self) -> usize {
        self.count(|e| matches!(e, Event::Close(_)))
    }

    pub fn readies(&self) -> usize {
        self.count(|e| matches!(e, Event::Ready(_)))
    }

    pub fn received(&self) -> Vec<(ConnectionId, Vec<u8>)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Receive(id, data) => Some((*id, data.clone())),
                _ => None,
            })
            .collect()
    }

    /// Blocks until `predicate` holds over the recorded events.
    pub fn wait_for(&self, timeout: Duration, predicate: impl Fn(&[Event]) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut events = self.events.lock();
        while !predicate(&events) {
            if self.changed.wait_until(&mut events, deadline).timed_out() {
                return predicate(&events);
            }
        }
        true
    }
}

pub fn client_handlers() -> ClientHandlers<Arc<Recorder>> {
    ClientHandlers::new(
        |id, data: &[u8], recorder: &Arc<Recorder>| {
            recorder.push(Event::Receive(id, data.to_vec()));
        },
        |id, recorder: &Arc<Recorder>| recorder.push(Event::Close(id)),
    )
}

pub fn server_handlers() -> ServerHandlers<Arc<Recorder>> {
    ServerHandlers::new(
        |id, recorder: &Arc<Recorder>| recorder.push(Event::Connect(id)),
        |id, recorder: &Arc<Recorder>| recorder.push(Event::Ready(id)),
        |id, data: &[u8], recorder: &Arc<Recorder>| {
            recorder.push(Event::Receive(id, data.to_vec()));
        },
        |id, recorder: &Arc<Recorder>| recorder.push(Event::Close(id)),
    )
}

/// Asserts connect < ready < receive* < close for every id in `events`.
pub fn assert_per_connection_order(events: &[Event]) {
    let mut ids: Vec<ConnectionId> = events.iter().map(Event::id).collect();
    ids.sort();
    ids.dedup();

    for id in ids {
        let stages: Vec<u8> = events
            .iter()
            .filter(|e| e.id() == id)
            .map(|e| match e {
                Event::Connect(_) => 0,
                Event::Ready(_) => 1,
                Event::Receive(..) => 2,
                Event::Close(_) => 3,
            })
            .collect();
        assert!(
            stages.windows(2).all(|w| w[0] <= w[1]),
            "out-of-order events for {id}: {stages:?}"
        );
        assert!(
            stages.iter().filter(|&&s| s == 3).count() <= 1,
            "duplicate close for {id}"
        );
    }
}
