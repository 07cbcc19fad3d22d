//! Scripted in-process transport.
//!
//! Lets lifecycle tests control exactly when a connection becomes ready,
//! how long a cancel takes, and which bytes arrive, without sockets.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use websocket_tools::transport::{NewConnectionHandler, ReceiveCompletion, StateHandler};
use websocket_tools::{
    Connection, Endpoint, Error, EventQueue, ListenEndpoint, Listener, ReceiveError, Result,
    Transport, TransportOptions, TransportState,
};

/// Port reported by every ready mock listener.
pub const MOCK_PORT: u16 = 4242;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Script
// ============================================================================

/// How a mock connection or listener behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Script {
    /// Report `Ready` after this long; `None` never reports anything.
    pub ready_after: Option<Duration>,
    /// Report `Waiting` instead of connecting.
    pub refuse: bool,
    /// How long a cancel takes to land.
    pub cancel_delay: Duration,
}

impl Script {
    pub const fn ready() -> Self {
        Self {
            ready_after: Some(Duration::ZERO),
            refuse: false,
            cancel_delay: Duration::ZERO,
        }
    }

    pub const fn hang() -> Self {
        Self {
            ready_after: None,
            refuse: false,
            cancel_delay: Duration::ZERO,
        }
    }

    pub const fn refuse() -> Self {
        Self {
            ready_after: None,
            refuse: true,
            cancel_delay: Duration::ZERO,
        }
    }

    pub const fn with_ready_after(mut self, delay: Duration) -> Self {
        self.ready_after = Some(delay);
        self
    }

    pub const fn with_cancel_delay(mut self, delay: Duration) -> Self {
        self.cancel_delay = delay;
        self
    }
}

// ============================================================================
// Shared Emission
// ============================================================================

type SharedStateHandler = Arc<dyn Fn(TransportState) + Send + Sync>;

struct StateEmitter {
    queue: EventQueue,
    handler: Mutex<Option<SharedStateHandler>>,
    terminated: AtomicBool,
    cancelling: AtomicBool,
}

impl StateEmitter {
    fn new(queue: EventQueue) -> Self {
        Self {
            queue,
            handler: Mutex::new(None),
            terminated: AtomicBool::new(false),
            cancelling: AtomicBool::new(false),
        }
    }

    fn install(&self, handler: StateHandler) {
        *self.handler.lock() = Some(Arc::from(handler));
    }

    fn emit(&self, state: TransportState) {
        let handler = if state.is_terminal() {
            self.terminated.store(true, Ordering::SeqCst);
            self.handler.lock().take()
        } else {
            self.handler.lock().clone()
        };
        if let Some(handler) = handler {
            self.queue.post(move || handler(state));
        }
    }

    fn terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Schedules `Cancelled` once, after `delay`. Returns `false` if already scheduled.
    fn begin_cancel(
        self: &Arc<Self>,
        delay: Duration,
        on_done: impl FnOnce() + Send + 'static,
    ) -> bool {
        if self.terminated() || self.cancelling.swap(true, Ordering::SeqCst) {
            return false;
        }
        let emitter = Arc::clone(self);
        thread::spawn(move || {
            thread::sleep(delay);
            on_done();
            emitter.emit(TransportState::Cancelled);
        });
        true
    }
}

// ============================================================================
// MockTransport
// ============================================================================

/// Transport whose connections and listeners follow a [`Script`].
///
/// Clones share the record of created handles.
#[derive(Clone)]
pub struct MockTransport {
    connection_script: Script,
    listener_script: Script,
    connections: Arc<Mutex<Vec<MockConnection>>>,
    listeners: Arc<Mutex<Vec<MockListener>>>,
}

impl MockTransport {
    pub fn new(connection_script: Script, listener_script: Script) -> Self {
        Self {
            connection_script,
            listener_script,
            connections: Arc::default(),
            listeners: Arc::default(),
        }
    }

    pub fn connection(&self, index: usize) -> MockConnection {
        self.connections.lock()[index].clone()
    }

    pub fn listener(&self, index: usize) -> MockListener {
        self.listeners.lock()[index].clone()
    }
}

impl Transport for MockTransport {
    type Connection = MockConnection;
    type Listener = MockListener;

    fn from_options(options: TransportOptions) -> Result<Self> {
        options.validate().map_err(Error::config)?;
        Ok(Self::new(Script::ready(), Script::ready()))
    }

    fn connection(&self, _endpoint: &Endpoint, queue: &EventQueue) -> Result<MockConnection> {
        let connection = MockConnection::new(self.connection_script, queue.clone());
        self.connections.lock().push(connection.clone());
        Ok(connection)
    }

    fn listener(&self, _endpoint: &ListenEndpoint, queue: &EventQueue) -> Result<MockListener> {
        let listener = MockListener::new(self.listener_script, queue.clone());
        self.listeners.lock().push(listener.clone());
        Ok(listener)
    }
}

// ============================================================================
// MockConnection
// ============================================================================

struct ConnectionInner {
    serial: u64,
    script: Script,
    emitter: Arc<StateEmitter>,
    pending_receive: Mutex<Option<ReceiveCompletion>>,
    sent: Mutex<Vec<Vec<u8>>>,
    cancels: AtomicUsize,
    started: AtomicBool,
}

#[derive(Clone)]
pub struct MockConnection {
    inner: Arc<ConnectionInner>,
}

impl MockConnection {
    fn new(script: Script, queue: EventQueue) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
                script,
                emitter: Arc::new(StateEmitter::new(queue)),
                pending_receive: Mutex::new(None),
                sent: Mutex::new(Vec::new()),
                cancels: AtomicUsize::new(0),
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Delivers `data` to the outstanding receive, waiting for one to be armed.
    pub fn deliver(&self, data: &[u8]) {
        self.complete(Ok(Some(data.to_vec())));
    }

    /// Completes the outstanding receive with "no more data".
    pub fn hang_up(&self) {
        self.complete(Err(ReceiveError::NoData));
    }

    fn complete(&self, outcome: std::result::Result<Option<Vec<u8>>, ReceiveError>) {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(completion) = self.inner.pending_receive.lock().take() {
                self.inner.emitter.queue.post(move || completion(outcome));
                return;
            }
            assert!(Instant::now() < deadline, "no receive armed");
            thread::sleep(Duration::from_millis(1));
        }
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.inner.sent.lock().clone()
    }

    pub fn cancels(&self) -> usize {
        self.inner.cancels.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    pub fn terminated(&self) -> bool {
        self.inner.emitter.terminated()
    }
}

impl Connection for MockConnection {
    fn set_state_changed_handler(&self, handler: StateHandler) {
        self.inner.emitter.install(handler);
    }

    fn start(&self) {
        self.inner.started.store(true, Ordering::SeqCst);
        let script = self.inner.script;
        let emitter = Arc::clone(&self.inner.emitter);

        if script.refuse {
            emitter.emit(TransportState::Waiting("connection refused".to_string()));
            return;
        }
        if let Some(delay) = script.ready_after {
            thread::spawn(move || {
                thread::sleep(delay);
                if !emitter.cancelling.load(Ordering::SeqCst) {
                    emitter.emit(TransportState::Ready);
                }
            });
        }
    }

    fn receive(&self, completion: ReceiveCompletion) {
        let previous = self.inner.pending_receive.lock().replace(completion);
        assert!(previous.is_none(), "more than one receive outstanding");
    }

    fn send(&self, payload: Vec<u8>) -> Result<()> {
        if self.inner.emitter.terminated() {
            return Err(Error::ConnectionClosed);
        }
        self.inner.sent.lock().push(payload);
        Ok(())
    }

    fn cancel(&self) {
        self.inner.cancels.fetch_add(1, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        self.inner
            .emitter
            .begin_cancel(self.inner.script.cancel_delay, move || {
                inner.pending_receive.lock().take();
            });
    }
}

impl PartialEq for MockConnection {
    fn eq(&self, other: &Self) -> bool {
        self.inner.serial == other.inner.serial
    }
}

impl Eq for MockConnection {}

impl Hash for MockConnection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.serial.hash(state);
    }
}

impl fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockConnection")
            .field("serial", &self.inner.serial)
            .finish()
    }
}

// ============================================================================
// MockListener
// ============================================================================

struct ListenerInner {
    script: Script,
    emitter: Arc<StateEmitter>,
    accepted: Mutex<Option<Arc<dyn Fn(MockConnection) + Send + Sync>>>,
    ready: AtomicBool,
}

#[derive(Clone)]
pub struct MockListener {
    inner: Arc<ListenerInner>,
}

impl MockListener {
    fn new(script: Script, queue: EventQueue) -> Self {
        Self {
            inner: Arc::new(ListenerInner {
                script,
                emitter: Arc::new(StateEmitter::new(queue)),
                accepted: Mutex::new(None),
                ready: AtomicBool::new(false),
            }),
        }
    }

    /// Simulates an inbound peer following `script`.
    pub fn accept(&self, script: Script) -> MockConnection {
        let connection = MockConnection::new(script, self.inner.emitter.queue.clone());
        let handler = self.inner.accepted.lock().clone();
        if let Some(handler) = handler {
            let handed = connection.clone();
            self.inner.emitter.queue.post(move || handler(handed));
        }
        connection
    }
}

impl Listener for MockListener {
    type Connection = MockConnection;

    fn set_state_changed_handler(&self, handler: StateHandler) {
        self.inner.emitter.install(handler);
    }

    fn set_new_connection_handler(&self, handler: NewConnectionHandler<MockConnection>) {
        *self.inner.accepted.lock() = Some(Arc::from(handler));
    }

    fn start(&self) {
        let Some(delay) = self.inner.script.ready_after else {
            return;
        };
        let inner = Arc::clone(&self.inner);
        thread::spawn(move || {
            thread::sleep(delay);
            if !inner.emitter.cancelling.load(Ordering::SeqCst) {
                inner.ready.store(true, Ordering::SeqCst);
                inner.emitter.emit(TransportState::Ready);
            }
        });
    }

    fn cancel(&self) {
        let inner = Arc::clone(&self.inner);
        self.inner
            .emitter
            .begin_cancel(self.inner.script.cancel_delay, move || {
                inner.accepted.lock().take();
            });
    }

    fn port(&self) -> u16 {
        if self.inner.ready.load(Ordering::SeqCst) {
            MOCK_PORT
        } else {
            0
        }
    }
}
