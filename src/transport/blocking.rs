//! Thread-per-connection adapter over synchronous tungstenite.
//!
//! Each connection and each listener owns one OS thread. Lifecycle requests
//! reach it over the same command channel the tokio adapter uses; the thread
//! interleaves command checks with socket reads bounded by the poll interval.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::ErrorKind;
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::thread;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_tungstenite::tungstenite::{self, Error as WsError, Message, WebSocket};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::queue::EventQueue;

use super::common::{
    CallbackSlot, Command, Establish, Incoming, classify, deliver, emit_state, incoming,
    is_transient, next_serial, path_guard,
};
use super::{
    Connection, Endpoint, ListenEndpoint, Listener, NewConnectionHandler, ReceiveCompletion,
    ReceiveError, StateHandler, Transport, TransportOptions, TransportState,
};

// ============================================================================
// ThreadedTransport
// ============================================================================

/// Backend giving every socket its own thread.
#[derive(Debug, Clone)]
pub struct ThreadedTransport {
    options: TransportOptions,
}

impl Transport for ThreadedTransport {
    type Connection = ThreadedConnection;
    type Listener = ThreadedListener;

    fn from_options(options: TransportOptions) -> Result<Self> {
        options.validate().map_err(Error::config)?;
        Ok(Self { options })
    }

    fn connection(&self, endpoint: &Endpoint, queue: &EventQueue) -> Result<ThreadedConnection> {
        Ok(ThreadedConnection::new(
            Origin::Outbound(endpoint.clone()),
            queue.clone(),
            self.options.clone(),
        ))
    }

    fn listener(&self, endpoint: &ListenEndpoint, queue: &EventQueue) -> Result<ThreadedListener> {
        Ok(ThreadedListener::new(
            endpoint.clone(),
            queue.clone(),
            self.options.clone(),
        ))
    }
}

// ============================================================================
// ThreadedConnection
// ============================================================================

enum Origin {
    Outbound(Endpoint),
    Inbound { stream: TcpStream, path: String },
}

/// Handle to one thread-driven WebSocket connection.
#[derive(Clone)]
pub struct ThreadedConnection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    serial: u64,
    queue: EventQueue,
    options: TransportOptions,
    state: CallbackSlot<TransportState>,
    commands: mpsc::UnboundedSender<Command>,
    pending: Mutex<Option<(Origin, mpsc::UnboundedReceiver<Command>)>>,
    terminated: AtomicBool,
}

impl ConnectionInner {
    fn emit(&self, state: TransportState) {
        if state.is_terminal() {
            self.terminated.store(true, Ordering::Release);
        }
        emit_state(&self.state, &self.queue, state);
    }
}

impl ThreadedConnection {
    fn new(origin: Origin, queue: EventQueue, options: TransportOptions) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(ConnectionInner {
                serial: next_serial(),
                queue,
                options,
                state: CallbackSlot::new(),
                commands,
                pending: Mutex::new(Some((origin, rx))),
                terminated: AtomicBool::new(false),
            }),
        }
    }
}

impl Connection for ThreadedConnection {
    fn set_state_changed_handler(&self, handler: StateHandler) {
        self.inner.state.install(handler);
    }

    fn start(&self) {
        let Some((origin, commands)) = self.inner.pending.lock().take() else {
            warn!(serial = self.inner.serial, "Connection already started");
            return;
        };
        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name(format!("websocket-tools-conn-{}", self.inner.serial))
            .spawn(move || run_connection(&inner, origin, commands));

        if let Err(e) = spawned {
            warn!(serial = self.inner.serial, error = %e, "Failed to spawn connection thread");
            self.inner.emit(TransportState::Failed(e.to_string()));
        }
    }

    fn receive(&self, completion: ReceiveCompletion) {
        if self.inner.commands.send(Command::Receive(completion)).is_err() {
            debug!(serial = self.inner.serial, "Receive on finished connection");
        }
    }

    fn send(&self, payload: Vec<u8>) -> Result<()> {
        if self.inner.terminated.load(Ordering::Acquire) {
            return Err(Error::ConnectionClosed);
        }
        self.inner
            .commands
            .send(Command::Send(payload))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn cancel(&self) {
        let _ = self.inner.commands.send(Command::Cancel);
    }
}

impl PartialEq for ThreadedConnection {
    fn eq(&self, other: &Self) -> bool {
        self.inner.serial == other.inner.serial
    }
}

impl Eq for ThreadedConnection {}

impl Hash for ThreadedConnection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.serial.hash(state);
    }
}

impl fmt::Debug for ThreadedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadedConnection")
            .field("serial", &self.inner.serial)
            .finish()
    }
}

// ============================================================================
// Connection Thread
// ============================================================================

type Socket = WebSocket<TcpStream>;

fn run_connection(
    inner: &ConnectionInner,
    origin: Origin,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let serial = inner.serial;

    let mut socket = match establish(&inner.options, origin) {
        Ok(socket) => socket,
        Err(Establish::Waiting(reason)) => {
            debug!(serial, reason = %reason, "Connection waiting");
            inner.emit(TransportState::Waiting(reason));
            while let Some(command) = commands.blocking_recv() {
                if matches!(command, Command::Cancel) {
                    break;
                }
            }
            inner.emit(TransportState::Cancelled);
            return;
        }
        Err(Establish::Failed(reason)) => {
            debug!(serial, reason = %reason, "Connection failed");
            inner.emit(TransportState::Failed(reason));
            return;
        }
    };

    // Commands issued while connecting; a cancel among them wins over Ready.
    let mut backlog = VecDeque::new();
    while let Ok(command) = commands.try_recv() {
        if matches!(command, Command::Cancel) {
            debug!(serial, "Connection cancelled while establishing");
            close(&mut socket, serial);
            inner.emit(TransportState::Cancelled);
            return;
        }
        backlog.push_back(command);
    }

    debug!(serial, "Connection established");
    inner.emit(TransportState::Ready);

    let mut armed: Option<ReceiveCompletion> = None;

    let terminal = 'session: loop {
        loop {
            let command = match backlog.pop_front() {
                Some(command) => command,
                None => match commands.try_recv() {
                    Ok(command) => command,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => break 'session TransportState::Cancelled,
                },
            };
            match command {
                Command::Send(payload) => {
                    if let Err(e) = socket.send(Message::Binary(payload.into())) {
                        warn!(serial, error = %e, "Send failed");
                        break 'session TransportState::Failed(e.to_string());
                    }
                }
                Command::Receive(completion) => {
                    if armed.replace(completion).is_some() {
                        warn!(serial, "Receive already outstanding, replaced");
                    }
                }
                Command::Cancel => {
                    close(&mut socket, serial);
                    break 'session TransportState::Cancelled;
                }
            }
        }

        let Some(completion) = armed.take() else {
            // Idle until lifecycle code asks for something.
            match commands.blocking_recv() {
                Some(command) => backlog.push_back(command),
                None => break 'session TransportState::Cancelled,
            }
            continue;
        };

        match socket.read() {
            Ok(message) => match incoming(message) {
                Incoming::Message(bytes) => deliver(&inner.queue, completion, Ok(Some(bytes))),
                Incoming::Control => armed = Some(completion),
                Incoming::Closed => deliver(&inner.queue, completion, Err(ReceiveError::NoData)),
            },
            Err(WsError::Io(e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                armed = Some(completion);
            }
            Err(e) => deliver(&inner.queue, completion, Err(classify(&e))),
        }
    };

    debug!(serial, state = ?terminal, "Connection finished");
    inner.emit(terminal);
}

fn establish(options: &TransportOptions, origin: Origin) -> std::result::Result<Socket, Establish> {
    let socket = match origin {
        Origin::Outbound(endpoint) => {
            let request = endpoint
                .request()
                .map_err(|e| Establish::Failed(e.to_string()))?;
            let stream = connect_tcp(&endpoint, options)?;
            prepare_stream(&stream, options)?;
            let (socket, _response) = tungstenite::client(request, stream)
                .map_err(|e| Establish::Failed(e.to_string()))?;
            socket
        }
        Origin::Inbound { stream, path } => {
            stream
                .set_nonblocking(false)
                .map_err(|e| Establish::Failed(e.to_string()))?;
            prepare_stream(&stream, options)?;
            tungstenite::accept_hdr(stream, path_guard(path))
                .map_err(|e| Establish::Failed(e.to_string()))?
        }
    };

    socket
        .get_ref()
        .set_read_timeout(Some(options.poll_interval))
        .map_err(|e| Establish::Failed(e.to_string()))?;
    Ok(socket)
}

fn connect_tcp(
    endpoint: &Endpoint,
    options: &TransportOptions,
) -> std::result::Result<TcpStream, Establish> {
    let addrs = (endpoint.bare_host(), endpoint.port())
        .to_socket_addrs()
        .map_err(|e| Establish::Failed(e.to_string()))?;

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, options.connect_timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }

    Err(match last_error {
        Some(e) if is_transient(&e) => Establish::Waiting(e.to_string()),
        Some(e) => Establish::Failed(e.to_string()),
        None => Establish::Failed(format!("{} resolved to no addresses", endpoint.host())),
    })
}

/// Applies socket options; the handshake runs under the connect budget.
fn prepare_stream(
    stream: &TcpStream,
    options: &TransportOptions,
) -> std::result::Result<(), Establish> {
    if let Err(e) = stream.set_nodelay(options.nodelay) {
        debug!(error = %e, "Failed to set TCP_NODELAY");
    }
    stream
        .set_read_timeout(Some(options.connect_timeout))
        .map_err(|e| Establish::Failed(e.to_string()))
}

fn close(socket: &mut Socket, serial: u64) {
    if let Err(e) = socket.close(None).and_then(|()| socket.flush()) {
        debug!(serial, error = %e, "Close handshake incomplete");
    }
}

// ============================================================================
// ThreadedListener
// ============================================================================

/// Handle to one thread-driven listener.
pub struct ThreadedListener {
    inner: Arc<ListenerInner>,
}

struct ListenerInner {
    endpoint: ListenEndpoint,
    queue: EventQueue,
    options: TransportOptions,
    state: CallbackSlot<TransportState>,
    accepted: CallbackSlot<ThreadedConnection>,
    port: AtomicU16,
    cancel: mpsc::UnboundedSender<()>,
    pending: Mutex<Option<mpsc::UnboundedReceiver<()>>>,
}

impl ListenerInner {
    fn finish(&self, state: TransportState) {
        self.accepted.clear();
        emit_state(&self.state, &self.queue, state);
    }
}

impl ThreadedListener {
    fn new(endpoint: ListenEndpoint, queue: EventQueue, options: TransportOptions) -> Self {
        let (cancel, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(ListenerInner {
                endpoint,
                queue,
                options,
                state: CallbackSlot::new(),
                accepted: CallbackSlot::new(),
                port: AtomicU16::new(0),
                cancel,
                pending: Mutex::new(Some(rx)),
            }),
        }
    }
}

impl Listener for ThreadedListener {
    type Connection = ThreadedConnection;

    fn set_state_changed_handler(&self, handler: StateHandler) {
        self.inner.state.install(handler);
    }

    fn set_new_connection_handler(&self, handler: NewConnectionHandler<ThreadedConnection>) {
        self.inner.accepted.install(handler);
    }

    fn start(&self) {
        let Some(cancel) = self.inner.pending.lock().take() else {
            warn!(addr = %self.inner.endpoint.socket_addr(), "Listener already started");
            return;
        };
        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name("websocket-tools-accept".to_string())
            .spawn(move || run_listener(&inner, cancel));

        if let Err(e) = spawned {
            warn!(error = %e, "Failed to spawn listener thread");
            self.inner.finish(TransportState::Failed(e.to_string()));
        }
    }

    fn cancel(&self) {
        let _ = self.inner.cancel.send(());
    }

    fn port(&self) -> u16 {
        self.inner.port.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ThreadedListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadedListener")
            .field("endpoint", &self.inner.endpoint)
            .field("port", &self.port())
            .finish()
    }
}

fn run_listener(inner: &ListenerInner, mut cancel: mpsc::UnboundedReceiver<()>) {
    let addr = inner.endpoint.socket_addr();
    let listener = match TcpListener::bind(addr).and_then(|listener| {
        listener.set_nonblocking(true)?;
        Ok(listener)
    }) {
        Ok(listener) => listener,
        Err(e) => {
            warn!(%addr, error = %e, "Failed to bind listener");
            inner.finish(TransportState::Failed(e.to_string()));
            return;
        }
    };
    let port = match listener.local_addr() {
        Ok(local) => local.port(),
        Err(e) => {
            inner.finish(TransportState::Failed(e.to_string()));
            return;
        }
    };
    inner.port.store(port, Ordering::Release);

    info!(port, path = inner.endpoint.path(), "WebSocket listener started");
    emit_state(&inner.state, &inner.queue, TransportState::Ready);

    loop {
        match cancel.try_recv() {
            Err(TryRecvError::Empty) => {}
            Ok(()) | Err(TryRecvError::Disconnected) => break,
        }

        match listener.accept() {
            Ok((stream, peer)) => {
                debug!(%peer, "Accepted TCP connection");
                let connection = ThreadedConnection::new(
                    Origin::Inbound {
                        stream,
                        path: inner.endpoint.path().to_string(),
                    },
                    inner.queue.clone(),
                    inner.options.clone(),
                );
                inner.accepted.post(&inner.queue, connection);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(inner.options.poll_interval);
            }
            Err(e) => {
                warn!(error = %e, "Accept failed");
                thread::sleep(inner.options.poll_interval);
            }
        }
    }

    drop(listener);
    info!(port, "WebSocket listener stopped");
    inner.finish(TransportState::Cancelled);
}

// ============================================================================
// Tests
// ============================================================================
