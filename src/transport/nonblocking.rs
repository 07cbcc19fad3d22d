//! tokio + tokio-tungstenite adapter.
//!
//! Every connection and listener is one task on a runtime owned by the
//! [`TokioTransport`]. Lifecycle requests reach the task over an unbounded
//! command channel; results go back out through the [`EventQueue`].
//!
//! ```text
//!  Connection handle ──Command──► task: connect ─► handshake ─► select! {
//!                                                                 read (if armed)
//!                                                                 commands
//!                                                               }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::{Handle, Runtime};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_hdr_async, client_async};
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
// TokioTransport
// ============================================================================

/// Backend running every socket on a private multi-threaded tokio runtime.
pub struct TokioTransport {
    runtime: Arc<RuntimeHolder>,
    options: TransportOptions,
}

/// Shuts the runtime down without blocking when the last user goes away.
struct RuntimeHolder {
    runtime: Option<Runtime>,
    handle: Handle,
}

impl Drop for RuntimeHolder {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl fmt::Debug for TokioTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioTransport")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Transport for TokioTransport {
    type Connection = TokioConnection;
    type Listener = TokioListener;

    fn from_options(options: TransportOptions) -> Result<Self> {
        options.validate().map_err(Error::config)?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(options.worker_threads)
            .thread_name("websocket-tools-io")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();

        debug!(workers = options.worker_threads, "Tokio transport started");

        Ok(Self {
            runtime: Arc::new(RuntimeHolder {
                runtime: Some(runtime),
                handle,
            }),
            options,
        })
    }

    fn connection(&self, endpoint: &Endpoint, queue: &EventQueue) -> Result<TokioConnection> {
        Ok(TokioConnection::new(
            Origin::Outbound(endpoint.clone()),
            queue.clone(),
            Arc::clone(&self.runtime),
            self.options.clone(),
        ))
    }

    fn listener(&self, endpoint: &ListenEndpoint, queue: &EventQueue) -> Result<TokioListener> {
        Ok(TokioListener::new(
            endpoint.clone(),
            queue.clone(),
            Arc::clone(&self.runtime),
            self.options.clone(),
        ))
    }
}

// ============================================================================
// TokioConnection
// ============================================================================

/// Where a connection comes from.
enum Origin {
    Outbound(Endpoint),
    Inbound { stream: TcpStream, path: String },
}

/// Handle to one tokio-driven WebSocket connection.
#[derive(Clone)]
pub struct TokioConnection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    serial: u64,
    queue: EventQueue,
    runtime: Arc<RuntimeHolder>,
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

impl TokioConnection {
    fn new(
        origin: Origin,
        queue: EventQueue,
        runtime: Arc<RuntimeHolder>,
        options: TransportOptions,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(ConnectionInner {
                serial: next_serial(),
                queue,
                runtime,
                options,
                state: CallbackSlot::new(),
                commands,
                pending: Mutex::new(Some((origin, rx))),
                terminated: AtomicBool::new(false),
            }),
        }
    }
}

impl Connection for TokioConnection {
    fn set_state_changed_handler(&self, handler: StateHandler) {
        self.inner.state.install(handler);
    }

    fn start(&self) {
        let Some((origin, commands)) = self.inner.pending.lock().take() else {
            warn!(serial = self.inner.serial, "Connection already started");
            return;
        };
        let inner = Arc::clone(&self.inner);
        self.inner
            .runtime
            .handle
            .spawn(run_connection(inner, origin, commands));
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

impl PartialEq for TokioConnection {
    fn eq(&self, other: &Self) -> bool {
        self.inner.serial == other.inner.serial
    }
}

impl Eq for TokioConnection {}

impl Hash for TokioConnection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.serial.hash(state);
    }
}

impl fmt::Debug for TokioConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioConnection")
            .field("serial", &self.inner.serial)
            .finish()
    }
}

// ============================================================================
// Connection Task
// ============================================================================

type Socket = WebSocketStream<TcpStream>;

async fn run_connection(
    inner: Arc<ConnectionInner>,
    origin: Origin,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let serial = inner.serial;
    let mut backlog: Vec<Vec<u8>> = Vec::new();
    let mut armed: Option<ReceiveCompletion> = None;

    let establishing = establish(inner.options.clone(), origin);
    tokio::pin!(establishing);

    let socket = loop {
        tokio::select! {
            result = &mut establishing => match result {
                Ok(socket) => break socket,
                Err(Establish::Waiting(reason)) => {
                    debug!(serial, reason = %reason, "Connection waiting");
                    inner.emit(TransportState::Waiting(reason));
                    wait_for_cancel(&mut commands).await;
                    inner.emit(TransportState::Cancelled);
                    return;
                }
                Err(Establish::Failed(reason)) => {
                    debug!(serial, reason = %reason, "Connection failed");
                    inner.emit(TransportState::Failed(reason));
                    return;
                }
            },
            command = commands.recv() => match command {
                Some(Command::Send(payload)) => backlog.push(payload),
                Some(Command::Receive(completion)) => armed = Some(completion),
                Some(Command::Cancel) | None => {
                    debug!(serial, "Connection cancelled while establishing");
                    inner.emit(TransportState::Cancelled);
                    return;
                }
            },
        }
    };

    debug!(serial, "Connection established");
    inner.emit(TransportState::Ready);

    let (mut write, mut read) = socket.split();

    let terminal = 'session: {
        for payload in backlog {
            if let Err(e) = write.send(Message::Binary(payload.into())).await {
                warn!(serial, error = %e, "Flushing queued message failed");
                break 'session TransportState::Failed(e.to_string());
            }
        }

        loop {
            tokio::select! {
                message = read.next(), if armed.is_some() => {
                    let Some(completion) = armed.take() else {
                        continue;
                    };
                    match message {
                        Some(Ok(message)) => match incoming(message) {
                            Incoming::Message(bytes) => {
                                deliver(&inner.queue, completion, Ok(Some(bytes)));
                            }
                            Incoming::Control => armed = Some(completion),
                            Incoming::Closed => {
                                deliver(&inner.queue, completion, Err(ReceiveError::NoData));
                            }
                        },
                        Some(Err(e)) => deliver(&inner.queue, completion, Err(classify(&e))),
                        None => deliver(&inner.queue, completion, Err(ReceiveError::NoData)),
                    }
                }
                command = commands.recv() => match command {
                    Some(Command::Send(payload)) => {
                        if let Err(e) = write.send(Message::Binary(payload.into())).await {
                            warn!(serial, error = %e, "Send failed");
                            break 'session TransportState::Failed(e.to_string());
                        }
                    }
                    Some(Command::Receive(completion)) => {
                        if armed.replace(completion).is_some() {
                            warn!(serial, "Receive already outstanding, replaced");
                        }
                    }
                    Some(Command::Cancel) | None => {
                        if let Err(e) = write.close().await {
                            debug!(serial, error = %e, "Close handshake incomplete");
                        }
                        break 'session TransportState::Cancelled;
                    }
                },
            }
        }
    };

    debug!(serial, state = ?terminal, "Connection finished");
    inner.emit(terminal);
}

async fn establish(
    options: TransportOptions,
    origin: Origin,
) -> std::result::Result<Socket, Establish> {
    match origin {
        Origin::Outbound(endpoint) => {
            let request = endpoint
                .request()
                .map_err(|e| Establish::Failed(e.to_string()))?;
            let connecting = TcpStream::connect((endpoint.bare_host(), endpoint.port()));
            let stream = match timeout(options.connect_timeout, connecting).await {
                Err(_) => return Err(Establish::Failed("connect timed out".to_string())),
                Ok(Err(e)) if is_transient(&e) => return Err(Establish::Waiting(e.to_string())),
                Ok(Err(e)) => return Err(Establish::Failed(e.to_string())),
                Ok(Ok(stream)) => stream,
            };
            if let Err(e) = stream.set_nodelay(options.nodelay) {
                debug!(error = %e, "Failed to set TCP_NODELAY");
            }

            match timeout(options.connect_timeout, client_async(request, stream)).await {
                Err(_) => Err(Establish::Failed("handshake timed out".to_string())),
                Ok(Err(e)) => Err(Establish::Failed(e.to_string())),
                Ok(Ok((socket, _response))) => Ok(socket),
            }
        }
        Origin::Inbound { stream, path } => {
            if let Err(e) = stream.set_nodelay(options.nodelay) {
                debug!(error = %e, "Failed to set TCP_NODELAY");
            }

            let accepting = accept_hdr_async(stream, path_guard(path));
            match timeout(options.connect_timeout, accepting).await {
                Err(_) => Err(Establish::Failed("handshake timed out".to_string())),
                Ok(Err(e)) => Err(Establish::Failed(e.to_string())),
                Ok(Ok(socket)) => Ok(socket),
            }
        }
    }
}

async fn wait_for_cancel(commands: &mut mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = commands.recv().await {
        if matches!(command, Command::Cancel) {
            return;
        }
    }
}

// ============================================================================
// TokioListener
// ============================================================================

/// Handle to one tokio-driven listener.
pub struct TokioListener {
    inner: Arc<ListenerInner>,
}

struct ListenerInner {
    endpoint: ListenEndpoint,
    queue: EventQueue,
    runtime: Arc<RuntimeHolder>,
    options: TransportOptions,
    state: CallbackSlot<TransportState>,
    accepted: CallbackSlot<TokioConnection>,
    port: AtomicU16,
    cancel: mpsc::UnboundedSender<()>,
    pending: Mutex<Option<mpsc::UnboundedReceiver<()>>>,
}

impl TokioListener {
    fn new(
        endpoint: ListenEndpoint,
        queue: EventQueue,
        runtime: Arc<RuntimeHolder>,
        options: TransportOptions,
    ) -> Self {
        let (cancel, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(ListenerInner {
                endpoint,
                queue,
                runtime,
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

impl Listener for TokioListener {
    type Connection = TokioConnection;

    fn set_state_changed_handler(&self, handler: StateHandler) {
        self.inner.state.install(handler);
    }

    fn set_new_connection_handler(&self, handler: NewConnectionHandler<TokioConnection>) {
        self.inner.accepted.install(handler);
    }

    fn start(&self) {
        let Some(cancel) = self.inner.pending.lock().take() else {
            warn!(addr = %self.inner.endpoint.socket_addr(), "Listener already started");
            return;
        };
        let inner = Arc::clone(&self.inner);
        self.inner.runtime.handle.spawn(run_listener(inner, cancel));
    }

    fn cancel(&self) {
        let _ = self.inner.cancel.send(());
    }

    fn port(&self) -> u16 {
        self.inner.port.load(Ordering::Acquire)
    }
}

impl fmt::Debug for TokioListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioListener")
            .field("endpoint", &self.inner.endpoint)
            .field("port", &self.port())
            .finish()
    }
}

async fn run_listener(inner: Arc<ListenerInner>, mut cancel: mpsc::UnboundedReceiver<()>) {
    let finish = |state: TransportState| {
        inner.accepted.clear();
        emit_state(&inner.state, &inner.queue, state);
    };

    if cancel.try_recv().is_ok() {
        finish(TransportState::Cancelled);
        return;
    }

    let addr = inner.endpoint.socket_addr();
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!(%addr, error = %e, "Failed to bind listener");
            finish(TransportState::Failed(e.to_string()));
            return;
        }
    };
    let port = match listener.local_addr() {
        Ok(local) => local.port(),
        Err(e) => {
            finish(TransportState::Failed(e.to_string()));
            return;
        }
    };
    inner.port.store(port, Ordering::Release);

    info!(port, path = inner.endpoint.path(), "WebSocket listener started");
    emit_state(&inner.state, &inner.queue, TransportState::Ready);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "Accepted TCP connection");
                    let connection = TokioConnection::new(
                        Origin::Inbound {
                            stream,
                            path: inner.endpoint.path().to_string(),
                        },
                        inner.queue.clone(),
                        Arc::clone(&inner.runtime),
                        inner.options.clone(),
                    );
                    inner.accepted.post(&inner.queue, connection);
                }
                Err(e) => warn!(error = %e, "Accept failed"),
            },
            _ = cancel.recv() => break,
        }
    }

    drop(listener);
    info!(port, "WebSocket listener stopped");
    finish(TransportState::Cancelled);
}

// ============================================================================
// Tests
// ============================================================================
