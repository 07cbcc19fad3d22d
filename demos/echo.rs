//! Echo demo: a server that sends every message back, and a client talking to it.
//!
//! Usage: cargo run --example echo [tokio|threaded]
//!
//! Set `RUST_LOG=debug` to watch the lifecycle.

use std::sync::mpsc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;
use websocket_tools::{
    Client, ClientBuilder, ClientHandlers, ConnectionId, Server, ServerBuilder, ServerHandlers,
    ThreadedTransport, TokioTransport, Transport, TransportOptions,
};

/// Server context: forwards received messages to the main thread.
type Inbox = mpsc::Sender<(ConnectionId, Vec<u8>)>;

// ============================================================================
// Main
// ============================================================================

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match std::env::args().nth(1).as_deref() {
        None | Some("tokio") => run::<TokioTransport>(),
        Some("threaded") => run::<ThreadedTransport>(),
        Some(other) => anyhow::bail!("unknown backend {other:?}, expected tokio or threaded"),
    }
}

fn run<B: Transport>() -> anyhow::Result<()> {
    let options = TransportOptions::new().with_worker_threads(1);

    // Server handlers forward messages to this thread, which echoes them.
    let (inbox, messages) = mpsc::channel();
    let server: Server<B> = ServerBuilder::new()
        .path("/echo")
        .timeout(Duration::from_secs(1))
        .listen_with(
            B::from_options(options.clone())?,
            ServerHandlers::new(
                |id, _: &Inbox| println!("server: {id} connected"),
                |id, _: &Inbox| println!("server: {id} ready"),
                |id, data: &[u8], inbox: &Inbox| {
                    let _ = inbox.send((id, data.to_vec()));
                },
                |id, _: &Inbox| println!("server: {id} closed"),
            ),
            inbox,
        )?;
    println!("server: listening on ws://127.0.0.1:{}/echo", server.port());

    let (replies_tx, replies) = mpsc::channel::<Vec<u8>>();
    let client: Client<B> = ClientBuilder::new()
        .host("127.0.0.1")
        .port(server.port())
        .path("/echo")
        .timeout(Duration::from_secs(1))
        .connect_with(
            B::from_options(options)?,
            ClientHandlers::new(
                |_, data: &[u8], replies: &mpsc::Sender<Vec<u8>>| {
                    let _ = replies.send(data.to_vec());
                },
                |id, _: &mpsc::Sender<Vec<u8>>| println!("client: {id} closed"),
            ),
            replies_tx,
        )?;

    for word in ["hello", "from", "websocket-tools"] {
        client.send(word.as_bytes())?;

        let (id, data) = messages.recv_timeout(Duration::from_secs(2))?;
        server.send(id, &data)?;

        let echoed = replies.recv_timeout(Duration::from_secs(2))?;
        println!("client: echoed {:?}", String::from_utf8_lossy(&echoed));
    }

    client.close();
    server.close();
    Ok(())
}
