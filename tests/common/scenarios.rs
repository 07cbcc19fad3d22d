//! End-to-end scenarios run against every real backend.

use std::sync::Arc;
use std::time::{Duration, Instant};

use websocket_tools::{
    Client, ClientBuilder, ConnectionId, Server, ServerBuilder, Transport, TransportOptions,
};

use super::{Event, Recorder, WAIT, client_handlers, init_logging, server_handlers, wait_until};

const TIMEOUT: Duration = Duration::from_secs(2);

fn backend<B: Transport>() -> B {
    B::from_options(TransportOptions::new().with_worker_threads(1))
        .unwrap_or_else(|e| panic!("backend: {e}"))
}

pub fn start_server<B: Transport>(path: &str) -> (Server<B>, Arc<Recorder>) {
    let recorder = Recorder::new();
    let server = ServerBuilder::new()
        .path(path)
        .timeout(TIMEOUT)
        .listen_with(backend::<B>(), server_handlers(), Arc::clone(&recorder))
        .unwrap_or_else(|e| panic!("server: {e}"));
    assert_ne!(server.port(), 0);
    (server, recorder)
}

pub fn connect<B: Transport>(port: u16, path: &str) -> (Client<B>, Arc<Recorder>) {
    let recorder = Recorder::new();
    let client = ClientBuilder::new()
        .host("127.0.0.1")
        .port(port)
        .path(path)
        .timeout(TIMEOUT)
        .connect_with(backend::<B>(), client_handlers(), Arc::clone(&recorder))
        .unwrap_or_else(|e| panic!("client: {e}"));
    (client, recorder)
}

/// Two clients receive one broadcast each.
pub fn broadcast_reaches_every_client<S: Transport, C: Transport>() {
    init_logging();
    let (server, server_events) = start_server::<S>("/");

    let (first, first_events) = connect::<C>(server.port(), "/");
    let (second, second_events) = connect::<C>(server.port(), "/");
    assert!(server_events.wait_for(WAIT, |events| {
        events.iter().filter(|e| matches!(e, Event::Ready(_))).count() == 2
    }));
    assert_eq!(server.connection_count(), 2);

    assert_eq!(server.broadcast(b"x"), 2);

    for recorder in [&first_events, &second_events] {
        assert!(recorder.wait_for(WAIT, |events| !events.is_empty()));
    }
    assert_eq!(first_events.received(), vec![(first.id(), b"x".to_vec())]);
    assert_eq!(second_events.received(), vec![(second.id(), b"x".to_vec())]);

    drop(first);
    drop(second);
    drop(server);
    super::assert_per_connection_order(&server_events.events());
}

/// Messages are attributed to the right id in both directions.
pub fn echo_matches_ids<S: Transport, C: Transport>() {
    init_logging();
    let (server, server_events) = start_server::<S>("/echo");
    let (client, client_events) = connect::<C>(server.port(), "/echo");

    client.send(b"hello").unwrap();
    assert!(server_events.wait_for(WAIT, |events| {
        events.iter().any(|e| matches!(e, Event::Receive(..)))
    }));

    let events = server_events.events();
    let connected: Vec<ConnectionId> = events
        .iter()
        .filter_map(|e| match e {
            Event::Connect(id) => Some(*id),
            _ => None,
        })
        .collect();
    assert_eq!(connected.len(), 1);
    assert!(events.contains(&Event::Ready(connected[0])));

    let (id, data) = server_events.received().remove(0);
    assert_eq!(data, b"hello");
    assert_eq!(id, connected[0]);
    assert_eq!(server.connection_ids(), vec![id]);

    server.send(id, b"world").unwrap();
    assert!(client_events.wait_for(WAIT, |events| !events.is_empty()));
    assert_eq!(client_events.received(), vec![(client.id(), b"world".to_vec())]);

    assert!(matches!(
        server.send(ConnectionId::new(999), b"nobody"),
        Err(websocket_tools::Error::ConnectionNotFound { .. })
    ));
}

/// Messages on one connection arrive in send order.
pub fn messages_arrive_in_order<S: Transport, C: Transport>() {
    init_logging();
    let (server, server_events) = start_server::<S>("/");
    let (client, _client_events) = connect::<C>(server.port(), "/");

    for i in 0..50u8 {
        client.send(&[i]).unwrap();
    }
    assert!(server_events.wait_for(WAIT, |events| {
        events.iter().filter(|e| matches!(e, Event::Receive(..))).count() == 50
    }));

    let payloads: Vec<u8> = server_events.received().into_iter().map(|(_, d)| d[0]).collect();
    assert_eq!(payloads, (0..50).collect::<Vec<_>>());
}

/// Nobody listens on port 1: construction fails, and not indefinitely.
pub fn unreachable_port_fails<B: Transport>() {
    init_logging();
    let recorder = Recorder::new();
    let timeout = Duration::from_millis(400);
    let started = Instant::now();

    let result = Client::<B>::create(
        "127.0.0.1",
        1,
        "/",
        client_handlers(),
        Arc::clone(&recorder),
        timeout,
    );

    let error = result.expect_err("nothing listens on port 1");
    assert!(error.is_recoverable(), "unexpected error: {error}");
    assert!(started.elapsed() < timeout + Duration::from_secs(3));
    assert_eq!(recorder.closes(), 1);
}

/// Closing a client is observed by the server.
pub fn client_close_reaches_server<S: Transport, C: Transport>() {
    init_logging();
    let (server, server_events) = start_server::<S>("/");
    let (client, client_events) = connect::<C>(server.port(), "/");
    assert!(server_events.wait_for(WAIT, |events| {
        events.iter().any(|e| matches!(e, Event::Ready(_)))
    }));

    let id = client.id();
    client.close();
    assert_eq!(client_events.events(), vec![Event::Close(id)]);

    assert!(server_events.wait_for(WAIT, |events| {
        events.iter().any(|e| matches!(e, Event::Close(_)))
    }));
    assert!(wait_until(WAIT, || server.connection_count() == 0));
}

/// Dropping the server closes its clients and runs every server `on_close`.
pub fn server_drop_closes_clients<S: Transport, C: Transport>() {
    init_logging();
    let (server, server_events) = start_server::<S>("/");
    let (client, client_events) = connect::<C>(server.port(), "/");
    assert!(server_events.wait_for(WAIT, |events| {
        events.iter().any(|e| matches!(e, Event::Ready(_)))
    }));

    drop(server);
    assert_eq!(server_events.closes(), 1);

    assert!(client_events.wait_for(WAIT, |events| {
        events.contains(&Event::Close(client.id()))
    }));
    assert!(wait_until(WAIT, || !client.is_open()));
    assert!(client.send(b"late").is_err());
}

/// Sequential connect/disconnect cycles keep reusing the smallest id.
pub fn reconnect_cycles_reuse_ids<S: Transport, C: Transport>(cycles: usize) {
    init_logging();
    let (server, server_events) = start_server::<S>("/");

    for cycle in 1..=cycles {
        let (client, _) = connect::<C>(server.port(), "/");
        assert!(server_events.wait_for(WAIT, |events| {
            events.iter().filter(|e| matches!(e, Event::Ready(_))).count() == cycle
        }));
        assert_eq!(server.connection_ids(), vec![ConnectionId::new(1)]);

        client.close();
        assert!(server_events.wait_for(WAIT, |events| {
            events.iter().filter(|e| matches!(e, Event::Close(_))).count() == cycle
        }));
    }

    assert!(server_events
        .events()
        .iter()
        .all(|e| e.id() == ConnectionId::new(1)));
    assert!(wait_until(WAIT, || server.connection_count() == 0));
}

/// Upgrades for another path are rejected.
pub fn wrong_path_is_rejected<S: Transport, C: Transport>() {
    init_logging();
    let (server, server_events) = start_server::<S>("/ws");

    let recorder = Recorder::new();
    let result = ClientBuilder::new()
        .host("127.0.0.1")
        .port(server.port())
        .path("/elsewhere")
        .timeout(TIMEOUT)
        .connect_with(backend::<C>(), client_handlers(), Arc::clone(&recorder));
    assert!(result.is_err());

    // The peer was registered on accept and closes without becoming ready.
    assert!(server_events.wait_for(WAIT, |events| {
        events.iter().any(|e| matches!(e, Event::Close(_)))
    }));
    assert_eq!(server_events.readies(), 0);
    assert!(wait_until(WAIT, || server.connection_count() == 0));
}
