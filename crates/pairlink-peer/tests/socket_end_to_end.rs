//! Client and server managers paired through a real socket directory.

#![cfg(unix)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use common::*;
use pairlink_codec::{FramedReceiver, FramedSender};
use pairlink_peer::{
    ClientManager, ConnectionListener, LineClient, LineServer, ManagerConfig, ServerManager,
    ServerHandler,
};
use pairlink_transport::{Peer, SharedIdentifier, SocketDirectory};

fn make_root(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/pl-e2e-{}-{}-{}",
        tag,
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn wait_for_socket(directory: &SocketDirectory, identifier: &SharedIdentifier) {
    let path = directory.socket_path(directory.local_name(), identifier);
    let deadline = Instant::now() + WAIT;
    while !path.exists() {
        assert!(Instant::now() < deadline, "server never bound {}", path.display());
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn line_client_and_server_talk_over_sockets() {
    let root = make_root("line");
    let identifier = SharedIdentifier::random();
    let server_dir = Arc::new(SocketDirectory::new(&root, "server"));
    let client_dir = Arc::new(SocketDirectory::new(&root, "client"));

    let (handler, server_events) = RecordingHandler::new();
    let server = LineServer::new(identifier, server_dir.clone(), ManagerConfig::default(), handler)
        .unwrap();
    server.start().unwrap();
    wait_for_socket(&server_dir, &identifier);

    let client = LineClient::new(identifier, client_dir, ManagerConfig::default()).unwrap();
    let (recorder, client_events) = Recorder::new();
    client.set_listener(&recorder);
    client.start();
    client.connect().unwrap();

    assert_eq!(next(&client_events), Seen::Connected("server".into()));
    assert!(matches!(next(&server_events), Seen::Connected(name) if name.starts_with("peer-")));

    client.send("ping").unwrap();
    assert_eq!(next(&server_events), Seen::Message("ping".into()));
    server.send("pong").unwrap();
    assert_eq!(next(&client_events), Seen::Message("pong".into()));

    client.disconnect().unwrap();
    assert_eq!(next(&client_events), Seen::Disconnected("server".into()));
    assert!(matches!(next(&server_events), Seen::Disconnected(_)));

    // The server re-binds and the client can pair again.
    wait_for_socket(&server_dir, &identifier);
    client.connect().unwrap();
    assert_eq!(next(&client_events), Seen::Connected("server".into()));
    assert!(matches!(next(&server_events), Seen::Connected(_)));

    client.teardown();
    server.teardown();
    let _ = std::fs::remove_dir_all(&root);
}

struct BytesHandler(std::sync::Mutex<std::sync::mpsc::Sender<Bytes>>);

impl ServerHandler<Bytes> for BytesHandler {
    fn on_connected(&self, _peer: &Peer) {}

    fn on_disconnected(&self, _peer: &Peer) {}

    fn on_message(&self, message: Bytes) {
        let _ = self.0.lock().unwrap().send(message);
    }
}

struct Quiet;

impl ConnectionListener<Bytes> for Quiet {}

#[test]
fn framed_codec_preserves_binary_boundaries() {
    let root = make_root("framed");
    let identifier = SharedIdentifier::random();
    let server_dir = Arc::new(SocketDirectory::new(&root, "server"));
    let client_dir = Arc::new(SocketDirectory::new(&root, "client"));

    let (tx, rx) = std::sync::mpsc::channel();
    let server: ServerManager<FramedSender, FramedReceiver, BytesHandler> = ServerManager::new(
        identifier,
        server_dir.clone(),
        ManagerConfig::default(),
        BytesHandler(std::sync::Mutex::new(tx)),
    )
    .unwrap();
    server.start().unwrap();
    wait_for_socket(&server_dir, &identifier);

    let client: ClientManager<FramedSender, FramedReceiver> =
        ClientManager::new(identifier, client_dir, ManagerConfig::default()).unwrap();
    let quiet = Arc::new(Quiet);
    client.set_listener(&quiet);
    client.connect().unwrap();

    let deadline = Instant::now() + WAIT;
    while !client.is_connected() {
        assert!(Instant::now() < deadline, "client never connected");
        std::thread::sleep(Duration::from_millis(5));
    }

    let payloads: [&[u8]; 3] = [b"\x00\x01\x02", b"", b"\n\n binary \xff"];
    for payload in payloads {
        client.send(payload).unwrap();
    }
    for payload in payloads {
        assert_eq!(rx.recv_timeout(WAIT).unwrap().as_ref(), payload);
    }

    client.teardown();
    server.teardown();
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn connecting_without_a_server_fails() {
    let root = make_root("absent");
    let client_dir = Arc::new(SocketDirectory::new(&root, "client"));
    let client = LineClient::new(SharedIdentifier::random(), client_dir, ManagerConfig::default())
        .unwrap();
    let (recorder, events) = Recorder::new();
    client.set_listener(&recorder);

    client.connect().unwrap();
    assert!(matches!(next(&events), Seen::Failed(_)));
    let _ = std::fs::remove_dir_all(&root);
}
