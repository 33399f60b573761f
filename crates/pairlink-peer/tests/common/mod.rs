//! Scripted peer directory and recording listeners shared by the
//! integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashSet;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pairlink_peer::{ConnectionListener, PeerError, ServerHandler};
use pairlink_transport::{
    DuplexStream, OpenMode, Peer, PeerAcceptor, PeerDirectory, Result, SharedIdentifier,
    TransportError,
};

pub const WAIT: Duration = Duration::from_secs(5);
pub const QUIET: Duration = Duration::from_millis(150);

/// In-process directory: peers are a fixed list, opened streams are socket
/// pairs whose far end is handed to the test.
pub struct ScriptedDirectory {
    peers: Vec<(Peer, HashSet<SharedIdentifier>)>,
    refreshed: Mutex<HashSet<String>>,
    fail_opens: AtomicUsize,
    fail_listens: AtomicUsize,
    open_modes: Mutex<Vec<OpenMode>>,
    listens: AtomicUsize,
    remotes: Mutex<Sender<DuplexStream>>,
    inbound_tx: Mutex<Sender<(DuplexStream, Peer)>>,
    inbound_rx: Arc<Mutex<Receiver<(DuplexStream, Peer)>>>,
}

impl ScriptedDirectory {
    /// Directory whose peers advertise the given identifiers. Returns the
    /// directory and the receiving end for the far side of opened streams.
    pub fn new(peers: Vec<(Peer, Vec<SharedIdentifier>)>) -> (Arc<Self>, Receiver<DuplexStream>) {
        let (remotes_tx, remotes_rx) = mpsc::channel();
        let (inbound_tx, inbound_rx) = mpsc::channel();
        let directory = Self {
            peers: peers
                .into_iter()
                .map(|(peer, ids)| (peer, ids.into_iter().collect()))
                .collect(),
            refreshed: Mutex::new(HashSet::new()),
            fail_opens: AtomicUsize::new(0),
            fail_listens: AtomicUsize::new(0),
            open_modes: Mutex::new(Vec::new()),
            listens: AtomicUsize::new(0),
            remotes: Mutex::new(remotes_tx),
            inbound_tx: Mutex::new(inbound_tx),
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
        };
        (Arc::new(directory), remotes_rx)
    }

    /// Make the next `count` calls to `open` fail.
    pub fn fail_next_opens(&self, count: usize) {
        self.fail_opens.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` calls to `listen` fail.
    pub fn fail_next_listens(&self, count: usize) {
        self.fail_listens.store(count, Ordering::SeqCst);
    }

    pub fn open_modes(&self) -> Vec<OpenMode> {
        self.open_modes.lock().unwrap().clone()
    }

    pub fn listen_count(&self) -> usize {
        self.listens.load(Ordering::SeqCst)
    }

    /// Connect to whatever acceptor is (or will be) listening.
    pub fn dial(&self, name: &str) -> DuplexStream {
        let (local, remote) = DuplexStream::pair().unwrap();
        self.inbound_tx
            .lock()
            .unwrap()
            .send((remote, Peer::new(name, format!("scripted://{name}"))))
            .unwrap();
        local
    }

    /// Block until `listen` has been called at least `count` times.
    pub fn wait_for_listens(&self, count: usize) {
        let deadline = std::time::Instant::now() + WAIT;
        while self.listen_count() < count {
            assert!(std::time::Instant::now() < deadline, "timed out waiting for listen #{count}");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl PeerDirectory for ScriptedDirectory {
    fn list_candidates(&self) -> Result<Vec<Peer>> {
        Ok(self.peers.iter().map(|(peer, _)| peer.clone()).collect())
    }

    fn refresh(&self, peer: &Peer) -> Result<()> {
        self.refreshed.lock().unwrap().insert(peer.name().to_string());
        Ok(())
    }

    fn resolve(&self, peer: &Peer) -> Result<HashSet<SharedIdentifier>> {
        if !self.refreshed.lock().unwrap().contains(peer.name()) {
            return Ok(HashSet::new());
        }
        self.peers
            .iter()
            .find(|(known, _)| known == peer)
            .map(|(_, ids)| ids.clone())
            .ok_or_else(|| TransportError::UnknownPeer(peer.name().to_string()))
    }

    fn open(&self, peer: &Peer, _identifier: &SharedIdentifier, mode: OpenMode) -> Result<DuplexStream> {
        self.open_modes.lock().unwrap().push(mode);
        if Self::take_failure(&self.fail_opens) {
            return Err(TransportError::CredentialsRejected(format!(
                "scripted {mode} open failure for {peer}"
            )));
        }
        let (local, remote) = DuplexStream::pair()?;
        let _ = self.remotes.lock().unwrap().send(remote);
        Ok(local)
    }

    fn listen(&self, _identifier: &SharedIdentifier) -> Result<Box<dyn PeerAcceptor>> {
        self.listens.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.fail_listens) {
            return Err(TransportError::Io(std::io::Error::other("scripted listen failure")));
        }
        Ok(Box::new(ScriptedAcceptor {
            inbound: Arc::clone(&self.inbound_rx),
            closed: AtomicBool::new(false),
        }))
    }
}

struct ScriptedAcceptor {
    inbound: Arc<Mutex<Receiver<(DuplexStream, Peer)>>>,
    closed: AtomicBool,
}

impl PeerAcceptor for ScriptedAcceptor {
    fn accept(&self) -> Result<(DuplexStream, Peer)> {
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Shutdown);
            }
            match self.inbound.lock().unwrap().recv_timeout(Duration::from_millis(10)) {
                Ok(accepted) => return Ok(accepted),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(TransportError::Shutdown),
            }
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// What a recording listener observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Connected(String),
    Failed(String),
    Disconnected(String),
    Message(String),
}

/// Listener that forwards every event to a channel.
pub struct Recorder {
    tx: Mutex<Sender<Seen>>,
}

impl Recorder {
    pub fn new() -> (Arc<Self>, Receiver<Seen>) {
        let (tx, rx) = mpsc::channel();
        (Arc::new(Self { tx: Mutex::new(tx) }), rx)
    }

    pub fn record(&self, seen: Seen) {
        let _ = self.tx.lock().unwrap().send(seen);
    }
}

impl ConnectionListener<String> for Recorder {
    fn on_connected(&self, peer: &Peer) {
        self.record(Seen::Connected(peer.name().to_string()));
    }

    fn on_connection_failed(&self, error: &PeerError) {
        self.record(Seen::Failed(error.to_string()));
    }

    fn on_disconnected(&self, peer: &Peer) {
        self.record(Seen::Disconnected(peer.name().to_string()));
    }

    fn on_message(&self, message: String) {
        self.record(Seen::Message(message));
    }
}

/// Server hooks that forward to a channel.
pub struct RecordingHandler {
    tx: Mutex<Sender<Seen>>,
}

impl RecordingHandler {
    pub fn new() -> (Self, Receiver<Seen>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx: Mutex::new(tx) }, rx)
    }
}

impl ServerHandler<String> for RecordingHandler {
    fn on_connected(&self, peer: &Peer) {
        let _ = self.tx.lock().unwrap().send(Seen::Connected(peer.name().to_string()));
    }

    fn on_disconnected(&self, peer: &Peer) {
        let _ = self.tx.lock().unwrap().send(Seen::Disconnected(peer.name().to_string()));
    }

    fn on_message(&self, message: String) {
        let _ = self.tx.lock().unwrap().send(Seen::Message(message));
    }
}

/// Records each event together with the name of the thread it arrived on.
pub struct ThreadRecorder {
    tx: Mutex<Sender<(Seen, String)>>,
}

impl ThreadRecorder {
    pub fn new() -> (Self, Receiver<(Seen, String)>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx: Mutex::new(tx) }, rx)
    }

    fn record(&self, seen: Seen) {
        let thread = std::thread::current().name().unwrap_or("<unnamed>").to_string();
        let _ = self.tx.lock().unwrap().send((seen, thread));
    }
}

impl ConnectionListener<String> for ThreadRecorder {
    fn on_connected(&self, peer: &Peer) {
        self.record(Seen::Connected(peer.name().to_string()));
    }

    fn on_connection_failed(&self, error: &PeerError) {
        self.record(Seen::Failed(error.to_string()));
    }

    fn on_disconnected(&self, peer: &Peer) {
        self.record(Seen::Disconnected(peer.name().to_string()));
    }

    fn on_message(&self, message: String) {
        self.record(Seen::Message(message));
    }
}

impl ServerHandler<String> for ThreadRecorder {
    fn on_connected(&self, peer: &Peer) {
        self.record(Seen::Connected(peer.name().to_string()));
    }

    fn on_disconnected(&self, peer: &Peer) {
        self.record(Seen::Disconnected(peer.name().to_string()));
    }

    fn on_message(&self, message: String) {
        self.record(Seen::Message(message));
    }
}

pub fn next(rx: &Receiver<Seen>) -> Seen {
    rx.recv_timeout(WAIT).expect("expected an event")
}

pub fn assert_quiet(rx: &Receiver<Seen>) {
    match rx.recv_timeout(QUIET) {
        Err(RecvTimeoutError::Timeout) => {}
        other => panic!("unexpected event: {other:?}"),
    }
}

pub fn write_line(stream: &mut DuplexStream, line: &str) {
    stream.write_all(line.as_bytes()).unwrap();
    stream.write_all(b"\n").unwrap();
}

pub fn read_line(stream: &mut DuplexStream) -> String {
    stream.set_read_timeout(Some(WAIT)).unwrap();
    let mut out = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).unwrap();
        assert!(n == 1, "stream closed before end of line");
        if byte[0] == b'\n' {
            return String::from_utf8(out).unwrap();
        }
        out.push(byte[0]);
    }
}

/// Read until end of stream, returning what arrived.
pub fn read_to_end(stream: &mut DuplexStream) -> Vec<u8> {
    stream.set_read_timeout(Some(WAIT)).unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    out
}
