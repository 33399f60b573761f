//! Client-role scenarios against a scripted directory.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::{Arc, Mutex, OnceLock};

use common::*;
use pairlink_codec::{LineReceiver, LineSender};
use pairlink_peer::{
    ConnectionListener, ConnectionManager, ConnectionState, LineClient, ManagerConfig, PeerError,
    Role,
};
use pairlink_transport::{OpenMode, Peer, SharedIdentifier};

fn client_for(
    identifier: SharedIdentifier,
    peers: Vec<(Peer, Vec<SharedIdentifier>)>,
) -> (
    LineClient,
    Arc<ScriptedDirectory>,
    std::sync::mpsc::Receiver<pairlink_transport::DuplexStream>,
) {
    let (directory, remotes) = ScriptedDirectory::new(peers);
    let client = LineClient::new(identifier, directory.clone(), ManagerConfig::default()).unwrap();
    (client, directory, remotes)
}

fn single_peer(identifier: SharedIdentifier) -> Vec<(Peer, Vec<SharedIdentifier>)> {
    vec![
        (Peer::new("bystander", "scripted://bystander"), vec![SharedIdentifier::random()]),
        (Peer::new("target", "scripted://target"), vec![identifier]),
    ]
}

#[test]
fn lookup_failure_reports_connection_failed_once() {
    let identifier = SharedIdentifier::random();
    let (client, directory, _remotes) = client_for(
        identifier,
        vec![(Peer::new("other", "scripted://other"), vec![SharedIdentifier::random()])],
    );
    let (recorder, events) = Recorder::new();
    client.set_listener(&recorder);

    client.connect().unwrap();

    match next(&events) {
        Seen::Failed(reason) => assert!(reason.contains(&identifier.to_string())),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_quiet(&events);
    assert!(!client.is_connected());
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(directory.open_modes().is_empty(), "no open without a match");
}

#[test]
fn first_matching_candidate_is_opened_in_verified_mode() {
    let identifier = SharedIdentifier::random();
    let (client, directory, _remotes) = client_for(identifier, single_peer(identifier));
    let (recorder, events) = Recorder::new();
    client.set_listener(&recorder);

    client.connect().unwrap();

    assert_eq!(next(&events), Seen::Connected("target".into()));
    assert!(client.is_connected());
    assert_eq!(client.peer().map(|p| p.name().to_string()), Some("target".into()));
    assert_eq!(directory.open_modes(), vec![OpenMode::Verified]);
}

#[test]
fn verified_failure_falls_back_to_unverified() {
    let identifier = SharedIdentifier::random();
    let (client, directory, _remotes) = client_for(identifier, single_peer(identifier));
    let (recorder, events) = Recorder::new();
    client.set_listener(&recorder);
    directory.fail_next_opens(1);

    client.connect().unwrap();

    assert_eq!(next(&events), Seen::Connected("target".into()));
    assert_eq!(
        directory.open_modes(),
        vec![OpenMode::Verified, OpenMode::Unverified]
    );
}

#[test]
fn both_modes_failing_reports_failure_and_retry_succeeds() {
    let identifier = SharedIdentifier::random();
    let (client, directory, _remotes) = client_for(identifier, single_peer(identifier));
    let (recorder, events) = Recorder::new();
    client.set_listener(&recorder);
    directory.fail_next_opens(2);

    client.connect().unwrap();
    assert!(matches!(next(&events), Seen::Failed(_)));
    assert_quiet(&events);
    assert!(!client.is_connected());

    client.connect().unwrap();
    assert_eq!(next(&events), Seen::Connected("target".into()));
    assert!(client.is_connected());
    assert_eq!(directory.open_modes().len(), 3);
}

#[test]
fn ping_round_trip() {
    let identifier = SharedIdentifier::random();
    let (client, _directory, remotes) = client_for(identifier, single_peer(identifier));
    let (recorder, events) = Recorder::new();
    client.set_listener(&recorder);

    client.connect().unwrap();
    assert_eq!(next(&events), Seen::Connected("target".into()));
    let mut remote = remotes.recv_timeout(WAIT).unwrap();

    client.send("ping").unwrap();
    assert_eq!(read_line(&mut remote), "ping");

    write_line(&mut remote, "pong");
    assert_eq!(next(&events), Seen::Message("pong".into()));
}

#[test]
fn events_arrive_in_order_and_disconnect_is_reported_once() {
    let identifier = SharedIdentifier::random();
    let (client, _directory, remotes) = client_for(identifier, single_peer(identifier));
    let (recorder, events) = Recorder::new();
    client.set_listener(&recorder);

    client.connect().unwrap();
    let mut remote = remotes.recv_timeout(WAIT).unwrap();
    for word in ["a", "b", "c"] {
        write_line(&mut remote, word);
    }
    drop(remote);

    assert_eq!(next(&events), Seen::Connected("target".into()));
    assert_eq!(next(&events), Seen::Message("a".into()));
    assert_eq!(next(&events), Seen::Message("b".into()));
    assert_eq!(next(&events), Seen::Message("c".into()));
    assert_eq!(next(&events), Seen::Disconnected("target".into()));
    assert_quiet(&events);
    assert!(!client.is_connected());
    assert!(client.peer().is_none());
}

#[test]
fn send_while_disconnected_is_an_invalid_state() {
    let identifier = SharedIdentifier::random();
    let (client, directory, _remotes) = client_for(identifier, single_peer(identifier));

    let err = client.send("nobody home").unwrap_err();
    assert!(matches!(err, PeerError::NotConnected));
    assert!(err.is_invalid_state());
    assert!(directory.open_modes().is_empty());
}

#[test]
fn disconnect_without_connection_fails() {
    let identifier = SharedIdentifier::random();
    let (client, _directory, _remotes) = client_for(identifier, single_peer(identifier));
    assert!(matches!(client.disconnect(), Err(PeerError::NotConnected)));
}

#[test]
fn disconnect_closes_stream_and_reports_once() {
    let identifier = SharedIdentifier::random();
    let (client, _directory, remotes) = client_for(identifier, single_peer(identifier));
    let (recorder, events) = Recorder::new();
    client.set_listener(&recorder);

    client.connect().unwrap();
    assert_eq!(next(&events), Seen::Connected("target".into()));
    let mut remote = remotes.recv_timeout(WAIT).unwrap();

    client.disconnect().unwrap();
    assert_eq!(next(&events), Seen::Disconnected("target".into()));
    assert!(read_to_end(&mut remote).is_empty());
    assert_quiet(&events);
    assert!(matches!(client.send("late"), Err(PeerError::NotConnected)));
}

#[test]
fn connect_while_connected_redelivers_connected() {
    let identifier = SharedIdentifier::random();
    let (client, directory, _remotes) = client_for(identifier, single_peer(identifier));
    let (recorder, events) = Recorder::new();
    client.set_listener(&recorder);

    client.connect().unwrap();
    client.connect().unwrap();

    assert_eq!(next(&events), Seen::Connected("target".into()));
    assert_eq!(next(&events), Seen::Connected("target".into()));
    assert_quiet(&events);
    assert_eq!(directory.open_modes().len(), 1, "no second channel");
}

#[test]
fn reconnect_after_disconnect_reports_disconnect_first() {
    let identifier = SharedIdentifier::random();
    let (client, _directory, _remotes) = client_for(identifier, single_peer(identifier));
    let (recorder, events) = Recorder::new();
    client.set_listener(&recorder);

    client.connect().unwrap();
    assert_eq!(next(&events), Seen::Connected("target".into()));

    client.disconnect().unwrap();
    client.connect().unwrap();
    assert_eq!(next(&events), Seen::Disconnected("target".into()));
    assert_eq!(next(&events), Seen::Connected("target".into()));
}

#[test]
fn write_failure_disconnects_once() {
    let identifier = SharedIdentifier::random();
    let (client, _directory, remotes) = client_for(identifier, single_peer(identifier));
    let (recorder, events) = Recorder::new();
    client.set_listener(&recorder);

    client.connect().unwrap();
    assert_eq!(next(&events), Seen::Connected("target".into()));
    drop(remotes.recv_timeout(WAIT).unwrap());

    let mut failure = None;
    for _ in 0..256 {
        if let Err(err) = client.send("into the void") {
            failure = Some(err);
            break;
        }
    }
    assert!(matches!(
        failure,
        Some(PeerError::Codec(_)) | Some(PeerError::NotConnected)
    ));
    assert_eq!(next(&events), Seen::Disconnected("target".into()));
    assert_quiet(&events);
    assert!(!client.is_connected());
}

struct SwapOnConnect {
    manager: OnceLock<Arc<LineClient>>,
    replacement: Arc<Recorder>,
    seen: Mutex<Vec<String>>,
}

impl ConnectionListener<String> for SwapOnConnect {
    fn on_connected(&self, peer: &Peer) {
        self.seen.lock().unwrap().push(format!("connected:{}", peer.name()));
        if let Some(manager) = self.manager.get() {
            manager.set_listener(&self.replacement);
        }
    }

    fn on_message(&self, message: String) {
        self.seen.lock().unwrap().push(format!("message:{message}"));
    }
}

#[test]
fn listener_can_be_replaced_from_a_callback() {
    let identifier = SharedIdentifier::random();
    let (client, _directory, remotes) = client_for(identifier, single_peer(identifier));
    let client = Arc::new(client);
    let (replacement, events) = Recorder::new();
    let first = Arc::new(SwapOnConnect {
        manager: OnceLock::new(),
        replacement,
        seen: Mutex::new(Vec::new()),
    });
    assert!(first.manager.set(Arc::clone(&client)).is_ok());
    client.set_listener(&first);

    client.connect().unwrap();
    let mut remote = remotes.recv_timeout(WAIT).unwrap();
    write_line(&mut remote, "after swap");

    assert_eq!(next(&events), Seen::Message("after swap".into()));
    assert_eq!(*first.seen.lock().unwrap(), vec!["connected:target"]);

    client.teardown();
}

#[test]
fn dropped_listener_falls_back_to_stub() {
    let identifier = SharedIdentifier::random();
    let (client, _directory, remotes) = client_for(identifier, single_peer(identifier));
    let (recorder, events) = Recorder::new();
    client.set_listener(&recorder);
    drop(recorder);

    client.connect().unwrap();
    let mut remote = remotes.recv_timeout(WAIT).unwrap();
    write_line(&mut remote, "unheard");
    assert!(matches!(
        events.recv_timeout(QUIET),
        Err(std::sync::mpsc::RecvTimeoutError::Disconnected)
    ));

    let (recorder, events) = Recorder::new();
    client.set_listener(&recorder);
    client.connect().unwrap();
    assert_eq!(next(&events), Seen::Connected("target".into()));
}

#[test]
fn teardown_drains_events_and_rejects_further_calls() {
    let identifier = SharedIdentifier::random();
    let (client, _directory, _remotes) = client_for(identifier, single_peer(identifier));
    let (recorder, events) = Recorder::new();
    client.set_listener(&recorder);

    client.connect().unwrap();
    assert_eq!(next(&events), Seen::Connected("target".into()));

    client.teardown();
    assert_eq!(next(&events), Seen::Disconnected("target".into()));
    assert!(!client.is_connected());
    assert!(matches!(client.connect(), Err(PeerError::ShutDown)));
    client.teardown();
}

#[test]
fn start_warms_the_directory_up() {
    let identifier = SharedIdentifier::random();
    let (client, _directory, _remotes) = client_for(identifier, single_peer(identifier));
    client.start();
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[test]
fn client_manager_cannot_listen() {
    let (directory, _remotes) = ScriptedDirectory::new(Vec::new());
    let manager = ConnectionManager::<LineSender, LineReceiver>::new(
        Role::Client,
        SharedIdentifier::random(),
        directory,
        ManagerConfig::default(),
    )
    .unwrap();
    let err = manager.listen().unwrap_err();
    assert!(matches!(err, PeerError::WrongRole { expected: Role::Server }));
    assert!(err.is_invalid_state());
}

#[test]
fn callbacks_run_on_the_dispatch_thread() {
    let identifier = SharedIdentifier::random();
    let (directory, remotes) = ScriptedDirectory::new(single_peer(identifier));
    let config = ManagerConfig::default().with_thread_name_prefix("cbthread");
    let client = LineClient::new(identifier, directory.clone(), config).unwrap();
    let (recorder, events) = ThreadRecorder::new();
    let recorder = Arc::new(recorder);
    client.set_listener(&recorder);

    directory.fail_next_opens(2);
    client.connect().unwrap();
    let (seen, thread) = events.recv_timeout(WAIT).unwrap();
    assert!(matches!(seen, Seen::Failed(_)));
    assert_eq!(thread, "cbthread-dispatch");

    client.connect().unwrap();
    let (seen, thread) = events.recv_timeout(WAIT).unwrap();
    assert_eq!(seen, Seen::Connected("target".into()));
    assert_eq!(thread, "cbthread-dispatch");

    let mut remote = remotes.recv_timeout(WAIT).unwrap();
    write_line(&mut remote, "hi");
    let (seen, thread) = events.recv_timeout(WAIT).unwrap();
    assert_eq!(seen, Seen::Message("hi".into()));
    assert_eq!(thread, "cbthread-dispatch");

    drop(remote);
    let (seen, thread) = events.recv_timeout(WAIT).unwrap();
    assert_eq!(seen, Seen::Disconnected("target".into()));
    assert_eq!(thread, "cbthread-dispatch");
}
