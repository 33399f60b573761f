use std::fs;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use pairlink_peer::{ConnectionListener, LineClient, PeerError};
use pairlink_transport::Peer;
use tracing::debug;

use crate::cmd::{open_directory, parse_duration, SendArgs};
use crate::exit::{io_error, peer_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT};
use crate::output::{print_message, OutputFormat};

#[derive(Debug)]
enum ClientEvent {
    Connected(Peer),
    Failed(String, i32),
    Disconnected,
    Message(String),
}

struct Forwarder {
    tx: Mutex<Sender<ClientEvent>>,
}

impl Forwarder {
    fn forward(&self, event: ClientEvent) {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = tx.send(event);
    }
}

impl ConnectionListener<String> for Forwarder {
    fn on_connected(&self, peer: &Peer) {
        self.forward(ClientEvent::Connected(peer.clone()));
    }

    fn on_connection_failed(&self, error: &PeerError) {
        let mapped = peer_error("connect failed", error);
        self.forward(ClientEvent::Failed(mapped.message, mapped.code));
    }

    fn on_disconnected(&self, _peer: &Peer) {
        self.forward(ClientEvent::Disconnected);
    }

    fn on_message(&self, message: String) {
        self.forward(ClientEvent::Message(message));
    }
}

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let connect_timeout = parse_duration(&args.connect_timeout)?;
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let lines = resolve_lines(&args)?;

    let directory = open_directory(&args.endpoint.root, &args.name)?;
    let client = LineClient::new(
        args.endpoint.identifier,
        directory,
        args.endpoint.manager_config()?,
    )
    .map_err(|err| peer_error("client setup failed", &err))?;

    let (tx, rx) = mpsc::channel();
    let listener = Arc::new(Forwarder { tx: Mutex::new(tx) });
    client.set_listener(&listener);
    client.start();
    client
        .connect()
        .map_err(|err| peer_error("connect failed", &err))?;

    let result = exchange(&client, &rx, &lines, args.wait, connect_timeout, wait_timeout, format);
    client.teardown();
    result
}

fn exchange(
    client: &LineClient,
    events: &Receiver<ClientEvent>,
    lines: &[String],
    wait: bool,
    connect_timeout: Duration,
    wait_timeout: Duration,
    format: OutputFormat,
) -> CliResult<i32> {
    let peer = match next_event(events, connect_timeout, "connect")? {
        ClientEvent::Connected(peer) => peer,
        ClientEvent::Failed(message, code) => return Err(CliError::new(code, message)),
        other => {
            return Err(CliError::new(
                FAILURE,
                format!("unexpected event while connecting: {other:?}"),
            ))
        }
    };
    debug!(peer = %peer, lines = lines.len(), "connected, sending");

    for line in lines {
        client
            .send(line)
            .map_err(|err| peer_error("send failed", &err))?;
    }

    if wait {
        match next_event(events, wait_timeout, "reply")? {
            ClientEvent::Message(reply) => print_message(&reply, peer.name(), format),
            ClientEvent::Disconnected => {
                return Err(CliError::new(FAILURE, "peer disconnected before replying"))
            }
            other => {
                return Err(CliError::new(
                    FAILURE,
                    format!("unexpected event while waiting: {other:?}"),
                ))
            }
        }
    }

    Ok(SUCCESS)
}

fn next_event(
    events: &Receiver<ClientEvent>,
    timeout: Duration,
    what: &str,
) -> CliResult<ClientEvent> {
    match events.recv_timeout(timeout) {
        Ok(event) => Ok(event),
        Err(RecvTimeoutError::Timeout) => Err(CliError::new(
            TIMEOUT,
            format!("timed out after {timeout:?} waiting for {what}"),
        )),
        Err(RecvTimeoutError::Disconnected) => {
            Err(CliError::new(FAILURE, format!("event stream closed waiting for {what}")))
        }
    }
}

fn resolve_lines(args: &SendArgs) -> CliResult<Vec<String>> {
    let text = if let Some(data) = &args.data {
        data.clone()
    } else if let Some(path) = &args.file {
        fs::read_to_string(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), &err))?
    } else {
        String::new()
    };
    Ok(text.lines().map(str::to_string).collect())
}
