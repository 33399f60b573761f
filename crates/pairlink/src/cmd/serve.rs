use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use pairlink_peer::{LineServer, ServerHandler};
use pairlink_transport::Peer;
use tracing::{info, warn};

use crate::cmd::{open_directory, ServeArgs};
use crate::exit::{peer_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_message, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

enum ServerEvent {
    Connected(Peer),
    Disconnected(Peer),
    Message(String),
}

/// Hands events to the main thread, which owns the server.
struct Forwarder {
    tx: Mutex<Sender<ServerEvent>>,
}

impl Forwarder {
    fn forward(&self, event: ServerEvent) {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = tx.send(event);
    }
}

impl ServerHandler<String> for Forwarder {
    fn on_connected(&self, peer: &Peer) {
        self.forward(ServerEvent::Connected(peer.clone()));
    }

    fn on_disconnected(&self, peer: &Peer) {
        self.forward(ServerEvent::Disconnected(peer.clone()));
    }

    fn on_message(&self, message: String) {
        self.forward(ServerEvent::Message(message));
    }
}

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let directory = open_directory(&args.endpoint.root, &args.name)?;
    let (tx, rx) = mpsc::channel();
    let server = LineServer::new(
        args.endpoint.identifier,
        directory,
        args.endpoint.manager_config()?,
        Forwarder { tx: Mutex::new(tx) },
    )
    .map_err(|err| peer_error("server setup failed", &err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    server
        .start()
        .map_err(|err| peer_error("listen failed", &err))?;
    info!(identifier = %args.endpoint.identifier, name = %args.name, "serving");

    let mut current: Option<Peer> = None;
    let mut received = 0usize;
    while running.load(Ordering::SeqCst) {
        let event = match rx.recv_timeout(POLL_INTERVAL) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        match event {
            ServerEvent::Connected(peer) => {
                info!(peer = %peer, "client connected");
                current = Some(peer);
            }
            ServerEvent::Disconnected(peer) => {
                info!(peer = %peer, "client disconnected");
                current = None;
            }
            ServerEvent::Message(message) => {
                let from = current.as_ref().map_or("-", Peer::name);
                print_message(&message, from, format);
                if args.echo {
                    if let Err(err) = server.send(&message) {
                        warn!(error = %err, "echo failed");
                    }
                }
                received = received.saturating_add(1);
                if args.count.is_some_and(|count| received >= count) {
                    break;
                }
            }
        }
    }

    server.teardown();
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
