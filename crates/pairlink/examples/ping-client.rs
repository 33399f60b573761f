//! Connects to the `echo-server` example, sends one line and prints the reply.

use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pairlink::peer::{ConnectionListener, LineClient, ManagerConfig, PeerError};
use pairlink::transport::{Peer, SharedIdentifier, SocketDirectory};

const DEMO_IDENTIFIER: &str = "7c1b8a1e-6a3f-4c59-9d21-0f3b5c2e9a44";
const DEMO_ROOT: &str = "/tmp/pairlink-demo";

enum Event {
    Connected,
    Failed(String),
    Reply(String),
}

struct Printer {
    tx: Mutex<Sender<Event>>,
}

impl Printer {
    fn forward(&self, event: Event) {
        if let Ok(tx) = self.tx.lock() {
            let _ = tx.send(event);
        }
    }
}

impl ConnectionListener<String> for Printer {
    fn on_connected(&self, peer: &Peer) {
        eprintln!("Connected to {peer}");
        self.forward(Event::Connected);
    }

    fn on_connection_failed(&self, error: &PeerError) {
        self.forward(Event::Failed(error.to_string()));
    }

    fn on_message(&self, message: String) {
        self.forward(Event::Reply(message));
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let identifier: SharedIdentifier = DEMO_IDENTIFIER.parse()?;
    let directory = Arc::new(SocketDirectory::new(DEMO_ROOT, "ping-client"));
    let client = LineClient::new(identifier, directory, ManagerConfig::default())?;

    let (tx, rx) = mpsc::channel();
    let printer = Arc::new(Printer { tx: Mutex::new(tx) });
    client.set_listener(&printer);
    client.start();
    client.connect()?;

    let timeout = Duration::from_secs(5);
    match rx.recv_timeout(timeout)? {
        Event::Connected => {}
        Event::Failed(reason) => return Err(reason.into()),
        Event::Reply(_) => return Err("reply before connect".into()),
    }

    client.send("ping")?;
    if let Event::Reply(reply) = rx.recv_timeout(timeout)? {
        println!("{reply}");
    }

    client.disconnect()?;
    client.teardown();
    Ok(())
}
