//! Minimal echo server: accepts one client at a time and echoes lines back.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal:
//!   cargo run --example ping-client

use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};

use pairlink::peer::{LineServer, ManagerConfig, ServerHandler};
use pairlink::transport::{Peer, SharedIdentifier, SocketDirectory};

/// Identifier shared with the `ping-client` example.
const DEMO_IDENTIFIER: &str = "7c1b8a1e-6a3f-4c59-9d21-0f3b5c2e9a44";
const DEMO_ROOT: &str = "/tmp/pairlink-demo";

struct Echo {
    lines: Mutex<Sender<String>>,
}

impl ServerHandler<String> for Echo {
    fn on_connected(&self, peer: &Peer) {
        eprintln!("Client connected: {peer}");
    }

    fn on_disconnected(&self, peer: &Peer) {
        eprintln!("Client disconnected: {peer}");
    }

    fn on_message(&self, message: String) {
        if let Ok(tx) = self.lines.lock() {
            let _ = tx.send(message);
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let identifier: SharedIdentifier = DEMO_IDENTIFIER.parse()?;
    let directory = Arc::new(SocketDirectory::new(DEMO_ROOT, "echo-server"));

    let (tx, rx) = mpsc::channel();
    let server = LineServer::new(
        identifier,
        directory,
        ManagerConfig::default(),
        Echo {
            lines: Mutex::new(tx),
        },
    )?;
    server.start()?;
    eprintln!("Listening under {DEMO_ROOT} for {identifier}");

    // Replies go out from the main thread; the handler only forwards.
    for line in rx {
        eprintln!("Received {line:?}");
        if let Err(err) = server.send(&line) {
            eprintln!("Echo failed: {err}");
        }
    }

    server.teardown();
    Ok(())
}
