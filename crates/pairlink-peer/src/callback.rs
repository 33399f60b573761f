use pairlink_transport::Peer;

use crate::error::PeerError;

/// Receives connection lifecycle events and inbound messages.
///
/// Every method defaults to a no-op, so implementors override only what they
/// need. All calls for one manager happen in order on its dispatch thread;
/// callbacks may call back into the manager, including `set_listener`.
pub trait ConnectionListener<M>: Send + Sync {
    /// A channel to `peer` is open.
    fn on_connected(&self, peer: &Peer) {
        let _ = peer;
    }

    /// A connect attempt ended without a channel.
    fn on_connection_failed(&self, error: &PeerError) {
        let _ = error;
    }

    /// The channel to `peer` is gone. Sent once per completed connection.
    fn on_disconnected(&self, peer: &Peer) {
        let _ = peer;
    }

    /// A message arrived on the channel.
    fn on_message(&self, message: M) {
        let _ = message;
    }
}

/// Listener that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubListener;

impl<M> ConnectionListener<M> for StubListener {}
