use std::sync::Arc;

use pairlink_codec::{LineReceiver, LineSender, MessageReceiver, MessageSender};
use pairlink_transport::{Peer, PeerDirectory, SharedIdentifier};

use crate::callback::ConnectionListener;
use crate::config::ManagerConfig;
use crate::error::{PeerError, Result};
use crate::manager::ConnectionManager;
use crate::state::{ConnectionState, Role};

/// Hooks a server-role application implements.
///
/// Called in order on the manager's dispatch thread.
pub trait ServerHandler<M>: Send + Sync + 'static {
    fn on_connected(&self, peer: &Peer);

    fn on_disconnected(&self, peer: &Peer);

    fn on_message(&self, message: M);
}

struct HandlerAdapter<H>(H);

impl<M, H: ServerHandler<M>> ConnectionListener<M> for HandlerAdapter<H> {
    fn on_connected(&self, peer: &Peer) {
        self.0.on_connected(peer);
    }

    fn on_connection_failed(&self, error: &PeerError) {
        tracing::debug!(error = %error, "server connection attempt failed");
    }

    fn on_disconnected(&self, peer: &Peer) {
        self.0.on_disconnected(peer);
    }

    fn on_message(&self, message: M) {
        self.0.on_message(message);
    }
}

/// Server role: accepts one channel at a time and goes back to listening
/// when it ends.
pub struct ServerManager<S: MessageSender, R: MessageReceiver, H> {
    inner: ConnectionManager<S, R>,
    handler: Arc<HandlerAdapter<H>>,
}

/// Server exchanging newline-delimited text.
pub type LineServer<H> = ServerManager<LineSender, LineReceiver, H>;

impl<S, R, H> ServerManager<S, R, H>
where
    S: MessageSender + Default,
    R: MessageReceiver + Default,
    H: ServerHandler<R::Message>,
{
    pub fn new(
        identifier: SharedIdentifier,
        directory: Arc<dyn PeerDirectory>,
        config: ManagerConfig,
        handler: H,
    ) -> Result<Self> {
        let inner = ConnectionManager::new(Role::Server, identifier, directory, config)?;
        Ok(Self::wire(inner, handler))
    }
}

impl<S, R, H> ServerManager<S, R, H>
where
    S: MessageSender,
    R: MessageReceiver,
    H: ServerHandler<R::Message>,
{
    pub fn with_codecs(
        identifier: SharedIdentifier,
        directory: Arc<dyn PeerDirectory>,
        config: ManagerConfig,
        handler: H,
        codecs: impl Fn() -> (S, R) + Send + Sync + 'static,
    ) -> Result<Self> {
        let inner =
            ConnectionManager::with_codecs(Role::Server, identifier, directory, config, codecs)?;
        Ok(Self::wire(inner, handler))
    }

    fn wire(inner: ConnectionManager<S, R>, handler: H) -> Self {
        let handler = Arc::new(HandlerAdapter(handler));
        inner.set_listener(&handler);
        Self { inner, handler }
    }

    /// Start the accept loop. Calling it twice is an error.
    pub fn start(&self) -> Result<()> {
        self.inner.listen()
    }

    pub fn handler(&self) -> &H {
        &self.handler.0
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    pub fn peer(&self) -> Option<Peer> {
        self.inner.peer()
    }

    pub fn send(&self, message: &S::Message) -> Result<()> {
        self.inner.send(message)
    }

    /// Drop the current channel; the accept loop then listens again.
    pub fn disconnect(&self) -> Result<()> {
        self.inner.disconnect()
    }

    pub fn teardown(&self) {
        self.inner.teardown();
    }
}
