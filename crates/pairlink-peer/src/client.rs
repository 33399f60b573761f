use std::sync::Arc;

use pairlink_codec::{LineReceiver, LineSender, MessageReceiver, MessageSender};
use pairlink_transport::{Peer, PeerDirectory, SharedIdentifier};

use crate::callback::ConnectionListener;
use crate::config::ManagerConfig;
use crate::error::Result;
use crate::manager::ConnectionManager;
use crate::state::{ConnectionState, Role};

/// Client role: finds the peer advertising the identifier and opens the
/// channel on demand.
pub struct ClientManager<S: MessageSender, R: MessageReceiver> {
    inner: ConnectionManager<S, R>,
}

/// Client exchanging newline-delimited text.
pub type LineClient = ClientManager<LineSender, LineReceiver>;

impl<S, R> ClientManager<S, R>
where
    S: MessageSender + Default,
    R: MessageReceiver + Default,
{
    pub fn new(
        identifier: SharedIdentifier,
        directory: Arc<dyn PeerDirectory>,
        config: ManagerConfig,
    ) -> Result<Self> {
        Ok(Self {
            inner: ConnectionManager::new(Role::Client, identifier, directory, config)?,
        })
    }
}

impl<S: MessageSender, R: MessageReceiver> ClientManager<S, R> {
    pub fn with_codecs(
        identifier: SharedIdentifier,
        directory: Arc<dyn PeerDirectory>,
        config: ManagerConfig,
        codecs: impl Fn() -> (S, R) + Send + Sync + 'static,
    ) -> Result<Self> {
        Ok(Self {
            inner: ConnectionManager::with_codecs(Role::Client, identifier, directory, config, codecs)?,
        })
    }

    /// Warm the directory up. Failures are logged only.
    pub fn start(&self) {
        self.inner.warm_up();
    }

    pub fn set_listener<L>(&self, listener: &Arc<L>)
    where
        L: ConnectionListener<R::Message> + 'static,
    {
        self.inner.set_listener(listener);
    }

    pub fn clear_listener(&self) {
        self.inner.clear_listener();
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

    /// See [`ConnectionManager::connect`].
    pub fn connect(&self) -> Result<()> {
        self.inner.connect()
    }

    pub fn disconnect(&self) -> Result<()> {
        self.inner.disconnect()
    }

    pub fn send(&self, message: &S::Message) -> Result<()> {
        self.inner.send(message)
    }

    pub fn teardown(&self) {
        self.inner.teardown();
    }
}
