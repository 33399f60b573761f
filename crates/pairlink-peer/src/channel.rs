use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use pairlink_codec::{MessageReceiver, MessageSender};
use pairlink_transport::{DuplexStream, Peer};
use tracing::debug;

use crate::config::ManagerConfig;
use crate::error::{PeerError, Result};

/// One live connection: the stream, the remote peer and the bound sender.
///
/// The receiving half is handed out once by [`establish`](Self::establish)
/// for the reader loop. Closing shuts the socket down, which ends that loop.
pub struct PeerChannel<S> {
    peer: Peer,
    stream: DuplexStream,
    sender: Mutex<S>,
    open: AtomicBool,
}

impl<S: MessageSender> PeerChannel<S> {
    /// Bind `sender` and `receiver` to `stream` and wrap it as a channel.
    pub fn establish<R: MessageReceiver>(
        stream: DuplexStream,
        peer: Peer,
        mut sender: S,
        mut receiver: R,
        config: &ManagerConfig,
    ) -> Result<(Self, R)> {
        stream.set_write_timeout(config.write_timeout)?;
        sender.bind(Box::new(stream.try_clone()?));
        receiver.bind(Box::new(stream.try_clone()?));
        debug!(peer = %peer, "channel established");
        Ok((
            Self {
                peer,
                stream,
                sender: Mutex::new(sender),
                open: AtomicBool::new(true),
            },
            receiver,
        ))
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Write one message. Concurrent callers are serialized.
    pub fn send(&self, message: &S::Message) -> Result<()> {
        if !self.is_open() {
            return Err(PeerError::NotConnected);
        }
        let mut sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        sender.send(message)?;
        Ok(())
    }

    /// Shut the stream down. Idempotent and callable from any thread.
    pub fn close(&self) {
        if !self.open.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Err(err) = self.stream.shutdown() {
            debug!(peer = %self.peer, error = %err, "stream shutdown failed");
        }
        debug!(peer = %self.peer, "channel closed");
    }
}

impl<S> Drop for PeerChannel<S> {
    fn drop(&mut self) {
        if self.open.swap(false, Ordering::AcqRel) {
            let _ = self.stream.shutdown();
        }
    }
}
