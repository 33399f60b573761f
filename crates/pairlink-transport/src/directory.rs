use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::Result;
use crate::identifier::SharedIdentifier;
use crate::peer::{OpenMode, Peer};
use crate::stream::DuplexStream;

/// The facility that knows which peers exist and how to reach them.
///
/// Implementations wrap whatever enumerates endpoints on a platform. Callers
/// must [`refresh`](PeerDirectory::refresh) a peer before trusting the result
/// of [`resolve`](PeerDirectory::resolve).
pub trait PeerDirectory: Send + Sync {
    /// Candidate peers in the directory's enumeration order.
    fn list_candidates(&self) -> Result<Vec<Peer>>;

    /// Re-read the identifiers a peer advertises.
    fn refresh(&self, peer: &Peer) -> Result<()>;

    /// Identifiers advertised by `peer` as of its last refresh.
    fn resolve(&self, peer: &Peer) -> Result<HashSet<SharedIdentifier>>;

    /// Open a duplex stream to `peer` for `identifier`.
    fn open(&self, peer: &Peer, identifier: &SharedIdentifier, mode: OpenMode)
        -> Result<DuplexStream>;

    /// Start listening for inbound streams for `identifier`.
    fn listen(&self, identifier: &SharedIdentifier) -> Result<Box<dyn PeerAcceptor>>;

    /// Refresh every known candidate.
    ///
    /// Individual refresh failures are logged and skipped.
    fn warm_up(&self) -> Result<()> {
        let candidates = self.list_candidates()?;
        debug!(count = candidates.len(), "warming up peer directory");
        for peer in &candidates {
            if let Err(err) = self.refresh(peer) {
                warn!(peer = %peer, error = %err, "peer refresh failed during warm-up");
            }
        }
        Ok(())
    }
}

/// A listening endpoint that yields inbound streams.
pub trait PeerAcceptor: Send + Sync {
    /// Block until a peer connects.
    ///
    /// Returns [`TransportError::Shutdown`](crate::TransportError::Shutdown)
    /// once [`close`](PeerAcceptor::close) has been called.
    fn accept(&self) -> Result<(DuplexStream, Peer)>;

    /// Stop accepting. Idempotent, callable from any thread, and unblocks a
    /// pending [`accept`](PeerAcceptor::accept).
    fn close(&self);
}

/// Find the first candidate advertising `identifier`, refreshing each one
/// before reading its identifiers. Candidates that fail to refresh or
/// resolve are skipped.
pub fn find_peer(
    directory: &dyn PeerDirectory,
    identifier: &SharedIdentifier,
) -> Result<Option<Peer>> {
    for peer in directory.list_candidates()? {
        if let Err(err) = directory.refresh(&peer) {
            debug!(peer = %peer, error = %err, "skipping peer that failed to refresh");
            continue;
        }
        let advertised = match directory.resolve(&peer) {
            Ok(advertised) => advertised,
            Err(err) => {
                debug!(peer = %peer, error = %err, "skipping peer that failed to resolve");
                continue;
            }
        };
        if advertised.contains(identifier) {
            debug!(peer = %peer, identifier = %identifier, "resolved peer");
            return Ok(Some(peer));
        }
    }
    Ok(None)
}
