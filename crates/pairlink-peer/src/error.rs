use pairlink_codec::CodecError;
use pairlink_transport::{SharedIdentifier, TransportError};

use crate::state::Role;

/// Errors that can occur in connection management.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Codec-level error while sending.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// No candidate peer advertises the identifier.
    #[error("no peer advertises {identifier}")]
    LookupFailed { identifier: SharedIdentifier },

    /// Every open mode failed for the resolved peer.
    #[error("failed to open a channel to {peer}: {source}")]
    ConnectFailed {
        peer: String,
        #[source]
        source: TransportError,
    },

    /// The operation needs a live channel.
    #[error("not connected")]
    NotConnected,

    /// The accept loop is already running.
    #[error("already listening")]
    AlreadyListening,

    /// The manager has been torn down.
    #[error("connection manager is shut down")]
    ShutDown,

    /// The operation belongs to the other role.
    #[error("operation requires the {expected} role")]
    WrongRole { expected: Role },

    /// A worker thread could not be started.
    #[error("failed to spawn thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl PeerError {
    /// Whether the call was rejected because of the manager's state rather
    /// than a transport or codec failure.
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            PeerError::NotConnected
                | PeerError::AlreadyListening
                | PeerError::ShutDown
                | PeerError::WrongRole { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;
