//! Peer discovery and duplex byte streams for pairlink.
//!
//! This is the lowest layer. It defines what a peer is, how peers advertise a
//! [`SharedIdentifier`], and the [`PeerDirectory`] interface the connection
//! manager consumes to find, open and accept [`DuplexStream`]s.
//!
//! A Unix-socket backed [`SocketDirectory`] is provided for local use and
//! tests; platform facilities (Bluetooth, named pipes, ...) plug in by
//! implementing [`PeerDirectory`].

pub mod directory;
pub mod error;
pub mod identifier;
pub mod peer;
pub mod stream;

#[cfg(unix)]
pub mod socket_directory;

pub use directory::{find_peer, PeerAcceptor, PeerDirectory};
pub use error::{Result, TransportError};
pub use identifier::SharedIdentifier;
pub use peer::{OpenMode, Peer};
pub use stream::DuplexStream;

#[cfg(unix)]
pub use socket_directory::{SocketAcceptor, SocketDirectory};
