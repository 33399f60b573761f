//! Paired peer connections with ordered callbacks.
//!
//! Two processes that share a [`SharedIdentifier`](transport::SharedIdentifier)
//! find each other through a peer directory, open one duplex channel, and
//! exchange typed messages over a pluggable codec.
//!
//! # Crate Structure
//!
//! - [`transport`]: identifiers, peers, duplex streams and the peer directory
//! - [`codec`]: line, raw-block and length-prefixed message codecs
//! - [`peer`]: connection manager, listeners and client/server roles (behind
//!   `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use pairlink_transport::*;
}

/// Re-export codec types.
pub mod codec {
    pub use pairlink_codec::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use pairlink_peer::*;
}
