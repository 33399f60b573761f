//! Connection management for pairlink.
//!
//! A [`ConnectionManager`] owns at most one [`PeerChannel`] to the peer
//! sharing its [`SharedIdentifier`](pairlink_transport::SharedIdentifier),
//! drives the connect/accept state machine on a worker thread, and reports
//! lifecycle events and inbound messages to a [`ConnectionListener`] in order
//! on a dedicated dispatch thread.
//!
//! Most applications use a role wrapper: [`ClientManager`] (connect on
//! demand) or [`ServerManager`] (accept loop with [`ServerHandler`] hooks).

pub mod callback;
pub mod channel;
pub mod client;
pub mod config;
mod dispatch;
pub mod error;
pub mod manager;
pub mod server;
pub mod state;

pub use callback::{ConnectionListener, StubListener};
pub use channel::PeerChannel;
pub use client::{ClientManager, LineClient};
pub use config::{ManagerConfig, DEFAULT_ACCEPT_RETRY_DELAY};
pub use error::{PeerError, Result};
pub use manager::ConnectionManager;
pub use server::{LineServer, ServerHandler, ServerManager};
pub use state::{ConnectionState, Role};
