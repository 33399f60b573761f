use std::fmt;

use serde::Serialize;

/// A connectable endpoint as reported by a [`PeerDirectory`](crate::PeerDirectory).
///
/// Peers are owned by the directory; callers hold them only transiently while
/// resolving and opening.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Peer {
    name: String,
    address: String,
}

impl Peer {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    /// Directory-assigned display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Opaque transport address.
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// How a stream to a peer is opened.
///
/// Connect attempts start in [`OpenMode::Verified`] and fall back once to
/// [`OpenMode::Unverified`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    /// Require the remote end to pass the directory's credential check.
    Verified,
    /// Open without a credential check.
    Unverified,
}

impl OpenMode {
    /// The mode to retry with after this one failed, if any.
    pub fn fallback(self) -> Option<Self> {
        match self {
            OpenMode::Verified => Some(OpenMode::Unverified),
            OpenMode::Unverified => None,
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenMode::Verified => f.write_str("verified"),
            OpenMode::Unverified => f.write_str("unverified"),
        }
    }
}
