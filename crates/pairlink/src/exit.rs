use std::fmt;
use std::io;

use pairlink_codec::CodecError;
use pairlink_peer::PeerError;
use pairlink_transport::TransportError;

// sysexits-style exit codes.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: &io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: &TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::CredentialsRejected(_) => {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        TransportError::PathTooLong { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn codec_error(context: &str, err: &CodecError) -> CliError {
    match err {
        CodecError::Io(source) => io_error(context, source),
        CodecError::MessageTooLarge { .. } | CodecError::InvalidMagic => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        CodecError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn peer_error(context: &str, err: &PeerError) -> CliError {
    match err {
        PeerError::Transport(inner) => transport_error(context, inner),
        PeerError::ConnectFailed { source, .. } => {
            let mapped = transport_error(context, source);
            CliError::new(mapped.code, format!("{context}: {err}"))
        }
        PeerError::Codec(inner) => codec_error(context, inner),
        PeerError::LookupFailed { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        PeerError::NotConnected | PeerError::ShutDown => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        PeerError::AlreadyListening | PeerError::WrongRole { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        PeerError::Spawn(_) => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}
