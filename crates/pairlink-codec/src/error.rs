/// Errors that can occur while encoding or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// `send` or `read_next` was called before a stream was bound.
    #[error("codec is not bound to a stream")]
    NotBound,

    /// A message exceeds the configured maximum size.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// A length-prefixed frame header contains an invalid magic number.
    #[error("invalid frame magic (expected 0x504C \"PL\")")]
    InvalidMagic,

    /// An I/O error occurred while reading or writing.
    #[error("codec I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream stopped accepting bytes.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, CodecError>;
