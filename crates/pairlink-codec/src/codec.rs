use std::io::{Read, Write};

use crate::error::Result;

/// Default maximum message size: 16 MiB.
pub const DEFAULT_MAX_MESSAGE: usize = 16 * 1024 * 1024;

/// Default read size for buffered decoders.
pub const DEFAULT_READ_CHUNK: usize = 8 * 1024;

/// Read size used by the raw block decoder.
pub const RAW_BLOCK_SIZE: usize = 1024;

/// Encodes typed messages onto the output half of a duplex stream.
///
/// A sender is created unbound, bound once per channel, and then used for
/// every outgoing message on that channel. Implementations must return an
/// error, never panic, when used unbound or after the stream has closed.
pub trait MessageSender: Send + 'static {
    /// The application message type.
    type Message: ?Sized;

    /// Attach the stream this sender writes to.
    fn bind(&mut self, output: Box<dyn Write + Send>);

    /// Whether [`bind`](MessageSender::bind) has been called.
    fn is_bound(&self) -> bool;

    /// Encode and write one message (blocking).
    fn send(&mut self, message: &Self::Message) -> Result<()>;
}

/// Decodes typed messages from the input half of a duplex stream.
pub trait MessageReceiver: Send + 'static {
    /// The application message type.
    type Message: Send + 'static;

    /// Attach the stream this receiver reads from.
    fn bind(&mut self, input: Box<dyn Read + Send>);

    /// Whether [`bind`](MessageReceiver::bind) has been called.
    fn is_bound(&self) -> bool;

    /// Perform one blocking read and hand every complete message to
    /// `on_message`, in order.
    ///
    /// Returns `Ok(true)` while the stream is still usable and `Ok(false)`
    /// once it reached end of stream. Callers stop reading on `Ok(false)` or
    /// any error.
    fn read_next(&mut self, on_message: &mut dyn FnMut(Self::Message)) -> Result<bool>;
}

/// Configuration shared by the codec implementations.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Largest message accepted in either direction. Default: 16 MiB.
    pub max_message_size: usize,
    /// Bytes requested from the stream per read.
    pub read_chunk_size: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE,
            read_chunk_size: DEFAULT_READ_CHUNK,
        }
    }
}

impl CodecConfig {
    /// Override the maximum message size.
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Override the per-read chunk size. Zero is clamped to one byte.
    pub fn with_read_chunk_size(mut self, read_chunk_size: usize) -> Self {
        self.read_chunk_size = read_chunk_size.max(1);
        self
    }
}
