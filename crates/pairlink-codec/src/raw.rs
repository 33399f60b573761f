//! Unframed byte blocks.
//!
//! The sender writes bytes verbatim. The receiver yields whatever each read
//! returned, at most [`RAW_BLOCK_SIZE`] bytes by default, so message
//! boundaries on the wire are not preserved.

use std::io::{Read, Write};

use bytes::Bytes;

use crate::codec::{CodecConfig, MessageReceiver, MessageSender, RAW_BLOCK_SIZE};
use crate::error::Result;
use crate::io::{BoundInput, BoundOutput, Fill};

/// Writes byte slices verbatim.
pub struct RawSender {
    output: BoundOutput,
}

impl Default for RawSender {
    fn default() -> Self {
        Self::new()
    }
}

impl RawSender {
    pub fn new() -> Self {
        Self {
            output: BoundOutput::new(),
        }
    }
}

impl MessageSender for RawSender {
    type Message = [u8];

    fn bind(&mut self, output: Box<dyn Write + Send>) {
        self.output.bind(output);
    }

    fn is_bound(&self) -> bool {
        self.output.is_bound()
    }

    fn send(&mut self, message: &[u8]) -> Result<()> {
        self.output.write_encoded(|buf| {
            buf.extend_from_slice(message);
            Ok(())
        })
    }
}

/// Yields one [`Bytes`] block per successful read.
pub struct RawReceiver {
    input: BoundInput,
}

impl Default for RawReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl RawReceiver {
    pub fn new() -> Self {
        Self::with_block_size(RAW_BLOCK_SIZE)
    }

    /// Receiver reading up to `block_size` bytes per call.
    pub fn with_block_size(block_size: usize) -> Self {
        Self {
            input: BoundInput::new(block_size),
        }
    }

    /// Receiver using `config.read_chunk_size` as the block size.
    pub fn with_config(config: &CodecConfig) -> Self {
        Self::with_block_size(config.read_chunk_size)
    }
}

impl MessageReceiver for RawReceiver {
    type Message = Bytes;

    fn bind(&mut self, input: Box<dyn Read + Send>) {
        self.input.bind(input);
    }

    fn is_bound(&self) -> bool {
        self.input.is_bound()
    }

    fn read_next(&mut self, on_message: &mut dyn FnMut(Bytes)) -> Result<bool> {
        match self.input.fill()? {
            Fill::Data(_) => {
                let block = self.input.buffer().split().freeze();
                on_message(block);
                Ok(true)
            }
            Fill::Idle => Ok(true),
            Fill::Eof => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::error::CodecError;
    use crate::io::test_support::*;

    #[test]
    fn sender_writes_bytes_verbatim() {
        let sink = SharedSink::default();
        let mut sender = RawSender::new();
        sender.bind(Box::new(sink.clone()));
        sender.send(b"\x00\x01binary\xff").unwrap();
        assert_eq!(sink.contents(), b"\x00\x01binary\xff");
    }

    #[test]
    fn receiver_splits_into_blocks() {
        let payload: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
        let mut receiver = RawReceiver::new();
        receiver.bind(Box::new(Cursor::new(payload.clone())));

        let mut blocks = Vec::new();
        while receiver.read_next(&mut |b| blocks.push(b)).unwrap() {}

        let sizes: Vec<usize> = blocks.iter().map(Bytes::len).collect();
        assert_eq!(sizes, vec![1024, 1024, 452]);
        assert_eq!(blocks.concat(), payload);
    }

    #[test]
    fn short_reads_yield_short_blocks() {
        let mut receiver = RawReceiver::new();
        receiver.bind(Box::new(ByteByByteReader::new(b"abc".to_vec())));

        let mut blocks = Vec::new();
        while receiver.read_next(&mut |b| blocks.push(b)).unwrap() {}
        assert_eq!(blocks, vec![Bytes::from_static(b"a"), Bytes::from_static(b"b"), Bytes::from_static(b"c")]);
    }

    #[test]
    fn unbound_halves_fail() {
        let mut sender = RawSender::new();
        assert!(matches!(sender.send(b"x"), Err(CodecError::NotBound)));
        let mut receiver = RawReceiver::new();
        assert!(!receiver.is_bound());
        assert!(matches!(receiver.read_next(&mut |_| {}), Err(CodecError::NotBound)));
    }

    #[test]
    fn custom_block_size() {
        let mut receiver = RawReceiver::with_config(&CodecConfig::default().with_read_chunk_size(4));
        receiver.bind(Box::new(Cursor::new(b"abcdefghij".to_vec())));
        let mut blocks = Vec::new();
        while receiver.read_next(&mut |b| blocks.push(b)).unwrap() {}
        assert_eq!(blocks.len(), 3);
    }
}
