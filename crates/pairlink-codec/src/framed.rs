//! Length-prefixed binary messages.
//!
//! Unlike [`raw`](crate::raw), message boundaries survive the trip: each
//! payload is delivered exactly as it was sent.

use std::io::{Read, Write};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{CodecConfig, MessageReceiver, MessageSender};
use crate::error::{CodecError, Result};
use crate::io::{BoundInput, BoundOutput, Fill};

/// Frame header: magic (2) + length (4) = 6 bytes.
pub const HEADER_SIZE: usize = 6;

/// Magic bytes: "PL" (0x50 0x4C).
pub const MAGIC: [u8; 2] = [0x50, 0x4C];

/// Encode one payload into the wire format.
///
/// ```text
/// ┌──────────────┬───────────┬─────────────────┐
/// │ Magic (2B)   │ Length    │ Payload         │
/// │ 0x50 0x4C    │ (4B LE)   │ (Length bytes)  │
/// │ "PL"         │           │                 │
/// └──────────────┴───────────┴─────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(CodecError::MessageTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Decode one frame from the front of `src`.
///
/// Returns `Ok(None)` until a complete frame is buffered. On success the
/// frame's bytes are consumed from `src`.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Bytes>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }
    if src[0..2] != MAGIC {
        return Err(CodecError::InvalidMagic);
    }

    let payload_len = u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize;
    if payload_len > max_payload {
        return Err(CodecError::MessageTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }
    if src.len() < HEADER_SIZE + payload_len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    Ok(Some(src.split_to(payload_len).freeze()))
}

/// Writes byte slices as length-prefixed frames.
pub struct FramedSender {
    output: BoundOutput,
    config: CodecConfig,
}

impl Default for FramedSender {
    fn default() -> Self {
        Self::new()
    }
}

impl FramedSender {
    pub fn new() -> Self {
        Self::with_config(CodecConfig::default())
    }

    pub fn with_config(config: CodecConfig) -> Self {
        Self {
            output: BoundOutput::new(),
            config,
        }
    }
}

impl MessageSender for FramedSender {
    type Message = [u8];

    fn bind(&mut self, output: Box<dyn Write + Send>) {
        self.output.bind(output);
    }

    fn is_bound(&self) -> bool {
        self.output.is_bound()
    }

    fn send(&mut self, message: &[u8]) -> Result<()> {
        if message.len() > self.config.max_message_size {
            return Err(CodecError::MessageTooLarge {
                size: message.len(),
                max: self.config.max_message_size,
            });
        }
        self.output.write_encoded(|buf| encode_frame(message, buf))
    }
}

/// Reads length-prefixed frames, yielding each payload as [`Bytes`].
pub struct FramedReceiver {
    input: BoundInput,
    config: CodecConfig,
}

impl Default for FramedReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl FramedReceiver {
    pub fn new() -> Self {
        Self::with_config(CodecConfig::default())
    }

    pub fn with_config(config: CodecConfig) -> Self {
        Self {
            input: BoundInput::new(config.read_chunk_size),
            config,
        }
    }
}

impl MessageReceiver for FramedReceiver {
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
                let max = self.config.max_message_size;
                while let Some(payload) = decode_frame(self.input.buffer(), max)? {
                    on_message(payload);
                }
                Ok(true)
            }
            Fill::Idle => Ok(true),
            Fill::Eof => {
                let pending = self.input.buffer().len();
                if pending > 0 {
                    tracing::debug!(pending, "discarding incomplete frame at end of stream");
                    self.input.buffer().clear();
                }
                Ok(false)
            }
        }
    }
}
