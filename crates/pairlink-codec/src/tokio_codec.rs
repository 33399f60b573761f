//! `tokio_util::codec` adapters speaking the same wire formats as the
//! blocking senders and receivers.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{CodecConfig, RAW_BLOCK_SIZE};
use crate::error::{CodecError, Result};
use crate::framed::{decode_frame, encode_frame};
use crate::line::TERMINATOR;

/// Newline-delimited UTF-8 text.
#[derive(Debug, Clone, Default)]
pub struct LineCodec {
    config: CodecConfig,
    scanned: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CodecConfig) -> Self {
        Self { config, scanned: 0 }
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        let max = self.config.max_message_size;
        match src[self.scanned..].iter().position(|b| *b == TERMINATOR) {
            Some(offset) => {
                let end = self.scanned + offset;
                self.scanned = 0;
                if end > max {
                    return Err(CodecError::MessageTooLarge { size: end, max });
                }
                let line = src.split_to(end + 1);
                Ok(Some(String::from_utf8_lossy(&line[..end]).into_owned()))
            }
            None => {
                self.scanned = src.len();
                if src.len() > max {
                    return Err(CodecError::MessageTooLarge {
                        size: src.len(),
                        max,
                    });
                }
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if !src.is_empty() {
            tracing::debug!(pending = src.len(), "discarding unterminated line at end of stream");
            src.clear();
            self.scanned = 0;
        }
        Ok(None)
    }
}

impl Encoder<&str> for LineCodec {
    type Error = CodecError;

    fn encode(&mut self, item: &str, dst: &mut BytesMut) -> Result<()> {
        if item.len() > self.config.max_message_size {
            return Err(CodecError::MessageTooLarge {
                size: item.len(),
                max: self.config.max_message_size,
            });
        }
        dst.reserve(item.len() + 1);
        dst.extend_from_slice(item.as_bytes());
        dst.extend_from_slice(&[TERMINATOR]);
        Ok(())
    }
}

impl Encoder<String> for LineCodec {
    type Error = CodecError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        Encoder::<&str>::encode(self, item.as_str(), dst)
    }
}

/// Unframed byte blocks of at most `block_size` bytes.
#[derive(Debug, Clone)]
pub struct RawCodec {
    block_size: usize,
}

impl Default for RawCodec {
    fn default() -> Self {
        Self {
            block_size: RAW_BLOCK_SIZE,
        }
    }
}

impl RawCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block_size(block_size: usize) -> Self {
        Self {
            block_size: block_size.max(1),
        }
    }
}

impl Decoder for RawCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if src.is_empty() {
            return Ok(None);
        }
        let n = src.len().min(self.block_size);
        Ok(Some(src.split_to(n).freeze()))
    }
}

impl Encoder<Bytes> for RawCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}

/// Length-prefixed frames with the "PL" magic.
#[derive(Debug, Clone, Default)]
pub struct FramedCodec {
    config: CodecConfig,
}

impl FramedCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CodecConfig) -> Self {
        Self { config }
    }
}

impl Decoder for FramedCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        decode_frame(src, self.config.max_message_size)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if !src.is_empty() {
            tracing::debug!(pending = src.len(), "discarding incomplete frame at end of stream");
            src.clear();
        }
        Ok(None)
    }
}

impl Encoder<Bytes> for FramedCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        if item.len() > self.config.max_message_size {
            return Err(CodecError::MessageTooLarge {
                size: item.len(),
                max: self.config.max_message_size,
            });
        }
        encode_frame(&item, dst)
    }
}
