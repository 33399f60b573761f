//! Line-delimited UTF-8 text messages.
//!
//! Wire format: the message's UTF-8 bytes followed by a single `\n`. A message
//! must not itself contain `\n`; senders do not check.

use std::io::{Read, Write};

use tracing::{debug, warn};

use crate::codec::{CodecConfig, MessageReceiver, MessageSender};
use crate::error::{CodecError, Result};
use crate::io::{BoundInput, BoundOutput, Fill};

/// Message terminator.
pub const TERMINATOR: u8 = b'\n';

/// Writes `&str` messages as `\n`-terminated lines.
pub struct LineSender {
    output: BoundOutput,
    config: CodecConfig,
}

impl Default for LineSender {
    fn default() -> Self {
        Self::new()
    }
}

impl LineSender {
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

impl MessageSender for LineSender {
    type Message = str;

    fn bind(&mut self, output: Box<dyn Write + Send>) {
        self.output.bind(output);
    }

    fn is_bound(&self) -> bool {
        self.output.is_bound()
    }

    fn send(&mut self, message: &str) -> Result<()> {
        if message.len() > self.config.max_message_size {
            return Err(CodecError::MessageTooLarge {
                size: message.len(),
                max: self.config.max_message_size,
            });
        }
        self.output.write_encoded(|buf| {
            buf.reserve(message.len() + 1);
            buf.extend_from_slice(message.as_bytes());
            buf.extend_from_slice(&[TERMINATOR]);
            Ok(())
        })
    }
}

/// Reads `\n`-terminated lines as `String` messages.
///
/// Partial lines are buffered across reads. Invalid UTF-8 is replaced with
/// U+FFFD rather than failing the stream.
pub struct LineReceiver {
    input: BoundInput,
    config: CodecConfig,
    scanned: usize,
}

impl Default for LineReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl LineReceiver {
    pub fn new() -> Self {
        Self::with_config(CodecConfig::default())
    }

    pub fn with_config(config: CodecConfig) -> Self {
        Self {
            input: BoundInput::new(config.read_chunk_size),
            config,
            scanned: 0,
        }
    }

    fn drain_lines(&mut self, on_message: &mut dyn FnMut(String)) -> Result<()> {
        let max = self.config.max_message_size;
        loop {
            let buf = self.input.buffer();
            let Some(offset) = buf[self.scanned..].iter().position(|b| *b == TERMINATOR) else {
                self.scanned = buf.len();
                if buf.len() > max {
                    return Err(CodecError::MessageTooLarge {
                        size: buf.len(),
                        max,
                    });
                }
                return Ok(());
            };
            let end = self.scanned + offset;
            self.scanned = 0;
            if end > max {
                return Err(CodecError::MessageTooLarge { size: end, max });
            }
            let line = buf.split_to(end + 1);
            on_message(decode_line(&line[..end]));
        }
    }
}

fn decode_line(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(err) => {
            warn!(error = %err, len = bytes.len(), "line is not valid UTF-8; replacing invalid sequences");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

impl MessageReceiver for LineReceiver {
    type Message = String;

    fn bind(&mut self, input: Box<dyn Read + Send>) {
        self.input.bind(input);
        self.scanned = 0;
    }

    fn is_bound(&self) -> bool {
        self.input.is_bound()
    }

    fn read_next(&mut self, on_message: &mut dyn FnMut(String)) -> Result<bool> {
        match self.input.fill()? {
            Fill::Data(_) => {
                self.drain_lines(on_message)?;
                Ok(true)
            }
            Fill::Idle => Ok(true),
            Fill::Eof => {
                let pending = self.input.buffer().len();
                if pending > 0 {
                    debug!(pending, "discarding unterminated line at end of stream");
                    self.input.buffer().clear();
                    self.scanned = 0;
                }
                Ok(false)
            }
        }
    }
}
