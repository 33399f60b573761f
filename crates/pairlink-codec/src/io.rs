//! Bound stream halves shared by the codec implementations.
//!
//! Handles partial writes, interrupted calls and read buffering so each codec
//! only deals with its own framing rule.

use std::io::{ErrorKind, Read, Write};

use bytes::BytesMut;

use crate::error::{CodecError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Output half: an optional bound writer plus a reusable encode buffer.
pub(crate) struct BoundOutput {
    inner: Option<Box<dyn Write + Send>>,
    buf: BytesMut,
}

impl BoundOutput {
    pub(crate) fn new() -> Self {
        Self {
            inner: None,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    pub(crate) fn bind(&mut self, output: Box<dyn Write + Send>) {
        self.inner = Some(output);
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.inner.is_some()
    }

    /// Encode into the scratch buffer, then write it out completely and flush.
    pub(crate) fn write_encoded(
        &mut self,
        encode: impl FnOnce(&mut BytesMut) -> Result<()>,
    ) -> Result<()> {
        let Self { inner, buf } = self;
        let inner = inner.as_mut().ok_or(CodecError::NotBound)?;
        buf.clear();
        encode(buf)?;
        write_fully(inner.as_mut(), &buf[..])?;
        flush_fully(inner.as_mut())
    }
}

/// Write every byte of `bytes`, retrying interrupted calls.
///
/// A timed-out write surfaces as an I/O error; a writer that accepts zero
/// bytes is treated as closed.
pub(crate) fn write_fully(out: &mut dyn Write, bytes: &[u8]) -> Result<()> {
    let mut offset = 0usize;
    while offset < bytes.len() {
        match out.write(&bytes[offset..]) {
            Ok(0) => return Err(CodecError::ConnectionClosed),
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(CodecError::Io(err)),
        }
    }
    Ok(())
}

pub(crate) fn flush_fully(out: &mut dyn Write) -> Result<()> {
    loop {
        match out.flush() {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(CodecError::Io(err)),
        }
    }
}

/// Outcome of one read into the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fill {
    /// This many bytes were appended to the buffer.
    Data(usize),
    /// The stream reached end of stream.
    Eof,
    /// A read timeout elapsed with nothing to read.
    Idle,
}

/// Input half: an optional bound reader plus the undecoded byte buffer.
pub(crate) struct BoundInput {
    inner: Option<Box<dyn Read + Send>>,
    buf: BytesMut,
    chunk: Vec<u8>,
}

impl BoundInput {
    pub(crate) fn new(read_chunk_size: usize) -> Self {
        Self {
            inner: None,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            chunk: vec![0u8; read_chunk_size.max(1)],
        }
    }

    pub(crate) fn bind(&mut self, input: Box<dyn Read + Send>) {
        self.inner = Some(input);
        self.buf.clear();
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.inner.is_some()
    }

    /// Perform one blocking read, appending whatever arrived.
    pub(crate) fn fill(&mut self) -> Result<Fill> {
        let inner = self.inner.as_mut().ok_or(CodecError::NotBound)?;
        loop {
            match inner.read(&mut self.chunk) {
                Ok(0) => return Ok(Fill::Eof),
                Ok(n) => {
                    self.buf.extend_from_slice(&self.chunk[..n]);
                    return Ok(Fill::Data(n));
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
                {
                    return Ok(Fill::Idle);
                }
                Err(err) => return Err(CodecError::Io(err)),
            }
        }
    }

    pub(crate) fn buffer(&mut self) -> &mut BytesMut {
        &mut self.buf
    }
}
