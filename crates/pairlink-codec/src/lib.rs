//! Message codecs for pairlink channels.
//!
//! A channel is a duplex byte stream; a codec turns it into a stream of typed
//! messages. Each codec comes as a [`MessageSender`] / [`MessageReceiver`]
//! pair bound to the two halves of the stream:
//!
//! - [`line`]: `\n`-terminated UTF-8 text
//! - [`raw`]: unframed byte blocks, boundaries not preserved
//! - [`framed`]: "PL" magic + 4-byte little-endian length + payload
//!
//! With the `async` feature, [`tokio_codec`] exposes the same wire formats as
//! `tokio_util::codec` decoders and encoders.

pub mod codec;
pub mod error;
pub mod framed;
mod io;
pub mod line;
pub mod raw;

#[cfg(feature = "async")]
pub mod tokio_codec;

pub use codec::{
    CodecConfig, MessageReceiver, MessageSender, DEFAULT_MAX_MESSAGE, DEFAULT_READ_CHUNK,
    RAW_BLOCK_SIZE,
};
pub use error::{CodecError, Result};
pub use framed::{decode_frame, encode_frame, FramedReceiver, FramedSender};
pub use line::{LineReceiver, LineSender};
pub use raw::{RawReceiver, RawSender};

#[cfg(feature = "async")]
pub use tokio_codec::{FramedCodec, LineCodec, RawCodec};
