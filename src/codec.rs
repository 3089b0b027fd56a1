//! NETCONF 1.0 end-of-message framing
//!
//! Every message on the wire is followed by `]]>]]>`. [`NetconfCodec`] plugs
//! into [`tokio_util::codec::Framed`] and yields one `String` per message.

use std::io;

use thiserror::Error;
use tokio_util::bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::session::TransportError;

pub const MESSAGE_TERMINATOR: &str = "]]>]]>";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("message is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("message longer than {0} bytes")]
    TooLong(usize),

    #[error("connection closed inside a message")]
    Truncated,
}

impl From<CodecError> for TransportError {
    fn from(err: CodecError) -> Self {
        use io::ErrorKind::*;
        match err {
            CodecError::Io(e) => match e.kind() {
                BrokenPipe | UnexpectedEof | ConnectionReset | ConnectionAborted => {
                    TransportError::Closed
                }
                _ => TransportError::Io(e.to_string()),
            },
            CodecError::Truncated => TransportError::Closed,
            other => TransportError::Framing(other.to_string()),
        }
    }
}

/// Splits a byte stream on [`MESSAGE_TERMINATOR`]
#[derive(Debug, Clone)]
pub struct NetconfCodec {
    /// Bytes of the pending buffer already searched
    next_index: usize,
    max_length: usize,
}

impl NetconfCodec {
    pub fn new() -> Self {
        Self {
            next_index: 0,
            max_length: usize::MAX,
        }
    }

    /// Fail instead of buffering more than `max_length` bytes of one message
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            next_index: 0,
            max_length,
        }
    }
}

impl Default for NetconfCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for NetconfCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let terminator = MESSAGE_TERMINATOR.as_bytes();
        // a terminator may straddle the previous read boundary
        let start = self
            .next_index
            .saturating_sub(terminator.len() - 1)
            .min(src.len());

        match src[start..]
            .windows(terminator.len())
            .position(|w| w == terminator)
        {
            Some(offset) => {
                let end = start + offset;
                self.next_index = 0;
                let frame = src.split_to(end + terminator.len());
                let message = std::str::from_utf8(&frame[..end])?;
                Ok(Some(message.to_string()))
            }
            None if src.len() > self.max_length => Err(CodecError::TooLong(self.max_length)),
            None => {
                self.next_index = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.iter().all(u8::is_ascii_whitespace) => {
                src.clear();
                Ok(None)
            }
            None => Err(CodecError::Truncated),
        }
    }
}

impl Encoder<String> for NetconfCodec {
    type Error = CodecError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len() + MESSAGE_TERMINATOR.len());
        dst.put_slice(item.as_bytes());
        dst.put_slice(MESSAGE_TERMINATOR.as_bytes());
        Ok(())
    }
}
