use bytes::{Buf, Bytes, BytesMut};
use std::io;
use thiserror::Error as ThisError;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{Frame, CRLF};

pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

#[derive(Debug, ThisError)]
pub enum CodecError {
    #[error("line exceeds the maximum length of {limit} bytes")]
    LineTooLong { limit: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Splits the incoming byte stream into tokens delimited by CRLF and writes frames back.
///
/// Every command verb, type marker, key and value is exactly one token. Tokens are raw bytes, no
/// encoding is assumed. A `\r` right before the delimiter is dropped. When the stream ends
/// without a final delimiter the remaining bytes still form a token.
///
/// A token longer than `max_length` bytes, not counting its terminator, is an error however the
/// bytes were split across reads.
#[derive(Debug)]
pub struct LineCodec {
    max_length: usize,
    // Where to resume searching for a delimiter, so partial reads don't rescan the whole buffer.
    next_index: usize,
}

impl LineCodec {
    pub fn new() -> LineCodec {
        LineCodec::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> LineCodec {
        LineCodec {
            max_length,
            next_index: 0,
        }
    }

    fn check_length(&self, line: &[u8]) -> Result<(), CodecError> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        if line.len() > self.max_length {
            return Err(CodecError::LineTooLong {
                limit: self.max_length,
            });
        }

        Ok(())
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // The last byte seen may be the `\r` half of a delimiter.
        let start = self.next_index.saturating_sub(1);

        let delimiter = src[start..]
            .windows(2)
            .position(|window| window == CRLF)
            .map(|index| start + index);

        match delimiter {
            Some(end) => {
                self.next_index = 0;
                let line = src.split_to(end);
                src.advance(CRLF.len());
                self.check_length(&line)?;
                Ok(Some(to_token(line)))
            }
            None => {
                // A trailing `\r` may be the first half of the delimiter.
                self.check_length(src)?;
                self.next_index = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }

        if src.is_empty() {
            return Ok(None);
        }

        // A final, non-terminated line. Tolerate a bare `\n` ending.
        self.next_index = 0;
        let mut line = src.split();
        if line.ends_with(b"\n") {
            line.truncate(line.len() - 1);
        }
        Ok(Some(to_token(line)))
    }
}

impl Encoder<Frame> for LineCodec {
    type Error = CodecError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&frame.serialize());
        Ok(())
    }
}

fn to_token(mut line: BytesMut) -> Bytes {
    if line.ends_with(b"\r") {
        line.truncate(line.len() - 1);
    }
    line.freeze()
}
