//! Accumulating decoder for frames split across transport reads.

use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::parser::{parse, ParseResult};
use crate::MAX_FRAME_SIZE;
use bytes::{Buf, BytesMut};

/// Longest slice of dropped bytes echoed back in an error.
const PREVIEW_LEN: usize = 32;

/// Buffers raw bytes and yields frames as they complete.
///
/// The buffer always holds the raw, undigested bytes of at most one
/// incomplete frame followed by whatever arrived after it. Nothing else
/// writes to it, so the owner of the decoder owns the pending state.
pub struct Decoder {
    buffer: BytesMut,
    max_frame_size: usize,
}

impl Decoder {
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    /// Creates a decoder that refuses to buffer more than `max` bytes.
    pub fn with_max_frame_size(max: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            max_frame_size: max,
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next frame from the buffer.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was decoded and
    /// `Ok(None)` if more data is needed, in which case the buffered bytes are
    /// kept untouched. On `Err` the buffer has been cleared: an unrecognized
    /// command drops everything buffered ([`ProtocolError::is_recoverable`]),
    /// and fatal errors leave nothing worth re-parsing.
    pub fn decode_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        let outcome = match parse(&self.buffer) {
            Ok(ParseResult::Complete { frame, remainder }) => {
                Ok(Some((frame, self.buffer.len() - remainder.len())))
            }
            Ok(ParseResult::Incomplete(_)) => Ok(None),
            Ok(ParseResult::Invalid) => Err(ProtocolError::UnrecognizedCommand {
                preview: preview(&self.buffer),
            }),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(Some((frame, consumed))) => {
                self.buffer.advance(consumed);
                Ok(Some(frame))
            }
            Ok(None) if self.buffer.len() > self.max_frame_size => {
                let size = self.buffer.len();
                self.buffer.clear();
                Err(ProtocolError::FrameTooLarge {
                    size,
                    max: self.max_frame_size,
                })
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.buffer.clear();
                Err(e)
            }
        }
    }

    /// Returns the pending bytes of an incomplete frame, if any.
    pub fn pending(&self) -> Option<&[u8]> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(&self.buffer)
        }
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

fn preview(buf: &[u8]) -> String {
    let end = buf.len().min(PREVIEW_LEN);
    String::from_utf8_lossy(&buf[..end]).into_owned()
}
