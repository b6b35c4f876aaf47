//! STOMP frame model and wire formatting.
//!
//! Frame layout:
//!
//! ```text
//! COMMAND <EOL>
//! key:value <EOL>      (zero or more)
//! <EOL>
//! [body] NUL
//! ```
//!
//! `<EOL>` is CRLF on output. The parser also accepts a bare LF.

use crate::command::Command;
use crate::error::ProtocolError;
use bytes::{BufMut, Bytes, BytesMut};

/// Frame terminator byte.
pub const NUL: u8 = 0x00;

/// Line terminator emitted on output.
pub(crate) const CRLF: &[u8] = b"\r\n";

/// A STOMP frame.
///
/// Headers keep their insertion order and may repeat; lookups return the
/// first occurrence. A zero-length body is stored as `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame command.
    pub command: Command,
    /// Ordered header pairs.
    pub headers: Vec<(String, String)>,
    /// Optional body.
    pub body: Option<Bytes>,
}

impl Frame {
    /// Creates a frame with no headers and no body.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Appends a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Sets the body. An empty body is stored as `None`.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        self.body = if body.is_empty() { None } else { Some(body) };
        self
    }

    /// Returns the value of the first header named `key`.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the body bytes, or an empty slice when absent.
    pub fn body_bytes(&self) -> &[u8] {
        self.body.as_deref().unwrap_or_default()
    }

    /// Returns the `content-length` header when present and numeric.
    pub fn content_length(&self) -> Option<usize> {
        self.header("content-length")
            .and_then(|v| v.trim().parse().ok())
    }

    /// Encodes the frame into wire bytes.
    ///
    /// Header values are written verbatim. No escaping is applied on this
    /// path even though the parser decodes escapes on inbound values.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        if !self.command.allows_body() && self.body.as_ref().is_some_and(|b| !b.is_empty()) {
            return Err(ProtocolError::UnsupportedFrame {
                command: self.command,
                reason: "cannot carry a body",
            });
        }

        let headers_len: usize = self
            .headers
            .iter()
            .map(|(k, v)| k.len() + v.len() + 3)
            .sum();
        let body = self.body_bytes();
        let total_size = self.command.as_str().len() + 2 + headers_len + 2 + body.len() + 1;
        let mut buf = BytesMut::with_capacity(total_size);

        buf.put_slice(self.command.as_str().as_bytes());
        buf.put_slice(CRLF);

        for (key, value) in &self.headers {
            buf.put_slice(key.as_bytes());
            buf.put_u8(b':');
            buf.put_slice(value.as_bytes());
            buf.put_slice(CRLF);
        }
        buf.put_slice(CRLF);

        buf.put_slice(body);
        buf.put_u8(NUL);

        Ok(buf)
    }
}
