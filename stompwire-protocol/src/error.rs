//! Protocol error types.

use crate::command::Command;
use thiserror::Error;

/// Protocol-level errors that can occur while formatting or parsing frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unsupported frame: {command} {reason}")]
    UnsupportedFrame {
        command: Command,
        reason: &'static str,
    },

    #[error("unrecognized command token: {preview:?}")]
    UnrecognizedCommand { preview: String },

    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    #[error("missing frame terminator at body offset {expected_at}")]
    MissingTerminator { expected_at: usize },

    #[error("invalid UTF-8 in command or header")]
    InvalidUtf8,

    #[error("frame too large: {size} bytes buffered (max {max})")]
    FrameTooLarge { size: usize, max: usize },
}

impl ProtocolError {
    /// Returns whether the stream can continue after this error.
    ///
    /// Only an unrecognized leading token is recoverable: the offending bytes
    /// are dropped and parsing resumes with the next read. Everything else
    /// happened after a valid command was recognized.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProtocolError::UnrecognizedCommand { .. })
    }
}
