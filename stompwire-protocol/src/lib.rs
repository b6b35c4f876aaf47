//! # stompwire-protocol
//!
//! Wire protocol implementation for stompwire (STOMP 1.2 client subset).
//!
//! This crate provides:
//! - The closed set of frame commands and their body rules
//! - Frame formatting to exact wire bytes
//! - Incremental parsing of byte streams that split or pack frames
//! - Header value decoding

pub mod codec;
pub mod command;
pub mod error;
pub mod frame;
pub mod header;
pub mod parser;

pub use codec::Decoder;
pub use command::Command;
pub use error::ProtocolError;
pub use frame::{Frame, NUL};
pub use parser::{parse, ParseResult, PartialFrame};

/// Protocol version advertised in `accept-version`.
pub const PROTOCOL_VERSION: &str = "1.2";

/// Default port for STOMP brokers.
pub const DEFAULT_PORT: u16 = 61613;

/// Maximum size of a buffered, not yet complete frame (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;
