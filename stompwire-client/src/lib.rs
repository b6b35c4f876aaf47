//! # stompwire-client
//!
//! Client library for STOMP brokers.
//!
//! This crate provides:
//! - Connect and disconnect handshakes with receipt correlation
//! - A subscription registry routing MESSAGE frames to handlers
//! - A background receive loop that reassembles fragmented frames
//!   and dispatches them in wire order

pub mod connection;
pub mod dispatch;
pub mod error;
pub mod receiver;
pub mod registry;
pub mod session;
pub mod transport;

pub use connection::ConnectionConfig;
pub use error::ClientError;
pub use receiver::{LoopExit, LoopState};
pub use registry::{channel_handler, MessageHandler, SubscriptionId, SubscriptionRegistry};
pub use session::{Session, SessionState};
pub use transport::Transport;
