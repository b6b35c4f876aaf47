//! Client error types.

use stompwire_protocol::Frame;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] stompwire_protocol::ProtocolError),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("handshake timeout")]
    Timeout,

    #[error("connect failed: {reason}")]
    ConnectFailed {
        reason: String,
        response: Option<Box<Frame>>,
    },

    #[error("disconnect failed: {0}")]
    DisconnectFailed(String),

    #[error("already subscribed to {0}")]
    AlreadySubscribed(String),

    #[error("not subscribed to {0}")]
    NotSubscribed(String),

    #[error("receive loop is not running")]
    ReceiveLoopStopped,
}

impl ClientError {
    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_) | ClientError::Timeout | ClientError::ConnectionClosed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stompwire_protocol::Command;

    #[test]
    fn test_retryable() {
        assert!(ClientError::Timeout.is_retryable());
        assert!(ClientError::ConnectionClosed.is_retryable());
        assert!(ClientError::Io(std::io::Error::other("reset")).is_retryable());

        assert!(!ClientError::NotConnected.is_retryable());
        assert!(!ClientError::AlreadySubscribed("a".to_string()).is_retryable());
        assert!(!ClientError::DisconnectFailed("x".to_string()).is_retryable());
    }

    #[test]
    fn test_connect_failed_display() {
        let err = ClientError::ConnectFailed {
            reason: "broker answered ERROR".to_string(),
            response: Some(Box::new(Frame::new(Command::Error))),
        };
        assert_eq!(err.to_string(), "connect failed: broker answered ERROR");
    }
}
