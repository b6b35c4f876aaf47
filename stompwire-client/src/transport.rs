//! Byte-stream transport seam.
//!
//! A session runs over any duplex byte stream. The stream is split once the
//! handshake starts: the read half belongs to whoever is reading (first the
//! handshake, then the receive loop) and the write half stays with the
//! session.

use crate::connection::ConnectionConfig;
use crate::error::ClientError;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Any duplex byte stream a session can run over.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Read half handed to the receive loop.
pub type TransportReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half kept by the session.
pub type TransportWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Splits a transport into boxed halves.
pub fn split<T: Transport>(stream: T) -> (TransportReader, TransportWriter) {
    let (reader, writer) = tokio::io::split(stream);
    (Box::new(reader), Box::new(writer))
}

/// Opens a TCP connection to the configured broker.
pub async fn connect_tcp(config: &ConnectionConfig) -> Result<TcpStream, ClientError> {
    let addr = (config.host.as_str(), config.port);
    tracing::debug!("Connecting to {}:{}...", config.host, config.port);

    let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| {
            tracing::debug!("Connection timeout");
            ClientError::Timeout
        })?
        .map_err(|e| {
            tracing::debug!("Connection failed: {}", e);
            ClientError::Io(e)
        })?;

    stream.set_nodelay(true).ok();
    tracing::debug!("TCP connected");
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_split_duplex() {
        let (client, mut broker) = tokio::io::duplex(64);
        let (mut reader, mut writer) = split(client);

        writer.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        broker.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        broker.write_all(b"pong").await.unwrap();
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[tokio::test]
    async fn test_connect_tcp_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = ConnectionConfig::new("127.0.0.1", port);
        let result = connect_tcp(&config).await;
        assert!(matches!(result, Err(ClientError::Io(_))));
    }
}
