//! Session lifecycle: connect handshake, subscriptions, disconnect handshake.
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnecting -> Disconnected
//! ```
//!
//! The CONNECTED response is read directly, before the receive loop exists.
//! From then on the loop is the only reader; the RECEIPT that answers
//! DISCONNECT is routed through it rather than read a second time.

use crate::connection::ConnectionConfig;
use crate::dispatch::{Dispatcher, ReceiptOutcome};
use crate::error::ClientError;
use crate::receiver::{LoopExit, LoopState, ReceiveLoop, ReceiveLoopHandle};
use crate::registry::{MessageHandler, SubscriptionId, SubscriptionRegistry};
use crate::transport::{self, Transport, TransportReader, TransportWriter};
use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use stompwire_protocol::{Command, Decoder, Frame};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{broadcast, oneshot, watch};
use uuid::Uuid;

/// Smallest receipt id generated for DISCONNECT.
pub const RECEIPT_ID_MIN: u64 = 1_000;

/// Largest receipt id generated for DISCONNECT.
pub const RECEIPT_ID_MAX: u64 = 1_000_000;

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// A connected STOMP session.
pub struct Session {
    config: ConnectionConfig,
    /// Write half of the transport. Only the request path writes.
    writer: tokio::sync::Mutex<Option<TransportWriter>>,
    registry: Arc<SubscriptionRegistry>,
    dispatcher: Arc<Dispatcher>,
    state: parking_lot::Mutex<SessionState>,
    receive_loop: parking_lot::Mutex<Option<ReceiveLoopHandle>>,
    /// The broker's CONNECTED frame.
    connected: Frame,
}

impl Session {
    /// Opens a TCP connection and performs the connect handshake.
    pub async fn connect(config: ConnectionConfig) -> Result<Self, ClientError> {
        let stream = transport::connect_tcp(&config).await?;
        Self::connect_with(stream, config).await
    }

    /// Performs the connect handshake over an already open transport.
    pub async fn connect_with<T: Transport>(
        stream: T,
        config: ConnectionConfig,
    ) -> Result<Self, ClientError> {
        tracing::debug!("Session {:?}", SessionState::Connecting);
        let (mut reader, mut writer) = transport::split(stream);

        let connect = Frame::new(Command::Connect)
            .with_header("accept-version", config.accept_version.as_str())
            .with_header("host", config.host_header())
            .with_header("login", config.login.as_str())
            .with_header("password", config.password.as_str());
        let encoded = connect.encode()?;
        tracing::debug!("Sending CONNECT ({} bytes)", encoded.len());
        writer.write_all(&encoded).await?;
        writer.flush().await?;

        // Leftover bytes after CONNECTED stay in the decoder for the loop.
        let mut decoder = Decoder::with_max_frame_size(config.max_frame_size);
        let response = with_timeout(
            config.handshake_timeout,
            read_single_frame(&mut reader, &mut decoder, config.read_buffer_size),
        )
        .await?;

        let connected = match response {
            Ok(Some(frame)) if frame.command == Command::Connected => frame,
            Ok(Some(frame)) => {
                let reason = match frame.command {
                    Command::Error => format!(
                        "broker rejected CONNECT: {}",
                        frame.header("message").unwrap_or("<no message>")
                    ),
                    other => format!("expected CONNECTED, got {}", other),
                };
                return Err(ClientError::ConnectFailed {
                    reason,
                    response: Some(Box::new(frame)),
                });
            }
            Ok(None) => {
                return Err(ClientError::ConnectFailed {
                    reason: "connection closed before CONNECTED".to_string(),
                    response: None,
                });
            }
            Err(ClientError::Protocol(e)) => {
                return Err(ClientError::ConnectFailed {
                    reason: format!("invalid response: {}", e),
                    response: None,
                });
            }
            Err(e) => return Err(e),
        };

        tracing::debug!(
            "CONNECTED (version={}, server={})",
            connected.header("version").unwrap_or("?"),
            connected.header("server").unwrap_or("?")
        );

        let registry = Arc::new(SubscriptionRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            config.destination_prefix.clone(),
        ));
        let handle = ReceiveLoop::new(reader, decoder, dispatcher.clone(), config.read_buffer_size)
            .spawn();

        Ok(Self {
            config,
            writer: tokio::sync::Mutex::new(Some(writer)),
            registry,
            dispatcher,
            state: parking_lot::Mutex::new(SessionState::Connected),
            receive_loop: parking_lot::Mutex::new(Some(handle)),
            connected,
        })
    }

    /// Returns the current state. A session whose receive loop has stopped
    /// on its own reports `Disconnected`.
    pub fn state(&self) -> SessionState {
        let state = *self.state.lock();
        if state == SessionState::Connected && self.receive_state() == LoopState::Stopped {
            return SessionState::Disconnected;
        }
        state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Returns the receive loop state.
    pub fn receive_state(&self) -> LoopState {
        self.receive_loop
            .lock()
            .as_ref()
            .map_or(LoopState::Stopped, |h| h.state())
    }

    /// Resolves once the receive loop has stopped, for whatever reason.
    pub async fn closed(&self) {
        let state = self.receive_loop.lock().as_ref().map(|h| h.watch_state());
        if let Some(state) = state {
            loop_stopped(state).await;
        }
    }

    /// Returns the CONNECTED frame sent by the broker.
    pub fn connected_frame(&self) -> &Frame {
        &self.connected
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Lists active subscriptions ordered by id.
    pub fn subscriptions(&self) -> Vec<(SubscriptionId, String)> {
        self.registry.list()
    }

    /// Returns a receiver for ERROR frames sent by the broker while connected.
    pub fn subscribe_errors(&self) -> broadcast::Receiver<Frame> {
        self.dispatcher.subscribe_errors()
    }

    /// Subscribes `handler` to `destination`.
    ///
    /// The registry entry is written before SUBSCRIBE goes out, so a MESSAGE
    /// can never arrive ahead of its route. Does not wait for the broker.
    pub async fn subscribe<H>(&self, destination: &str, handler: H) -> Result<SubscriptionId, ClientError>
    where
        H: MessageHandler + 'static,
    {
        self.ensure_connected()?;
        let id = self.registry.subscribe(destination, Arc::new(handler))?;

        let frame = Frame::new(Command::Subscribe)
            .with_header("destination", self.config.wire_destination(destination))
            .with_header("ack", "auto")
            .with_header("id", id.to_string());

        if let Err(e) = self.send_frame(&frame).await {
            let _ = self.registry.unsubscribe(destination);
            return Err(e);
        }

        tracing::debug!("Subscribed to {} (id={})", destination, id);
        Ok(id)
    }

    /// Removes the subscription for `destination` and sends UNSUBSCRIBE.
    pub async fn unsubscribe(&self, destination: &str) -> Result<(), ClientError> {
        self.ensure_connected()?;
        let id = self.registry.unsubscribe(destination)?;

        let frame = Frame::new(Command::Unsubscribe).with_header("id", id.to_string());
        self.send_frame(&frame).await?;

        tracing::debug!("Unsubscribed from {} (id={})", destination, id);
        Ok(())
    }

    /// Sends `body` to `destination`.
    ///
    /// `content-length` is always set, so bodies may contain NUL bytes.
    pub async fn send(
        &self,
        destination: &str,
        body: impl Into<Bytes>,
        content_type: Option<&str>,
    ) -> Result<(), ClientError> {
        self.ensure_connected()?;
        let body = body.into();

        let mut frame =
            Frame::new(Command::Send).with_header("destination", self.config.wire_destination(destination));
        if let Some(content_type) = content_type {
            frame = frame.with_header("content-type", content_type);
        }
        let frame = frame
            .with_header("content-length", body.len().to_string())
            .with_body(body);

        self.send_frame(&frame).await
    }

    /// Performs the disconnect handshake.
    ///
    /// Succeeds when the broker answers with the matching RECEIPT or closes
    /// the connection. The receive loop and registry are torn down either way.
    ///
    /// If the broker already closed the connection, nothing is sent; the
    /// session is torn down and the call succeeds.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.disconnect_with_receipt(random_receipt_id()).await
    }

    async fn disconnect_with_receipt(&self, receipt_id: u64) -> Result<(), ClientError> {
        if *self.state.lock() != SessionState::Connected {
            return Err(ClientError::NotConnected);
        }
        if self.receive_state() == LoopState::Stopped {
            tracing::debug!("Receive loop already stopped, tearing down");
            return match self.teardown().await {
                Some(Err(e)) => Err(ClientError::DisconnectFailed(format!(
                    "receive loop failed: {}",
                    e
                ))),
                _ => Ok(()),
            };
        }
        *self.state.lock() = SessionState::Disconnecting;

        let receipt_id = receipt_id.to_string();
        let receipt = self.dispatcher.expect_receipt(receipt_id.as_str());
        let frame = Frame::new(Command::Disconnect).with_header("receipt-id", receipt_id.as_str());

        let waited = match self.send_frame(&frame).await {
            Ok(()) => self.await_receipt(receipt).await,
            Err(e) => Err(e),
        };
        let exit = self.teardown().await;

        match waited? {
            Some(outcome) => receipt_result(outcome),
            None => match exit {
                Some(Ok(LoopExit::Closed)) => Ok(()),
                Some(Err(e)) => Err(ClientError::DisconnectFailed(format!(
                    "receive loop failed: {}",
                    e
                ))),
                _ => Err(ClientError::DisconnectFailed(
                    "receive loop ended before the receipt arrived".to_string(),
                )),
            },
        }
    }

    /// Waits for the receipt outcome, or for the loop to end without one.
    async fn await_receipt(
        &self,
        mut receipt: oneshot::Receiver<ReceiptOutcome>,
    ) -> Result<Option<ReceiptOutcome>, ClientError> {
        let Some(loop_state) = self.receive_loop.lock().as_ref().map(|h| h.watch_state()) else {
            return Ok(None);
        };

        let resolved = with_timeout(self.config.handshake_timeout, async {
            tokio::select! {
                biased;
                outcome = &mut receipt => Some(outcome.ok()),
                _ = loop_stopped(loop_state) => None,
            }
        })
        .await?;

        Ok(match resolved {
            Some(outcome) => outcome,
            None => receipt.try_recv().ok(),
        })
    }

    /// Stops the receive loop, clears subscriptions and closes the writer.
    async fn teardown(&self) -> Option<Result<LoopExit, ClientError>> {
        let handle = self.receive_loop.lock().take();
        let exit = match handle {
            Some(handle) => Some(handle.shutdown().await),
            None => None,
        };

        self.registry.clear();
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        *self.state.lock() = SessionState::Disconnected;
        tracing::debug!("Session {:?}", SessionState::Disconnected);
        exit
    }

    fn ensure_connected(&self) -> Result<(), ClientError> {
        if self.state() == SessionState::Connected {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }

    async fn send_frame(&self, frame: &Frame) -> Result<(), ClientError> {
        let encoded = frame.encode()?;
        let mut writer_guard = self.writer.lock().await;
        let writer = writer_guard.as_mut().ok_or(ClientError::NotConnected)?;
        writer.write_all(&encoded).await?;
        writer.flush().await?;
        tracing::debug!("Sent {} ({} bytes)", frame.command, encoded.len());
        Ok(())
    }
}

/// Generates a receipt id in `RECEIPT_ID_MIN..=RECEIPT_ID_MAX`.
pub fn random_receipt_id() -> u64 {
    let span = u128::from(RECEIPT_ID_MAX - RECEIPT_ID_MIN + 1);
    RECEIPT_ID_MIN + (Uuid::new_v4().as_u128() % span) as u64
}

fn receipt_result(outcome: ReceiptOutcome) -> Result<(), ClientError> {
    match outcome {
        ReceiptOutcome::Matched => Ok(()),
        ReceiptOutcome::Closed => {
            tracing::debug!("Broker closed the connection instead of sending RECEIPT");
            Ok(())
        }
        ReceiptOutcome::Mismatch { expected, actual } => Err(ClientError::DisconnectFailed(format!(
            "expected receipt-id {}, got {}",
            expected,
            actual.as_deref().unwrap_or("none")
        ))),
        ReceiptOutcome::Unexpected(frame) => Err(ClientError::DisconnectFailed(format!(
            "expected RECEIPT, got {}",
            frame.command
        ))),
        ReceiptOutcome::Failed(reason) => Err(ClientError::DisconnectFailed(reason)),
    }
}

/// Reads until one frame decodes. `Ok(None)` means the transport closed.
async fn read_single_frame(
    reader: &mut TransportReader,
    decoder: &mut Decoder,
    buffer_size: usize,
) -> Result<Option<Frame>, ClientError> {
    let mut buf = vec![0u8; buffer_size];
    loop {
        if let Some(frame) = decoder.decode_frame()? {
            return Ok(Some(frame));
        }

        let n = reader.read(&mut buf).await?;
        tracing::debug!("Read {} bytes from socket", n);
        if n == 0 {
            return Ok(None);
        }
        decoder.extend(&buf[..n]);
    }
}

async fn with_timeout<F: Future>(timeout: Option<Duration>, fut: F) -> Result<F::Output, ClientError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ClientError::Timeout),
        None => Ok(fut.await),
    }
}

async fn loop_stopped(mut state: watch::Receiver<LoopState>) {
    loop {
        if *state.borrow_and_update() == LoopState::Stopped {
            return;
        }
        if state.changed().await.is_err() {
            return;
        }
    }
}
