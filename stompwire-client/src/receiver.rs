//! Background receive loop.
//!
//! The loop is the only reader of the transport once a session is connected.
//! It owns the decoder, so the pending bytes of a partial frame live in
//! exactly one place. Each completed frame is dispatched before the next one
//! is parsed.
//!
//! ```text
//! Idle --spawn--> Listening --bytes--> Draining --> Listening
//!                     |                   |
//!                     +--closed/stop--> Stopped <--receipt/fatal--+
//! ```

use crate::dispatch::{Dispatcher, Flow};
use crate::error::ClientError;
use crate::transport::TransportReader;
use std::sync::Arc;
use stompwire_protocol::Decoder;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Receive loop states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Created, not yet started.
    Idle,
    /// Waiting for the next transport read.
    Listening,
    /// Parsing and dispatching buffered bytes.
    Draining,
    /// Terminal.
    Stopped,
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The transport reported end of stream.
    Closed,
    /// A stop was requested.
    Stopped,
    /// The dispatcher resolved a receipt and asked the loop to end.
    Finished,
}

/// A receive loop that has not been started yet.
pub struct ReceiveLoop {
    reader: TransportReader,
    decoder: Decoder,
    dispatcher: Arc<Dispatcher>,
    read_buffer_size: usize,
    state_tx: watch::Sender<LoopState>,
    state_rx: watch::Receiver<LoopState>,
    /// Set by `spawn`. A loop driven through `run` has no stop signal and
    /// ends only on end of stream, a receipt, or an error.
    stop_rx: Option<watch::Receiver<bool>>,
}

impl ReceiveLoop {
    /// Creates a loop over `reader`.
    ///
    /// `decoder` may already hold bytes; they are drained before the first
    /// read.
    pub fn new(
        reader: TransportReader,
        decoder: Decoder,
        dispatcher: Arc<Dispatcher>,
        read_buffer_size: usize,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(LoopState::Idle);
        Self {
            reader,
            decoder,
            dispatcher,
            read_buffer_size,
            state_tx,
            state_rx,
            stop_rx: None,
        }
    }

    pub fn state(&self) -> LoopState {
        *self.state_rx.borrow()
    }

    /// Starts the loop on the tokio runtime.
    ///
    /// The returned handle owns the only stop sender.
    pub fn spawn(mut self) -> ReceiveLoopHandle {
        let state = self.state_rx.clone();
        let (stop, stop_rx) = watch::channel(false);
        self.stop_rx = Some(stop_rx);
        let join = tokio::spawn(self.run());
        ReceiveLoopHandle { stop, state, join }
    }

    /// Runs the loop to completion on the current task, without a stop
    /// signal.
    pub async fn run(mut self) -> Result<LoopExit, ClientError> {
        tracing::debug!("receive loop started");
        let result = self.run_inner().await;
        self.state_tx.send_replace(LoopState::Stopped);
        tracing::debug!("receive loop stopped: {:?}", result);
        result
    }

    async fn run_inner(&mut self) -> Result<LoopExit, ClientError> {
        if self.decoder.pending().is_some() && self.drain()? == Flow::Stop {
            return Ok(LoopExit::Finished);
        }

        let mut buf = vec![0u8; self.read_buffer_size];
        loop {
            self.state_tx.send_replace(LoopState::Listening);

            let read = tokio::select! {
                biased;
                _ = stop_requested(self.stop_rx.as_mut()) => return Ok(LoopExit::Stopped),
                read = self.reader.read(&mut buf) => read,
            };

            let n = match read {
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!("receive loop: read failed: {}", e);
                    self.dispatcher.connection_failed(e.to_string());
                    return Err(ClientError::Io(e));
                }
            };

            if n == 0 {
                tracing::debug!("receive loop: connection closed");
                self.dispatcher.connection_closed();
                return Ok(LoopExit::Closed);
            }

            tracing::debug!("receive loop: received {} bytes", n);
            self.decoder.extend(&buf[..n]);
            if self.drain()? == Flow::Stop {
                return Ok(LoopExit::Finished);
            }
        }
    }

    /// Dispatches every complete frame in the decoder.
    fn drain(&mut self) -> Result<Flow, ClientError> {
        self.state_tx.send_replace(LoopState::Draining);
        loop {
            match self.decoder.decode_frame() {
                Ok(Some(frame)) => {
                    if self.dispatcher.dispatch(frame) == Flow::Stop {
                        return Ok(Flow::Stop);
                    }
                }
                Ok(None) => return Ok(Flow::Continue),
                Err(e) if e.is_recoverable() => {
                    tracing::warn!("receive loop: dropped invalid input: {}", e);
                    return Ok(Flow::Continue);
                }
                Err(e) => {
                    tracing::error!("receive loop: fatal protocol error: {}", e);
                    self.dispatcher.connection_failed(e.to_string());
                    return Err(ClientError::Protocol(e));
                }
            }
        }
    }
}

/// Resolves once a stop is signalled or the stop sender is gone. Never
/// resolves without a stop channel.
async fn stop_requested(stop: Option<&mut watch::Receiver<bool>>) {
    let Some(stop) = stop else {
        return std::future::pending().await;
    };
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}

/// Handle to a running receive loop.
///
/// Dropping the handle stops the loop at its next read.
pub struct ReceiveLoopHandle {
    stop: watch::Sender<bool>,
    state: watch::Receiver<LoopState>,
    join: JoinHandle<Result<LoopExit, ClientError>>,
}

impl ReceiveLoopHandle {
    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    /// Returns a receiver that observes state transitions.
    pub fn watch_state(&self) -> watch::Receiver<LoopState> {
        self.state.clone()
    }

    /// Requests a stop. A dispatch already in progress runs to completion;
    /// only the pending read is cancelled.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the loop to end.
    pub async fn join(self) -> Result<LoopExit, ClientError> {
        self.join.await.map_err(|e| {
            tracing::error!("receive loop task failed: {}", e);
            ClientError::ReceiveLoopStopped
        })
        .and_then(|result| result)
    }

    /// Requests a stop and waits for the loop to end.
    pub async fn shutdown(self) -> Result<LoopExit, ClientError> {
        self.stop();
        self.join().await
    }
}
