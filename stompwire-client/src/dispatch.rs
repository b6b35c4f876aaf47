//! Routing of inbound frames.
//!
//! The receive loop hands every parsed frame to a [`Dispatcher`], one at a
//! time and in wire order. MESSAGE frames go to their subscription's handler;
//! ERROR frames are published to error listeners; a RECEIPT resolves the
//! disconnect waiter, if one is registered.

use crate::connection::strip_destination_prefix;
use crate::registry::SubscriptionRegistry;
use parking_lot::Mutex;
use std::sync::Arc;
use stompwire_protocol::{Command, Frame};
use tokio::sync::{broadcast, oneshot};

/// Capacity of the ERROR frame broadcast channel.
const ERROR_CHANNEL_CAPACITY: usize = 64;

/// What the receive loop should do after a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// How a pending receipt wait ended.
#[derive(Debug)]
pub enum ReceiptOutcome {
    /// RECEIPT carrying the expected `receipt-id`.
    Matched,
    /// RECEIPT for some other id, or none at all.
    Mismatch {
        expected: String,
        actual: Option<String>,
    },
    /// A frame other than MESSAGE or RECEIPT arrived first.
    Unexpected(Box<Frame>),
    /// The broker closed the connection.
    Closed,
    /// Reading or parsing failed.
    Failed(String),
}

struct PendingReceipt {
    receipt_id: String,
    tx: oneshot::Sender<ReceiptOutcome>,
}

/// Consumer side of the receive loop.
pub struct Dispatcher {
    registry: Arc<SubscriptionRegistry>,
    destination_prefix: String,
    pending_receipt: Mutex<Option<PendingReceipt>>,
    errors: broadcast::Sender<Frame>,
}

impl Dispatcher {
    pub fn new(registry: Arc<SubscriptionRegistry>, destination_prefix: impl Into<String>) -> Self {
        let (errors, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);
        Self {
            registry,
            destination_prefix: destination_prefix.into(),
            pending_receipt: Mutex::new(None),
            errors,
        }
    }

    /// Returns a receiver for ERROR frames sent by the broker while connected.
    pub fn subscribe_errors(&self) -> broadcast::Receiver<Frame> {
        self.errors.subscribe()
    }

    /// Registers a waiter for the RECEIPT answering `receipt_id`.
    ///
    /// A waiter registered earlier is resolved as failed.
    pub fn expect_receipt(&self, receipt_id: impl Into<String>) -> oneshot::Receiver<ReceiptOutcome> {
        let (tx, rx) = oneshot::channel();
        let previous = self.pending_receipt.lock().replace(PendingReceipt {
            receipt_id: receipt_id.into(),
            tx,
        });
        if let Some(previous) = previous {
            let _ = previous
                .tx
                .send(ReceiptOutcome::Failed("superseded by a newer receipt".to_string()));
        }
        rx
    }

    /// Returns whether a receipt waiter is registered.
    pub fn awaiting_receipt(&self) -> bool {
        self.pending_receipt.lock().is_some()
    }

    /// Routes one frame.
    ///
    /// Returns [`Flow::Stop`] once a pending receipt has been resolved.
    pub fn dispatch(&self, frame: Frame) -> Flow {
        tracing::debug!("dispatch: {} ({} headers)", frame.command, frame.headers.len());

        if frame.command == Command::Message {
            self.route_message(frame);
            return Flow::Continue;
        }

        let pending = self.pending_receipt.lock().take();
        if let Some(pending) = pending {
            let outcome = match frame.command {
                Command::Receipt => match frame.header("receipt-id") {
                    Some(id) if id == pending.receipt_id => ReceiptOutcome::Matched,
                    other => ReceiptOutcome::Mismatch {
                        expected: pending.receipt_id.clone(),
                        actual: other.map(str::to_string),
                    },
                },
                _ => ReceiptOutcome::Unexpected(Box::new(frame)),
            };
            let _ = pending.tx.send(outcome);
            return Flow::Stop;
        }

        match frame.command {
            Command::Error => {
                tracing::warn!(
                    "Broker sent ERROR: {}",
                    frame.header("message").unwrap_or("<no message>")
                );
                // No listeners is fine.
                let _ = self.errors.send(frame);
            }
            Command::Receipt => {
                tracing::debug!(
                    "Ignoring unsolicited RECEIPT {}",
                    frame.header("receipt-id").unwrap_or("<none>")
                );
            }
            other => {
                tracing::warn!("Unexpected {} frame from broker", other);
            }
        }
        Flow::Continue
    }

    /// Resolves a pending receipt wait after the broker closed the connection.
    pub fn connection_closed(&self) {
        if let Some(pending) = self.pending_receipt.lock().take() {
            let _ = pending.tx.send(ReceiptOutcome::Closed);
        }
    }

    /// Resolves a pending receipt wait after a fatal read or parse error.
    pub fn connection_failed(&self, reason: impl Into<String>) {
        if let Some(pending) = self.pending_receipt.lock().take() {
            let _ = pending.tx.send(ReceiptOutcome::Failed(reason.into()));
        }
    }

    fn route_message(&self, frame: Frame) {
        let Some(destination) = frame.header("destination") else {
            tracing::warn!("MESSAGE without destination header dropped");
            return;
        };
        let name = strip_destination_prefix(&self.destination_prefix, destination);

        match self.registry.lookup(name) {
            Ok(handler) => handler.on_message(frame),
            Err(e) => tracing::warn!("Unroutable MESSAGE for {}: {}", destination, e),
        }
    }
}
