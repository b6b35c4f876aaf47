//! Subscription registry.
//!
//! Maps destinations to their subscription id and delivery target. All
//! operations take one short lock; handlers are handed out as `Arc`s and
//! always invoked after the lock is released.

use crate::error::ClientError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use stompwire_protocol::Frame;
use tokio::sync::mpsc;

/// Delivery target for frames routed to a subscription.
pub trait MessageHandler: Send + Sync {
    fn on_message(&self, frame: Frame);
}

impl<F> MessageHandler for F
where
    F: Fn(Frame) + Send + Sync,
{
    fn on_message(&self, frame: Frame) {
        self(frame)
    }
}

/// Returns a handler that forwards every frame into `tx`.
///
/// Frames are dropped once the receiver has gone away.
pub fn channel_handler(tx: mpsc::UnboundedSender<Frame>) -> impl MessageHandler {
    move |frame: Frame| {
        if tx.send(frame).is_err() {
            tracing::debug!("Subscription receiver dropped, discarding frame");
        }
    }
}

/// Identifier sent in the `id` header of SUBSCRIBE and UNSUBSCRIBE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Subscription {
    id: SubscriptionId,
    handler: Arc<dyn MessageHandler>,
}

struct RegistryInner {
    subscriptions: HashMap<String, Subscription>,
    last_id: u64,
}

/// Registry of active subscriptions for one session.
pub struct SubscriptionRegistry {
    inner: Mutex<RegistryInner>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                subscriptions: HashMap::new(),
                last_id: 0,
            }),
        }
    }

    /// Registers `handler` for `destination` and assigns the next id.
    ///
    /// Ids are never reused within one registry: each new id is one past the
    /// highest id ever assigned here.
    pub fn subscribe(
        &self,
        destination: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<SubscriptionId, ClientError> {
        let mut inner = self.inner.lock();
        if inner.subscriptions.contains_key(destination) {
            return Err(ClientError::AlreadySubscribed(destination.to_string()));
        }

        inner.last_id += 1;
        let id = SubscriptionId(inner.last_id);
        inner
            .subscriptions
            .insert(destination.to_string(), Subscription { id, handler });
        Ok(id)
    }

    /// Removes the subscription for `destination`, returning its id.
    pub fn unsubscribe(&self, destination: &str) -> Result<SubscriptionId, ClientError> {
        self.inner
            .lock()
            .subscriptions
            .remove(destination)
            .map(|sub| sub.id)
            .ok_or_else(|| ClientError::NotSubscribed(destination.to_string()))
    }

    /// Returns the handler registered for `destination`.
    pub fn lookup(&self, destination: &str) -> Result<Arc<dyn MessageHandler>, ClientError> {
        self.inner
            .lock()
            .subscriptions
            .get(destination)
            .map(|sub| sub.handler.clone())
            .ok_or_else(|| ClientError::NotSubscribed(destination.to_string()))
    }

    pub fn contains(&self, destination: &str) -> bool {
        self.inner.lock().subscriptions.contains_key(destination)
    }

    pub fn subscription_id(&self, destination: &str) -> Option<SubscriptionId> {
        self.inner
            .lock()
            .subscriptions
            .get(destination)
            .map(|sub| sub.id)
    }

    /// Lists active subscriptions ordered by id.
    pub fn list(&self) -> Vec<(SubscriptionId, String)> {
        let mut subs: Vec<_> = self
            .inner
            .lock()
            .subscriptions
            .iter()
            .map(|(dest, sub)| (sub.id, dest.clone()))
            .collect();
        subs.sort();
        subs
    }

    pub fn len(&self) -> usize {
        self.inner.lock().subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every subscription. Ids keep counting from where they were.
    pub fn clear(&self) {
        self.inner.lock().subscriptions.clear();
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
