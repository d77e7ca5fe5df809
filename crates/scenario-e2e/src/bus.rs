//! In-memory message bus.
//!
//! Queues are addressed by [`Address`] and backed by unbounded tokio
//! channels, so endpoints hosted on different runtimes can talk to each
//! other. Deferred sends are delivered by a timer task spawned on the
//! sender's runtime.

use chrono::Utc;
use scenario_proto::{Address, EndpointError, MessageIntent, SendOptions};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Errors raised by [`InMemoryBus`].
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("send options carry no destination")]
    NoDestination,

    #[error("queue {0} is not bound")]
    UnknownQueue(Address),

    #[error("queue {0} is already bound")]
    AlreadyBound(Address),

    #[error("queue {0} is closed")]
    Closed(Address),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<BusError> for EndpointError {
    fn from(e: BusError) -> Self {
        EndpointError::Transport(e.to_string())
    }
}

/// A message in flight.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub id: u64,
    pub intent: MessageIntent,
    pub correlation_id: Option<String>,
    pub reply_to: Option<Address>,
    pub body: serde_json::Value,
}

impl Envelope {
    /// Decodes the body into a typed message.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.body.clone())
    }
}

/// Receiving half of a bound queue.
pub type Inbox = mpsc::UnboundedReceiver<Envelope>;

#[derive(Debug, Default)]
pub struct InMemoryBus {
    queues: Mutex<HashMap<Address, mpsc::UnboundedSender<Envelope>>>,
    next_id: AtomicU64,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a queue and returns its inbox.
    ///
    /// A queue whose previous inbox was dropped can be bound again.
    pub fn bind(&self, address: &Address) -> Result<Inbox, BusError> {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        if queues.get(address).is_some_and(|tx| !tx.is_closed()) {
            return Err(BusError::AlreadyBound(address.clone()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        queues.insert(address.clone(), tx);
        debug!(queue = %address, "Queue bound");
        Ok(rx)
    }

    /// Sends `message` according to `options` and returns the message id.
    ///
    /// Deferred messages are handed to a timer task on the current tokio
    /// runtime; an unknown destination is reported immediately either way.
    pub fn send<T: Serialize>(&self, options: &SendOptions, message: &T) -> Result<u64, BusError> {
        let destination = options.destination.as_ref().ok_or(BusError::NoDestination)?;
        let tx = self
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(destination)
            .cloned()
            .ok_or_else(|| BusError::UnknownQueue(destination.clone()))?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let envelope = Envelope {
            id,
            intent: options.intent,
            correlation_id: options.correlation_id.clone(),
            reply_to: options.reply_to_address.clone(),
            body: serde_json::to_value(message)?,
        };

        let delay = delivery_delay(options);
        if delay.is_zero() {
            tx.send(envelope)
                .map_err(|_| BusError::Closed(destination.clone()))?;
            debug!(id, queue = %destination, intent = ?options.intent, "Message delivered");
        } else {
            let queue = destination.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if tx.send(envelope).is_err() {
                    debug!(id, queue = %queue, "Deferred message dropped, queue closed");
                }
            });
            debug!(id, queue = %destination, delay_ms = delay.as_millis() as u64, "Message deferred");
        }
        Ok(id)
    }
}

/// How long to hold a message back. An explicit delay wins over a
/// delivery time; a delivery time in the past means no delay.
fn delivery_delay(options: &SendOptions) -> Duration {
    if let Some(delay) = options.delay_delivery_with {
        return delay;
    }
    options
        .deliver_at
        .and_then(|at| (at - Utc::now()).to_std().ok())
        .unwrap_or(Duration::ZERO)
}
