//! Middleware adapter contract
//!
//! The relay never talks to the robotics bus directly. It registers one
//! dynamic subscription through a [`Middleware`] implementation and then asks
//! it to subscribe or unsubscribe topics. Everything the adapter produces
//! (deliveries, per-topic errors, request acknowledgements) flows back through
//! a [`MiddlewareSink`] into the relay's dispatch loop.
//!
//! Deliveries travel on a bounded channel sized by `DeliveryOptions::queue_size`.
//! When it is full the adapter drops the message: delivery is at-most-once and
//! there is no retransmission.

pub mod demo;
pub mod memory;

use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::directory::TopicInfo;
use crate::utils::error::MiddlewareError;

pub use memory::InMemoryMiddleware;

/// One message delivered by the middleware. Lives for a single dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveredMessage {
    pub topic: String,
    pub type_name: String,
    pub payload: Value,
}

/// Polling period and queue depth handed to the middleware at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryOptions {
    pub period: Duration,
    pub queue_size: usize,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(100),
            queue_size: 1,
        }
    }
}

/// Control-plane notifications from the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiddlewareEvent {
    SubscribeAck {
        topic: String,
        result: Result<(), String>,
    },
    UnsubscribeAck {
        topic: String,
    },
    /// The middleware could not serve `topic`. Logged and otherwise ignored.
    DeliveryError {
        topic: String,
        status: String,
    },
}

/// Adapter-side handle used to push deliveries and notifications to the relay.
#[derive(Debug, Clone)]
pub struct MiddlewareSink {
    messages: mpsc::Sender<DeliveredMessage>,
    events: mpsc::UnboundedSender<MiddlewareEvent>,
}

impl MiddlewareSink {
    /// Offer a delivery. Returns `false` when the queue is full or the relay is gone.
    pub fn deliver(&self, message: DeliveredMessage) -> bool {
        self.messages.try_send(message).is_ok()
    }

    pub fn notify(&self, event: MiddlewareEvent) -> bool {
        self.events.send(event).is_ok()
    }
}

/// Relay-side receivers matching a [`MiddlewareSink`].
#[derive(Debug)]
pub struct MiddlewareEvents {
    pub messages: mpsc::Receiver<DeliveredMessage>,
    pub events: mpsc::UnboundedReceiver<MiddlewareEvent>,
}

/// Create a sink/receiver pair. A `queue_size` of zero is treated as one.
pub fn channel(queue_size: usize) -> (MiddlewareSink, MiddlewareEvents) {
    let (msg_tx, msg_rx) = mpsc::channel(queue_size.max(1));
    let (evt_tx, evt_rx) = mpsc::unbounded_channel();
    (
        MiddlewareSink {
            messages: msg_tx,
            events: evt_tx,
        },
        MiddlewareEvents {
            messages: msg_rx,
            events: evt_rx,
        },
    )
}

/// What the relay needs from a middleware client.
///
/// Every method must return promptly. `subscribe` and `unsubscribe` only issue
/// the request; the outcome arrives later as a [`MiddlewareEvent`] ack.
pub trait Middleware: Send + Sync {
    /// Whether the client handshake with the middleware has completed.
    fn is_ready(&self) -> bool;

    fn register_dynamic_subscription(
        &self,
        sink: MiddlewareSink,
        options: DeliveryOptions,
    ) -> Result<(), MiddlewareError>;

    fn subscribe(
        &self,
        topic: &str,
        type_name: &str,
        options: &DeliveryOptions,
    ) -> Result<(), MiddlewareError>;

    fn unsubscribe(&self, topic: &str) -> Result<(), MiddlewareError>;

    fn query_topics(&self) -> Result<Vec<TopicInfo>, MiddlewareError>;
}

#[cfg(test)]
mod tests;
