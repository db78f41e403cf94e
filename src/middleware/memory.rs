//! In-process middleware
//!
//! A [`Middleware`] backed by plain maps. The demo server publishes synthetic
//! frames through it, and tests use it to script handshakes, rejected
//! subscriptions, held acknowledgements and per-topic delivery errors.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::debug;

use super::{
    DeliveredMessage, DeliveryOptions, Middleware, MiddlewareEvent, MiddlewareSink,
};
use crate::directory::TopicInfo;
use crate::utils::error::MiddlewareError;

/// A subscribe or unsubscribe call as the adapter received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Subscribe(String),
    Unsubscribe(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered,
    /// Nobody asked for the topic; the message never left the middleware.
    NotSubscribed,
    /// The delivery queue was full and the message was discarded.
    Dropped,
    UnknownTopic,
}

#[derive(Debug, Default)]
struct State {
    sink: Option<MiddlewareSink>,
    options: Option<DeliveryOptions>,
    topics: BTreeMap<String, TopicInfo>,
    active: HashSet<String>,
    rejected: HashMap<String, String>,
    refuse_unsubscribe: Option<String>,
    requests: Vec<Request>,
    hold_acks: bool,
    held: Vec<MiddlewareEvent>,
}

#[derive(Debug)]
pub struct InMemoryMiddleware {
    ready: AtomicBool,
    state: Mutex<State>,
}

impl Default for InMemoryMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMiddleware {
    /// A middleware whose handshake has already completed.
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(true),
            state: Mutex::new(State::default()),
        }
    }

    /// A middleware that refuses every request until `complete_handshake`.
    pub fn with_pending_handshake() -> Self {
        let middleware = Self::new();
        middleware.ready.store(false, Ordering::SeqCst);
        middleware
    }

    pub fn complete_handshake(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn advertise(&self, info: TopicInfo) {
        self.lock().topics.insert(info.topic.clone(), info);
    }

    pub fn withdraw(&self, topic: &str) {
        self.lock().topics.remove(topic);
    }

    /// Make every future subscribe to `topic` fail with `reason`.
    pub fn reject(&self, topic: &str, reason: &str) {
        self.lock()
            .rejected
            .insert(topic.to_string(), reason.to_string());
    }

    /// Make `unsubscribe` fail with `reason` until called again with `None`.
    pub fn refuse_unsubscribes(&self, reason: Option<&str>) {
        self.lock().refuse_unsubscribe = reason.map(str::to_string);
    }

    /// Queue acks instead of sending them until `release_acks`.
    pub fn hold_acks(&self, hold: bool) {
        self.lock().hold_acks = hold;
    }

    /// Send every held ack, in the order the requests were made.
    pub fn release_acks(&self) -> usize {
        let mut state = self.lock();
        let held = std::mem::take(&mut state.held);
        let count = held.len();
        if let Some(sink) = &state.sink {
            for event in held {
                sink.notify(event);
            }
        }
        count
    }

    pub fn publish(&self, topic: &str, payload: Value) -> PublishOutcome {
        let state = self.lock();
        let Some(info) = state.topics.get(topic) else {
            return PublishOutcome::UnknownTopic;
        };
        let Some(sink) = state.sink.as_ref().filter(|_| state.active.contains(topic)) else {
            return PublishOutcome::NotSubscribed;
        };

        let delivered = sink.deliver(DeliveredMessage {
            topic: topic.to_string(),
            type_name: info.type_name.clone(),
            payload,
        });
        if delivered {
            PublishOutcome::Delivered
        } else {
            debug!("delivery queue full, dropping message on {topic}");
            PublishOutcome::Dropped
        }
    }

    /// Report that `topic` could not be served.
    pub fn fail_delivery(&self, topic: &str, status: &str) {
        if let Some(sink) = &self.lock().sink {
            sink.notify(MiddlewareEvent::DeliveryError {
                topic: topic.to_string(),
                status: status.to_string(),
            });
        }
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.lock().active.contains(topic)
    }

    pub fn is_registered(&self) -> bool {
        self.lock().sink.is_some()
    }

    pub fn options(&self) -> Option<DeliveryOptions> {
        self.lock().options
    }

    pub fn requests(&self) -> Vec<Request> {
        self.lock().requests.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_link(&self, state: &State) -> Result<(), MiddlewareError> {
        if !self.is_ready() {
            return Err(MiddlewareError::NotReady);
        }
        if state.sink.is_none() {
            return Err(MiddlewareError::NotRegistered);
        }
        Ok(())
    }

    fn ack(state: &mut State, event: MiddlewareEvent) {
        if state.hold_acks {
            state.held.push(event);
        } else if let Some(sink) = &state.sink {
            sink.notify(event);
        }
    }
}

impl Middleware for InMemoryMiddleware {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn register_dynamic_subscription(
        &self,
        sink: MiddlewareSink,
        options: DeliveryOptions,
    ) -> Result<(), MiddlewareError> {
        if !self.is_ready() {
            return Err(MiddlewareError::NotReady);
        }
        let mut state = self.lock();
        if state.sink.is_some() {
            return Err(MiddlewareError::AlreadyRegistered);
        }
        state.sink = Some(sink);
        state.options = Some(options);
        Ok(())
    }

    fn subscribe(
        &self,
        topic: &str,
        _type_name: &str,
        _options: &DeliveryOptions,
    ) -> Result<(), MiddlewareError> {
        let mut state = self.lock();
        self.check_link(&state)?;
        state.requests.push(Request::Subscribe(topic.to_string()));

        let rejection = state.rejected.get(topic).cloned();
        let result = match rejection {
            Some(reason) => Err(reason),
            None => {
                state.active.insert(topic.to_string());
                Ok(())
            }
        };
        Self::ack(
            &mut state,
            MiddlewareEvent::SubscribeAck {
                topic: topic.to_string(),
                result,
            },
        );
        Ok(())
    }

    fn unsubscribe(&self, topic: &str) -> Result<(), MiddlewareError> {
        let mut state = self.lock();
        self.check_link(&state)?;
        if let Some(reason) = &state.refuse_unsubscribe {
            return Err(MiddlewareError::Request(reason.clone()));
        }
        state.requests.push(Request::Unsubscribe(topic.to_string()));
        state.active.remove(topic);
        Self::ack(
            &mut state,
            MiddlewareEvent::UnsubscribeAck {
                topic: topic.to_string(),
            },
        );
        Ok(())
    }

    fn query_topics(&self) -> Result<Vec<TopicInfo>, MiddlewareError> {
        if !self.is_ready() {
            return Err(MiddlewareError::NotReady);
        }
        Ok(self.lock().topics.values().cloned().collect())
    }
}
