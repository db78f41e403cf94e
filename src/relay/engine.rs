//! Relay engine
//!
//! `Relay` is the one service object per process. It owns the connection
//! registry and the subscription manager, and it is driven by a single task
//! (`Relay::run`) that consumes two event streams:
//! - transport lifecycle events from the WebSocket server (connect, control
//!   message, disconnect)
//! - middleware events (deliveries, acks, per-topic delivery errors)
//!
//! Every mutation of the topic index and the reference counts happens on that
//! task, so there is no lock around either. The public `handle_*` methods are
//! synchronous and are what the tests drive directly.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tungstenite::protocol::Message as WsMessage;

use super::registry::{ConnectionId, ConnectionRegistry, SendOutcome, SubscribeOutcome};
use super::subscription::{AckOutcome, SubscriptionManager};
use crate::catalog::{ChannelCatalog, NeedKind};
use crate::config::RelaySettings;
use crate::directory::TopicDirectory;
use crate::middleware::{
    self, DeliveryOptions, Middleware, MiddlewareEvent, MiddlewareEvents, MiddlewareSink,
};
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::utils::error::{MiddlewareError, RelayError, SubscriptionError};

/// Lifecycle events produced by the transport for each connection.
#[derive(Debug)]
pub enum TransportEvent {
    Connected {
        id: ConnectionId,
        sender: mpsc::Sender<WsMessage>,
    },
    Control {
        id: ConnectionId,
        text: String,
    },
    Disconnected {
        id: ConnectionId,
    },
}

pub struct Relay {
    pub(super) catalog: Arc<ChannelCatalog>,
    directory: Arc<TopicDirectory>,
    pub(super) registry: ConnectionRegistry,
    pub(super) subscriptions: SubscriptionManager,
    middleware: Arc<dyn Middleware>,
    options: DeliveryOptions,
    pending_sink: Option<MiddlewareSink>,
    handshake_retry: Duration,
    directory_poll: Duration,
}

impl Relay {
    /// Build the relay and the receiving end of its middleware channel.
    ///
    /// Nothing is registered with the middleware yet; `run` (or
    /// `try_register`) does that once the handshake has completed.
    pub fn new(
        catalog: Arc<ChannelCatalog>,
        middleware: Arc<dyn Middleware>,
        settings: &RelaySettings,
    ) -> (Self, MiddlewareEvents) {
        let options = DeliveryOptions {
            period: settings.period(),
            queue_size: settings.queue_size,
        };
        let (sink, events) = middleware::channel(options.queue_size);
        let relay = Self {
            catalog,
            directory: Arc::new(TopicDirectory::new()),
            registry: ConnectionRegistry::new(),
            subscriptions: SubscriptionManager::new(Arc::clone(&middleware), options),
            middleware,
            options,
            pending_sink: Some(sink),
            handshake_retry: settings.handshake_retry(),
            directory_poll: settings.directory_poll(),
        };
        (relay, events)
    }

    pub fn directory(&self) -> Arc<TopicDirectory> {
        Arc::clone(&self.directory)
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    pub fn is_registered(&self) -> bool {
        self.pending_sink.is_none()
    }

    /// Register the dynamic subscription if the middleware handshake is done.
    ///
    /// Returns `Ok(false)` while the handshake is pending. Any other
    /// registration failure means the middleware link cannot be established.
    pub fn try_register(&mut self) -> Result<bool, RelayError> {
        let Some(sink) = self.pending_sink.take() else {
            return Ok(true);
        };
        if !self.middleware.is_ready() {
            debug!("middleware handshake pending, retrying registration later");
            self.pending_sink = Some(sink);
            return Ok(false);
        }

        match self
            .middleware
            .register_dynamic_subscription(sink.clone(), self.options)
        {
            Ok(()) => {
                info!(
                    "registered dynamic subscription (period {:?}, queue size {})",
                    self.options.period, self.options.queue_size
                );
                for failure in self.subscriptions.set_link_ready() {
                    self.fail_subscription(failure);
                }
                self.refresh_directory();
                Ok(true)
            }
            Err(MiddlewareError::NotReady) => {
                self.pending_sink = Some(sink);
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected { id, sender } => {
                info!("{id} connected");
                self.registry.register(id, sender);
            }
            TransportEvent::Control { id, text } => self.handle_control(&id, &text),
            TransportEvent::Disconnected { id } => self.disconnect(&id),
        }
    }

    /// Apply one control message. Malformed messages are logged and ignored.
    pub fn handle_control(&mut self, conn: &str, text: &str) {
        let message = match ClientMessage::parse(text) {
            Ok(message) => message,
            Err(err) => {
                warn!(
                    "invalid control message from {conn}: {err} | {}",
                    text.chars().take(100).collect::<String>()
                );
                return;
            }
        };

        match message {
            ClientMessage::MetaInfo => {
                self.refresh_directory();
                let topics = self.directory.snapshot();
                self.reply(conn, &ServerMessage::MetaInfo { topics });
            }
            ClientMessage::Subscribe { need, topic, slot } => {
                self.subscribe(conn, need, &topic, &slot);
            }
            ClientMessage::UnsubscribeSlot { slot } => {
                match self
                    .registry
                    .unsubscribe_slot(conn, &slot, &mut self.subscriptions)
                {
                    Ok(Some(topic)) => info!("{conn} unsubscribed slot {slot} from {topic}"),
                    Ok(None) => debug!("{conn} unsubscribed unbound slot {slot}"),
                    Err(err) => warn!("unsubscribe of slot {slot} for {conn} failed: {err}"),
                }
            }
            ClientMessage::UnsubscribeTopic { topic } => {
                match self
                    .registry
                    .unsubscribe(conn, &topic, &mut self.subscriptions)
                {
                    Ok(true) => info!("{conn} unsubscribed from {topic}"),
                    Ok(false) => debug!("{conn} was not subscribed to {topic}"),
                    Err(err) => warn!("unsubscribe of {topic} for {conn} failed: {err}"),
                }
            }
        }
    }

    pub fn handle_middleware_event(&mut self, event: MiddlewareEvent) {
        match event {
            MiddlewareEvent::SubscribeAck { topic, result } => {
                match self.subscriptions.on_subscribe_ack(&topic, result) {
                    AckOutcome::Failed(err) => self.fail_subscription(err),
                    AckOutcome::Active | AckOutcome::Cancelled | AckOutcome::Ignored => {}
                }
            }
            MiddlewareEvent::UnsubscribeAck { topic } => {
                if let Err(err) = self.subscriptions.on_unsubscribe_ack(&topic) {
                    self.fail_subscription(err);
                }
            }
            MiddlewareEvent::DeliveryError { topic, status } => {
                warn!("[{topic}] middleware delivery error: {status}");
            }
        }
    }

    /// Re-query the middleware's topic list. Failures keep the previous table.
    pub fn refresh_directory(&mut self) {
        match self.middleware.query_topics() {
            Ok(topics) => {
                let summary = self.directory.refresh(topics);
                if !summary.added.is_empty() || !summary.removed.is_empty() {
                    info!(
                        "topic directory updated: +{:?} -{:?}",
                        summary.added, summary.removed
                    );
                }
            }
            Err(err) => warn!("topic query failed: {err}"),
        }
    }

    /// Tear down `conn` and release everything it held.
    pub fn disconnect(&mut self, conn: &str) {
        if !self.registry.contains(conn) {
            return;
        }
        self.registry.mark_dead(conn);
        let released = self.registry.on_disconnect(conn, &mut self.subscriptions);
        info!("{conn} disconnected, released {released:?}");
    }

    /// Registration pending, or an unsubscribe the middleware refused.
    fn needs_retry(&self) -> bool {
        !self.is_registered() || self.subscriptions.pending_unsubscribes() > 0
    }

    /// Drive the relay until the transport side goes away.
    pub async fn run(
        mut self,
        mut transport: mpsc::UnboundedReceiver<TransportEvent>,
        mut middleware: MiddlewareEvents,
    ) -> Result<(), RelayError> {
        self.try_register()?;

        let mut retry = tokio::time::interval(self.handshake_retry);
        retry.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut poll = tokio::time::interval(self.directory_poll);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = transport.recv() => match event {
                    Some(event) => self.handle_transport(event),
                    None => {
                        info!("transport closed, stopping relay");
                        return Ok(());
                    }
                },
                Some(event) = middleware.events.recv() => self.handle_middleware_event(event),
                Some(message) = middleware.messages.recv() => {
                    self.dispatch(message);
                }
                _ = retry.tick(), if self.needs_retry() => {
                    if self.try_register()? {
                        let pending = self.subscriptions.retry_unsubscribes();
                        if pending > 0 {
                            warn!("{pending} unsubscribe requests still refused");
                        }
                    }
                }
                _ = poll.tick(), if self.is_registered() => self.refresh_directory(),
            }
        }
    }

    fn subscribe(&mut self, conn: &str, need: NeedKind, topic: &str, slot: &str) {
        let info = match self.directory.get(topic) {
            Some(info) => Some(info),
            None => {
                // the table may be one poll behind
                self.refresh_directory();
                self.directory.get(topic)
            }
        };
        let Some(info) = info else {
            let err = RelayError::UnknownTopic {
                topic: topic.to_string(),
            };
            self.reject_subscribe(conn, topic, slot, &err);
            return;
        };
        if info.type_name != need.message_type() {
            let err = RelayError::NeedMismatch {
                topic: topic.to_string(),
                need: need.name().to_string(),
                expected: need.message_type().to_string(),
                actual: info.type_name,
            };
            self.reject_subscribe(conn, topic, slot, &err);
            return;
        }

        match self.registry.subscribe(
            conn,
            slot,
            topic,
            &info.type_name,
            &mut self.subscriptions,
        ) {
            Ok(SubscribeOutcome::Unchanged) => debug!("{conn} slot {slot} already on {topic}"),
            Ok(SubscribeOutcome::Bound { released: Some(old) }) => {
                info!("{conn} moved slot {slot} from {old} to {topic}")
            }
            Ok(SubscribeOutcome::Bound { released: None }) => {
                info!("{conn} subscribed slot {slot} to {topic}")
            }
            Err(err @ RelayError::Subscription(SubscriptionError::Failed { .. })) => {
                self.reject_subscribe(conn, topic, slot, &err);
            }
            Err(err) => warn!("subscribe of {conn} to {topic} failed: {err}"),
        }
    }

    fn reject_subscribe(&mut self, conn: &str, topic: &str, slot: &str, err: &RelayError) {
        warn!("rejecting subscribe of {conn} to {topic}: {err}");
        self.reply(
            conn,
            &ServerMessage::SubscriptionFailed {
                topic: topic.to_string(),
                slot: Some(slot.to_string()),
                reason: err.to_string(),
            },
        );
    }

    /// Tell the clients that were waiting on a failed topic, and nobody else.
    fn fail_subscription(&mut self, err: SubscriptionError) {
        let (topic, reason) = match err {
            SubscriptionError::Failed { topic, reason } => (topic, reason),
            other => {
                error!("{other}");
                return;
            }
        };
        for (conn, slots) in self.registry.drop_topic(&topic) {
            let slots: Vec<Option<String>> = if slots.is_empty() {
                vec![None]
            } else {
                slots.into_iter().map(Some).collect()
            };
            for slot in slots {
                self.reply(
                    &conn,
                    &ServerMessage::SubscriptionFailed {
                        topic: topic.clone(),
                        slot,
                        reason: reason.clone(),
                    },
                );
            }
        }
    }

    fn reply(&mut self, conn: &str, message: &ServerMessage) {
        let frame = match message.to_ws() {
            Ok(frame) => frame,
            Err(err) => {
                error!("failed to serialize reply for {conn}: {err}");
                return;
            }
        };
        match self.registry.send(conn, frame) {
            SendOutcome::Sent => {}
            SendOutcome::Dropped => warn!("outbound queue full for {conn}, reply dropped"),
            SendOutcome::Dead => self.disconnect(conn),
        }
    }
}
