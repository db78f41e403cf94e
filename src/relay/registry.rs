//! Connection registry
//!
//! Tracks every live transport connection, the slots each one has bound to a
//! topic, and a topic → connections index the dispatcher reads on every
//! delivery.
//!
//! A connection references a topic once no matter how many of its slots point
//! at it; that single (connection, topic) pair is what the subscription
//! manager counts.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use tungstenite::protocol::Message as WsMessage;

use super::subscription::SubscriptionManager;
use crate::utils::error::RelayError;

pub type ConnectionId = String;

#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub connected_at: DateTime<Utc>,
    sender: mpsc::Sender<WsMessage>,
    alive: bool,
    slots: HashMap<String, String>,
    /// Topic → number of this connection's slots bound to it.
    topics: HashMap<String, usize>,
}

impl Connection {
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn topic_for_slot(&self, slot: &str) -> Option<&str> {
        self.slots.get(slot).map(String::as_str)
    }
}

/// What `subscribe` changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// The slot already pointed at this topic.
    Unchanged,
    /// The slot now points at the topic; `released` is the topic it left, if any.
    Bound { released: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Outbound queue full; this frame is lost for this connection only.
    Dropped,
    /// The writer side is gone.
    Dead,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
    topic_index: HashMap<String, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: ConnectionId, sender: mpsc::Sender<WsMessage>) {
        self.connections.insert(
            id.clone(),
            Connection {
                id,
                connected_at: Utc::now(),
                sender,
                alive: true,
                slots: HashMap::new(),
                topics: HashMap::new(),
            },
        );
    }

    /// Bind `slot` of `conn` to `topic`.
    ///
    /// A slot bound elsewhere is unbound first, so the old topic is released
    /// before the new one is acquired. If the acquire fails the slot stays
    /// unbound.
    pub fn subscribe(
        &mut self,
        conn: &str,
        slot: &str,
        topic: &str,
        type_name: &str,
        manager: &mut SubscriptionManager,
    ) -> Result<SubscribeOutcome, RelayError> {
        let connection = self.live_connection(conn)?;
        if connection.slots.get(slot).map(String::as_str) == Some(topic) {
            return Ok(SubscribeOutcome::Unchanged);
        }

        let released = self.unsubscribe_slot(conn, slot, manager)?;

        let connection = self.live_connection(conn)?;
        let first_reference = !connection.topics.contains_key(topic);
        if first_reference {
            manager.acquire(topic, type_name)?;
        }

        let connection = self.live_connection(conn)?;
        connection.slots.insert(slot.to_string(), topic.to_string());
        *connection.topics.entry(topic.to_string()).or_insert(0) += 1;
        self.topic_index
            .entry(topic.to_string())
            .or_default()
            .insert(conn.to_string());

        debug!("{conn} bound slot {slot} to {topic}");
        Ok(SubscribeOutcome::Bound { released })
    }

    /// Unbind one slot. Returns the topic it pointed at, if any.
    pub fn unsubscribe_slot(
        &mut self,
        conn: &str,
        slot: &str,
        manager: &mut SubscriptionManager,
    ) -> Result<Option<String>, RelayError> {
        let connection = self.live_connection(conn)?;
        let Some(topic) = connection.slots.remove(slot) else {
            return Ok(None);
        };

        let last_slot = match connection.topics.get_mut(&topic) {
            Some(slots) => {
                *slots = slots.saturating_sub(1);
                *slots == 0
            }
            None => true,
        };
        if last_slot {
            connection.topics.remove(&topic);
            self.unindex(conn, &topic);
            manager.release(&topic)?;
        }
        Ok(Some(topic))
    }

    /// Drop every slot of `conn` bound to `topic`. Returns whether any existed.
    pub fn unsubscribe(
        &mut self,
        conn: &str,
        topic: &str,
        manager: &mut SubscriptionManager,
    ) -> Result<bool, RelayError> {
        let connection = self.live_connection(conn)?;
        if connection.topics.remove(topic).is_none() {
            return Ok(false);
        }
        connection.slots.retain(|_, t| t.as_str() != topic);
        self.unindex(conn, topic);
        manager.release(topic)?;
        Ok(true)
    }

    /// Connections currently subscribed to `topic`, sorted by id.
    pub fn connections_for(&self, topic: &str) -> Vec<ConnectionId> {
        let Some(ids) = self.topic_index.get(topic) else {
            return Vec::new();
        };
        let live: BTreeSet<&ConnectionId> = ids
            .iter()
            .filter(|id| self.connections.get(*id).is_some_and(Connection::is_alive))
            .collect();
        live.into_iter().cloned().collect()
    }

    /// Remove `conn` and release each topic it held exactly once.
    ///
    /// Returns the released topics. Unknown ids are a no-op, so transport
    /// and dispatcher may both report the same disconnect.
    pub fn on_disconnect(
        &mut self,
        conn: &str,
        manager: &mut SubscriptionManager,
    ) -> Vec<String> {
        let Some(connection) = self.connections.remove(conn) else {
            return Vec::new();
        };

        let mut released: Vec<String> = connection.topics.into_keys().collect();
        released.sort();
        let session = Utc::now().signed_duration_since(connection.connected_at);
        debug!(
            "{conn} closing after {}s holding {} topics",
            session.num_seconds(),
            released.len()
        );
        for topic in &released {
            self.unindex(conn, topic);
            if let Err(err) = manager.release(topic) {
                warn!("releasing {topic} for disconnected {conn}: {err}");
            }
        }
        released
    }

    /// Forget every subscription to `topic` without touching reference counts.
    ///
    /// Used after the middleware refused the topic and the manager already
    /// dropped its entry. Returns each affected connection with the slots
    /// that were bound to the topic.
    pub fn drop_topic(&mut self, topic: &str) -> Vec<(ConnectionId, Vec<String>)> {
        let Some(ids) = self.topic_index.remove(topic) else {
            return Vec::new();
        };

        let mut affected = Vec::new();
        for id in ids {
            if let Some(connection) = self.connections.get_mut(&id) {
                connection.topics.remove(topic);
                let mut slots: Vec<String> = connection
                    .slots
                    .iter()
                    .filter(|(_, t)| t.as_str() == topic)
                    .map(|(s, _)| s.clone())
                    .collect();
                connection.slots.retain(|_, t| t.as_str() != topic);
                slots.sort();
                affected.push((id, slots));
            }
        }
        affected.sort();
        affected
    }

    /// Queue a frame on `conn` without waiting.
    pub fn send(&self, conn: &str, frame: WsMessage) -> SendOutcome {
        let Some(connection) = self.connections.get(conn).filter(|c| c.alive) else {
            return SendOutcome::Dead;
        };
        match connection.sender.try_send(frame) {
            Ok(()) => SendOutcome::Sent,
            Err(TrySendError::Full(_)) => SendOutcome::Dropped,
            Err(TrySendError::Closed(_)) => SendOutcome::Dead,
        }
    }

    pub fn mark_dead(&mut self, conn: &str) {
        if let Some(connection) = self.connections.get_mut(conn) {
            connection.alive = false;
        }
    }

    pub fn get(&self, conn: &str) -> Option<&Connection> {
        self.connections.get(conn)
    }

    pub fn contains(&self, conn: &str) -> bool {
        self.connections.contains_key(conn)
    }

    /// Topics `conn` holds, sorted.
    pub fn topics_of(&self, conn: &str) -> Vec<String> {
        let mut topics: Vec<String> = self
            .connections
            .get(conn)
            .map(|c| c.topics.keys().cloned().collect())
            .unwrap_or_default();
        topics.sort();
        topics
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn indexed_topics(&self) -> usize {
        self.topic_index.len()
    }

    fn live_connection(&mut self, conn: &str) -> Result<&mut Connection, RelayError> {
        self.connections
            .get_mut(conn)
            .filter(|c| c.alive)
            .ok_or_else(|| RelayError::UnknownConnection {
                id: conn.to_string(),
            })
    }

    fn unindex(&mut self, conn: &str, topic: &str) {
        if let Some(ids) = self.topic_index.get_mut(topic) {
            ids.remove(conn);
            if ids.is_empty() {
                self.topic_index.remove(topic);
            }
        }
    }
}

