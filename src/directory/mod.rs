//! Topic directory
//!
//! Table of the topics the middleware currently reports. It is replaced
//! wholesale on every meta-info query, so readers can observe a view that is
//! up to one polling interval old. Both the relay and each client session keep
//! one; on the relay it sits behind an `Arc` and is shared read-mostly.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelKind {
    Tcp,
    Udp,
    WebSocket,
    Shm,
    Uds,
}

/// One transport a topic is published on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDef {
    pub kind: ChannelKind,
    /// `ip:port` for socket channels, an opaque id for shared memory.
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicInfo {
    pub topic: String,
    pub type_name: String,
    #[serde(default)]
    pub channels: Vec<ChannelDef>,
}

impl TopicInfo {
    pub fn new(topic: &str, type_name: &str) -> Self {
        Self {
            topic: topic.to_string(),
            type_name: type_name.to_string(),
            channels: Vec::new(),
        }
    }

    pub fn with_channel(mut self, kind: ChannelKind, endpoint: &str) -> Self {
        self.channels.push(ChannelDef {
            kind,
            endpoint: endpoint.to_string(),
        });
        self
    }

    pub fn has_websocket_channel(&self) -> bool {
        self.channels.iter().any(|c| c.kind == ChannelKind::WebSocket)
    }

    /// The first websocket endpoint that is a concrete, connectable address.
    ///
    /// Unparseable entries, the unspecified address and port 0 are skipped.
    pub fn websocket_endpoint(&self) -> Option<SocketAddr> {
        self.channels
            .iter()
            .filter(|c| c.kind == ChannelKind::WebSocket)
            .filter_map(|c| c.endpoint.parse::<SocketAddr>().ok())
            .find(|addr| !addr.ip().is_unspecified() && addr.port() != 0)
    }
}

/// What changed in the last refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

#[derive(Debug, Default)]
struct DirectoryState {
    topics: BTreeMap<String, TopicInfo>,
    refreshed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct TopicDirectory {
    state: RwLock<DirectoryState>,
}

impl TopicDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the table with `topics`. Topics missing from the list are dropped.
    pub fn refresh(&self, topics: Vec<TopicInfo>) -> RefreshSummary {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let next: BTreeMap<String, TopicInfo> =
            topics.into_iter().map(|t| (t.topic.clone(), t)).collect();

        let summary = RefreshSummary {
            added: next
                .keys()
                .filter(|k| !state.topics.contains_key(*k))
                .cloned()
                .collect(),
            removed: state
                .topics
                .keys()
                .filter(|k| !next.contains_key(*k))
                .cloned()
                .collect(),
        };

        state.topics = next;
        state.refreshed_at = Some(Utc::now());
        summary
    }

    pub fn get(&self, topic: &str) -> Option<TopicInfo> {
        self.read(|s| s.topics.get(topic).cloned())
    }

    /// Topics carrying `type_name`, ordered by topic name.
    pub fn matching(&self, type_name: &str) -> Vec<TopicInfo> {
        self.read(|s| {
            s.topics
                .values()
                .filter(|t| t.type_name == type_name)
                .cloned()
                .collect()
        })
    }

    pub fn snapshot(&self) -> Vec<TopicInfo> {
        self.read(|s| s.topics.values().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.read(|s| s.topics.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.read(|s| s.refreshed_at)
    }

    fn read<R>(&self, f: impl FnOnce(&DirectoryState) -> R) -> R {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }
}
