//! Client topic resolver
//!
//! Each UI panel mounts a *need* on a slot: "show me a Lidar here". The
//! resolver lists the directory topics that can satisfy it, resolves the
//! endpoint of the topic the user picks, and keeps at most one outstanding
//! subscription per slot. Nothing is ever chosen automatically.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::catalog::NeedKind;
use crate::directory::TopicInfo;
use crate::transport::message::ClientMessage;
use crate::utils::error::ResolveError;

/// Where the resolver sends its subscribe and unsubscribe requests.
pub trait SubscriptionSink {
    fn send_control(&mut self, message: ClientMessage) -> Result<(), ResolveError>;
}

impl SubscriptionSink for mpsc::UnboundedSender<ClientMessage> {
    fn send_control(&mut self, message: ClientMessage) -> Result<(), ResolveError> {
        self.send(message)
            .map_err(|e| ResolveError::Send(e.to_string()))
    }
}

/// The topic a slot is bound to and the endpoint it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub topic: String,
    pub type_name: String,
    pub endpoint: SocketAddr,
}

#[derive(Debug)]
struct Need {
    kind: NeedKind,
    selection: Option<Selection>,
}

pub struct TopicResolver<S> {
    sink: S,
    directory: BTreeMap<String, TopicInfo>,
    needs: BTreeMap<String, Need>,
}

impl<S: SubscriptionSink> TopicResolver<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            directory: BTreeMap::new(),
            needs: BTreeMap::new(),
        }
    }

    /// Replace the known topics with a fresh meta-info snapshot.
    ///
    /// Selections survive; [`selection`](Self::selection) hides the ones whose
    /// topic no longer exists with the same type.
    pub fn apply_directory(&mut self, topics: Vec<TopicInfo>) {
        self.directory = topics
            .into_iter()
            .map(|info| (info.topic.clone(), info))
            .collect();
        debug!("resolver directory holds {} topics", self.directory.len());
    }

    /// Mount a need on `slot`. Re-mounting with another kind drops the old binding.
    pub fn mount(&mut self, slot: &str, kind: NeedKind) -> Result<(), ResolveError> {
        if let Some(existing) = self.needs.get(slot) {
            if existing.kind == kind {
                return Ok(());
            }
            self.unmount(slot)?;
        }
        self.needs.insert(
            slot.to_string(),
            Need {
                kind,
                selection: None,
            },
        );
        Ok(())
    }

    /// Topics that can satisfy the need on `slot`, sorted by name.
    pub fn candidates(&self, slot: &str) -> Result<Vec<&TopicInfo>, ResolveError> {
        let need = self.need(slot)?;
        Ok(self
            .directory
            .values()
            .filter(|info| info.type_name == need.kind.message_type())
            .filter(|info| info.has_websocket_channel())
            .collect())
    }

    /// Bind `slot` to `topic`.
    ///
    /// On failure nothing is sent and the previous binding, if any, is kept.
    /// A change of topic sends one unsubscribe followed by one subscribe.
    pub fn select(&mut self, slot: &str, topic: &str) -> Result<Selection, ResolveError> {
        let kind = self.need(slot)?.kind;

        let Some(info) = self.directory.get(topic) else {
            warn!("cannot resolve {topic}: not in directory");
            return Err(ResolveError::EndpointUnresolved {
                topic: topic.to_string(),
            });
        };
        if info.type_name != kind.message_type() {
            return Err(ResolveError::TypeMismatch {
                topic: topic.to_string(),
                expected: kind.message_type().to_string(),
                actual: info.type_name.clone(),
            });
        }
        let Some(endpoint) = info.websocket_endpoint() else {
            warn!("cannot resolve {topic}: no usable websocket endpoint");
            return Err(ResolveError::EndpointUnresolved {
                topic: topic.to_string(),
            });
        };
        let selection = Selection {
            topic: topic.to_string(),
            type_name: info.type_name.clone(),
            endpoint,
        };

        let previous = self.need(slot)?.selection.clone();
        if previous.as_ref().is_some_and(|p| p.topic == topic) {
            self.set_selection(slot, Some(selection.clone()));
            return Ok(selection);
        }

        if previous.is_some() {
            self.set_selection(slot, None);
            self.sink.send_control(ClientMessage::UnsubscribeSlot {
                slot: slot.to_string(),
            })?;
        }
        self.sink.send_control(ClientMessage::Subscribe {
            need: kind,
            topic: topic.to_string(),
            slot: slot.to_string(),
        })?;
        self.set_selection(slot, Some(selection.clone()));
        Ok(selection)
    }

    /// Drop the binding of `slot` but keep the need mounted.
    pub fn clear_selection(&mut self, slot: &str) -> Result<(), ResolveError> {
        if self.need(slot)?.selection.is_none() {
            return Ok(());
        }
        self.set_selection(slot, None);
        self.sink.send_control(ClientMessage::UnsubscribeSlot {
            slot: slot.to_string(),
        })
    }

    /// Remove the need on `slot`, unsubscribing its topic.
    pub fn unmount(&mut self, slot: &str) -> Result<(), ResolveError> {
        let Some(need) = self.needs.remove(slot) else {
            return Ok(());
        };
        if need.selection.is_some() {
            self.sink.send_control(ClientMessage::UnsubscribeSlot {
                slot: slot.to_string(),
            })?;
        }
        Ok(())
    }

    /// The relay gave up on `topic`; forget the bindings that pointed at it.
    pub fn on_subscription_failed(&mut self, topic: &str, slot: Option<&str>) {
        for (name, need) in self.needs.iter_mut() {
            let matches_slot = slot.is_none_or(|s| s == name);
            if matches_slot && need.selection.as_ref().is_some_and(|s| s.topic == topic) {
                need.selection = None;
            }
        }
    }

    /// The current binding of `slot`, if its topic is still in the directory
    /// with the same type.
    pub fn selection(&self, slot: &str) -> Option<&Selection> {
        let selection = self.needs.get(slot)?.selection.as_ref()?;
        self.directory
            .get(&selection.topic)
            .filter(|info| info.type_name == selection.type_name)
            .map(|_| selection)
    }

    pub fn need_kind(&self, slot: &str) -> Option<NeedKind> {
        self.needs.get(slot).map(|n| n.kind)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn need(&self, slot: &str) -> Result<&Need, ResolveError> {
        self.needs.get(slot).ok_or_else(|| ResolveError::UnknownSlot {
            slot: slot.to_string(),
        })
    }

    fn set_selection(&mut self, slot: &str, selection: Option<Selection>) {
        if let Some(need) = self.needs.get_mut(slot) {
            need.selection = selection;
        }
    }
}
