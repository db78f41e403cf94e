//! Dynamic subscription manager
//!
//! Reference-counts client demand per topic and keeps exactly one middleware
//! subscription alive for every topic with a positive count. Per topic:
//!
//! ```text
//! Queued ──(link ready)──▶ Subscribing ──ack ok──▶ Subscribed
//!                               │                      │ count → 0
//!                            ack err                   ▼
//!                               ▼                 Unsubscribing ──ack──▶ (removed)
//!                           (removed)                  ▲
//!                                                      │ retry
//!                                                 UnsubscribeRetry
//! ```
//!
//! A topic with no entry is Unsubscribed. An unsubscribe request the
//! middleware refuses keeps its entry in `UnsubscribeRetry` until
//! `retry_unsubscribes` gets it through, so the manager never forgets a
//! topic the middleware may still be serving. The manager is synchronous and owned
//! by the dispatch loop, so acquire/release on the same topic never race.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::middleware::{DeliveryOptions, Middleware};
use crate::utils::error::SubscriptionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Waiting for the middleware handshake; no request issued yet.
    Queued,
    Subscribing,
    Subscribed,
    Unsubscribing,
    /// The unsubscribe request was refused; the middleware may still be
    /// delivering. Count is zero.
    UnsubscribeRetry,
}

#[derive(Debug)]
struct ActiveSubscription {
    type_name: String,
    ref_count: usize,
    state: SubscriptionState,
    /// Re-issue the subscribe once the in-flight unsubscribe is acknowledged.
    resubscribe: bool,
}

/// Result of feeding a subscribe ack into the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    Active,
    /// Every reference went away while the subscribe was in flight; an
    /// unsubscribe has been issued.
    Cancelled,
    /// The middleware refused the topic. The entry is gone and whoever still
    /// references the topic must be told.
    Failed(SubscriptionError),
    /// Ack for a topic the manager is not waiting on.
    Ignored,
}

pub struct SubscriptionManager {
    middleware: Arc<dyn Middleware>,
    options: DeliveryOptions,
    link_ready: bool,
    active: HashMap<String, ActiveSubscription>,
}

impl SubscriptionManager {
    pub fn new(middleware: Arc<dyn Middleware>, options: DeliveryOptions) -> Self {
        Self {
            middleware,
            options,
            link_ready: false,
            active: HashMap::new(),
        }
    }

    /// Add one reference to `topic`. Returns the new count.
    ///
    /// The 0 → 1 transition issues the middleware subscribe, or queues it if
    /// the link is not up yet. A subscribe the middleware rejects synchronously
    /// leaves the topic unsubscribed and is returned as `Failed`.
    pub fn acquire(&mut self, topic: &str, type_name: &str) -> Result<usize, SubscriptionError> {
        if let Some(entry) = self.active.get_mut(topic) {
            entry.ref_count += 1;
            match entry.state {
                SubscriptionState::Unsubscribing if entry.ref_count == 1 => {
                    entry.resubscribe = true;
                }
                SubscriptionState::UnsubscribeRetry => {
                    debug!("{topic} wanted again before its unsubscribe went through");
                    entry.state = SubscriptionState::Subscribed;
                }
                _ => {}
            }
            return Ok(entry.ref_count);
        }

        let state = if self.link_ready {
            self.request_subscribe(topic, type_name)?;
            SubscriptionState::Subscribing
        } else {
            debug!("middleware link not ready, queueing subscribe for {topic}");
            SubscriptionState::Queued
        };

        self.active.insert(
            topic.to_string(),
            ActiveSubscription {
                type_name: type_name.to_string(),
                ref_count: 1,
                state,
                resubscribe: false,
            },
        );
        Ok(1)
    }

    /// Drop one reference to `topic`. Returns the remaining count.
    pub fn release(&mut self, topic: &str) -> Result<usize, SubscriptionError> {
        let Some(entry) = self.active.get_mut(topic).filter(|e| e.ref_count > 0) else {
            error!("release of {topic} without a matching acquire");
            return Err(SubscriptionError::ReleaseUnderflow {
                topic: topic.to_string(),
            });
        };

        entry.ref_count -= 1;
        let remaining = entry.ref_count;
        if remaining > 0 {
            return Ok(remaining);
        }

        let state = entry.state;
        match state {
            SubscriptionState::Queued => {
                self.active.remove(topic);
            }
            // cancelled when the ack arrives
            SubscriptionState::Subscribing => {}
            SubscriptionState::Unsubscribing => entry.resubscribe = false,
            SubscriptionState::Subscribed | SubscriptionState::UnsubscribeRetry => {
                self.request_unsubscribe(topic)
            }
        }
        Ok(0)
    }

    pub fn on_subscribe_ack(&mut self, topic: &str, result: Result<(), String>) -> AckOutcome {
        let Some(entry) = self.active.get_mut(topic) else {
            warn!("subscribe ack for untracked topic {topic}");
            return AckOutcome::Ignored;
        };
        if entry.state != SubscriptionState::Subscribing {
            warn!("subscribe ack for {topic} in state {:?}", entry.state);
            return AckOutcome::Ignored;
        }

        let ref_count = entry.ref_count;
        match result {
            Ok(()) if ref_count == 0 => {
                info!("subscribe to {topic} completed after last release, cancelling");
                self.request_unsubscribe(topic);
                AckOutcome::Cancelled
            }
            Ok(()) => {
                entry.state = SubscriptionState::Subscribed;
                info!("subscribed to {topic}");
                AckOutcome::Active
            }
            Err(reason) => {
                self.active.remove(topic);
                warn!("middleware rejected subscription to {topic}: {reason}");
                AckOutcome::Failed(SubscriptionError::Failed {
                    topic: topic.to_string(),
                    reason,
                })
            }
        }
    }

    /// Completes an unsubscribe. If demand came back meanwhile, subscribes again.
    pub fn on_unsubscribe_ack(&mut self, topic: &str) -> Result<(), SubscriptionError> {
        let Some(entry) = self.active.get(topic) else {
            warn!("unsubscribe ack for untracked topic {topic}");
            return Ok(());
        };
        if entry.state != SubscriptionState::Unsubscribing {
            warn!("unsubscribe ack for {topic} in state {:?}", entry.state);
            return Ok(());
        }

        if entry.resubscribe && entry.ref_count > 0 {
            let type_name = entry.type_name.clone();
            if let Err(err) = self.request_subscribe(topic, &type_name) {
                self.active.remove(topic);
                return Err(err);
            }
            if let Some(entry) = self.active.get_mut(topic) {
                entry.state = SubscriptionState::Subscribing;
                entry.resubscribe = false;
            }
        } else {
            self.active.remove(topic);
            info!("unsubscribed from {topic}");
        }
        Ok(())
    }

    /// Mark the middleware link as usable and issue every queued subscribe.
    ///
    /// Returns the topics whose subscribe was refused on the spot.
    pub fn set_link_ready(&mut self) -> Vec<SubscriptionError> {
        self.link_ready = true;

        let queued: Vec<(String, String)> = self
            .active
            .iter()
            .filter(|(_, e)| e.state == SubscriptionState::Queued)
            .map(|(topic, e)| (topic.clone(), e.type_name.clone()))
            .collect();

        let mut failures = Vec::new();
        for (topic, type_name) in queued {
            match self.request_subscribe(&topic, &type_name) {
                Ok(()) => {
                    if let Some(entry) = self.active.get_mut(&topic) {
                        entry.state = SubscriptionState::Subscribing;
                    }
                }
                Err(err) => {
                    self.active.remove(&topic);
                    failures.push(err);
                }
            }
        }
        failures
    }

    /// Re-issue every unsubscribe the middleware refused earlier.
    ///
    /// Returns how many are still waiting for another attempt.
    pub fn retry_unsubscribes(&mut self) -> usize {
        let pending: Vec<String> = self
            .active
            .iter()
            .filter(|(_, e)| e.state == SubscriptionState::UnsubscribeRetry)
            .map(|(topic, _)| topic.clone())
            .collect();
        for topic in &pending {
            debug!("retrying unsubscribe of {topic}");
            self.request_unsubscribe(topic);
        }
        self.pending_unsubscribes()
    }

    pub fn pending_unsubscribes(&self) -> usize {
        self.active
            .values()
            .filter(|e| e.state == SubscriptionState::UnsubscribeRetry)
            .count()
    }

    pub fn is_link_ready(&self) -> bool {
        self.link_ready
    }

    pub fn ref_count(&self, topic: &str) -> usize {
        self.active.get(topic).map_or(0, |e| e.ref_count)
    }

    pub fn state(&self, topic: &str) -> Option<SubscriptionState> {
        self.active.get(topic).map(|e| e.state)
    }

    pub fn options(&self) -> DeliveryOptions {
        self.options
    }

    fn request_subscribe(&self, topic: &str, type_name: &str) -> Result<(), SubscriptionError> {
        self.middleware
            .subscribe(topic, type_name, &self.options)
            .map_err(|err| {
                warn!("subscribe request for {topic} failed: {err}");
                SubscriptionError::Failed {
                    topic: topic.to_string(),
                    reason: err.to_string(),
                }
            })
    }

    fn request_unsubscribe(&mut self, topic: &str) {
        let state = match self.middleware.unsubscribe(topic) {
            Ok(()) => SubscriptionState::Unsubscribing,
            Err(err) => {
                error!("unsubscribe request for {topic} failed, will retry: {err}");
                SubscriptionState::UnsubscribeRetry
            }
        };
        if let Some(entry) = self.active.get_mut(topic) {
            entry.state = state;
        }
    }
}
