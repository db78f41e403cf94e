use std::sync::Arc;

use tracing::{trace, warn};

use super::engine::Relay;
use super::registry::{ConnectionId, SendOutcome};
use crate::middleware::DeliveredMessage;
use crate::transport::frame::encode_delivery;
use crate::utils::error::RelayError;

/// What happened to one delivery.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// Whether a frame was produced. False for unknown types, encoding
    /// failures and topics nobody is subscribed to.
    pub encoded: bool,
    pub sent: Vec<ConnectionId>,
    /// Queue was full; the frame was lost for these connections only.
    pub dropped: Vec<ConnectionId>,
    /// Writer gone; these connections were torn down.
    pub dead: Vec<ConnectionId>,
}

impl Relay {
    /// Encode one middleware delivery and fan it out to its subscribers.
    ///
    /// Never fails: every problem is confined to the message (unknown type,
    /// bad payload) or to one connection (full or closed queue).
    pub fn dispatch(&mut self, message: DeliveredMessage) -> DispatchReport {
        let mut report = DispatchReport::default();
        let catalog = Arc::clone(&self.catalog);

        let spec = match catalog.classify(&message.type_name) {
            Ok(spec) => spec,
            Err(err) => {
                warn!("dropping message on {}: {err}", message.topic);
                return report;
            }
        };

        let recipients = self.registry.connections_for(&message.topic);
        if recipients.is_empty() {
            trace!("no subscribers for {}, skipping", message.topic);
            return report;
        }

        let frame = match encode_delivery(spec, &message) {
            Ok(frame) => frame,
            Err(err) => {
                warn!("dropping message on {}: {err}", message.topic);
                return report;
            }
        };
        report.encoded = true;

        for conn in recipients {
            match self.registry.send(&conn, frame.clone()) {
                SendOutcome::Sent => report.sent.push(conn),
                SendOutcome::Dropped => {
                    warn!("outbound queue full for {conn}, dropping {} frame", message.topic);
                    report.dropped.push(conn);
                }
                SendOutcome::Dead => {
                    self.registry.mark_dead(&conn);
                    report.dead.push(conn);
                }
            }
        }

        for conn in &report.dead {
            let err = RelayError::ConnectionWrite {
                id: conn.clone(),
                reason: "outbound channel closed".to_string(),
            };
            warn!("{err}");
            self.disconnect(conn);
        }
        report
    }
}
