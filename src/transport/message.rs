use serde::{Deserialize, Serialize};
use tungstenite::protocol::Message as WsMessage;

use crate::catalog::NeedKind;
use crate::directory::TopicInfo;
use crate::utils::error::ControlError;

/// Control messages a client sends to the relay.
///
/// On the wire the `type` field is either `MetaInfo`, `Unsubscribe`, or the
/// name of a need kind (`Camera`, `Lidar`, ...). A need-kind message binds a
/// slot to `topic`; without `topic` it unbinds the slot. The slot defaults to
/// the need kind's name, so a client with one panel per kind never sends it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    MetaInfo,
    Subscribe {
        need: NeedKind,
        topic: String,
        slot: String,
    },
    UnsubscribeSlot {
        slot: String,
    },
    UnsubscribeTopic {
        topic: String,
    },
}

#[derive(Debug, Deserialize, Serialize)]
struct RawControl {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    slot: Option<String>,
}

const META_INFO: &str = "MetaInfo";
const UNSUBSCRIBE: &str = "Unsubscribe";

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, ControlError> {
        let raw: RawControl = serde_json::from_str(text)?;
        match raw.kind.as_str() {
            META_INFO => Ok(ClientMessage::MetaInfo),
            UNSUBSCRIBE => match (raw.slot, raw.topic) {
                (Some(slot), _) => Ok(ClientMessage::UnsubscribeSlot { slot }),
                (None, Some(topic)) => Ok(ClientMessage::UnsubscribeTopic { topic }),
                (None, None) => Err(ControlError::EmptyUnsubscribe),
            },
            kind => {
                let need: NeedKind = kind.parse()?;
                let slot = raw.slot.unwrap_or_else(|| need.name().to_string());
                Ok(match raw.topic {
                    Some(topic) => ClientMessage::Subscribe { need, topic, slot },
                    None => ClientMessage::UnsubscribeSlot { slot },
                })
            }
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let raw = match self {
            ClientMessage::MetaInfo => RawControl {
                kind: META_INFO.to_string(),
                topic: None,
                slot: None,
            },
            ClientMessage::Subscribe { need, topic, slot } => RawControl {
                kind: need.name().to_string(),
                topic: Some(topic.clone()),
                slot: Some(slot.clone()),
            },
            ClientMessage::UnsubscribeSlot { slot } => RawControl {
                kind: UNSUBSCRIBE.to_string(),
                topic: None,
                slot: Some(slot.clone()),
            },
            ClientMessage::UnsubscribeTopic { topic } => RawControl {
                kind: UNSUBSCRIBE.to_string(),
                topic: Some(topic.clone()),
                slot: None,
            },
        };
        serde_json::to_string(&raw)
    }
}

/// Replies the relay sends outside the data stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    MetaInfo {
        topics: Vec<TopicInfo>,
    },
    SubscriptionFailed {
        topic: String,
        slot: Option<String>,
        reason: String,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn to_ws(&self) -> Result<WsMessage, serde_json::Error> {
        Ok(WsMessage::text(serde_json::to_string(self)?))
    }
}
