//! Data frames sent from the relay to clients.
//!
//! Binary frames carry their own header so a receiver can demultiplex by
//! message type and topic without parsing the body:
//!
//! ```text
//! u16 BE  type name length
//! bytes   type name (utf-8)
//! u16 BE  topic length
//! bytes   topic (utf-8)
//! bytes   body (schema codec output)
//! ```
//!
//! Text frames are a JSON envelope `{"type", "topic", "data"}`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tungstenite::protocol::Message as WsMessage;

use crate::catalog::{ChannelSpec, Framing, MessageCodec};
use crate::middleware::DeliveredMessage;
use crate::utils::error::{CodecError, FrameError, RelayError};

/// A decoded data frame, whichever framing it arrived in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    #[serde(rename = "type")]
    pub type_name: String,
    pub topic: String,
    pub data: Value,
}

#[derive(Serialize)]
struct TextEnvelope<'a> {
    #[serde(rename = "type")]
    type_name: &'a str,
    topic: &'a str,
    data: &'a Value,
}

/// Borrowed view of a binary frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryFrame<'a> {
    pub type_name: &'a str,
    pub topic: &'a str,
    pub body: &'a [u8],
}

/// Encode one delivery according to its catalog entry.
pub fn encode_delivery(
    spec: &ChannelSpec,
    message: &DeliveredMessage,
) -> Result<WsMessage, RelayError> {
    match &spec.framing {
        Framing::Binary(codec) => {
            let body = codec.encode(&message.payload)?;
            let frame = encode_binary(&message.type_name, &message.topic, &body)?;
            Ok(WsMessage::Binary(frame))
        }
        Framing::Text => {
            let text = encode_text(&message.type_name, &message.topic, &message.payload)
                .map_err(CodecError::from)?;
            Ok(WsMessage::text(text))
        }
    }
}

pub fn encode_text(type_name: &str, topic: &str, data: &Value) -> Result<String, serde_json::Error> {
    serde_json::to_string(&TextEnvelope {
        type_name,
        topic,
        data,
    })
}

pub fn encode_binary(type_name: &str, topic: &str, body: &[u8]) -> Result<Bytes, FrameError> {
    let type_len = header_len(type_name)?;
    let topic_len = header_len(topic)?;

    let mut buf = BytesMut::with_capacity(4 + type_name.len() + topic.len() + body.len());
    buf.put_u16(type_len);
    buf.put_slice(type_name.as_bytes());
    buf.put_u16(topic_len);
    buf.put_slice(topic.as_bytes());
    buf.put_slice(body);
    Ok(buf.freeze())
}

pub fn decode_binary(frame: &[u8]) -> Result<BinaryFrame<'_>, FrameError> {
    let mut buf = frame;
    let type_name = read_str(&mut buf)?;
    let topic = read_str(&mut buf)?;
    Ok(BinaryFrame {
        type_name,
        topic,
        body: buf,
    })
}

fn header_len(field: &str) -> Result<u16, FrameError> {
    u16::try_from(field.len()).map_err(|_| FrameError::HeaderTooLong { len: field.len() })
}

fn read_str<'a>(buf: &mut &'a [u8]) -> Result<&'a str, FrameError> {
    if buf.remaining() < 2 {
        return Err(FrameError::Truncated {
            needed: 2,
            remaining: buf.remaining(),
        });
    }
    let len = usize::from(buf.get_u16());
    if buf.remaining() < len {
        return Err(FrameError::Truncated {
            needed: len,
            remaining: buf.remaining(),
        });
    }
    let slice: &'a [u8] = *buf;
    let (field, rest) = slice.split_at(len);
    *buf = rest;
    Ok(std::str::from_utf8(field)?)
}
