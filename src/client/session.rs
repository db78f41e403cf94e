use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use super::resolver::TopicResolver;
use crate::catalog::{ChannelCatalog, MessageCodec};
use crate::directory::TopicInfo;
use crate::transport::frame::{DataFrame, decode_binary};
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::utils::error::{ClientError, CodecError, FrameError};

/// Something the relay sent, decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Data(DataFrame),
    MetaInfo(Vec<TopicInfo>),
    SubscriptionFailed {
        topic: String,
        slot: Option<String>,
        reason: String,
    },
    Error(String),
}

/// Decode one WebSocket message from the relay.
///
/// Returns `Ok(None)` for control frames (ping, pong) that carry nothing.
pub fn decode_inbound(
    catalog: &ChannelCatalog,
    message: WsMessage,
) -> Result<Option<InboundFrame>, ClientError> {
    match message {
        WsMessage::Text(text) => {
            if let Ok(reply) = serde_json::from_str::<ServerMessage>(text.as_str()) {
                return Ok(Some(match reply {
                    ServerMessage::MetaInfo { topics } => InboundFrame::MetaInfo(topics),
                    ServerMessage::SubscriptionFailed {
                        topic,
                        slot,
                        reason,
                    } => InboundFrame::SubscriptionFailed {
                        topic,
                        slot,
                        reason,
                    },
                    ServerMessage::Error { message } => InboundFrame::Error(message),
                }));
            }
            let frame: DataFrame =
                serde_json::from_str(text.as_str()).map_err(FrameError::InvalidText)?;
            Ok(Some(InboundFrame::Data(frame)))
        }
        WsMessage::Binary(bytes) => {
            let frame = decode_binary(&bytes)?;
            let spec = catalog.classify(frame.type_name)?;
            let codec = spec.codec().ok_or(FrameError::Unsupported)?;
            Ok(Some(InboundFrame::Data(DataFrame {
                type_name: frame.type_name.to_string(),
                topic: frame.topic.to_string(),
                data: codec.decode(frame.body)?,
            })))
        }
        WsMessage::Close(_) => Err(ClientError::Closed),
        _ => Ok(None),
    }
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A client session against a relay.
///
/// Meta info is requested once, when the session starts. Requests made
/// through [`resolver`](Self::resolver) are written out on the next
/// [`flush`](Self::flush) or [`next_frame`](Self::next_frame).
pub struct RelayClient {
    ws: Socket,
    catalog: Arc<ChannelCatalog>,
    resolver: TopicResolver<mpsc::UnboundedSender<ClientMessage>>,
    outbound: mpsc::UnboundedReceiver<ClientMessage>,
}

impl RelayClient {
    pub async fn connect(url: &str, catalog: Arc<ChannelCatalog>) -> Result<Self, ClientError> {
        let (ws, _) = connect_async(url).await?;
        info!("connected to relay at {url}");

        let (tx, outbound) = mpsc::unbounded_channel();
        let mut client = Self {
            ws,
            catalog,
            resolver: TopicResolver::new(tx),
            outbound,
        };
        client.send(&ClientMessage::MetaInfo).await?;
        Ok(client)
    }

    pub fn resolver(&mut self) -> &mut TopicResolver<mpsc::UnboundedSender<ClientMessage>> {
        &mut self.resolver
    }

    /// Write every pending resolver request to the relay.
    pub async fn flush(&mut self) -> Result<(), ClientError> {
        while let Ok(message) = self.outbound.try_recv() {
            self.send(&message).await?;
        }
        Ok(())
    }

    /// Wait for the next frame from the relay.
    ///
    /// Meta info replies update the resolver's directory and failed
    /// subscriptions clear the matching bindings before being returned.
    pub async fn next_frame(&mut self) -> Result<InboundFrame, ClientError> {
        self.flush().await?;
        loop {
            let message = self.ws.next().await.ok_or(ClientError::Closed)??;
            let Some(frame) = decode_inbound(&self.catalog, message)? else {
                continue;
            };
            match &frame {
                InboundFrame::MetaInfo(topics) => {
                    self.resolver.apply_directory(topics.clone());
                }
                InboundFrame::SubscriptionFailed {
                    topic,
                    slot,
                    reason,
                } => {
                    warn!("relay could not subscribe {topic}: {reason}");
                    self.resolver.on_subscription_failed(topic, slot.as_deref());
                }
                InboundFrame::Error(message) => warn!("relay error: {message}"),
                InboundFrame::Data(_) => {}
            }
            return Ok(frame);
        }
    }

    /// Wait until the relay's meta info reply arrives, discarding anything else.
    pub async fn wait_for_topics(&mut self) -> Result<Vec<TopicInfo>, ClientError> {
        loop {
            if let InboundFrame::MetaInfo(topics) = self.next_frame().await? {
                return Ok(topics);
            }
        }
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.flush().await?;
        self.ws.close(None).await?;
        debug!("relay session closed");
        Ok(())
    }

    async fn send(&mut self, message: &ClientMessage) -> Result<(), ClientError> {
        let text = message.to_json().map_err(CodecError::from)?;
        self.ws.send(WsMessage::text(text)).await?;
        Ok(())
    }
}
