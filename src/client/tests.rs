use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tungstenite::protocol::Message as WsMessage;

use super::resolver::{SubscriptionSink, TopicResolver};
use super::session::{InboundFrame, RelayClient, decode_inbound};
use crate::catalog::{ChannelCatalog, NeedKind, messages};
use crate::config::Settings;
use crate::directory::{ChannelKind, TopicInfo};
use crate::middleware::InMemoryMiddleware;
use crate::middleware::memory::PublishOutcome;
use crate::relay::Relay;
use crate::transport::frame::encode_binary;
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::transport::websocket::start_websocket_server;
use crate::utils::error::{ClientError, ResolveError};

#[derive(Debug, Default)]
struct RecordingSink {
    sent: Vec<ClientMessage>,
    fail: bool,
}

impl SubscriptionSink for RecordingSink {
    fn send_control(&mut self, message: ClientMessage) -> Result<(), ResolveError> {
        if self.fail {
            return Err(ResolveError::Send("link down".to_string()));
        }
        self.sent.push(message);
        Ok(())
    }
}

fn directory() -> Vec<TopicInfo> {
    vec![
        TopicInfo::new("camera/0", messages::CAMERA_FRAME_MESSAGE)
            .with_channel(ChannelKind::Tcp, "10.0.0.2:7000")
            .with_channel(ChannelKind::WebSocket, "10.0.0.2:7001"),
        TopicInfo::new("camera/1", messages::CAMERA_FRAME_MESSAGE)
            .with_channel(ChannelKind::WebSocket, "10.0.0.3:7001"),
        TopicInfo::new("camera/shm", messages::CAMERA_FRAME_MESSAGE)
            .with_channel(ChannelKind::Shm, "shm-17"),
        TopicInfo::new("camera/any", messages::CAMERA_FRAME_MESSAGE)
            .with_channel(ChannelKind::WebSocket, "0.0.0.0:7001"),
        TopicInfo::new("lidar/0", messages::LIDAR_FRAME_MESSAGE)
            .with_channel(ChannelKind::WebSocket, "10.0.0.4:7001"),
    ]
}

fn resolver() -> TopicResolver<RecordingSink> {
    let mut resolver = TopicResolver::new(RecordingSink::default());
    resolver.apply_directory(directory());
    resolver.mount("main", NeedKind::Camera).unwrap();
    resolver
}

fn subscribe(topic: &str) -> ClientMessage {
    ClientMessage::Subscribe {
        need: NeedKind::Camera,
        topic: topic.to_string(),
        slot: "main".to_string(),
    }
}

fn unsubscribe_main() -> ClientMessage {
    ClientMessage::UnsubscribeSlot {
        slot: "main".to_string(),
    }
}

#[test]
fn test_candidates_match_type_and_websocket_channel() {
    let resolver = resolver();
    let names: Vec<&str> = resolver
        .candidates("main")
        .unwrap()
        .iter()
        .map(|t| t.topic.as_str())
        .collect();
    assert_eq!(names, vec!["camera/0", "camera/1", "camera/any"]);
    assert!(resolver.sink().sent.is_empty());
}

#[test]
fn test_select_unknown_topic_is_unresolved_and_sends_nothing() {
    let mut resolver = TopicResolver::new(RecordingSink::default());
    resolver.apply_directory(vec![
        TopicInfo::new("lidar/0", messages::LIDAR_FRAME_MESSAGE)
            .with_channel(ChannelKind::WebSocket, "10.0.0.4:7001"),
    ]);
    resolver.mount("main", NeedKind::Camera).unwrap();

    assert_eq!(
        resolver.select("main", "camera/0"),
        Err(ResolveError::EndpointUnresolved {
            topic: "camera/0".to_string()
        })
    );
    assert!(resolver.sink().sent.is_empty());
    assert!(resolver.selection("main").is_none());
}

#[test]
fn test_select_rejects_unusable_endpoints() {
    let mut resolver = resolver();
    for topic in ["camera/shm", "camera/any"] {
        assert_eq!(
            resolver.select("main", topic),
            Err(ResolveError::EndpointUnresolved {
                topic: topic.to_string()
            })
        );
    }
    assert!(resolver.sink().sent.is_empty());
}

#[test]
fn test_select_rejects_type_mismatch_and_unknown_slot() {
    let mut resolver = resolver();
    assert!(matches!(
        resolver.select("main", "lidar/0"),
        Err(ResolveError::TypeMismatch { .. })
    ));
    assert_eq!(
        resolver.select("side", "camera/0"),
        Err(ResolveError::UnknownSlot {
            slot: "side".to_string()
        })
    );
    assert!(resolver.sink().sent.is_empty());
}

#[test]
fn test_select_resolves_websocket_endpoint() {
    let mut resolver = resolver();
    let selection = resolver.select("main", "camera/0").unwrap();
    assert_eq!(selection.endpoint, "10.0.0.2:7001".parse().unwrap());
    assert_eq!(resolver.sink().sent, vec![subscribe("camera/0")]);
    assert_eq!(resolver.selection("main"), Some(&selection));
}

#[test]
fn test_changing_topic_unsubscribes_then_subscribes() {
    let mut resolver = resolver();
    resolver.select("main", "camera/0").unwrap();
    resolver.select("main", "camera/1").unwrap();
    // reselecting the current topic sends nothing
    resolver.select("main", "camera/1").unwrap();

    assert_eq!(
        resolver.sink().sent,
        vec![
            subscribe("camera/0"),
            unsubscribe_main(),
            subscribe("camera/1"),
        ]
    );
}

#[test]
fn test_failed_selection_keeps_previous_binding() {
    let mut resolver = resolver();
    resolver.select("main", "camera/0").unwrap();
    assert!(resolver.select("main", "camera/9").is_err());
    assert_eq!(resolver.selection("main").unwrap().topic, "camera/0");
    assert_eq!(resolver.sink().sent, vec![subscribe("camera/0")]);
}

#[test]
fn test_unmount_and_clear_unsubscribe() {
    let mut resolver = resolver();
    resolver.select("main", "camera/0").unwrap();
    resolver.clear_selection("main").unwrap();
    resolver.clear_selection("main").unwrap();
    assert_eq!(resolver.need_kind("main"), Some(NeedKind::Camera));

    resolver.select("main", "camera/1").unwrap();
    resolver.unmount("main").unwrap();
    assert_eq!(resolver.need_kind("main"), None);

    assert_eq!(
        resolver.sink().sent,
        vec![
            subscribe("camera/0"),
            unsubscribe_main(),
            subscribe("camera/1"),
            unsubscribe_main(),
        ]
    );
}

#[test]
fn test_remount_with_other_kind_drops_binding() {
    let mut resolver = resolver();
    resolver.select("main", "camera/0").unwrap();
    resolver.mount("main", NeedKind::Lidar).unwrap();
    assert!(resolver.selection("main").is_none());
    assert_eq!(resolver.need_kind("main"), Some(NeedKind::Lidar));
    assert_eq!(
        resolver.sink().sent,
        vec![subscribe("camera/0"), unsubscribe_main()]
    );
}

#[test]
fn test_selection_survives_refresh_with_same_identity() {
    let mut resolver = resolver();
    resolver.select("main", "camera/0").unwrap();

    resolver.apply_directory(directory());
    assert_eq!(resolver.selection("main").unwrap().topic, "camera/0");

    resolver.apply_directory(vec![
        TopicInfo::new("camera/0", messages::DEPTH_CAMERA_FRAME_MESSAGE)
            .with_channel(ChannelKind::WebSocket, "10.0.0.2:7001"),
    ]);
    assert!(resolver.selection("main").is_none());

    resolver.apply_directory(directory());
    assert_eq!(resolver.selection("main").unwrap().topic, "camera/0");
    assert_eq!(resolver.sink().sent.len(), 1);
}

#[test]
fn test_subscription_failed_clears_binding() {
    let mut resolver = resolver();
    resolver.select("main", "camera/0").unwrap();
    resolver.on_subscription_failed("camera/0", Some("main"));
    assert!(resolver.selection("main").is_none());

    // the next selection subscribes without a stale unsubscribe
    resolver.select("main", "camera/0").unwrap();
    assert_eq!(
        resolver.sink().sent,
        vec![subscribe("camera/0"), subscribe("camera/0")]
    );
}

#[test]
fn test_send_failure_is_reported() {
    let mut resolver = TopicResolver::new(RecordingSink {
        sent: Vec::new(),
        fail: true,
    });
    resolver.apply_directory(directory());
    resolver.mount("main", NeedKind::Camera).unwrap();
    assert!(matches!(
        resolver.select("main", "camera/0"),
        Err(ResolveError::Send(_))
    ));
    assert!(resolver.selection("main").is_none());
}

#[test]
fn test_channel_sink_forwards_requests() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut resolver = TopicResolver::new(tx);
    resolver.apply_directory(directory());
    resolver.mount("main", NeedKind::Camera).unwrap();
    resolver.select("main", "camera/1").unwrap();
    assert_eq!(rx.try_recv().unwrap(), subscribe("camera/1"));
}

#[test]
fn test_decode_inbound_frames() {
    let catalog = ChannelCatalog::builtin();

    let reply = ServerMessage::Error {
        message: "boom".to_string(),
    }
    .to_ws()
    .unwrap();
    assert_eq!(
        decode_inbound(&catalog, reply).unwrap(),
        Some(InboundFrame::Error("boom".to_string()))
    );

    let text = WsMessage::text(
        json!({ "type": messages::IMU_FRAME_MESSAGE, "topic": "imu", "data": { "x": 1 } })
            .to_string(),
    );
    let Some(InboundFrame::Data(frame)) = decode_inbound(&catalog, text).unwrap() else {
        panic!("expected a data frame");
    };
    assert_eq!(frame.topic, "imu");
    assert_eq!(frame.data, json!({ "x": 1 }));

    assert_eq!(
        decode_inbound(&catalog, WsMessage::Ping(Default::default())).unwrap(),
        None
    );
}

#[test]
fn test_decode_inbound_rejects_unknown_binary_type() {
    let catalog = ChannelCatalog::builtin();
    let bytes = encode_binary("felicia.Unknown", "t", &[1]).unwrap();
    assert!(matches!(
        decode_inbound(&catalog, WsMessage::Binary(bytes)).unwrap_err(),
        ClientError::Catalog(_)
    ));

    let bytes = encode_binary(messages::LIDAR_FRAME_MESSAGE, "t", &[1]).unwrap();
    assert!(matches!(
        decode_inbound(&catalog, WsMessage::Binary(bytes)).unwrap_err(),
        ClientError::Frame(_)
    ));
}

#[tokio::test]
async fn test_session_subscribes_and_decodes_camera_frames() {
    let settings = Settings::default();
    let addr = format!(
        "127.0.0.1:{}",
        portpicker::pick_unused_port().expect("No free ports")
    );
    let mw = Arc::new(InMemoryMiddleware::new());
    mw.advertise(
        TopicInfo::new("camera/0", messages::CAMERA_FRAME_MESSAGE)
            .with_channel(ChannelKind::WebSocket, &addr),
    );

    let catalog = Arc::new(ChannelCatalog::builtin());
    let (relay, events) = Relay::new(catalog.clone(), mw.clone(), &settings.relay);
    let (transport_tx, transport_rx) = mpsc::unbounded_channel();
    tokio::spawn(relay.run(transport_rx, events));
    tokio::spawn(start_websocket_server(
        addr.clone(),
        transport_tx,
        settings.relay.clone(),
    ));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut client = RelayClient::connect(&format!("ws://{addr}"), catalog)
        .await
        .expect("Failed to connect");
    let topics = client.wait_for_topics().await.unwrap();
    assert_eq!(topics.len(), 1);

    client.resolver().mount("main", NeedKind::Camera).unwrap();
    client.resolver().select("main", "camera/0").unwrap();
    client.flush().await.unwrap();

    let payload = json!({
        "converted": false,
        "data": [7, 7, 7],
        "cameraFormat": { "width": 3, "height": 1, "pixelFormat": "PIXEL_FORMAT_Y8", "frameRate": 10.0 },
        "timestamp": 5
    });
    let mut delivered = false;
    for _ in 0..100 {
        if mw.publish("camera/0", payload.clone()) == PublishOutcome::Delivered {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(delivered, "relay never subscribed camera/0");

    let frame = tokio::time::timeout(Duration::from_secs(2), client.next_frame())
        .await
        .expect("timed out waiting for a frame")
        .unwrap();
    let InboundFrame::Data(frame) = frame else {
        panic!("expected a data frame, got {frame:?}");
    };
    assert_eq!(frame.topic, "camera/0");
    assert_eq!(frame.data["data"], json!([7, 7, 7]));
    assert_eq!(frame.data["cameraFormat"]["width"], 3);

    client.close().await.unwrap();
}
