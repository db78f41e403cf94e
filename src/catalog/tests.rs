use serde_json::json;

use super::messages::{self, CameraFormat, CameraFrameMessage, DepthCameraFrameMessage};
use super::{ChannelCatalog, NeedKind};
use crate::utils::error::{CatalogError, CodecError};

fn sample_camera_frame() -> CameraFrameMessage {
    CameraFrameMessage {
        converted: true,
        data: vec![0, 1, 2, 254, 255],
        camera_format: CameraFormat {
            width: 640,
            height: 480,
            pixel_format: "PIXEL_FORMAT_RGB".to_string(),
            frame_rate: 30.0,
        },
        timestamp: 1_700_000_000_123,
    }
}

#[test]
fn builtin_covers_every_need_kind() {
    let catalog = ChannelCatalog::builtin();
    for kind in NeedKind::ALL {
        assert!(catalog.classify(kind.message_type()).is_ok(), "{kind}");
    }
}

#[test]
fn camera_frames_are_binary_framed_and_lidar_is_text() {
    let catalog = ChannelCatalog::builtin();
    assert!(
        catalog
            .classify(messages::CAMERA_FRAME_MESSAGE)
            .unwrap()
            .is_binary_framed()
    );
    let lidar = catalog.classify(messages::LIDAR_FRAME_MESSAGE).unwrap();
    assert!(!lidar.is_binary_framed());
    assert!(lidar.codec().is_none());
}

#[test]
fn classify_unknown_type_fails() {
    let catalog = ChannelCatalog::builtin();
    let err = catalog.classify("felicia.Nope").unwrap_err();
    assert_eq!(
        err,
        CatalogError::UnknownType {
            type_name: "felicia.Nope".to_string()
        }
    );
}

#[test]
fn binary_codec_round_trip_preserves_fields() {
    let catalog = ChannelCatalog::builtin();
    let spec = catalog.classify(messages::CAMERA_FRAME_MESSAGE).unwrap();
    let codec = spec.codec().unwrap();

    let payload = serde_json::to_value(sample_camera_frame()).unwrap();
    let body = codec.encode(&payload).unwrap();
    let decoded = codec.decode(&body).unwrap();

    assert_eq!(decoded, payload);
    assert_eq!(decoded["cameraFormat"]["width"], 640);
    let typed: CameraFrameMessage = serde_json::from_value(decoded).unwrap();
    assert_eq!(typed, sample_camera_frame());
}

#[test]
fn binary_codec_normalizes_numbers_to_schema_types() {
    let catalog = ChannelCatalog::builtin();
    let codec = catalog
        .classify(messages::CAMERA_FRAME_MESSAGE)
        .unwrap()
        .codec()
        .unwrap()
        .clone();
    let payload = json!({
        "converted": true,
        "data": [0, 1, 2, 254, 255],
        "cameraFormat": {
            "width": 640,
            "height": 480,
            "pixelFormat": "PIXEL_FORMAT_RGB",
            "frameRate": 30
        },
        "timestamp": 1_700_000_000_123u64
    });

    let decoded = codec.decode(&codec.encode(&payload).unwrap()).unwrap();

    assert_eq!(decoded["cameraFormat"]["frameRate"], json!(30.0));
    assert_ne!(decoded, payload);
    let sent: CameraFrameMessage = serde_json::from_value(payload).unwrap();
    let received: CameraFrameMessage = serde_json::from_value(decoded).unwrap();
    assert_eq!(received, sent);
    assert_eq!(received, sample_camera_frame());
}

#[test]
fn depth_frame_round_trip() {
    let catalog = ChannelCatalog::builtin();
    let codec = catalog
        .classify(messages::DEPTH_CAMERA_FRAME_MESSAGE)
        .unwrap()
        .codec()
        .unwrap()
        .clone();
    let frame = DepthCameraFrameMessage {
        data: vec![9; 16],
        camera_format: sample_camera_frame().camera_format,
        timestamp: 42,
        min: 0.25,
        max: 10.5,
    };
    let payload = serde_json::to_value(&frame).unwrap();
    let decoded = codec.decode(&codec.encode(&payload).unwrap()).unwrap();
    assert_eq!(decoded, payload);
}

#[test]
fn binary_codec_rejects_payload_with_wrong_schema() {
    let catalog = ChannelCatalog::builtin();
    let codec = catalog
        .classify(messages::CAMERA_FRAME_MESSAGE)
        .unwrap()
        .codec()
        .unwrap();
    let err = codec.encode(&json!({ "converted": "yes" })).unwrap_err();
    assert!(matches!(err, CodecError::Schema { .. }));
}

#[test]
fn need_kind_names_parse_back() {
    for kind in NeedKind::ALL {
        assert_eq!(kind.name().parse::<NeedKind>().unwrap(), kind);
    }
    assert!("Radar".parse::<NeedKind>().is_err());
}
