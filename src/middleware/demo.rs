//! Synthetic topics for `vizrelay serve --demo`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::time::MissedTickBehavior;
use tracing::{info, trace};

use super::memory::{InMemoryMiddleware, PublishOutcome};
use crate::catalog::messages;
use crate::directory::{ChannelKind, TopicInfo};

pub const CAMERA_TOPIC: &str = "demo/camera";
pub const LIDAR_TOPIC: &str = "demo/lidar";

const CAMERA_WIDTH: u32 = 8;
const CAMERA_HEIGHT: u32 = 8;
const LIDAR_BEAMS: usize = 36;

/// Advertise the demo topics as reachable through `endpoint`.
pub fn advertise(middleware: &InMemoryMiddleware, endpoint: &str) {
    middleware.advertise(
        TopicInfo::new(CAMERA_TOPIC, messages::CAMERA_FRAME_MESSAGE)
            .with_channel(ChannelKind::WebSocket, endpoint),
    );
    middleware.advertise(
        TopicInfo::new(LIDAR_TOPIC, messages::LIDAR_FRAME_MESSAGE)
            .with_channel(ChannelKind::WebSocket, endpoint),
    );
}

/// A grayscale gradient that shifts by one column per frame.
pub fn camera_frame(seq: u64) -> Value {
    let data: Vec<u8> = (0..CAMERA_HEIGHT)
        .flat_map(|_| 0..CAMERA_WIDTH)
        .map(|x| ((u64::from(x) + seq) % u64::from(CAMERA_WIDTH) * 32) as u8)
        .collect();
    json!({
        "converted": false,
        "data": data,
        "cameraFormat": {
            "width": CAMERA_WIDTH,
            "height": CAMERA_HEIGHT,
            "pixelFormat": "PIXEL_FORMAT_Y8",
            "frameRate": 10.0
        },
        "timestamp": timestamp_ms()
    })
}

/// A ring of ranges with one rotating near obstacle.
pub fn lidar_frame(seq: u64) -> Value {
    let near = (seq as usize) % LIDAR_BEAMS;
    let ranges: Vec<f64> = (0..LIDAR_BEAMS)
        .map(|i| if i == near { 0.5 } else { 5.0 })
        .collect();
    json!({
        "angleStart": 0.0,
        "angleEnd": std::f64::consts::TAU,
        "angleDelta": std::f64::consts::TAU / LIDAR_BEAMS as f64,
        "rangeMin": 0.1,
        "rangeMax": 10.0,
        "ranges": ranges,
        "timestamp": timestamp_ms()
    })
}

/// Publish one camera and one lidar frame every `period`, forever.
pub async fn publish_loop(middleware: Arc<InMemoryMiddleware>, period: Duration) {
    info!("demo publisher running every {period:?}");
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut seq: u64 = 0;

    loop {
        ticker.tick().await;
        seq += 1;
        for (topic, payload) in [
            (CAMERA_TOPIC, camera_frame(seq)),
            (LIDAR_TOPIC, lidar_frame(seq)),
        ] {
            match middleware.publish(topic, payload) {
                PublishOutcome::Delivered | PublishOutcome::NotSubscribed => {}
                outcome => trace!("demo frame {seq} on {topic}: {outcome:?}"),
            }
        }
    }
}

fn timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
