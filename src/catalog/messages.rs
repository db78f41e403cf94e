//! Fixed-layout schemas for the binary-framed message types.
//!
//! Field names follow the middleware's JSON rendering (camelCase), so a payload
//! delivered as structured data deserializes straight into these structs.

use serde::{Deserialize, Serialize};

pub const CAMERA_FRAME_MESSAGE: &str = "felicia.drivers.CameraFrameMessage";
pub const DEPTH_CAMERA_FRAME_MESSAGE: &str = "felicia.drivers.DepthCameraFrameMessage";
pub const IMU_FRAME_MESSAGE: &str = "felicia.drivers.ImuFrameMessage";
pub const LIDAR_FRAME_MESSAGE: &str = "felicia.drivers.LidarFrameMessage";
pub const POINTCLOUD_MESSAGE: &str = "felicia.map.PointcloudMessage";
pub const OCCUPANCY_GRID_MAP_MESSAGE: &str = "felicia.map.OccupancyGridMapMessage";
pub const IMAGE_WITH_BOUNDING_BOXES_MESSAGE: &str = "felicia.ImageWithBoundingBoxesMessage";
pub const IMAGE_WITH_HUMANS_MESSAGE: &str = "felicia.ImageWithHumansMessage";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraFormat {
    pub width: u32,
    pub height: u32,
    pub pixel_format: String,
    pub frame_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraFrameMessage {
    pub converted: bool,
    pub data: Vec<u8>,
    pub camera_format: CameraFormat,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthCameraFrameMessage {
    pub data: Vec<u8>,
    pub camera_format: CameraFormat,
    pub timestamp: i64,
    pub min: f64,
    pub max: f64,
}
