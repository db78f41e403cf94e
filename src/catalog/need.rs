use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::messages;
use crate::utils::error::CatalogError;

/// The kind of data a UI panel asks for.
///
/// Each kind consumes exactly one message type; the name doubles as the `type`
/// tag of subscribe control messages and as the default slot id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NeedKind {
    Camera,
    DepthCamera,
    Imu,
    Lidar,
    Pointcloud,
    OccupancyGridMap,
    ImageWithBoundingBoxes,
    ImageWithHumans,
}

impl NeedKind {
    pub const ALL: [NeedKind; 8] = [
        NeedKind::Camera,
        NeedKind::DepthCamera,
        NeedKind::Imu,
        NeedKind::Lidar,
        NeedKind::Pointcloud,
        NeedKind::OccupancyGridMap,
        NeedKind::ImageWithBoundingBoxes,
        NeedKind::ImageWithHumans,
    ];

    pub fn name(self) -> &'static str {
        match self {
            NeedKind::Camera => "Camera",
            NeedKind::DepthCamera => "DepthCamera",
            NeedKind::Imu => "Imu",
            NeedKind::Lidar => "Lidar",
            NeedKind::Pointcloud => "Pointcloud",
            NeedKind::OccupancyGridMap => "OccupancyGridMap",
            NeedKind::ImageWithBoundingBoxes => "ImageWithBoundingBoxes",
            NeedKind::ImageWithHumans => "ImageWithHumans",
        }
    }

    /// Message type name this need consumes.
    pub fn message_type(self) -> &'static str {
        match self {
            NeedKind::Camera => messages::CAMERA_FRAME_MESSAGE,
            NeedKind::DepthCamera => messages::DEPTH_CAMERA_FRAME_MESSAGE,
            NeedKind::Imu => messages::IMU_FRAME_MESSAGE,
            NeedKind::Lidar => messages::LIDAR_FRAME_MESSAGE,
            NeedKind::Pointcloud => messages::POINTCLOUD_MESSAGE,
            NeedKind::OccupancyGridMap => messages::OCCUPANCY_GRID_MAP_MESSAGE,
            NeedKind::ImageWithBoundingBoxes => messages::IMAGE_WITH_BOUNDING_BOXES_MESSAGE,
            NeedKind::ImageWithHumans => messages::IMAGE_WITH_HUMANS_MESSAGE,
        }
    }
}

impl FromStr for NeedKind {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NeedKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| CatalogError::UnknownNeed {
                name: s.to_string(),
            })
    }
}

impl fmt::Display for NeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
