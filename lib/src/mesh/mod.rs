pub mod buffers;
pub mod face;
pub mod hierarchy;
pub mod kernel;

use glam::{Vec2, Vec3};

/// One corner of a decoded triangle, before any derivation.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Corner {
    pub position: Vec3,
    pub uv: Vec2,
}

/// A decoded triangle and the smoothing group it belongs to.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RawTriangle {
    pub group: u32,
    pub corners: [Corner; 3],
}

impl RawTriangle {
    pub fn positions(&self) -> [Vec3; 3] { self.corners.map(|c| c.position) }

    pub fn uvs(&self) -> [Vec2; 3] { self.corners.map(|c| c.uv) }
}
