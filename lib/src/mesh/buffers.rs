use glam::{Vec2, Vec3};
use serde_derive::Serialize;

use crate::mesh::face::DerivedCorner;

/// Flat, interleave-ready vertex attribute arrays. Three corners per triangle.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MeshBuffers {
    #[serde(rename = "position_3f")]
    pub position: Vec<f32>,
    #[serde(rename = "texcoord_2f")]
    pub texcoord: Vec<f32>,
    #[serde(rename = "normal_3f")]
    pub normal: Vec<f32>,
    #[serde(rename = "tangent_3f")]
    pub tangent: Vec<f32>,
    #[serde(rename = "bitangent_3f")]
    pub bitangent: Vec<f32>,
    #[serde(rename = "bone_4f", skip_serializing_if = "Option::is_none")]
    pub bone: Option<Vec<f32>>,
}

impl MeshBuffers {
    /// Buffers that also carry a bone-index chain per vertex.
    pub fn with_bones() -> Self { Self { bone: Some(vec![]), ..Default::default() } }

    pub fn push(&mut self, position: Vec3, uv: Vec2, normal: Vec3, tangent: Vec3, bitangent: Vec3) {
        self.position.extend_from_slice(&position.to_array());
        self.texcoord.extend_from_slice(&uv.to_array());
        self.normal.extend_from_slice(&normal.to_array());
        self.tangent.extend_from_slice(&tangent.to_array());
        self.bitangent.extend_from_slice(&bitangent.to_array());
    }

    /// Pushes a derived corner with its position replaced by `position`.
    #[inline]
    pub fn push_corner(&mut self, corner: &DerivedCorner, position: Vec3) {
        self.push(position, corner.uv, corner.normal, corner.tangent, corner.bitangent);
    }

    pub fn push_bone(&mut self, chain: [f32; 4]) {
        self.bone.get_or_insert_with(Vec::new).extend_from_slice(&chain);
    }

    pub fn vertex_count(&self) -> usize { self.position.len() / 3 }
}
