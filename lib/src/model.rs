//! Converted model output: attribute buffers plus the object tree.

use glam::{Vec2, Vec3};
use serde_json::{json, Map, Value};

use crate::{
    error::{DecodeError, Result},
    format::{
        chunk::Chunk,
        ms3d::{Ms3dFile, MS3D_GROUP_HEADER_SIZE},
        tds::read_objects,
    },
    mesh::{
        buffers::MeshBuffers,
        face::derive_faces,
        hierarchy::{BoneTree, Hierarchy, Node},
        kernel::corner_tangent,
    },
};

/// Applied to 3DS positions and offsets unless overridden.
pub const DEFAULT_SCALE: f32 = 0.0005;

#[derive(Clone, Debug)]
pub struct ConvertOptions {
    pub scale: f32,
    /// Object tree; every object hangs off a synthetic root when absent
    pub hierarchy: Option<BoneTree>,
}

impl Default for ConvertOptions {
    fn default() -> Self { Self { scale: DEFAULT_SCALE, hierarchy: None } }
}

/// A 3DS scene ready for output.
#[derive(Clone, Debug)]
pub struct Model {
    pub hierarchy: Hierarchy,
    pub scale: f32,
}

impl Model {
    pub fn from_3ds(data: &[u8], options: &ConvertOptions) -> Result<Self> {
        let root = Chunk::read(data)?;
        let objects = read_objects(&root)?;
        let nodes: Vec<Node> = objects
            .into_iter()
            .map(|o| Node::new(o.index, o.name, o.center, derive_faces(&o.triangles)))
            .collect();
        let hierarchy = match &options.hierarchy {
            Some(bones) => {
                let count = nodes.len();
                let hierarchy = Hierarchy::from_bones(bones, nodes)?;
                if hierarchy.len() < count {
                    log::warn!(
                        "Hierarchy references {} of {count} objects; the rest are dropped",
                        hierarchy.len()
                    );
                }
                hierarchy
            }
            None => Hierarchy::flat(nodes),
        };
        Ok(Self { hierarchy, scale: options.scale })
    }

    /// Every face of every node in pre-order, each corner tagged with its node's bone chain.
    pub fn buffers(&self) -> MeshBuffers {
        let mut out = MeshBuffers::with_bones();
        self.hierarchy.write_buffers(self.scale, &mut out);
        out
    }

    pub fn parts(&self) -> Map<String, Value> { self.hierarchy.parts(self.scale) }

    /// `{"buffer": ..., "parts": ...}`
    pub fn to_json(&self) -> Value { self.document(&self.buffers()) }

    /// Output document for buffers already produced by [`Model::buffers`].
    pub fn document(&self, buffers: &MeshBuffers) -> Value {
        json!({ "buffer": buffers, "parts": self.parts() })
    }
}

/// Flattens an MS3D model into attribute buffers: groups in file order,
/// three corners per referenced triangle.
pub fn ms3d_buffers(file: &Ms3dFile) -> Result<MeshBuffers> {
    let mut out = MeshBuffers::default();
    for (group_idx, group) in file.groups.iter().enumerate() {
        for (slot, &triangle_idx) in group.triangle_indices.iter().enumerate() {
            let Some(triangle) = file.triangles.get(triangle_idx as usize) else {
                return Err(DecodeError::corrupt(
                    file.group_offset(group_idx) + (MS3D_GROUP_HEADER_SIZE + slot * 2) as u64,
                    format!(
                        "group '{}' references triangle {triangle_idx} of {}",
                        group.name,
                        file.triangles.len()
                    ),
                ));
            };
            let mut positions = [Vec3::ZERO; 3];
            for (position, &vertex_idx) in positions.iter_mut().zip(&triangle.indices) {
                let Some(vertex) = file.vertices.get(vertex_idx as usize) else {
                    return Err(DecodeError::corrupt(
                        file.triangle_offset(triangle_idx as usize) + 2,
                        format!(
                            "triangle {triangle_idx} references vertex {vertex_idx} of {}",
                            file.vertices.len()
                        ),
                    ));
                };
                *position = Vec3::from_array(vertex.position);
            }
            let uvs: [Vec2; 3] = std::array::from_fn(|k| Vec2::new(triangle.s[k], triangle.t[k]));
            for k in 0..3 {
                let (k1, k2) = ((k + 1) % 3, (k + 2) % 3);
                let normal = Vec3::from_array(triangle.normals[k]);
                let tangent = corner_tangent(
                    positions[k1] - positions[k],
                    positions[k2] - positions[k],
                    uvs[k1] - uvs[k],
                    uvs[k2] - uvs[k],
                );
                let bitangent = normal.cross(tangent).normalize_or_zero();
                out.push(positions[k], uvs[k], normal, tangent, bitangent);
            }
        }
    }
    log::debug!("Flattened {} MS3D groups into {} vertices", file.groups.len(), out.vertex_count());
    Ok(out)
}
