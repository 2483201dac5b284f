//! Autodesk 3D Studio (.3ds) payload records and mesh object extraction.

use std::collections::HashMap;

use binrw::{binrw, NullString};
use glam::{Vec2, Vec3};

use crate::{
    error::{DecodeError, Result},
    format::chunk::{Chunk, ChunkData, ChunkKind, K_CHUNK_MAIN},
    mesh::{kernel::position_key, Corner, RawTriangle},
};

/// Converts from the file's Z-up space.
#[inline]
pub fn to_y_up([x, y, z]: [f32; 3]) -> Vec3 { Vec3::new(x, z, -y) }

/// 0x4110 vertex list
#[binrw]
#[derive(Clone, Debug, Default)]
pub struct VertexList {
    #[bw(try_calc = positions.len().try_into())]
    pub count: u16,
    #[br(count = count)]
    pub positions: Vec<[f32; 3]>,
}

/// 0x4120 face list
#[binrw]
#[derive(Clone, Debug, Default)]
pub struct FaceList {
    #[bw(try_calc = faces.len().try_into())]
    pub count: u16,
    #[br(count = count)]
    pub faces: Vec<Face>,
}

#[binrw]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Face {
    pub indices: [u16; 3],
    pub flags: u16,
}

/// 0x4130 faces using a material
#[binrw]
#[derive(Clone, Debug, Default)]
pub struct FaceMaterial {
    #[br(map = |s: NullString| s.to_string())]
    #[bw(map = |s: &String| NullString::from(s.as_str()))]
    pub name: String,
    #[bw(try_calc = faces.len().try_into())]
    pub count: u16,
    #[br(count = count)]
    pub faces: Vec<u16>,
}

/// 0x4140 texture coordinates
#[binrw]
#[derive(Clone, Debug, Default)]
pub struct TexcoordList {
    #[bw(try_calc = uvs.len().try_into())]
    pub count: u16,
    #[br(count = count)]
    pub uvs: Vec<[f32; 2]>,
}

/// 0x4150 one smoothing group bitmask per face of the enclosing face list
#[binrw]
#[br(import(face_count: usize))]
#[derive(Clone, Debug, Default)]
pub struct SmoothGroupList {
    #[br(count = face_count)]
    pub groups: Vec<u32>,
}

/// 0x4160 local coordinate system
#[binrw]
#[derive(Clone, Debug, Default)]
pub struct MeshMatrix {
    pub rotation: [f32; 9],
    pub translation: [f32; 3],
}

impl MeshMatrix {
    /// Object pivot, converted to Y-up.
    pub fn center(&self) -> Vec3 { to_y_up(self.translation) }
}

/// 0xB010 keyframer node header
#[binrw]
#[derive(Clone, Debug, Default)]
pub struct HierarchyLink {
    #[br(map = |s: NullString| s.to_string())]
    #[bw(map = |s: &String| NullString::from(s.as_str()))]
    pub name: String,
    pub flags: [u16; 2],
    /// Parent node, -1 for none
    pub parent: i16,
}

/// Vertex positions after welding.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Vertices {
    pub positions: Vec<Vec3>,
    /// Index of the first vertex with an identical position, per vertex
    pub canonical: Vec<u16>,
}

impl Vertices {
    /// Converts to Y-up and welds vertices with exactly equal coordinates.
    /// Every original index stays valid; duplicates resolve to the first occurrence.
    pub fn weld(raw: &[[f32; 3]]) -> Self {
        let mut first: HashMap<[u32; 3], u16> = HashMap::with_capacity(raw.len());
        let mut positions = Vec::with_capacity(raw.len());
        let mut canonical = Vec::with_capacity(raw.len());
        for (idx, &p) in raw.iter().enumerate() {
            let position = to_y_up(p);
            // NaN never compares equal, so it is never welded
            let target = if position.is_nan() {
                idx as u16
            } else {
                *first.entry(position_key(position)).or_insert(idx as u16)
            };
            positions.push(positions.get(target as usize).copied().unwrap_or(position));
            canonical.push(target);
        }
        Self { positions, canonical }
    }

    pub fn len(&self) -> usize { self.positions.len() }

    pub fn is_empty(&self) -> bool { self.positions.is_empty() }
}

/// A mesh object from the editor section, with its faces resolved to positions and UVs.
#[derive(Clone, Debug, Default)]
pub struct MeshObject {
    /// Ordinal among all object chunks
    pub index: u32,
    pub name: String,
    pub center: Vec3,
    pub triangles: Vec<RawTriangle>,
}

macro_rules! payload {
    ($chunk:expr, $variant:ident) => {
        match &$chunk.data {
            ChunkData::$variant(value) => Ok(value),
            _ => Err(DecodeError::corrupt(
                $chunk.offset,
                format!("chunk {:#06X} carries no {} payload", $chunk.tag, stringify!($variant)),
            )),
        }
    };
}

/// Collects every object under `main > editor`, in file order.
///
/// Objects without a mesh (lights, cameras) are kept as empty objects so
/// that ordinals stay aligned with the file.
pub fn read_objects(root: &Chunk) -> Result<Vec<MeshObject>> {
    if root.kind != ChunkKind::Main {
        return Err(DecodeError::corrupt(
            root.offset,
            format!("expected main chunk {K_CHUNK_MAIN:#06X}, found {:#06X}", root.tag),
        ));
    }
    let editor = root.child(ChunkKind::Editor)?;
    let mut out = Vec::new();
    for (index, object) in editor.children_of(ChunkKind::Object).enumerate() {
        let name = payload!(object, ObjectName)?.clone();
        let mut result =
            MeshObject { index: index as u32, name, center: Vec3::ZERO, triangles: vec![] };
        match object.find(ChunkKind::Mesh) {
            Some(mesh) => {
                result.center = mesh
                    .find(ChunkKind::Matrix)
                    .map(|c| payload!(c, Matrix).map(MeshMatrix::center))
                    .transpose()?
                    .unwrap_or(Vec3::ZERO);
                result.triangles = read_triangles(&result.name, mesh)?;
            }
            None => log::debug!("Object '{}' has no mesh", result.name),
        }
        log::debug!(
            "Object {} '{}': {} faces, center {}",
            result.index,
            result.name,
            result.triangles.len(),
            result.center
        );
        out.push(result);
    }
    Ok(out)
}

fn read_triangles(name: &str, mesh: &Chunk) -> Result<Vec<RawTriangle>> {
    let vertex_chunk = mesh.child(ChunkKind::Vertices)?;
    let vertices = payload!(vertex_chunk, Vertices)?;
    let face_chunk = mesh.child(ChunkKind::Faces)?;
    let faces = payload!(face_chunk, Faces)?;

    let texcoords = match mesh.find(ChunkKind::Texcoords) {
        Some(chunk) => payload!(chunk, Texcoords)?.as_slice(),
        None => {
            log::warn!("Object '{name}' has no texture coordinates");
            &[]
        }
    };
    let groups = match face_chunk.find(ChunkKind::SmoothGroup) {
        Some(chunk) => payload!(chunk, SmoothGroup)?.as_slice(),
        None => &[],
    };

    let mut out = Vec::with_capacity(faces.len());
    for (face_idx, face) in faces.iter().enumerate() {
        let mut corners = [Corner::default(); 3];
        for (corner, &vertex) in corners.iter_mut().zip(&face.indices) {
            let vertex = vertex as usize;
            let Some(&position) = vertices.positions.get(vertex) else {
                return Err(DecodeError::corrupt(
                    face_chunk.offset,
                    format!(
                        "face {face_idx} references vertex {vertex} of {}",
                        vertices.len()
                    ),
                ));
            };
            let uv = if texcoords.is_empty() {
                Vec2::ZERO
            } else {
                *texcoords.get(vertex).ok_or_else(|| {
                    DecodeError::corrupt(
                        face_chunk.offset,
                        format!(
                            "face {face_idx} references texcoord {vertex} of {}",
                            texcoords.len()
                        ),
                    )
                })?
            };
            *corner = Corner { position, uv };
        }
        out.push(RawTriangle { group: groups.get(face_idx).copied().unwrap_or(0), corners });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weld_resolves_duplicates_to_first() {
        let raw = [
            [1.0, 2.0, 3.0],
            [4.0, 5.0, 6.0],
            [1.0, 2.0, 3.0],
            [-0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0],
        ];
        let vertices = Vertices::weld(&raw);
        assert_eq!(vertices.canonical, vec![0, 1, 0, 3, 3]);
        assert_eq!(vertices.positions[2], vertices.positions[0]);
        assert_eq!(vertices.positions[0], Vec3::new(1.0, 3.0, -2.0));
        let bits = |v: Vec3| v.to_array().map(f32::to_bits);
        assert_eq!(bits(vertices.positions[4]), bits(vertices.positions[3]));
    }

    #[test]
    fn weld_never_merges_nan() {
        let raw = [[f32::NAN, 0.0, 0.0], [f32::NAN, 0.0, 0.0]];
        assert_eq!(Vertices::weld(&raw).canonical, vec![0, 1]);
    }

    #[test]
    fn matrix_center_is_y_up() {
        let matrix = MeshMatrix { rotation: [0.0; 9], translation: [1.0, 2.0, 3.0] };
        assert_eq!(matrix.center(), Vec3::new(1.0, 3.0, -2.0));
    }
}
