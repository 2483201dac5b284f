use std::collections::{BTreeMap, HashMap};

use glam::{Vec2, Vec3};

use crate::mesh::{
    kernel::{face_basis, orthogonalize, position_key, Basis},
    RawTriangle,
};

/// Corner with its smoothed tangent space.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct DerivedCorner {
    pub position: Vec3,
    pub uv: Vec2,
    pub normal: Vec3,
    pub tangent: Vec3,
    pub bitangent: Vec3,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DerivedFace {
    pub group: u32,
    pub corners: [DerivedCorner; 3],
    /// Flat basis computed from this face alone
    pub flat: Basis,
}

/// Derives per-corner smoothed normals, tangents and bitangents.
///
/// A corner is smoothed across every face of the same smoothing group that
/// contains its exact position. Faces in other groups never contribute,
/// even when they touch the same position.
pub fn derive_faces(triangles: &[RawTriangle]) -> Vec<DerivedFace> {
    let flat: Vec<Basis> =
        triangles.iter().map(|t| face_basis(t.positions(), t.uvs())).collect();

    let mut groups: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (idx, triangle) in triangles.iter().enumerate() {
        groups.entry(triangle.group).or_default().push(idx);
    }

    let mut out: Vec<DerivedFace> = triangles
        .iter()
        .zip(&flat)
        .map(|(triangle, basis)| DerivedFace {
            group: triangle.group,
            corners: triangle.corners.map(|c| DerivedCorner {
                position: c.position,
                uv: c.uv,
                ..Default::default()
            }),
            flat: *basis,
        })
        .collect();

    for faces in groups.values() {
        // Position -> faces in this group touching it. A face is listed once
        // per position even if two of its corners coincide.
        let mut sharing: HashMap<[u32; 3], Vec<usize>> = HashMap::new();
        for &face in faces {
            for corner in &triangles[face].corners {
                let list = sharing.entry(position_key(corner.position)).or_default();
                if list.last() != Some(&face) {
                    list.push(face);
                }
            }
        }

        for &face in faces {
            for corner in &mut out[face].corners {
                let shared = &sharing[&position_key(corner.position)];
                let normal_sum: Vec3 = shared.iter().map(|&f| flat[f].normal).sum();
                let normal = (normal_sum / shared.len() as f32).normalize_or_zero();
                let tangent_sum: Vec3 = shared.iter().map(|&f| flat[f].tangent).sum();
                let tangent = orthogonalize(tangent_sum, normal);
                corner.normal = normal;
                corner.tangent = tangent;
                corner.bitangent = tangent.cross(normal);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Corner;

    const EPSILON: f32 = 1e-5;

    fn triangle(group: u32, positions: [Vec3; 3]) -> RawTriangle {
        let uvs = [Vec2::ZERO, Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)];
        RawTriangle {
            group,
            corners: [0, 1, 2].map(|i| Corner { position: positions[i], uv: uvs[i] }),
        }
    }

    // Two faces folded 90 degrees along the shared X axis edge.
    fn hinge(group_a: u32, group_b: u32) -> Vec<RawTriangle> {
        vec![
            triangle(group_a, [Vec3::ZERO, Vec3::X, Vec3::Y]),
            triangle(group_b, [Vec3::X, Vec3::ZERO, Vec3::Z]),
        ]
    }

    #[test]
    fn coplanar_faces_share_flat_normal() {
        let faces = derive_faces(&[
            triangle(1, [Vec3::ZERO, Vec3::X, Vec3::Y]),
            triangle(1, [Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y]),
        ]);
        for face in &faces {
            for corner in &face.corners {
                assert!(corner.normal.abs_diff_eq(Vec3::Z, EPSILON));
                assert!(corner.tangent.dot(corner.normal).abs() < EPSILON);
            }
        }
    }

    #[test]
    fn same_group_smooths_shared_corners() {
        let faces = derive_faces(&hinge(3, 3));
        let a = faces[0].corners[0];
        let b = faces[1].corners[1];
        assert_eq!(a.position, b.position);
        assert!(a.normal.abs_diff_eq(b.normal, EPSILON));
        let expected = (faces[0].flat.normal + faces[1].flat.normal).normalize();
        assert!(a.normal.abs_diff_eq(expected, EPSILON));
        // Unshared corners keep their flat normal
        assert!(faces[0].corners[2].normal.abs_diff_eq(faces[0].flat.normal, EPSILON));
    }

    #[test]
    fn different_groups_stay_isolated() {
        let faces = derive_faces(&hinge(1, 2));
        let a = faces[0].corners[0];
        let b = faces[1].corners[1];
        assert_eq!(a.position, b.position);
        assert!(a.normal.abs_diff_eq(faces[0].flat.normal, EPSILON));
        assert!(b.normal.abs_diff_eq(faces[1].flat.normal, EPSILON));
        assert!(!a.normal.abs_diff_eq(b.normal, EPSILON));
    }

    #[test]
    fn bitangent_is_tangent_cross_normal() {
        let faces = derive_faces(&hinge(0, 0));
        for corner in faces.iter().flat_map(|f| f.corners.iter()) {
            assert!(corner.bitangent.abs_diff_eq(corner.tangent.cross(corner.normal), EPSILON));
        }
    }
}
