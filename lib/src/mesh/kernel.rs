//! Tangent-space math shared by both model formats.

use glam::{Vec2, Vec3};

/// Auxiliary axis crossed with the face normal when a face has no usable UV area.
pub const FALLBACK_AUX: Vec3 = Vec3::new(0.00001, 0.00001, 1.0);
/// Per-corner tangent used when the UV determinant is zero.
pub const FALLBACK_TANGENT: Vec3 = Vec3::Z;

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Basis {
    pub normal: Vec3,
    pub tangent: Vec3,
    pub bitangent: Vec3,
}

/// Flat normal, tangent and bitangent of a triangle from its edge and UV derivatives.
///
/// If the UV triangle has zero signed area the tangent is derived from the
/// normal and [`FALLBACK_AUX`] instead, with the bitangent orthogonal to both.
///
/// Both UV deltas start at the first corner (`uv2 - uv1`, `uv3 - uv1`) so they
/// pair with the position edges. Taking the second delta from the second
/// corner (`uv3 - uv2`) would mismatch `e2` and skew the bitangent.
pub fn face_basis(positions: [Vec3; 3], uvs: [Vec2; 3]) -> Basis {
    let e1 = positions[1] - positions[0];
    let e2 = positions[2] - positions[0];
    let d1 = uvs[1] - uvs[0];
    let d2 = uvs[2] - uvs[0];
    let normal = e1.cross(e2).normalize_or_zero();

    let cp = d1.y * d2.x - d1.x * d2.y;
    if cp != 0.0 {
        Basis {
            normal,
            tangent: ((e1 * -d2.y + e2 * d1.y) / cp).normalize_or_zero(),
            bitangent: ((e1 * -d2.x + e2 * d1.x) / cp).normalize_or_zero(),
        }
    } else {
        let tangent = normal.cross(FALLBACK_AUX).normalize_or_zero();
        Basis { normal, tangent, bitangent: normal.cross(tangent).normalize_or_zero() }
    }
}

/// Unnormalized tangent at a corner, given the two edges leaving it and their UV deltas.
pub fn corner_tangent(e1: Vec3, e2: Vec3, d1: Vec2, d2: Vec2) -> Vec3 {
    let div = d1.x * d2.y - d2.x * d1.y;
    if div != 0.0 {
        (e1 * d2.y - e2 * d1.y) / div
    } else {
        FALLBACK_TANGENT
    }
}

/// Gram-Schmidt: removes the `normal` component from `tangent` and normalizes.
pub fn orthogonalize(tangent: Vec3, normal: Vec3) -> Vec3 {
    (tangent - normal * tangent.dot(normal)).normalize_or_zero()
}

/// Hash key for exact position equality. Signed zeros compare equal, so they share a key.
pub fn position_key(position: Vec3) -> [u32; 3] {
    position.to_array().map(|c| if c == 0.0 { 0 } else { c.to_bits() })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn basis_of_axis_aligned_face() {
        let basis = face_basis(
            [Vec3::ZERO, Vec3::X, Vec3::Y],
            [Vec2::ZERO, Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)],
        );
        assert!(basis.normal.abs_diff_eq(Vec3::Z, EPSILON));
        assert!(basis.tangent.abs_diff_eq(Vec3::X, EPSILON));
        assert!(basis.bitangent.abs_diff_eq(Vec3::NEG_Y, EPSILON));
    }

    #[test]
    fn uv_deltas_share_the_first_corner() {
        // Stretched U; measuring the second delta from corner 2 would tilt the bitangent
        let basis = face_basis(
            [Vec3::ZERO, Vec3::X, Vec3::Y],
            [Vec2::ZERO, Vec2::new(2.0, 0.0), Vec2::new(0.0, 1.0)],
        );
        assert!(basis.tangent.abs_diff_eq(Vec3::X, EPSILON));
        assert!(basis.bitangent.abs_diff_eq(Vec3::NEG_Y, EPSILON));
    }

    #[test]
    fn degenerate_uvs_use_fallback_axis() {
        let positions = [Vec3::ZERO, Vec3::X, Vec3::new(0.0, 2.0, 0.5)];
        // Collinear UVs: zero signed area
        let uvs = [Vec2::ZERO, Vec2::new(0.5, 0.5), Vec2::new(1.0, 1.0)];
        let basis = face_basis(positions, uvs);
        let expected = basis.normal.cross(FALLBACK_AUX).normalize();
        assert!(basis.tangent.abs_diff_eq(expected, EPSILON));
        assert!(basis.bitangent.dot(basis.tangent).abs() < EPSILON);
        assert!(basis.bitangent.dot(basis.normal).abs() < EPSILON);
        assert!((basis.bitangent.length() - 1.0).abs() < EPSILON);
    }

    #[test]
    fn corner_tangent_solves_uv_system() {
        let t = corner_tangent(Vec3::X * 2.0, Vec3::Y, Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0));
        assert!(t.abs_diff_eq(Vec3::new(2.0, 0.0, 0.0), EPSILON));
    }

    #[test]
    fn corner_tangent_falls_back_on_zero_determinant() {
        let t = corner_tangent(Vec3::X, Vec3::Y, Vec2::new(1.0, 1.0), Vec2::new(2.0, 2.0));
        assert_eq!(t, FALLBACK_TANGENT);
    }

    #[test]
    fn orthogonalize_removes_normal_component() {
        let t = orthogonalize(Vec3::new(1.0, 0.0, 1.0), Vec3::Z);
        assert!(t.abs_diff_eq(Vec3::X, EPSILON));
        assert_eq!(orthogonalize(Vec3::Z, Vec3::Z), Vec3::ZERO);
    }

    #[test]
    fn signed_zero_shares_key() {
        assert_eq!(position_key(Vec3::new(-0.0, 1.0, 0.0)), position_key(Vec3::new(0.0, 1.0, -0.0)));
        assert_ne!(position_key(Vec3::X), position_key(Vec3::NEG_X));
    }
}
