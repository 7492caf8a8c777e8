use glam::{Mat4, Vec3, Vec4, Vec4Swizzles};

use crate::Aabb;

/// One half-space of a clip volume. Positive signed distance is inside.
#[derive(Clone, Copy, Debug)]
pub struct ClipPlane {
    pub normal: Vec3,
    pub distance: f32,
    /// Corner index (see [`Aabb::corner`]) maximizing the signed distance of
    /// any box, picked from the normal's sign octant. Testing this one corner
    /// is enough to prove a box fully outside.
    pub far_corner: u8,
}

impl ClipPlane {
    fn from_row(row: Vec4) -> Self {
        let inv_len = row.xyz().length_recip();
        let normal = row.xyz() * inv_len;
        let far_corner = (normal.x >= 0.0) as u8
            | ((normal.y >= 0.0) as u8) << 1
            | ((normal.z >= 0.0) as u8) << 2;
        Self {
            normal,
            distance: row.w * inv_len,
            far_corner,
        }
    }

    #[inline]
    pub fn signed_distance(&self, p: Vec3) -> f32 {
        self.normal.dot(p) + self.distance
    }
}

/// Camera frustum as six planes plus a conservative world-space bound.
///
/// `overlaps` never reports a truly intersecting box as outside; it may keep
/// boxes that sit outside an edge but inside every individual plane.
#[derive(Clone, Copy, Debug)]
pub struct ClipVolume {
    pub planes: [ClipPlane; 6],
    pub bounds: Aabb,
}

impl ClipVolume {
    /// Extract planes from a world-to-clip matrix (row sums and differences),
    /// and bound the volume by unprojecting the eight clip-space corners.
    /// A degenerate projection yields undefined plane directions; callers
    /// must supply a valid matrix.
    pub fn new(world_to_clip: Mat4) -> Self {
        let r0 = world_to_clip.row(0);
        let r1 = world_to_clip.row(1);
        let r2 = world_to_clip.row(2);
        let r3 = world_to_clip.row(3);

        let planes = [
            ClipPlane::from_row(r3 + r0), // left
            ClipPlane::from_row(r3 - r0), // right
            ClipPlane::from_row(r3 + r1), // bottom
            ClipPlane::from_row(r3 - r1), // top
            ClipPlane::from_row(r3 + r2), // near
            ClipPlane::from_row(r3 - r2), // far
        ];

        let clip_to_world = world_to_clip.inverse();
        let mut bounds: Option<Aabb> = None;
        for index in 0..8u8 {
            let ndc = Vec3::new(
                if index & 1 != 0 { 1.0 } else { -1.0 },
                if index & 2 != 0 { 1.0 } else { -1.0 },
                if index & 4 != 0 { 1.0 } else { -1.0 },
            );
            let h = clip_to_world * ndc.extend(1.0);
            let p = h.xyz() / h.w;
            match bounds.as_mut() {
                Some(b) => b.encapsulate(p),
                None => bounds = Some(Aabb::point(p)),
            }
        }

        Self {
            planes,
            bounds: bounds.unwrap_or_default(),
        }
    }

    /// Conservative frustum-vs-box test: false only when `aabb` is provably
    /// outside (broad bound miss, or fully behind one plane).
    pub fn overlaps(&self, aabb: &Aabb) -> bool {
        if !self.bounds.overlaps(aabb) {
            return false;
        }
        for plane in &self.planes {
            if plane.signed_distance(aabb.corner(plane.far_corner)) < 0.0 {
                return false;
            }
        }
        true
    }
}
