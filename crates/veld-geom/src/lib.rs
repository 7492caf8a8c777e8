//! Geometry types for the terrain crates: boxes, clip volumes, parcel math.
#![forbid(unsafe_code)]

use glam::{IVec2, Vec2, Vec3};

mod clip;
mod rect;

pub use clip::{ClipPlane, ClipVolume};
pub use rect::ParcelRect;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box containing a single point.
    #[inline]
    pub const fn point(p: Vec3) -> Self {
        Self { min: p, max: p }
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    pub fn extents(&self) -> Vec3 {
        self.max - self.min
    }

    /// Corner by 3-bit index: bit 0 selects max.x, bit 1 max.y, bit 2 max.z.
    #[inline]
    pub fn corner(&self, index: u8) -> Vec3 {
        debug_assert!(index < 8, "corner index out of range: {index}");
        Vec3::new(
            if index & 1 != 0 { self.max.x } else { self.min.x },
            if index & 2 != 0 { self.max.y } else { self.min.y },
            if index & 4 != 0 { self.max.z } else { self.min.z },
        )
    }

    #[inline]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    #[inline]
    pub fn contains(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    #[inline]
    pub fn encapsulate(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }
}

/// Parcel containing a world-space XZ position.
#[inline]
pub fn parcel_of(position_xz: Vec2, parcel_size: i32) -> IVec2 {
    let inv = 1.0 / parcel_size as f32;
    IVec2::new(
        (position_xz.x * inv).floor() as i32,
        (position_xz.y * inv).floor() as i32,
    )
}

/// World-space bounds of one parcel, spanning the full height range.
#[inline]
pub fn parcel_bounds(parcel: IVec2, parcel_size: i32, max_height: f32) -> Aabb {
    let min = parcel * parcel_size;
    let max = min + IVec2::splat(parcel_size);
    Aabb::new(
        Vec3::new(min.x as f32, 0.0, min.y as f32),
        Vec3::new(max.x as f32, max_height, max.y as f32),
    )
}
