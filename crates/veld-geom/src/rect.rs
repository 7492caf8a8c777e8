use glam::{IVec2, Vec2};

/// Integer parcel rectangle, max-exclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParcelRect {
    pub min: IVec2,
    pub max: IVec2,
}

impl ParcelRect {
    #[inline]
    pub const fn new(min: IVec2, max: IVec2) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn width(&self) -> i32 {
        (self.max.x - self.min.x).max(0)
    }

    #[inline]
    pub fn height(&self) -> i32 {
        (self.max.y - self.min.y).max(0)
    }

    #[inline]
    pub fn area(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.max.x <= self.min.x || self.max.y <= self.min.y
    }

    #[inline]
    pub fn contains(&self, parcel: IVec2) -> bool {
        parcel.x >= self.min.x
            && parcel.x < self.max.x
            && parcel.y >= self.min.y
            && parcel.y < self.max.y
    }

    #[inline]
    pub fn clamp_to(&self, bounds: &ParcelRect) -> ParcelRect {
        ParcelRect {
            min: self.min.max(bounds.min),
            max: self.max.min(bounds.max).max(self.min.max(bounds.min)),
        }
    }

    #[inline]
    pub fn overlaps(&self, other: &ParcelRect) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
    }

    /// Parcel at a flat index, x-fastest. Index must be within `area()`.
    #[inline]
    pub fn parcel_at(&self, index: usize) -> IVec2 {
        let w = self.width() as usize;
        debug_assert!(w > 0 && index < self.area());
        IVec2::new(
            self.min.x + (index % w) as i32,
            self.min.y + (index / w) as i32,
        )
    }

    /// Smallest parcel rect covering a square of `radius` around `center_xz`.
    pub fn around(center_xz: Vec2, radius: f32, parcel_size: i32) -> ParcelRect {
        let inv = 1.0 / parcel_size as f32;
        let min = IVec2::new(
            ((center_xz.x - radius) * inv).floor() as i32,
            ((center_xz.y - radius) * inv).floor() as i32,
        );
        let max = IVec2::new(
            ((center_xz.x + radius) * inv).ceil() as i32,
            ((center_xz.y + radius) * inv).ceil() as i32,
        );
        ParcelRect { min, max }
    }

    /// Parcel rect covering a world-space XZ span.
    pub fn from_world_span(min_xz: Vec2, max_xz: Vec2, parcel_size: i32) -> ParcelRect {
        let inv = 1.0 / parcel_size as f32;
        ParcelRect {
            min: IVec2::new(
                (min_xz.x * inv).floor() as i32,
                (min_xz.y * inv).floor() as i32,
            ),
            max: IVec2::new((max_xz.x * inv).ceil() as i32, (max_xz.y * inv).ceil() as i32),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = IVec2> + '_ {
        let rect = *self;
        (0..rect.area()).map(move |i| rect.parcel_at(i))
    }
}
