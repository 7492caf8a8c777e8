use glam::{IVec2, Vec2, Vec3};
use veld_geom::{Aabb, ParcelRect};

use crate::config::HeightNoise;
use crate::occupancy::OccupancyMap;
use crate::rng::ParcelRng;
use crate::trees::{TreeIndex, TreeInstance, TreePrototypeData};

/// Noise contribution fades in over this multiple of the normalized
/// occupancy, so flat carved ground meets noisy terrain without a seam.
const SATURATION_FACTOR: f32 = 20.0;

/// A fully dequantized tree placement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TreePlacement {
    pub prototype: usize,
    pub position: Vec3,
    pub rotation_y_deg: f32,
    pub scale_xz: f32,
    pub scale_y: f32,
}

/// Read-only per-frame view over terrain state, shared without locks by all
/// concurrently running generation jobs.
#[derive(Clone, Copy)]
pub struct TerrainView<'a> {
    pub random_seed: u32,
    pub parcel_size: i32,
    pub bounds: ParcelRect,
    pub max_height: f32,
    pub occupancy_floor: u8,
    occupancy: Option<&'a OccupancyMap>,
    noise: &'a HeightNoise,
    trees: &'a TreeIndex,
    pub tree_prototypes: &'a [TreePrototypeData],
}

impl<'a> TerrainView<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        random_seed: u32,
        parcel_size: i32,
        bounds: ParcelRect,
        max_height: f32,
        occupancy_floor: u8,
        occupancy: Option<&'a OccupancyMap>,
        noise: &'a HeightNoise,
        trees: &'a TreeIndex,
        tree_prototypes: &'a [TreePrototypeData],
    ) -> Self {
        Self {
            random_seed,
            parcel_size,
            bounds,
            max_height,
            occupancy_floor,
            occupancy,
            noise,
            trees,
            tree_prototypes,
        }
    }

    /// Terrain height at a world XZ position. Occupancy at or below the
    /// configured floor is flat carved ground; above it, height climbs
    /// linearly toward `max_height` while the noise contribution saturates in
    /// over a short band.
    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        let occupancy = match self.occupancy {
            Some(map) => {
                let size = map.size() as f32;
                let uv = (Vec2::new(x, z) / self.parcel_size as f32 + size * 0.5) / size;
                map.sample_bilinear(uv)
            }
            None => 0.0,
        };

        // Same constant as the bilinear sampler, so a map filled with the
        // floor value compares exactly equal.
        let min_value = self.occupancy_floor as f32 * (1.0 / 255.0);
        if occupancy <= min_value {
            return 0.0;
        }

        let normalized = (occupancy - min_value) / (1.0 - min_value);
        let saturation = (normalized * SATURATION_FACTOR).clamp(0.0, 1.0);
        normalized * self.max_height + self.noise.sample(x, z) * saturation
    }

    /// Surface normal by central differences over `height_at`.
    pub fn normal_at(&self, x: f32, z: f32) -> Vec3 {
        const STEP: f32 = 0.5;
        let dx = self.height_at(x + STEP, z) - self.height_at(x - STEP, z);
        let dz = self.height_at(x, z + STEP) - self.height_at(x, z - STEP);
        Vec3::new(-dx, 2.0 * STEP, -dz).normalize_or(Vec3::Y)
    }

    /// Whether hand-authored content occupies this parcel. Parcels outside
    /// the configured bounds count as occupied.
    pub fn is_occupied(&self, parcel: IVec2) -> bool {
        let Some(map) = self.occupancy else {
            return false;
        };
        if !self.bounds.contains(parcel) {
            return true;
        }
        let size = map.size() as i32;
        let p = parcel + IVec2::splat(size / 2);
        // Bounds larger than the map leave border parcels unmapped; treat
        // them like the out-of-bounds case.
        if p.x < 0 || p.y < 0 || p.x >= size || p.y >= size {
            return true;
        }
        map.byte_at(p.x as usize, p.y as usize) > 0
    }

    /// Whether a circle of `radius` around a position inside `parcel` (local
    /// coordinates) reaches into any occupied neighbor parcel.
    pub fn overlaps_occupied_parcel(&self, parcel: IVec2, local: Vec2, radius: f32) -> bool {
        let size = self.parcel_size as f32;
        let near_min_x = local.x < radius;
        let near_max_x = size - local.x < radius;
        let near_min_y = local.y < radius;
        let near_max_y = size - local.y < radius;

        (near_min_x && self.is_occupied(parcel + IVec2::new(-1, 0)))
            || (near_max_x && self.is_occupied(parcel + IVec2::new(1, 0)))
            || (near_min_y && self.is_occupied(parcel + IVec2::new(0, -1)))
            || (near_max_y && self.is_occupied(parcel + IVec2::new(0, 1)))
            || (near_min_x && near_min_y && self.is_occupied(parcel + IVec2::new(-1, -1)))
            || (near_max_x && near_min_y && self.is_occupied(parcel + IVec2::new(1, -1)))
            || (near_min_x && near_max_y && self.is_occupied(parcel + IVec2::new(-1, 1)))
            || (near_max_x && near_max_y && self.is_occupied(parcel + IVec2::new(1, 1)))
    }

    #[inline]
    pub fn parcel_rng(&self, parcel: IVec2) -> ParcelRng {
        ParcelRng::new(parcel, self.random_seed)
    }

    #[inline]
    pub fn tree_instances(&self, parcel: IVec2) -> &'a [TreeInstance] {
        self.trees.instances_at(parcel)
    }

    /// Dequantize a preseeded tree instance into a world placement. Returns
    /// None when the placement is rejected (unknown prototype, or the trunk
    /// circle reaches into an occupied neighbor parcel).
    pub fn try_generate_tree(&self, parcel: IVec2, instance: TreeInstance) -> Option<TreePlacement> {
        let prototype_index = instance.prototype as usize;
        let prototype = self.tree_prototypes.get(prototype_index)?;

        let size = self.parcel_size as f32;
        let local = Vec2::new(
            instance.position_x as f32 * size * (1.0 / 255.0),
            instance.position_z as f32 * size * (1.0 / 255.0),
        );

        if self.overlaps_occupied_parcel(parcel, local, prototype.radius) {
            return None;
        }

        let world_xz = local + Vec2::new(parcel.x as f32, parcel.y as f32) * size;
        let position = Vec3::new(world_xz.x, self.height_at(world_xz.x, world_xz.y), world_xz.y);
        Some(TreePlacement {
            prototype: prototype_index,
            position,
            rotation_y_deg: instance.rotation_y as f32 * (360.0 / 255.0),
            scale_xz: prototype.min_scale_xz
                + instance.scale_xz as f32 * (1.0 / 255.0) * prototype.scale_size_xz,
            scale_y: prototype.min_scale_y
                + instance.scale_y as f32 * (1.0 / 255.0) * prototype.scale_size_y,
        })
    }

    /// World bounds of one parcel, spanning the full height range.
    #[inline]
    pub fn parcel_bounds(&self, parcel: IVec2) -> Aabb {
        veld_geom::parcel_bounds(parcel, self.parcel_size, self.max_height)
    }

    /// Inclusive-touch overlap against the terrain bounds, in parcels.
    #[inline]
    pub fn bounds_overlaps(&self, rect: &ParcelRect) -> bool {
        self.bounds.max.x >= rect.min.x
            && self.bounds.max.y >= rect.min.y
            && self.bounds.min.x <= rect.max.x
            && self.bounds.min.y <= rect.max.y
    }

    /// World-space box around the whole configured terrain.
    pub fn world_bounds(&self) -> Aabb {
        let size = self.parcel_size as f32;
        let min = Vec2::new(self.bounds.min.x as f32, self.bounds.min.y as f32) * size;
        let max = Vec2::new(self.bounds.max.x as f32, self.bounds.max.y as f32) * size;
        Aabb::new(
            Vec3::new(min.x, 0.0, min.y),
            Vec3::new(max.x, self.max_height, max.y),
        )
    }
}
