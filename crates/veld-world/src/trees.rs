use std::fmt;
use std::io::{self, Read};

use glam::IVec2;

use crate::TERRAIN_SIZE_LIMIT;
use crate::rng::ParcelRng;

/// Hard cap on preseeded tree instances (2^18).
pub const TREE_INSTANCE_LIMIT: usize = 262_144;

/// One preseeded tree placement, quantized to 8 bytes. Positions are
/// fractions of the parcel, rotation covers the full circle, scales span the
/// prototype's configured range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeInstance {
    pub prototype: u8,
    pub position_x: u8,
    pub position_y: i16,
    pub position_z: u8,
    pub rotation_y: u8,
    pub scale_xz: u8,
    pub scale_y: u8,
}

/// Per-prototype scatter data derived from config: dequantization ranges and
/// the prototype's first index into the concatenated LOD mesh list.
#[derive(Clone, Copy, Debug)]
pub struct TreePrototypeData {
    pub local_size: f32,
    pub min_scale_xz: f32,
    pub scale_size_xz: f32,
    pub min_scale_y: f32,
    pub scale_size_y: f32,
    pub radius: f32,
    pub lod0_mesh_index: usize,
    pub lod_count: usize,
}

#[derive(Debug)]
pub enum TreeIndexError {
    Io(io::Error),
    /// Index rect exceeds the terrain size limit.
    IndexTooLarge(IVec2),
    /// Instance count exceeds [`TREE_INSTANCE_LIMIT`].
    TooManyInstances(usize),
}

impl fmt::Display for TreeIndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeIndexError::Io(e) => write!(f, "tree index read failed: {e}"),
            TreeIndexError::IndexTooLarge(size) => write!(
                f,
                "tree index size of ({}, {}) exceeds the limit of {TERRAIN_SIZE_LIMIT}",
                size.x, size.y
            ),
            TreeIndexError::TooManyInstances(n) => write!(
                f,
                "tree instance count of {n} exceeds the limit of {TREE_INSTANCE_LIMIT}"
            ),
        }
    }
}

impl std::error::Error for TreeIndexError {}

impl From<io::Error> for TreeIndexError {
    fn from(e: io::Error) -> Self {
        TreeIndexError::Io(e)
    }
}

/// Preseeded tree placements for a parcel rect: a flat instance array plus
/// per-parcel start offsets (x-fastest), so one parcel's trees are a slice.
#[derive(Clone, Debug, Default)]
pub struct TreeIndex {
    min_parcel: IVec2,
    max_parcel: IVec2,
    starts: Vec<u32>,
    instances: Vec<TreeInstance>,
}

impl TreeIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn instances_at(&self, parcel: IVec2) -> &[TreeInstance] {
        if parcel.x < self.min_parcel.x
            || parcel.x >= self.max_parcel.x
            || parcel.y < self.min_parcel.y
            || parcel.y >= self.max_parcel.y
        {
            return &[];
        }
        let width = (self.max_parcel.x - self.min_parcel.x) as usize;
        let index = (parcel.y - self.min_parcel.y) as usize * width
            + (parcel.x - self.min_parcel.x) as usize;
        let start = self.starts[index] as usize;
        let end = self
            .starts
            .get(index + 1)
            .map(|s| *s as usize)
            .unwrap_or(self.instances.len());
        &self.instances[start..end]
    }

    /// Read the little-endian binary asset: min/max parcel, per-parcel start
    /// offsets, instance count, then 8-byte instances.
    pub fn load(reader: &mut impl Read) -> Result<Self, TreeIndexError> {
        let min_parcel = IVec2::new(read_i32(reader)?, read_i32(reader)?);
        let max_parcel = IVec2::new(read_i32(reader)?, read_i32(reader)?);
        let size = max_parcel - min_parcel;

        if size.x < 0 || size.y < 0 || size.x > TERRAIN_SIZE_LIMIT || size.y > TERRAIN_SIZE_LIMIT {
            return Err(TreeIndexError::IndexTooLarge(size));
        }

        let cell_count = size.x as usize * size.y as usize;
        let mut starts = Vec::with_capacity(cell_count);
        for _ in 0..cell_count {
            starts.push(read_i32(reader)? as u32);
        }

        let instance_count = read_i32(reader)? as usize;
        if instance_count > TREE_INSTANCE_LIMIT {
            return Err(TreeIndexError::TooManyInstances(instance_count));
        }

        let mut instances = Vec::with_capacity(instance_count);
        let mut buf = [0u8; 8];
        for _ in 0..instance_count {
            reader.read_exact(&mut buf)?;
            instances.push(TreeInstance {
                prototype: buf[0],
                position_x: buf[1],
                position_y: i16::from_le_bytes([buf[2], buf[3]]),
                position_z: buf[4],
                rotation_y: buf[5],
                scale_xz: buf[6],
                scale_y: buf[7],
            });
        }

        Ok(Self {
            min_parcel,
            max_parcel,
            starts,
            instances,
        })
    }

    /// Deterministically synthesize an index for demos and tests: up to
    /// `max_per_parcel` trees per parcel, derived from the parcel's random
    /// stream.
    pub fn scatter(
        min_parcel: IVec2,
        max_parcel: IVec2,
        prototype_count: usize,
        max_per_parcel: u32,
        random_seed: u32,
    ) -> Self {
        let size = max_parcel - min_parcel;
        if size.x <= 0 || size.y <= 0 || prototype_count == 0 {
            return Self::empty();
        }

        let mut starts = Vec::with_capacity(size.x as usize * size.y as usize);
        let mut instances = Vec::new();
        for y in min_parcel.y..max_parcel.y {
            for x in min_parcel.x..max_parcel.x {
                starts.push(instances.len() as u32);
                let mut rng = ParcelRng::new(IVec2::new(x, y), random_seed);
                let count = rng.range_u32(max_per_parcel + 1);
                for _ in 0..count {
                    if instances.len() >= TREE_INSTANCE_LIMIT {
                        break;
                    }
                    instances.push(TreeInstance {
                        prototype: rng.range_u32(prototype_count as u32) as u8,
                        position_x: rng.range_u32(256) as u8,
                        position_y: 0,
                        position_z: rng.range_u32(256) as u8,
                        rotation_y: rng.range_u32(256) as u8,
                        scale_xz: rng.range_u32(256) as u8,
                        scale_y: rng.range_u32(256) as u8,
                    });
                }
            }
        }

        Self {
            min_parcel,
            max_parcel,
            starts,
            instances,
        }
    }
}

fn read_i32(reader: &mut impl Read) -> Result<i32, io::Error> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_i32(out: &mut Vec<u8>, v: i32) {
        out.extend_from_slice(&v.to_le_bytes());
    }

    #[test]
    fn load_reads_slices_per_parcel() {
        let mut bytes = Vec::new();
        write_i32(&mut bytes, 0); // min
        write_i32(&mut bytes, 0);
        write_i32(&mut bytes, 2); // max
        write_i32(&mut bytes, 1);
        write_i32(&mut bytes, 0); // starts
        write_i32(&mut bytes, 1);
        write_i32(&mut bytes, 3); // instance count
        for p in 0..3u8 {
            bytes.extend_from_slice(&[p, 10, 0, 0, 20, 30, 40, 50]);
        }

        let index = TreeIndex::load(&mut bytes.as_slice()).unwrap();
        assert_eq!(index.instance_count(), 3);
        assert_eq!(index.instances_at(IVec2::new(0, 0)).len(), 1);
        assert_eq!(index.instances_at(IVec2::new(1, 0)).len(), 2);
        assert_eq!(index.instances_at(IVec2::new(1, 0))[0].prototype, 1);
        assert!(index.instances_at(IVec2::new(2, 0)).is_empty());
        assert!(index.instances_at(IVec2::new(0, -1)).is_empty());
    }

    #[test]
    fn load_rejects_oversized_index() {
        let mut bytes = Vec::new();
        write_i32(&mut bytes, 0);
        write_i32(&mut bytes, 0);
        write_i32(&mut bytes, 1000);
        write_i32(&mut bytes, 1);
        let err = TreeIndex::load(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, TreeIndexError::IndexTooLarge(_)));
    }

    #[test]
    fn load_rejects_oversized_instance_count() {
        let mut bytes = Vec::new();
        write_i32(&mut bytes, 0);
        write_i32(&mut bytes, 0);
        write_i32(&mut bytes, 1);
        write_i32(&mut bytes, 1);
        write_i32(&mut bytes, 0);
        write_i32(&mut bytes, TREE_INSTANCE_LIMIT as i32 + 1);
        let err = TreeIndex::load(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, TreeIndexError::TooManyInstances(_)));
    }

    #[test]
    fn scatter_is_deterministic() {
        let a = TreeIndex::scatter(IVec2::new(-4, -4), IVec2::new(4, 4), 2, 3, 7);
        let b = TreeIndex::scatter(IVec2::new(-4, -4), IVec2::new(4, 4), 2, 3, 7);
        assert_eq!(a.instances, b.instances);
        assert_eq!(a.starts, b.starts);
        assert!(a.instance_count() > 0);
    }
}
