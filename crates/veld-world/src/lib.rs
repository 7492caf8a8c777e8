//! Terrain configuration, occupancy sampling, and per-parcel determinism.
#![forbid(unsafe_code)]

mod config;
mod occupancy;
mod rng;
mod trees;
mod view;

pub use config::{
    BoundsConfig, ConfigError, DetailPrototypeConfig, NoiseConfig, OccupancyMapConfig, Terrain,
    TerrainConfig, TreeLodConfig, TreePrototypeConfig, TreeSourceConfig, load_config_from_path,
};
pub use occupancy::OccupancyMap;
pub use rng::{ParcelRng, lowbias32};
pub use trees::{
    TREE_INSTANCE_LIMIT, TreeIndex, TreeIndexError, TreeInstance, TreePrototypeData,
};
pub use view::{TerrainView, TreePlacement};

/// Terrain extent hard cap, in parcels per axis.
pub const TERRAIN_SIZE_LIMIT: i32 = 512;

/// Ground tile mesh variants, in mesh-index order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroundMesh {
    Middle,
    Edge,
    Corner,
}

impl GroundMesh {
    pub const COUNT: usize = 3;

    #[inline]
    pub fn index(self) -> usize {
        match self {
            GroundMesh::Middle => 0,
            GroundMesh::Edge => 1,
            GroundMesh::Corner => 2,
        }
    }
}
