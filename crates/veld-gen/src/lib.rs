//! Procedural instance generation: ground tiles, tree and detail scatter,
//! and compaction into per-mesh draw ranges.
#![forbid(unsafe_code)]

mod compact;
mod ground;
mod scatter;

pub use compact::{CompactedInstances, compact_instances};
pub use ground::{GROUND_TILE_TABLE, GroundStats, GroundTileEntry, generate_ground};
pub use scatter::{scatter_detail_parcel, scatter_trees_parcel, tree_lod_thresholds};

use glam::Vec3;

/// One generated instance, produced into a parallel append buffer and later
/// grouped by `mesh_index` for instanced drawing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScatterInstance {
    pub mesh_index: u32,
    pub position: Vec3,
    pub rotation_y_deg: f32,
    pub scale_xz: f32,
    pub scale_y: f32,
}
