use glam::{IVec2, Vec3};
use veld_geom::{Aabb, ClipVolume, parcel_of};
use veld_jobs::AppendBuffer;
use veld_world::{GroundMesh, TerrainView};

use crate::ScatterInstance;

/// One entry of the fixed ground layout: tile offset from the walk's center
/// corner in multiples of the current scale, mesh variant, and the quarter
/// turns that orient the variant's open edge outward.
#[derive(Clone, Copy, Debug)]
pub struct GroundTileEntry {
    pub offset: IVec2,
    pub mesh: GroundMesh,
    pub rotation_quarters: u8,
}

const fn entry(x: i32, y: i32, mesh: GroundMesh, rotation_quarters: u8) -> GroundTileEntry {
    GroundTileEntry {
        offset: IVec2::new(x, y),
        mesh,
        rotation_quarters,
    }
}

/// Entries 0-3 are the innermost 2x2 middle tiles; entries 4-15 are the ring
/// around them: four corners and two edge tiles per side. At scale `s` the
/// inner block covers the 2s x 2s parcels around the center corner and the
/// ring extends coverage to 4s x 4s, which is exactly the inner block of the
/// next doubled scale.
pub const GROUND_TILE_TABLE: [GroundTileEntry; 16] = [
    entry(-1, -1, GroundMesh::Middle, 0),
    entry(0, -1, GroundMesh::Middle, 1),
    entry(0, 0, GroundMesh::Middle, 2),
    entry(-1, 0, GroundMesh::Middle, 3),
    // South side, west to east.
    entry(-2, -2, GroundMesh::Corner, 0),
    entry(-1, -2, GroundMesh::Edge, 0),
    entry(0, -2, GroundMesh::Edge, 0),
    entry(1, -2, GroundMesh::Corner, 1),
    // East and west flanks, south to north.
    entry(-2, -1, GroundMesh::Edge, 3),
    entry(1, -1, GroundMesh::Edge, 1),
    entry(-2, 0, GroundMesh::Edge, 3),
    entry(1, 0, GroundMesh::Edge, 1),
    // North side, west to east.
    entry(-2, 1, GroundMesh::Corner, 3),
    entry(-1, 1, GroundMesh::Edge, 2),
    entry(0, 1, GroundMesh::Edge, 2),
    entry(1, 1, GroundMesh::Corner, 2),
];

#[derive(Clone, Copy, Debug, Default)]
pub struct GroundStats {
    pub tiles: u32,
    pub rings: u32,
    pub final_scale: i64,
}

/// Walk concentric rings outward from the camera's 2x2-aligned parcel block,
/// doubling the tile scale each ring, and append every tile that survives
/// the terrain-bounds and frustum tests. The walk stops once a whole ring
/// pass falls outside the frustum's conservative bound, or at the scale
/// guard when the volume overlaps everything at every scale.
///
/// Ground meshes are authored on the unit square, so a tile's XZ scale is
/// its world edge length.
pub fn generate_ground(
    view: &TerrainView<'_>,
    camera_position: Vec3,
    frustum: &ClipVolume,
    out: &AppendBuffer<ScatterInstance>,
) -> GroundStats {
    let camera_parcel = parcel_of(
        glam::Vec2::new(camera_position.x, camera_position.z),
        view.parcel_size,
    );
    // Shared corner of the 2x2-aligned block containing the camera.
    let center = IVec2::new(
        camera_parcel.x.div_euclid(2) * 2 + 1,
        camera_parcel.y.div_euclid(2) * 2 + 1,
    );

    let mut stats = GroundStats::default();
    let mut scale: i64 = 1;

    for e in &GROUND_TILE_TABLE[..4] {
        stats.tiles += emit_tile(view, frustum, center, scale, e, out).emitted as u32;
    }

    loop {
        let mut emitted = 0u32;
        let mut in_reach = false;
        for e in &GROUND_TILE_TABLE[4..] {
            let outcome = emit_tile(view, frustum, center, scale, e, out);
            emitted += outcome.emitted as u32;
            in_reach |= outcome.in_reach;
        }
        stats.rings += 1;
        stats.tiles += emitted;
        stats.final_scale = scale;

        if !in_reach || scale >= i32::MAX as i64 / 2 {
            return stats;
        }
        scale *= 2;
    }
}

struct TileOutcome {
    emitted: bool,
    /// The candidate still overlapped the frustum's conservative bound, so
    /// the outward walk has not escaped the camera's reach yet. Tiles
    /// rejected by the terrain bounds or the exact plane test keep the walk
    /// alive; a far-outside camera must not stall before its rings arrive at
    /// the terrain.
    in_reach: bool,
}

fn emit_tile(
    view: &TerrainView<'_>,
    frustum: &ClipVolume,
    center: IVec2,
    scale: i64,
    e: &GroundTileEntry,
    out: &AppendBuffer<ScatterInstance>,
) -> TileOutcome {
    // Parcel rect of the candidate, in i64 so huge ring scales cannot wrap.
    let min_x = center.x as i64 + e.offset.x as i64 * scale;
    let min_y = center.y as i64 + e.offset.y as i64 * scale;
    let max_x = min_x + scale;
    let max_y = min_y + scale;

    let parcel_size = view.parcel_size as f32;
    let world_box = Aabb::new(
        Vec3::new(min_x as f32 * parcel_size, 0.0, min_y as f32 * parcel_size),
        Vec3::new(
            max_x as f32 * parcel_size,
            view.max_height,
            max_y as f32 * parcel_size,
        ),
    );

    let in_reach = frustum.bounds.overlaps(&world_box);
    if !in_reach {
        return TileOutcome {
            emitted: false,
            in_reach: false,
        };
    }

    // Out-of-bounds tiles are rejected individually; the scan continues.
    let in_bounds = (view.bounds.max.x as i64) >= min_x
        && (view.bounds.max.y as i64) >= min_y
        && (view.bounds.min.x as i64) <= max_x
        && (view.bounds.min.y as i64) <= max_y;
    if !in_bounds || !frustum.overlaps(&world_box) {
        return TileOutcome {
            emitted: false,
            in_reach: true,
        };
    }

    let half_edge = scale as f32 * parcel_size * 0.5;
    out.push(ScatterInstance {
        mesh_index: e.mesh.index() as u32,
        position: Vec3::new(world_box.min.x + half_edge, 0.0, world_box.min.z + half_edge),
        rotation_y_deg: e.rotation_quarters as f32 * 90.0,
        scale_xz: scale as f32 * parcel_size,
        scale_y: 1.0,
    });
    TileOutcome {
        emitted: true,
        in_reach: true,
    }
}
