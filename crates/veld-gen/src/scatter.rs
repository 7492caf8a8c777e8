use glam::{IVec2, Vec2, Vec3};
use veld_geom::ClipVolume;
use veld_jobs::AppendBuffer;
use veld_world::{DetailPrototypeConfig, TerrainView, TreePrototypeConfig};

use crate::ScatterInstance;

/// Flatten the per-prototype LOD lists into the concatenated threshold array
/// indexed by tree mesh index.
pub fn tree_lod_thresholds(prototypes: &[TreePrototypeConfig]) -> Vec<f32> {
    prototypes
        .iter()
        .flat_map(|p| p.lods.iter().map(|lod| lod.min_screen_size))
        .collect()
}

/// Scatter one parcel's preseeded trees. Runs as one invocation of a
/// parallel-for over the camera's scatter rect; appends through the shared
/// writer and never blocks.
pub fn scatter_trees_parcel(
    view: &TerrainView<'_>,
    parcel: IVec2,
    camera_position: Vec3,
    frustum: &ClipVolume,
    lod_thresholds: &[f32],
    out: &AppendBuffer<ScatterInstance>,
) {
    if view.is_occupied(parcel) {
        return;
    }
    if !frustum.overlaps(&view.parcel_bounds(parcel)) {
        return;
    }

    for &instance in view.tree_instances(parcel) {
        let Some(placed) = view.try_generate_tree(parcel, instance) else {
            continue;
        };
        let prototype = view.tree_prototypes[placed.prototype];

        // Screen size: the tree's world size over its distance to camera.
        // Walk toward coarser LODs until one's threshold is met; a threshold
        // exactly equal to the screen size selects that LOD. Running out of
        // LODs culls the tree.
        let world_size = prototype.local_size * placed.scale_y;
        let distance = (placed.position - camera_position).length().max(1e-3);
        let screen_size = world_size / distance;

        let mut mesh_index = prototype.lod0_mesh_index;
        let end = prototype.lod0_mesh_index + prototype.lod_count;
        while mesh_index < end && lod_thresholds[mesh_index] > screen_size {
            mesh_index += 1;
        }
        if mesh_index == end {
            continue;
        }

        out.push(ScatterInstance {
            mesh_index: mesh_index as u32,
            position: placed.position,
            rotation_y_deg: placed.rotation_y_deg,
            scale_xz: placed.scale_xz,
            scale_y: placed.scale_y,
        });
    }
}

/// Scatter one parcel's detail (grass) instances on a jittered grid. The
/// grid resolution derives from the prototype density; border cells shared
/// with an occupied neighbor are skipped so placements never straddle into
/// hand-authored parcels. On writer overflow the parcel abandons its
/// remaining placements; other parcels keep going.
pub fn scatter_detail_parcel(
    view: &TerrainView<'_>,
    parcel: IVec2,
    frustum: &ClipVolume,
    prototypes: &[DetailPrototypeConfig],
    out: &AppendBuffer<ScatterInstance>,
) {
    if view.is_occupied(parcel) {
        return;
    }
    if !frustum.overlaps(&view.parcel_bounds(parcel)) {
        return;
    }

    let parcel_size = view.parcel_size as f32;
    let parcel_origin = Vec2::new(parcel.x as f32, parcel.y as f32) * parcel_size;
    let mut rng = view.parcel_rng(parcel);

    let occupied_west = view.is_occupied(parcel + IVec2::new(-1, 0));
    let occupied_east = view.is_occupied(parcel + IVec2::new(1, 0));
    let occupied_south = view.is_occupied(parcel + IVec2::new(0, -1));
    let occupied_north = view.is_occupied(parcel + IVec2::new(0, 1));

    for (prototype_index, prototype) in prototypes.iter().enumerate() {
        let cells = (parcel_size * prototype.density).ceil().max(1.0) as i32;
        let cell_size = parcel_size / cells as f32;

        for cell_y in 0..cells {
            for cell_x in 0..cells {
                if (cell_x == 0 && occupied_west)
                    || (cell_x == cells - 1 && occupied_east)
                    || (cell_y == 0 && occupied_south)
                    || (cell_y == cells - 1 && occupied_north)
                {
                    continue;
                }

                let local = Vec2::new(
                    (cell_x as f32 + rng.next_f32()) * cell_size,
                    (cell_y as f32 + rng.next_f32()) * cell_size,
                );
                let world = parcel_origin + local;
                let instance = ScatterInstance {
                    mesh_index: prototype_index as u32,
                    position: Vec3::new(world.x, view.height_at(world.x, world.y), world.y),
                    rotation_y_deg: rng.angle_deg(),
                    scale_xz: rng.range_f32(prototype.min_scale_xz, prototype.max_scale_xz),
                    scale_y: rng.range_f32(prototype.min_scale_y, prototype.max_scale_y),
                };
                if !out.push(instance) {
                    return;
                }
            }
        }
    }
}
