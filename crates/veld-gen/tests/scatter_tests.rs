use glam::{IVec2, Mat4, Vec3};
use veld_gen::{scatter_detail_parcel, scatter_trees_parcel, tree_lod_thresholds};
use veld_geom::ClipVolume;
use veld_jobs::{AppendBuffer, JobSystem};
use veld_world::{OccupancyMap, Terrain, TerrainConfig, TreeIndex};

fn terrain_from_toml(toml_str: &str) -> Terrain {
    let cfg: TerrainConfig = toml::from_str(toml_str).unwrap();
    Terrain::from_config(&cfg, std::path::Path::new(".")).unwrap()
}

fn everything_frustum() -> ClipVolume {
    ClipVolume::new(Mat4::orthographic_rh_gl(-1e9, 1e9, -1e9, 1e9, -1e9, 1e9))
}

/// Craft a tree index holding exactly one instance on parcel (0, 0).
fn single_tree_index(instance_bytes: [u8; 8]) -> TreeIndex {
    let mut bytes = Vec::new();
    for v in [0i32, 0, 1, 1] {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes.extend_from_slice(&0i32.to_le_bytes()); // start offset
    bytes.extend_from_slice(&1i32.to_le_bytes()); // instance count
    bytes.extend_from_slice(&instance_bytes);
    TreeIndex::load(&mut bytes.as_slice()).unwrap()
}

fn lod_test_terrain() -> Terrain {
    let mut terrain = terrain_from_toml(
        r#"
        parcel_size = 16
        max_height = 10.0
        bounds = { x = -2, y = -2, width = 4, height = 4 }

        [[tree_prototypes]]
        local_size = 2.0
        min_scale_xz = 1.0
        max_scale_xz = 1.0
        min_scale_y = 1.0
        max_scale_y = 1.0
        radius = 0.5
        lods = [{ min_screen_size = 0.5 }, { min_screen_size = 0.1 }]
        "#,
    );
    // One tree at the parcel's min corner, unscaled, unrotated.
    terrain.set_tree_index(single_tree_index([0, 0, 0, 0, 0, 0, 0, 0]));
    terrain
}

fn scatter_once(terrain: &Terrain, camera: Vec3) -> Vec<u32> {
    let view = terrain.view();
    let lods = tree_lod_thresholds(&terrain.tree_prototype_configs);
    let mut out = AppendBuffer::new(16);
    scatter_trees_parcel(
        &view,
        IVec2::new(0, 0),
        camera,
        &everything_frustum(),
        &lods,
        &out,
    );
    out.as_mut_slice().iter().map(|i| i.mesh_index).collect()
}

// Screen size 2.0 / 4.0 = 0.5 exactly equals LOD0's threshold: equality
// selects, it does not advance.
#[test]
fn lod_threshold_equality_selects() {
    let terrain = lod_test_terrain();
    assert_eq!(scatter_once(&terrain, Vec3::new(0.0, 0.0, 4.0)), vec![0]);
}

#[test]
fn lod_advances_below_threshold() {
    let terrain = lod_test_terrain();
    // Screen size 2/5 = 0.4 < 0.5, but >= 0.1: the second LOD draws.
    assert_eq!(scatter_once(&terrain, Vec3::new(0.0, 0.0, 5.0)), vec![1]);
}

#[test]
fn lod_exhaustion_culls_the_tree() {
    let terrain = lod_test_terrain();
    // Screen size 2/40 = 0.05 < every threshold.
    assert_eq!(scatter_once(&terrain, Vec3::new(0.0, 0.0, 40.0)), Vec::<u32>::new());
}

#[test]
fn occupied_parcel_scatters_nothing() {
    let mut terrain = terrain_from_toml(
        r#"
        parcel_size = 16
        max_height = 10.0
        bounds = { x = -2, y = -2, width = 4, height = 4 }

        [[detail_prototypes]]
        density = 0.25
        "#,
    );
    let mut data = vec![0u8; 16];
    data[2 * 4 + 2] = 255; // parcel (0, 0)
    terrain.set_occupancy_map(OccupancyMap::from_bytes(4, data));

    let view = terrain.view();
    let out = AppendBuffer::new(64);
    scatter_detail_parcel(
        &view,
        IVec2::new(0, 0),
        &everything_frustum(),
        &terrain.detail_prototypes,
        &out,
    );
    assert_eq!(out.produced(), 0);
}

#[test]
fn detail_skips_border_cells_next_to_occupied_neighbor() {
    let base = r#"
        parcel_size = 16
        max_height = 10.0
        bounds = { x = -2, y = -2, width = 4, height = 4 }

        [[detail_prototypes]]
        density = 0.25
    "#;

    // Free neighbors: the east column of cells scatters.
    let mut open = terrain_from_toml(base);
    open.set_occupancy_map(OccupancyMap::from_bytes(4, vec![0; 16]));
    let mut out_open = AppendBuffer::new(256);
    scatter_detail_parcel(
        &open.view(),
        IVec2::new(0, 0),
        &everything_frustum(),
        &open.detail_prototypes,
        &out_open,
    );
    // density 0.25 over a 16-unit parcel: 4x4 cells of 4 units each.
    assert_eq!(out_open.produced(), 16);
    assert!(out_open.as_slice().iter().any(|i| i.position.x >= 12.0));

    // Occupied east neighbor (parcel (1, 0) => byte (3, 2)): the shared
    // column is skipped.
    let mut walled = terrain_from_toml(base);
    let mut data = vec![0u8; 16];
    data[2 * 4 + 3] = 255;
    walled.set_occupancy_map(OccupancyMap::from_bytes(4, data));
    let mut out_walled = AppendBuffer::new(256);
    scatter_detail_parcel(
        &walled.view(),
        IVec2::new(0, 0),
        &everything_frustum(),
        &walled.detail_prototypes,
        &out_walled,
    );
    assert_eq!(out_walled.produced(), 12);
    assert!(out_walled.as_slice().iter().all(|i| i.position.x < 12.0));
}

#[test]
fn detail_scatter_is_deterministic() {
    let terrain = terrain_from_toml(
        r#"
        parcel_size = 16
        max_height = 10.0
        bounds = { x = -2, y = -2, width = 4, height = 4 }

        [[detail_prototypes]]
        density = 0.5
        min_scale_xz = 0.5
        max_scale_xz = 1.5

        [[detail_prototypes]]
        density = 0.25
        "#,
    );
    let view = terrain.view();
    let mut a = AppendBuffer::new(512);
    let mut b = AppendBuffer::new(512);
    for out in [&a, &b] {
        scatter_detail_parcel(
            &view,
            IVec2::new(-1, 1),
            &everything_frustum(),
            &terrain.detail_prototypes,
            out,
        );
    }
    assert!(a.produced() > 0);
    assert_eq!(a.as_slice(), b.as_slice());
}

// The parallel-for fan-out must not affect results: scattering a rect with
// 1 worker and with 8 workers yields the same multiset of instances.
#[test]
fn scatter_is_independent_of_worker_count() {
    let terrain = std::sync::Arc::new(terrain_from_toml(
        r#"
        parcel_size = 16
        max_height = 10.0
        bounds = { x = -4, y = -4, width = 8, height = 8 }

        [[detail_prototypes]]
        density = 0.25
        min_scale_y = 0.5
        max_scale_y = 1.5
        "#,
    ));
    let rect = terrain.bounds;

    let mut runs: Vec<Vec<veld_gen::ScatterInstance>> = Vec::new();
    for workers in [1usize, 8] {
        let jobs = JobSystem::new(workers);
        let out = std::sync::Arc::new(AppendBuffer::new(4096));
        let handle = {
            let terrain = std::sync::Arc::clone(&terrain);
            let out = std::sync::Arc::clone(&out);
            jobs.schedule_parallel(rect.area(), move |range| {
                let view = terrain.view();
                for index in range {
                    scatter_detail_parcel(
                        &view,
                        rect.parcel_at(index),
                        &everything_frustum(),
                        &terrain.detail_prototypes,
                        &out,
                    );
                }
            })
        };
        handle.complete();
        let mut out = std::sync::Arc::try_unwrap(out).ok().unwrap();
        let mut instances = out.as_mut_slice().to_vec();
        instances.sort_by(|a, b| {
            (a.position.x, a.position.z, a.scale_y)
                .partial_cmp(&(b.position.x, b.position.z, b.scale_y))
                .unwrap()
        });
        runs.push(instances);
    }

    assert!(!runs[0].is_empty());
    assert_eq!(runs[0], runs[1]);
}

#[test]
fn detail_overflow_aborts_parcel_but_counts() {
    let terrain = terrain_from_toml(
        r#"
        parcel_size = 16
        max_height = 10.0
        bounds = { x = -2, y = -2, width = 4, height = 4 }

        [[detail_prototypes]]
        density = 0.25
        "#,
    );
    let view = terrain.view();
    let out = AppendBuffer::new(3);
    scatter_detail_parcel(
        &view,
        IVec2::new(0, 0),
        &everything_frustum(),
        &terrain.detail_prototypes,
        &out,
    );
    // The failed append is counted, then the parcel stops placing.
    assert_eq!(out.produced(), 4);
    assert_eq!(out.len(), 3);
    assert!(out.overflowed());
}
