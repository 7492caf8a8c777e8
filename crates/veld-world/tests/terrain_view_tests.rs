use glam::IVec2;
use veld_world::{OccupancyMap, Terrain, TerrainConfig, TreeIndex};

fn terrain_from_toml(toml_str: &str) -> Terrain {
    let cfg: TerrainConfig = toml::from_str(toml_str).unwrap();
    Terrain::from_config(&cfg, std::path::Path::new(".")).unwrap()
}

fn flat_4x4() -> Terrain {
    terrain_from_toml(
        r#"
        parcel_size = 16
        max_height = 10.0
        bounds = { x = -2, y = -2, width = 4, height = 4 }
        "#,
    )
}

#[test]
fn no_occupancy_map_means_flat_terrain() {
    let terrain = flat_4x4();
    let view = terrain.view();
    for z in -3..3 {
        for x in -3..3 {
            let h = view.height_at(x as f32 * 11.0, z as f32 * 7.0);
            assert_eq!(h, 0.0, "height at ({x}, {z})");
        }
    }
}

#[test]
fn occupancy_at_floor_is_exactly_zero() {
    let mut terrain = terrain_from_toml(
        r#"
        parcel_size = 16
        max_height = 10.0
        occupancy_floor = 173
        bounds = { x = -2, y = -2, width = 4, height = 4 }
        "#,
    );
    terrain.set_occupancy_map(OccupancyMap::from_bytes(4, vec![173; 16]));
    let view = terrain.view();
    assert_eq!(view.height_at(0.0, 0.0), 0.0);
    assert_eq!(view.height_at(5.0, -13.0), 0.0);
}

#[test]
fn full_occupancy_reaches_max_height_when_noise_is_silent() {
    let mut terrain = terrain_from_toml(
        r#"
        parcel_size = 16
        max_height = 10.0
        bounds = { x = -2, y = -2, width = 4, height = 4 }
        noise = { frequency = 0.02, amplitude = 0.0 }
        "#,
    );
    terrain.set_occupancy_map(OccupancyMap::from_bytes(4, vec![255; 16]));
    let view = terrain.view();
    let h = view.height_at(0.0, 0.0);
    assert!((h - 10.0).abs() < 1e-4, "{h}");
}

#[test]
fn noise_contribution_is_bounded_by_amplitude_near_full_occupancy() {
    let mut terrain = terrain_from_toml(
        r#"
        parcel_size = 16
        max_height = 10.0
        bounds = { x = -2, y = -2, width = 4, height = 4 }
        noise = { frequency = 0.05, amplitude = 1.5 }
        "#,
    );
    terrain.set_occupancy_map(OccupancyMap::from_bytes(4, vec![255; 16]));
    let view = terrain.view();
    for i in 0..32 {
        let x = i as f32 * 1.7 - 16.0;
        let h = view.height_at(x, -x * 0.5);
        assert!(h >= 10.0 - 1.5 - 1e-3 && h <= 10.0 + 1.5 + 1e-3, "{h}");
    }
}

#[test]
fn is_occupied_outside_bounds() {
    let mut terrain = flat_4x4();
    terrain.set_occupancy_map(OccupancyMap::from_bytes(4, vec![0; 16]));
    let view = terrain.view();
    assert!(!view.is_occupied(IVec2::new(0, 0)));
    assert!(view.is_occupied(IVec2::new(2, 0)), "outside bounds");
    assert!(view.is_occupied(IVec2::new(0, -3)), "outside bounds");
}

#[test]
fn is_occupied_reads_parcel_bytes() {
    let mut terrain = flat_4x4();
    let mut data = vec![0u8; 16];
    // Parcel (1, -2) maps to byte (3, 0) with a size-4 map.
    data[0 * 4 + 3] = 255;
    terrain.set_occupancy_map(OccupancyMap::from_bytes(4, data));
    let view = terrain.view();
    assert!(view.is_occupied(IVec2::new(1, -2)));
    assert!(!view.is_occupied(IVec2::new(0, 0)));
}

#[test]
fn without_map_nothing_is_occupied() {
    let terrain = flat_4x4();
    let view = terrain.view();
    assert!(!view.is_occupied(IVec2::new(0, 0)));
    assert!(!view.is_occupied(IVec2::new(100, 100)));
}

#[test]
fn tree_generation_dequantizes_into_parcel() {
    let mut terrain = terrain_from_toml(
        r#"
        parcel_size = 16
        max_height = 10.0
        bounds = { x = -2, y = -2, width = 4, height = 4 }

        [[tree_prototypes]]
        local_size = 2.0
        min_scale_xz = 0.5
        max_scale_xz = 1.5
        min_scale_y = 0.8
        max_scale_y = 1.2
        radius = 1.0
        lods = [{ min_screen_size = 0.5 }, { min_screen_size = 0.1 }]
        "#,
    );
    terrain.set_tree_index(TreeIndex::scatter(
        IVec2::new(-2, -2),
        IVec2::new(2, 2),
        1,
        3,
        1,
    ));
    let view = terrain.view();

    let mut seen = 0;
    for parcel in (-2..2).flat_map(|y| (-2..2).map(move |x| IVec2::new(x, y))) {
        for &instance in view.tree_instances(parcel) {
            let placed = view.try_generate_tree(parcel, instance).unwrap();
            seen += 1;
            let min_x = parcel.x as f32 * 16.0;
            let min_z = parcel.y as f32 * 16.0;
            assert!(placed.position.x >= min_x && placed.position.x <= min_x + 16.0);
            assert!(placed.position.z >= min_z && placed.position.z <= min_z + 16.0);
            assert_eq!(placed.position.y, 0.0, "flat terrain");
            assert!(placed.scale_xz >= 0.5 && placed.scale_xz <= 1.5);
            assert!(placed.scale_y >= 0.8 && placed.scale_y <= 1.2);
            assert!(placed.rotation_y_deg >= 0.0 && placed.rotation_y_deg < 360.1);
        }
    }
    assert!(seen > 0, "scatter produced no instances to check");
}

#[test]
fn tree_near_occupied_neighbor_is_rejected() {
    let mut terrain = terrain_from_toml(
        r#"
        parcel_size = 16
        max_height = 10.0
        bounds = { x = -2, y = -2, width = 4, height = 4 }

        [[tree_prototypes]]
        local_size = 2.0
        radius = 2.0
        lods = [{ min_screen_size = 0.1 }]
        "#,
    );
    // Occupy parcel (1, 0) => byte (3, 2).
    let mut data = vec![0u8; 16];
    data[2 * 4 + 3] = 255;
    terrain.set_occupancy_map(OccupancyMap::from_bytes(4, data));
    let view = terrain.view();

    let instance = |position_x: u8| veld_world::TreeInstance {
        prototype: 0,
        position_x,
        position_y: 0,
        position_z: 128,
        rotation_y: 0,
        scale_xz: 0,
        scale_y: 0,
    };

    // Trunk circle at the east edge of (0, 0) reaches into occupied (1, 0).
    assert!(view.try_generate_tree(IVec2::new(0, 0), instance(255)).is_none());
    // Center of the parcel stays clear of every neighbor.
    assert!(view.try_generate_tree(IVec2::new(0, 0), instance(128)).is_some());
    // Unknown prototype is rejected outright.
    let mut bad = instance(128);
    bad.prototype = 9;
    assert!(view.try_generate_tree(IVec2::new(0, 0), bad).is_none());
}

#[test]
fn bounds_overlap_is_inclusive_at_touch() {
    let terrain = flat_4x4();
    let view = terrain.view();
    let touching = veld_geom::ParcelRect::new(IVec2::new(2, -2), IVec2::new(3, -1));
    assert!(view.bounds_overlaps(&touching));
    let disjoint = veld_geom::ParcelRect::new(IVec2::new(4, 0), IVec2::new(6, 2));
    assert!(!view.bounds_overlaps(&disjoint));
}

#[test]
fn world_bounds_scale_with_parcel_size() {
    let terrain = flat_4x4();
    let view = terrain.view();
    let b = view.world_bounds();
    assert_eq!(b.min, glam::Vec3::new(-32.0, 0.0, -32.0));
    assert_eq!(b.max, glam::Vec3::new(32.0, 10.0, 32.0));
}

#[test]
fn capacity_hints_are_clamped_to_one() {
    let terrain = terrain_from_toml(
        r#"
        ground_instance_capacity = 0
        tree_instance_capacity = 0
        detail_instance_capacity = 0
        "#,
    );
    assert_eq!(terrain.ground_instance_capacity, 1);
    assert_eq!(terrain.tree_instance_capacity, 1);
    assert_eq!(terrain.detail_instance_capacity, 1);
}

#[test]
fn bounds_are_clamped_to_terrain_size_limit() {
    let terrain = terrain_from_toml(
        r#"
        bounds = { x = 0, y = 0, width = 100000, height = 3 }
        "#,
    );
    assert_eq!(terrain.bounds.width(), veld_world::TERRAIN_SIZE_LIMIT);
    assert_eq!(terrain.bounds.height(), 3);
}
