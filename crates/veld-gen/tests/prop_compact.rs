use glam::Vec3;
use proptest::prelude::*;
use veld_gen::{ScatterInstance, compact_instances};
use veld_jobs::AppendBuffer;

const MESH_COUNT: usize = 5;

fn arb_instance() -> impl Strategy<Value = ScatterInstance> {
    (
        0..MESH_COUNT as u32,
        -100f32..100.0,
        -100f32..100.0,
        0f32..360.0,
        0.1f32..3.0,
        0.1f32..3.0,
    )
        .prop_map(|(mesh_index, x, z, rot, sxz, sy)| ScatterInstance {
            mesh_index,
            // Tag the translation with the mesh index so the compacted
            // transform ranges can be checked for homogeneity.
            position: Vec3::new(mesh_index as f32 * 1000.0 + x, 0.0, z),
            rotation_y_deg: rot,
            scale_xz: sxz,
            scale_y: sy,
        })
}

proptest! {
    #[test]
    fn counts_sum_to_clamped_production(
        instances in prop::collection::vec(arb_instance(), 0..200),
        capacity in 1usize..150,
    ) {
        let buffer = AppendBuffer::new(capacity);
        for instance in &instances {
            buffer.push(*instance);
        }

        let compacted = compact_instances(buffer, MESH_COUNT);

        let stored = instances.len().min(capacity);
        prop_assert_eq!(compacted.produced, instances.len());
        let total: u32 = compacted.counts.iter().sum();
        prop_assert_eq!(total as usize, stored);
        prop_assert_eq!(compacted.transforms.len(), stored);
        prop_assert_eq!(compacted.overflowed(), instances.len() > capacity);
    }

    #[test]
    fn ranges_are_homogeneous_and_ordered(
        instances in prop::collection::vec(arb_instance(), 0..200),
    ) {
        let buffer = AppendBuffer::new(256);
        for instance in &instances {
            buffer.push(*instance);
        }

        let compacted = compact_instances(buffer, MESH_COUNT);

        for mesh_index in 0..MESH_COUNT {
            let (start, count) = compacted.range_of(mesh_index);
            for transform in &compacted.transforms[start..start + count] {
                let translation_x = transform.w_axis.x;
                let tagged_mesh = (translation_x / 1000.0).round().clamp(0.0, 10.0);
                // The tag is offset by at most 100 from the band center.
                prop_assert!(
                    (translation_x - tagged_mesh * 1000.0).abs() <= 100.0 + 1e-3
                );
                prop_assert_eq!(tagged_mesh as usize, mesh_index);
            }
        }
    }

    // The transform preserves position, rotation and composed scale.
    #[test]
    fn transforms_compose_trs(
        instance in arb_instance(),
    ) {
        let buffer = AppendBuffer::new(4);
        buffer.push(instance);
        let compacted = compact_instances(buffer, MESH_COUNT);
        let (scale, rotation, translation) =
            compacted.transforms[0].to_scale_rotation_translation();
        prop_assert!((translation - instance.position).length() < 1e-3);
        prop_assert!((scale.x - instance.scale_xz).abs() < 1e-3);
        prop_assert!((scale.y - instance.scale_y).abs() < 1e-3);
        prop_assert!((scale.z - instance.scale_xz).abs() < 1e-3);
        let expected =
            glam::Quat::from_rotation_y(instance.rotation_y_deg.to_radians());
        prop_assert!(rotation.angle_between(expected) < 1e-2);
    }
}
