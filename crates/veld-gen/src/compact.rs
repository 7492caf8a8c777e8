use glam::{Mat4, Quat, Vec3};
use veld_jobs::AppendBuffer;

use crate::ScatterInstance;

/// Instances grouped for drawing: `transforms` is sorted by mesh index, and
/// `counts[m]` is the length of mesh `m`'s contiguous sub-range. The writer
/// comes back with the result so the frame driver can reuse or grow it.
pub struct CompactedInstances {
    pub counts: Vec<u32>,
    pub transforms: Vec<Mat4>,
    /// Appends attempted by the producers, including dropped ones.
    pub produced: usize,
    pub buffer: AppendBuffer<ScatterInstance>,
}

impl CompactedInstances {
    pub fn empty(mesh_count: usize, buffer: AppendBuffer<ScatterInstance>) -> Self {
        Self {
            counts: vec![0; mesh_count],
            transforms: Vec::new(),
            produced: 0,
            buffer,
        }
    }

    #[inline]
    pub fn overflowed(&self) -> bool {
        self.produced > self.buffer.capacity()
    }

    /// Start offset and count of one mesh's sub-range.
    pub fn range_of(&self, mesh_index: usize) -> (usize, usize) {
        let start: u32 = self.counts[..mesh_index].iter().sum();
        (start as usize, self.counts[mesh_index] as usize)
    }
}

/// Clamp the produced instances to capacity, sort by mesh index, and expand
/// into per-mesh counted transform ranges. Runs as the job dependent on its
/// scatterer (or inline after single-threaded generation).
pub fn compact_instances(
    mut buffer: AppendBuffer<ScatterInstance>,
    mesh_count: usize,
) -> CompactedInstances {
    let produced = buffer.produced();
    let instances = buffer.as_mut_slice();

    let mut counts = vec![0u32; mesh_count];
    let mut transforms = Vec::with_capacity(instances.len());

    // Parallel writers may race past capacity; everything stored is valid,
    // order is meaningless until this sort.
    instances.sort_unstable_by_key(|i| i.mesh_index);

    for instance in instances.iter() {
        counts[instance.mesh_index as usize] += 1;
        transforms.push(Mat4::from_scale_rotation_translation(
            Vec3::new(instance.scale_xz, instance.scale_y, instance.scale_xz),
            Quat::from_rotation_y(instance.rotation_y_deg.to_radians()),
            instance.position,
        ));
    }

    CompactedInstances {
        counts,
        transforms,
        produced,
        buffer,
    }
}
