//! Per-frame terrain render orchestration: frustum build, job scheduling,
//! capacity growth, and grouped instanced draw submission.
#![forbid(unsafe_code)]

use std::sync::Arc;

use crossbeam_channel::bounded;
use glam::{Mat4, Vec2, Vec3};
use veld_gen::{
    CompactedInstances, GroundStats, ScatterInstance, compact_instances, generate_ground,
    scatter_detail_parcel, scatter_trees_parcel, tree_lod_thresholds,
};
use veld_geom::{ClipVolume, ParcelRect};
use veld_jobs::{AppendBuffer, JobSystem};
use veld_world::{GroundMesh, Terrain};

/// Growth applied to a capacity hint after an overflowed frame.
const CAPACITY_GROWTH: f32 = 1.1;

/// Which mesh a draw call refers to; the backend resolves it to its own
/// mesh and material assets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeshRef {
    Ground(usize),
    Tree { prototype: usize, lod: usize },
    Detail { prototype: usize },
}

/// Ground-only material overrides, set once before the ground draws.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroundMaterialParams {
    pub has_occupancy_map: bool,
    pub inv_parcel_size: f32,
    /// (min x, max x, min z, max z) in world units.
    pub bounds: [f32; 4],
}

/// The "draw many instances" boundary with the rendering back end.
pub trait DrawBackend {
    fn set_ground_material(&mut self, params: &GroundMaterialParams);
    fn draw_instanced(&mut self, mesh: MeshRef, submesh: usize, transforms: &[Mat4]);
}

/// Per-frame camera input from the rendering front end.
#[derive(Clone, Copy, Debug)]
pub struct FrameCamera {
    pub position: Vec3,
    pub view: Mat4,
    pub fov_y_deg: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RenderStats {
    pub ground_instances: usize,
    pub tree_instances: usize,
    pub detail_instances: usize,
    pub draw_groups: usize,
    pub ground_rings: u32,
    pub skipped: bool,
}

struct InstanceCategory {
    label: &'static str,
    capacity_hint: usize,
    buffer: Option<AppendBuffer<ScatterInstance>>,
}

impl InstanceCategory {
    fn new(label: &'static str) -> Self {
        Self {
            label,
            capacity_hint: 0,
            buffer: None,
        }
    }

    /// Buffer for this frame, sized to the current hint.
    fn take_buffer(&mut self, config_capacity: usize) -> AppendBuffer<ScatterInstance> {
        self.capacity_hint = self.capacity_hint.max(config_capacity);
        match self.buffer.take() {
            Some(mut buffer) => {
                if buffer.capacity() != self.capacity_hint {
                    buffer.reset_with_capacity(self.capacity_hint);
                } else {
                    buffer.clear();
                }
                buffer
            }
            None => AppendBuffer::new(self.capacity_hint),
        }
    }

    /// Store the writer back, growing the hint when this frame overflowed.
    fn retire(&mut self, compacted: &CompactedInstances) {
        if compacted.overflowed() {
            self.capacity_hint =
                ((self.capacity_hint as f32 * CAPACITY_GROWTH).ceil() as usize)
                    .max(self.capacity_hint + 1);
            log::warn!(
                "The {} list ran out of space. Increasing capacity to {}.",
                self.label,
                self.capacity_hint
            );
        }
    }
}

/// Frame driver for the terrain. Holds the reusable instance writers and the
/// capacity hints that grow across frames; everything else is rebuilt per
/// frame and dropped on every exit path.
pub struct TerrainRenderer {
    enabled: bool,
    ground: InstanceCategory,
    trees: InstanceCategory,
    detail: InstanceCategory,
}

impl TerrainRenderer {
    pub fn new() -> Self {
        Self {
            enabled: true,
            ground: InstanceCategory::new("ground transforms"),
            trees: InstanceCategory::new("tree instances"),
            detail: InstanceCategory::new("detail instances"),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Render one frame. A missing terrain config disables the renderer
    /// (with an error) until a config shows up again; every other failure is
    /// frame-local: skip, truncate, or early-exit, never panic.
    pub fn render(
        &mut self,
        terrain: Option<&Arc<Terrain>>,
        camera: &FrameCamera,
        jobs: &JobSystem,
        backend: &mut dyn DrawBackend,
    ) -> RenderStats {
        let mut stats = RenderStats {
            skipped: true,
            ..RenderStats::default()
        };

        let Some(terrain) = terrain else {
            if self.enabled {
                log::error!("Terrain data is not set up properly");
                self.enabled = false;
            }
            return stats;
        };
        if !self.enabled {
            log::info!("terrain configuration restored; re-enabling renderer");
            self.enabled = true;
        }

        let render_ground = terrain.render_ground;
        let render_trees = terrain.render_trees && !terrain.tree_prototypes().is_empty();
        let render_detail = terrain.render_detail && !terrain.detail_prototypes.is_empty();
        if !render_ground && !render_trees && !render_detail {
            return stats;
        }

        // Below the ground plane nothing of the terrain is visible.
        if camera.position.y < 0.0 {
            return stats;
        }

        let proj = Mat4::perspective_rh_gl(
            camera.fov_y_deg.to_radians(),
            camera.aspect,
            camera.near,
            camera.far.min(terrain.detail_distance),
        );
        let frustum = ClipVolume::new(proj * camera.view);

        let world_bounds = terrain.view().world_bounds();
        if !frustum.overlaps(&world_bounds) {
            return stats;
        }

        stats.skipped = false;

        let scatter_rect = ParcelRect::from_world_span(
            Vec2::new(frustum.bounds.min.x, frustum.bounds.min.z),
            Vec2::new(frustum.bounds.max.x, frustum.bounds.max.z),
            terrain.parcel_size,
        )
        .clamp_to(&terrain.bounds);

        // Ground: one single-threaded job that generates and compacts.
        let ground_rx = render_ground.then(|| {
            let buffer = self.ground.take_buffer(terrain.ground_instance_capacity);
            let (tx, rx) = bounded::<(GroundStats, CompactedInstances)>(1);
            let terrain = Arc::clone(terrain);
            let camera_position = camera.position;
            let handle = jobs.schedule(move || {
                let view = terrain.view();
                let ground_stats = generate_ground(&view, camera_position, &frustum, &buffer);
                let compacted = compact_instances(buffer, GroundMesh::COUNT);
                let _ = tx.send((ground_stats, compacted));
            });
            (handle, rx)
        });

        // Trees: parallel-for over the scatter rect, then a dependent
        // compaction job.
        let tree_rx = render_trees.then(|| {
            let buffer = Arc::new(self.trees.take_buffer(terrain.tree_instance_capacity));
            let lods = Arc::new(tree_lod_thresholds(&terrain.tree_prototype_configs));
            let mesh_count = terrain.tree_mesh_count();
            let (tx, rx) = bounded::<CompactedInstances>(1);

            let scatter = {
                let buffer = Arc::clone(&buffer);
                let terrain = Arc::clone(terrain);
                let lods = Arc::clone(&lods);
                let camera_position = camera.position;
                let rect = scatter_rect;
                jobs.schedule_parallel(rect.area(), move |range| {
                    let view = terrain.view();
                    for index in range {
                        scatter_trees_parcel(
                            &view,
                            rect.parcel_at(index),
                            camera_position,
                            &frustum,
                            &lods,
                            &buffer,
                        );
                    }
                })
            };

            let compaction = jobs.schedule_after(&scatter, move || {
                let Ok(buffer) = Arc::try_unwrap(buffer) else {
                    unreachable!("scatter batches release the writer before compaction");
                };
                let _ = tx.send(compact_instances(buffer, mesh_count));
            });
            (scatter, compaction, rx)
        });

        // Detail: same shape as trees.
        let detail_rx = render_detail.then(|| {
            let buffer = Arc::new(self.detail.take_buffer(terrain.detail_instance_capacity));
            let mesh_count = terrain.detail_prototypes.len();
            let (tx, rx) = bounded::<CompactedInstances>(1);

            let scatter = {
                let buffer = Arc::clone(&buffer);
                let terrain = Arc::clone(terrain);
                let rect = scatter_rect;
                jobs.schedule_parallel(rect.area(), move |range| {
                    let view = terrain.view();
                    let prototypes = &terrain.detail_prototypes;
                    for index in range {
                        scatter_detail_parcel(
                            &view,
                            rect.parcel_at(index),
                            &frustum,
                            prototypes,
                            &buffer,
                        );
                    }
                })
            };

            let compaction = jobs.schedule_after(&scatter, move || {
                let Ok(buffer) = Arc::try_unwrap(buffer) else {
                    unreachable!("scatter batches release the writer before compaction");
                };
                let _ = tx.send(compact_instances(buffer, mesh_count));
            });
            (scatter, compaction, rx)
        });

        if let Some((handle, rx)) = ground_rx {
            handle.complete();
            if let Ok((ground_stats, compacted)) = rx.recv() {
                stats.ground_instances = compacted.transforms.len();
                stats.ground_rings = ground_stats.rings;
                self.ground.retire(&compacted);
                stats.draw_groups += draw_ground(terrain, backend, &compacted);
                self.ground.buffer = Some(compacted.buffer);
            }
        }

        if let Some((scatter, compaction, rx)) = tree_rx {
            scatter.complete();
            compaction.complete();
            if let Ok(compacted) = rx.recv() {
                stats.tree_instances = compacted.transforms.len();
                self.trees.retire(&compacted);
                stats.draw_groups += draw_trees(terrain, backend, &compacted);
                self.trees.buffer = Some(compacted.buffer);
            }
        }

        if let Some((scatter, compaction, rx)) = detail_rx {
            scatter.complete();
            compaction.complete();
            if let Ok(compacted) = rx.recv() {
                stats.detail_instances = compacted.transforms.len();
                self.detail.retire(&compacted);
                stats.draw_groups += draw_detail(terrain, backend, &compacted);
                self.detail.buffer = Some(compacted.buffer);
            }
        }

        stats
    }
}

impl Default for TerrainRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn draw_ground(
    terrain: &Terrain,
    backend: &mut dyn DrawBackend,
    compacted: &CompactedInstances,
) -> usize {
    if compacted.transforms.is_empty() {
        return 0;
    }

    let world_min = terrain.bounds.min * terrain.parcel_size;
    let world_max = terrain.bounds.max * terrain.parcel_size;
    backend.set_ground_material(&GroundMaterialParams {
        has_occupancy_map: terrain.occupancy_map().is_some(),
        inv_parcel_size: 1.0 / terrain.parcel_size as f32,
        bounds: [
            world_min.x as f32,
            world_max.x as f32,
            world_min.y as f32,
            world_max.y as f32,
        ],
    });

    let mut groups = 0;
    let mut start = 0usize;
    for mesh_index in 0..GroundMesh::COUNT {
        let count = compacted.counts[mesh_index] as usize;
        if count > 0 {
            backend.draw_instanced(
                MeshRef::Ground(mesh_index),
                0,
                &compacted.transforms[start..start + count],
            );
            groups += 1;
        }
        start += count;
    }
    groups
}

fn draw_trees(
    terrain: &Terrain,
    backend: &mut dyn DrawBackend,
    compacted: &CompactedInstances,
) -> usize {
    if compacted.transforms.is_empty() {
        return 0;
    }

    let mut groups = 0;
    let mut mesh_index = 0usize;
    let mut start = 0usize;
    for (prototype, config) in terrain.tree_prototype_configs.iter().enumerate() {
        for (lod, lod_config) in config.lods.iter().enumerate() {
            let count = compacted.counts[mesh_index] as usize;
            mesh_index += 1;
            if count == 0 {
                continue;
            }
            for submesh in 0..lod_config.submesh_count {
                backend.draw_instanced(
                    MeshRef::Tree { prototype, lod },
                    submesh,
                    &compacted.transforms[start..start + count],
                );
                groups += 1;
            }
            start += count;
        }
    }
    groups
}

fn draw_detail(
    terrain: &Terrain,
    backend: &mut dyn DrawBackend,
    compacted: &CompactedInstances,
) -> usize {
    if compacted.transforms.is_empty() {
        return 0;
    }

    let mut groups = 0;
    let mut start = 0usize;
    for prototype in 0..terrain.detail_prototypes.len() {
        let count = compacted.counts[prototype] as usize;
        if count > 0 {
            backend.draw_instanced(
                MeshRef::Detail { prototype },
                0,
                &compacted.transforms[start..start + count],
            );
            groups += 1;
        }
        start += count;
    }
    groups
}
