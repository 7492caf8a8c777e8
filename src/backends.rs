use glam::{Mat4, Vec3};
use veld_collider::{ColliderBackend, TileHandle, TreeColliderHandle};
use veld_render::{DrawBackend, GroundMaterialParams, MeshRef};

/// Draw backend that tallies submissions instead of talking to a GPU.
#[derive(Default)]
pub struct StatsDrawBackend {
    pub draw_calls: usize,
    pub instances: usize,
    pub ground_material_sets: usize,
}

impl DrawBackend for StatsDrawBackend {
    fn set_ground_material(&mut self, params: &GroundMaterialParams) {
        self.ground_material_sets += 1;
        log::trace!(
            "ground material: occupancy={} inv_parcel_size={} bounds={:?}",
            params.has_occupancy_map,
            params.inv_parcel_size,
            params.bounds
        );
    }

    fn draw_instanced(&mut self, mesh: MeshRef, submesh: usize, transforms: &[Mat4]) {
        self.draw_calls += 1;
        self.instances += transforms.len();
        log::trace!("draw {mesh:?} submesh {submesh}: {} instances", transforms.len());
    }
}

/// Collider backend that issues sequential handles and tracks lifecycle
/// counts; stands in for the physics engine.
#[derive(Default)]
pub struct StatsColliderBackend {
    next_handle: u64,
    pub tiles_created: usize,
    pub vertex_uploads: usize,
    pub bake_batches: usize,
    pub meshes_baked: usize,
    pub mesh_assigns: usize,
    pub tree_colliders_spawned: usize,
}

impl ColliderBackend for StatsColliderBackend {
    fn create_tile(&mut self, _side_vertex_count: usize, _indices: &[u16]) -> TileHandle {
        self.tiles_created += 1;
        self.next_handle += 1;
        TileHandle(self.next_handle)
    }

    fn set_tile_origin(&mut self, _tile: TileHandle, _origin: Vec3) {}

    fn upload_vertices(&mut self, _tile: TileHandle, _vertices: &[Vec3]) {
        self.vertex_uploads += 1;
    }

    fn bake_tiles(&mut self, tiles: &[TileHandle]) {
        self.bake_batches += 1;
        self.meshes_baked += tiles.len();
    }

    fn assign_baked_mesh(&mut self, _tile: TileHandle) {
        self.mesh_assigns += 1;
    }

    fn spawn_tree_collider(&mut self, _prototype: usize) -> TreeColliderHandle {
        self.tree_colliders_spawned += 1;
        self.next_handle += 1;
        TreeColliderHandle(self.next_handle)
    }

    fn place_tree_collider(
        &mut self,
        _handle: TreeColliderHandle,
        _position: Vec3,
        _rotation_y_deg: f32,
        _scale_xz: f32,
        _scale_y: f32,
    ) {
    }

    fn park_tree_collider(&mut self, _handle: TreeColliderHandle) {}
}
