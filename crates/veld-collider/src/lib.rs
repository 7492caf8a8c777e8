//! Incremental pooled parcel colliders driven by observer positions.
#![forbid(unsafe_code)]

mod pool;

pub use pool::InstancePool;

use glam::{IVec2, Vec2, Vec3};
use veld_geom::ParcelRect;
use veld_jobs::JobSystem;
use veld_world::TerrainView;

/// Handle to one parcel's collider object plus its dynamic mesh, issued by
/// the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileHandle(pub u64);

/// Handle to one pooled tree collider instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TreeColliderHandle(pub u64);

/// Engine boundary for collision state. The cache decides *what* to build
/// and when; the backend owns meshes, bakes, and collider objects.
pub trait ColliderBackend {
    /// Create a collider + dynamic mesh pair with a fixed index buffer and
    /// `side_vertex_count^2` vertices.
    fn create_tile(&mut self, side_vertex_count: usize, indices: &[u16]) -> TileHandle;
    /// Move a tile to a parcel's world origin.
    fn set_tile_origin(&mut self, tile: TileHandle, origin: Vec3);
    /// Upload one tile's regenerated vertex grid.
    fn upload_vertices(&mut self, tile: TileHandle, vertices: &[Vec3]);
    /// Bake every listed mesh in one batch (fast-midphase cooking).
    fn bake_tiles(&mut self, tiles: &[TileHandle]);
    /// Reassign the baked mesh to its collider. Required even when the mesh
    /// reference is unchanged, so the collider notices the new bake.
    fn assign_baked_mesh(&mut self, tile: TileHandle);

    fn spawn_tree_collider(&mut self, prototype: usize) -> TreeColliderHandle;
    fn place_tree_collider(
        &mut self,
        handle: TreeColliderHandle,
        position: Vec3,
        rotation_y_deg: f32,
        scale_xz: f32,
        scale_y: f32,
    );
    /// Deactivate a tree collider returned to its pool.
    fn park_tree_collider(&mut self, handle: TreeColliderHandle);
}

/// One parcel's cached collider state.
pub struct ColliderTile {
    pub parcel: IVec2,
    pub handle: TileHandle,
    dirty: bool,
    trees: Vec<(usize, TreeColliderHandle)>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ColliderStats {
    pub used: usize,
    pub free: usize,
    pub baked_this_tick: usize,
}

/// The used/free/dirty tile cache, updated once per physics tick from the
/// set of observer positions. Tiles are never destroyed: eviction moves them
/// to the free list, reuse repurposes the most recently freed tile, and only
/// repurposed or brand-new tiles regenerate vertices and rebake.
pub struct ColliderSet<B: ColliderBackend> {
    backend: B,
    used: Vec<ColliderTile>,
    free: Vec<ColliderTile>,
    tree_pools: Vec<InstancePool<TreeColliderHandle>>,
    index_buffer: Vec<u16>,
    index_buffer_parcel_size: i32,
}

impl<B: ColliderBackend> ColliderSet<B> {
    pub fn new(backend: B, tree_prototype_count: usize) -> Self {
        Self {
            backend,
            used: Vec::new(),
            free: Vec::new(),
            tree_pools: (0..tree_prototype_count)
                .map(|_| InstancePool::new())
                .collect(),
            index_buffer: Vec::new(),
            index_buffer_parcel_size: 0,
        }
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn used_parcels(&self) -> impl Iterator<Item = IVec2> + '_ {
        self.used.iter().map(|t| t.parcel)
    }

    pub fn stats(&self) -> ColliderStats {
        ColliderStats {
            used: self.used.len(),
            free: self.free.len(),
            baked_this_tick: 0,
        }
    }

    /// One physics tick: activate tiles under every observer, evict tiles no
    /// observer needs, then regenerate and rebake whatever went dirty. Zero
    /// observers is a no-op.
    pub fn update(
        &mut self,
        view: &TerrainView<'_>,
        observers: &[Vec2],
        jobs: &JobSystem,
    ) -> ColliderStats {
        if observers.is_empty() {
            return self.stats();
        }

        let use_radius = view.parcel_size as f32 / 3.0;
        let used_rects: Vec<ParcelRect> = observers
            .iter()
            .map(|&observer| ParcelRect::around(observer, use_radius, view.parcel_size))
            .collect();

        // Swap-back eviction of tiles no observer needs: O(1) removal, order
        // not preserved. Freed tiles stay baked at the backend; the free
        // list only marks them repurposable.
        let mut i = self.used.len();
        while i > 0 {
            i -= 1;
            let parcel = self.used[i].parcel;
            if !used_rects.iter().any(|r| r.contains(parcel)) {
                let tile = self.used.swap_remove(i);
                self.free.push(tile);
            }
        }

        for used_rect in &used_rects {
            for parcel in used_rect.iter() {
                if self.used.iter().any(|t| t.parcel == parcel) {
                    continue;
                }
                self.activate(view, parcel);
            }
        }

        let baked = self.regenerate_dirty(view, jobs);
        ColliderStats {
            used: self.used.len(),
            free: self.free.len(),
            baked_this_tick: baked,
        }
    }

    fn activate(&mut self, view: &TerrainView<'_>, parcel: IVec2) {
        // Exact parcel already sitting in the free list: nothing to rebuild.
        if let Some(index) = self.free.iter().position(|t| t.parcel == parcel) {
            let tile = self.free.swap_remove(index);
            self.used.push(tile);
            return;
        }

        let origin = Vec3::new(
            (parcel.x * view.parcel_size) as f32,
            0.0,
            (parcel.y * view.parcel_size) as f32,
        );

        // Repurpose the most recently freed tile, or build a brand-new one.
        let mut tile = match self.free.pop() {
            Some(mut tile) => {
                tile.parcel = parcel;
                tile.dirty = true;
                for (prototype, handle) in tile.trees.drain(..) {
                    self.backend.park_tree_collider(handle);
                    self.tree_pools[prototype].release(handle);
                }
                tile
            }
            None => {
                if self.index_buffer_parcel_size != view.parcel_size {
                    self.index_buffer = build_index_buffer(view.parcel_size);
                    self.index_buffer_parcel_size = view.parcel_size;
                }
                let side_vertex_count = view.parcel_size as usize + 1;
                let handle = self
                    .backend
                    .create_tile(side_vertex_count, &self.index_buffer);
                log::debug!("allocated collider tile for parcel ({}, {})", parcel.x, parcel.y);
                ColliderTile {
                    parcel,
                    handle,
                    dirty: true,
                    trees: Vec::new(),
                }
            }
        };

        self.backend.set_tile_origin(tile.handle, origin);
        self.generate_trees(view, &mut tile);
        self.used.push(tile);
    }

    fn generate_trees(&mut self, view: &TerrainView<'_>, tile: &mut ColliderTile) {
        if view.is_occupied(tile.parcel) {
            return;
        }

        for &instance in view.tree_instances(tile.parcel) {
            let Some(placed) = view.try_generate_tree(tile.parcel, instance) else {
                continue;
            };
            let Some(pool) = self.tree_pools.get_mut(placed.prototype) else {
                continue;
            };
            let backend = &mut self.backend;
            let handle = pool.acquire(|| backend.spawn_tree_collider(placed.prototype));
            self.backend.place_tree_collider(
                handle,
                placed.position,
                placed.rotation_y_deg,
                placed.scale_xz,
                placed.scale_y,
            );
            tile.trees.push((placed.prototype, handle));
        }
    }

    /// Compute per-vertex heights for every dirty tile in one parallel pass,
    /// upload each grid, bake all dirty meshes in one batch, and reassign.
    fn regenerate_dirty(&mut self, view: &TerrainView<'_>, jobs: &JobSystem) -> usize {
        let dirty: Vec<usize> = (0..self.used.len())
            .filter(|&i| self.used[i].dirty)
            .collect();
        if dirty.is_empty() {
            return 0;
        }

        let side_vertex_count = view.parcel_size as usize + 1;
        let mesh_vertex_count = side_vertex_count * side_vertex_count;
        let parcels: Vec<IVec2> = dirty.iter().map(|&i| self.used[i].parcel).collect();

        let mut vertices = vec![Vec3::ZERO; mesh_vertex_count * dirty.len()];
        let parcel_size = view.parcel_size;
        jobs.run_parallel_chunks(&mut vertices, mesh_vertex_count, |tile_index, chunk| {
            let origin = parcels[tile_index] * parcel_size;
            for (vertex_index, vertex) in chunk.iter_mut().enumerate() {
                let x = (vertex_index % side_vertex_count) as f32;
                let z = (vertex_index / side_vertex_count) as f32;
                let y = view.height_at(x + origin.x as f32, z + origin.y as f32);
                *vertex = Vec3::new(x, y, z);
            }
        });

        for (chunk_index, &tile_index) in dirty.iter().enumerate() {
            let start = chunk_index * mesh_vertex_count;
            self.backend.upload_vertices(
                self.used[tile_index].handle,
                &vertices[start..start + mesh_vertex_count],
            );
        }

        let handles: Vec<TileHandle> = dirty.iter().map(|&i| self.used[i].handle).collect();
        self.backend.bake_tiles(&handles);

        for &tile_index in &dirty {
            self.backend.assign_baked_mesh(self.used[tile_index].handle);
            self.used[tile_index].dirty = false;
        }

        dirty.len()
    }
}

/// Two triangles per grid cell, vertices ordered row-major from the parcel's
/// min corner.
pub fn build_index_buffer(parcel_size: i32) -> Vec<u16> {
    debug_assert!((1..=255).contains(&parcel_size), "index buffer uses u16");
    let cells = parcel_size as usize;
    let side_vertex_count = cells + 1;
    let mut indices = Vec::with_capacity(cells * cells * 6);

    for z in 0..cells {
        for x in 0..cells {
            let start = z * side_vertex_count + x;
            indices.push(start as u16);
            indices.push((start + side_vertex_count + 1) as u16);
            indices.push((start + 1) as u16);

            indices.push(start as u16);
            indices.push((start + side_vertex_count) as u16);
            indices.push((start + side_vertex_count + 1) as u16);
        }
    }

    indices
}

/// Per-vertex normals for one tile's grid, central differences over the
/// height field. Only debug drawing wants these; the baked collision mesh
/// carries positions alone.
pub fn normal_grid(view: &TerrainView<'_>, parcel: IVec2) -> Vec<Vec3> {
    let side_vertex_count = view.parcel_size as usize + 1;
    let origin = parcel * view.parcel_size;
    let mut normals = Vec::with_capacity(side_vertex_count * side_vertex_count);
    for z in 0..side_vertex_count {
        for x in 0..side_vertex_count {
            normals.push(view.normal_at(origin.x as f32 + x as f32, origin.y as f32 + z as f32));
        }
    }
    normals
}
