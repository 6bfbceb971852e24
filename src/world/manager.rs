//! # Chunk Manager Module
//!
//! The facade the host application talks to. `ChunkManager` composes the
//! storage grid, the LOD controller, the geometry manager, and the chunk
//! renderer, and sequences them through the per-frame flow: camera update,
//! worker drain and upload, then draw.
//!
//! The facade reads no input and draws no UI; it is a pure function of the
//! calls the host makes and the handles the host passes in.

use cgmath::Point3;
use log::info;
use wgpu::{Device, Queue};

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::rendering::frustum::Frustum;
use crate::rendering::geometry_manager::GeometryManager;
use crate::rendering::renderer::ChunkRenderer;
use crate::world::raycast::{self, RayHit};

use super::chunk::CHUNK_SIZE;
use super::lod::LodController;
use super::palette::BlockPalette;
use super::storage::{split_world_coord, ChunkStorage};
use super::voxel::VoxelData;
use super::ChunkKey;

/// When the camera is within this many blocks of its chunk's floor, the
/// chunk below is prefetched so a descending player never sees a hole open
/// beneath them.
const VERTICAL_STREAM_MARGIN: f32 = 4.0;

/// A snapshot of the engine's statistics counters.
#[derive(Clone, Copy, Debug, Default)]
pub struct EngineStats {
    /// Loaded chunks.
    pub chunk_count: usize,
    /// Chunks drawn last frame.
    pub visible_count: u32,
    /// Chunks frustum-culled last frame.
    pub culled_count: u32,
    /// Vertices resident in pools.
    pub total_vertices: u64,
    /// Indices resident in pools.
    pub total_indices: u64,
    /// Vertices drawn last frame.
    pub visible_vertices: u64,
    /// Mesh/generate tasks in flight.
    pub pending_meshes: usize,
    /// Chunk counts per LOD level.
    pub lod_counts: [u32; 3],
    /// World-space origin of the chunk grid's minimum corner.
    pub world_origin: [f32; 3],
    /// Worker threads meshing in the background.
    pub worker_threads: usize,
    /// Geometry pools created so far.
    pub pool_count: usize,
    /// Milliseconds the last drain-and-upload pass took.
    pub last_rebuild_ms: f32,
}

/// Facade over chunk storage, LOD selection, meshing, and drawing.
pub struct ChunkManager {
    storage: ChunkStorage,
    lod: LodController,
    geometry: GeometryManager,
    renderer: ChunkRenderer,
    palette: BlockPalette,
    seed: u32,
}

impl ChunkManager {
    /// Builds the engine core from a validated configuration, with the
    /// built-in terrain block palette.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        Self::with_palette(config, BlockPalette::with_defaults())
    }

    /// Builds the engine core with a caller-supplied block palette.
    pub fn with_palette(config: EngineConfig, palette: BlockPalette) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            storage: ChunkStorage::new(),
            lod: LodController::new(&config),
            geometry: GeometryManager::new(&config),
            renderer: ChunkRenderer::new(
                config.max_worker_threads,
                config.ring_capacity,
                config.fade_duration,
            ),
            palette,
            seed: 0,
        })
    }

    /// Rebuilds the world: drains in-flight work, regenerates terrain, and
    /// queues every chunk for meshing at its initial LOD.
    pub fn generate_world(&mut self, radius_x: i32, radius_z: i32, seed: u32) {
        info!("Generating world: radius ({radius_x}, {radius_z}), seed {seed}");
        self.seed = seed;

        self.renderer.clear();
        self.geometry.reset();
        self.storage.generate_world(radius_x, radius_z, seed);

        for &key in self.storage.active_keys() {
            let lod = self.lod.calculate_lod(key, None);
            self.renderer.set_lod(key, lod);
            self.renderer.mark_dirty(&self.storage, key);
        }
        self.renderer.flush_dirty(&self.storage, &self.lod);
    }

    /// Per-frame camera update: re-evaluates LOD for every chunk, marks
    /// changes dirty, prefetches the chunk below a descending camera, and
    /// flushes the dirty set to the workers.
    ///
    /// Call before [`rebuild_dirty_chunks`](Self::rebuild_dirty_chunks).
    pub fn update_camera(&mut self, pos: Point3<f32>) {
        self.lod.set_camera_position(pos);

        for &key in self.storage.active_keys() {
            let old = self.renderer.get_lod(key);
            let new = self.lod.calculate_lod(key, old);
            if old != Some(new) {
                // Record the LOD before marking dirty so the flush builds
                // the task against the value hysteresis chose.
                self.renderer.set_lod(key, new);
                self.renderer.mark_dirty(&self.storage, key);
            }
        }

        let (camera_cx, _) = split_world_coord(pos.x.floor() as i32);
        let (camera_cy, _) = split_world_coord(pos.y.floor() as i32);
        let (camera_cz, _) = split_world_coord(pos.z.floor() as i32);
        if pos.y - ((camera_cy * CHUNK_SIZE) as f32) < VERTICAL_STREAM_MARGIN {
            self.storage.create_chunk_if_missing(
                ChunkKey::new(camera_cx, camera_cy - 1, camera_cz),
                self.seed,
                &mut self.renderer,
            );
        }

        self.renderer.flush_dirty(&self.storage, &self.lod);
    }

    /// Drains completed worker tasks and commits surviving meshes in one
    /// batched upload. Non-blocking aside from the upload's device wait.
    pub fn rebuild_dirty_chunks(
        &mut self,
        device: &Device,
        queue: &Queue,
        current_time: f32,
    ) -> EngineResult<()> {
        self.renderer.rebuild_dirty_chunks(
            device,
            queue,
            &self.geometry,
            &self.storage,
            current_time,
        )
    }

    /// Draws every visible chunk into the host's active render pass.
    pub fn render(
        &mut self,
        pass: &mut wgpu::RenderPass<'_>,
        frustum: &Frustum,
        current_time: f32,
    ) {
        self.renderer
            .render(pass, &self.geometry, frustum, current_time);
    }

    /// Reads a voxel by world coordinates; air outside the loaded world.
    pub fn get_voxel(&self, wx: i32, wy: i32, wz: i32) -> VoxelData {
        self.storage.get_voxel(wx, wy, wz)
    }

    /// Writes a voxel and queues the owning chunk for re-meshing, plus
    /// each face neighbor the edit touches, so adjacent chunks re-expose
    /// their border faces correctly. A no-op outside the loaded world.
    ///
    /// Nothing is submitted until [`flush_dirty`](Self::flush_dirty) (or
    /// the next camera update).
    pub fn set_voxel(&mut self, wx: i32, wy: i32, wz: i32, voxel: VoxelData) {
        if !self.storage.set_voxel(wx, wy, wz, voxel) {
            return;
        }

        let (cx, lx) = split_world_coord(wx);
        let (cy, ly) = split_world_coord(wy);
        let (cz, lz) = split_world_coord(wz);
        self.renderer.mark_dirty(&self.storage, ChunkKey::new(cx, cy, cz));

        if lx == 0 {
            self.renderer.mark_dirty(&self.storage, ChunkKey::new(cx - 1, cy, cz));
        }
        if lx == CHUNK_SIZE - 1 {
            self.renderer.mark_dirty(&self.storage, ChunkKey::new(cx + 1, cy, cz));
        }
        if ly == 0 {
            self.renderer.mark_dirty(&self.storage, ChunkKey::new(cx, cy - 1, cz));
        }
        if ly == CHUNK_SIZE - 1 {
            self.renderer.mark_dirty(&self.storage, ChunkKey::new(cx, cy + 1, cz));
        }
        if lz == 0 {
            self.renderer.mark_dirty(&self.storage, ChunkKey::new(cx, cy, cz - 1));
        }
        if lz == CHUNK_SIZE - 1 {
            self.renderer.mark_dirty(&self.storage, ChunkKey::new(cx, cy, cz + 1));
        }
    }

    /// Submits all pending dirty chunks to the workers as one batch.
    pub fn flush_dirty(&mut self) {
        self.renderer.flush_dirty(&self.storage, &self.lod);
    }

    /// Places a full-health block of a registered palette type.
    ///
    /// # Returns
    /// `false` if the palette index is unregistered or the position lies
    /// outside the loaded world.
    pub fn place_block(&mut self, wx: i32, wy: i32, wz: i32, palette_index: u16) -> bool {
        let Some(voxel) = self.palette.make_voxel(palette_index) else {
            return false;
        };
        let (cx, _) = split_world_coord(wx);
        let (cy, _) = split_world_coord(wy);
        let (cz, _) = split_world_coord(wz);
        if self.storage.get_chunk(cx, cy, cz).is_none() {
            return false;
        }
        self.set_voxel(wx, wy, wz, voxel);
        true
    }

    /// Applies one hit of damage to the voxel at world coordinates.
    ///
    /// The hit strength comes from the block type's durability; a voxel
    /// whose health reaches zero breaks into air (queueing the usual
    /// re-mesh fan-out). Health-only changes do not touch the mesh, so
    /// they skip the dirty queue.
    ///
    /// # Returns
    /// `true` if this hit broke the voxel.
    pub fn damage_voxel(&mut self, wx: i32, wy: i32, wz: i32) -> bool {
        let voxel = self.storage.get_voxel(wx, wy, wz);
        if !voxel.is_solid() {
            return false;
        }

        let durability = self
            .palette
            .get(voxel.palette_index())
            .map(|info| info.durability.max(1))
            .unwrap_or(1);
        let hit = 255u8.div_ceil(durability);

        let health = voxel.health().saturating_sub(hit);
        if health == 0 {
            self.set_voxel(wx, wy, wz, VoxelData::AIR);
            return true;
        }

        let mut damaged = voxel;
        damaged.set_health(health);
        self.storage.set_voxel(wx, wy, wz, damaged);
        false
    }

    /// The block palette voxels are constructed from.
    pub fn palette(&self) -> &BlockPalette {
        &self.palette
    }

    /// Mutable access to the block palette, for host-side registration.
    pub fn palette_mut(&mut self) -> &mut BlockPalette {
        &mut self.palette
    }

    /// Casts a picking ray against the voxel world.
    pub fn raycast(
        &self,
        origin: Point3<f32>,
        dir: cgmath::Vector3<f32>,
        max_dist: f32,
    ) -> Option<RayHit> {
        raycast::raycast(&self.storage, origin, dir, max_dist)
    }

    /// Unloads one chunk: frees its mesh sub-allocation, forgets its
    /// render state, and clears its storage slot. Any in-flight task
    /// holding the chunk keeps the voxel data alive until it finishes; its
    /// result is discarded at drain time because the task's chunk handle
    /// no longer matches the slot.
    pub fn remove_chunk(&mut self, key: ChunkKey) {
        self.renderer.remove_chunk(&self.geometry, key);
        self.storage.remove_chunk(key);
    }

    /// Empties every geometry pool and queues all chunks for re-mesh and
    /// re-upload. The caller guarantees the GPU is idle.
    pub fn reset_geometry(&mut self) {
        self.geometry.reset();
        self.renderer.mark_all_dirty(&self.storage);
        self.renderer.flush_dirty(&self.storage, &self.lod);
    }

    /// Current statistics snapshot.
    pub fn stats(&self) -> EngineStats {
        let origin = self.storage.world_origin();
        EngineStats {
            chunk_count: self.storage.chunk_count(),
            visible_count: self.renderer.visible_count(),
            culled_count: self.renderer.culled_count(),
            total_vertices: self.renderer.total_vertices(),
            total_indices: self.renderer.total_indices(),
            visible_vertices: self.renderer.visible_vertices(),
            pending_meshes: self.renderer.pending_meshes(),
            lod_counts: self.renderer.lod_counts(),
            world_origin: [origin.x, origin.y, origin.z],
            worker_threads: self.renderer.worker_threads(),
            pool_count: self.geometry.pool_count(),
            last_rebuild_ms: self.renderer.last_rebuild_ms(),
        }
    }

    /// Read access to the chunk storage grid.
    pub fn storage(&self) -> &ChunkStorage {
        &self.storage
    }

    /// Read access to the renderer's bookkeeping.
    pub fn renderer(&self) -> &ChunkRenderer {
        &self.renderer
    }

    /// Read access to the geometry pools.
    pub fn geometry(&self) -> &GeometryManager {
        &self.geometry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::voxel::PALETTE_STONE;

    fn manager_with_world() -> ChunkManager {
        let mut manager = ChunkManager::new(EngineConfig::default()).unwrap();
        manager.generate_world(1, 1, 42);
        manager
    }

    #[test]
    fn test_generate_world_queues_every_chunk() {
        let manager = manager_with_world();
        let stats = manager.stats();
        assert!(stats.chunk_count > 0);
        assert_eq!(stats.lod_counts.iter().sum::<u32>() as usize, stats.chunk_count);
        assert_eq!(stats.world_origin, [-32.0, -256.0, -32.0]);
    }

    #[test]
    fn test_boundary_edit_dirties_both_chunks() {
        let mut manager = manager_with_world();
        // Let the initial meshing land so the dirty set starts empty.
        manager.renderer.clear();

        // Edit on the +X border of chunk (0, 0, 0).
        manager.set_voxel(CHUNK_SIZE - 1, 10, 5, VoxelData::AIR);
        let dirty = manager.renderer().dirty_pending();
        assert!(dirty.contains(&ChunkKey::new(0, 0, 0)));
        assert!(dirty.contains(&ChunkKey::new(1, 0, 0)));
        assert_eq!(dirty.len(), 2);
    }

    #[test]
    fn test_corner_edit_dirties_three_neighbors() {
        let mut manager = manager_with_world();
        manager.renderer.clear();

        manager.set_voxel(0, 10, 0, VoxelData::solid(PALETTE_STONE));
        let dirty = manager.renderer().dirty_pending();
        assert!(dirty.contains(&ChunkKey::new(0, 0, 0)));
        assert!(dirty.contains(&ChunkKey::new(-1, 0, 0)));
        assert!(dirty.contains(&ChunkKey::new(0, 0, -1)));
        // y = 10 is not on a Y boundary, so no vertical neighbor joins.
        assert_eq!(dirty.len(), 3);
    }

    #[test]
    fn test_interior_edit_dirties_one_chunk() {
        let mut manager = manager_with_world();
        manager.renderer.clear();

        manager.set_voxel(10, 10, 10, VoxelData::AIR);
        assert_eq!(manager.renderer().dirty_pending().len(), 1);
    }

    #[test]
    fn test_edit_outside_world_is_noop() {
        let mut manager = manager_with_world();
        manager.renderer.clear();

        manager.set_voxel(10_000, 0, 0, VoxelData::solid(PALETTE_STONE));
        assert!(manager.renderer().dirty_pending().is_empty());
        assert!(manager.get_voxel(10_000, 0, 0).is_air());
    }

    #[test]
    fn test_camera_move_across_lod_boundary_marks_dirty() {
        let mut manager = manager_with_world();
        manager.update_camera(Point3::new(0.0, 16.0, 0.0));
        manager.renderer.clear();

        // Jump far away: every chunk's LOD coarsens and re-queues.
        manager.update_camera(Point3::new(2000.0, 16.0, 0.0));
        // flush_dirty ran inside update_camera, so the work is in flight
        // rather than pending.
        assert!(manager.stats().pending_meshes > 0 || manager.renderer().dirty_pending().is_empty());
        let stats = manager.stats();
        assert_eq!(stats.lod_counts[0], 0);
    }

    #[test]
    fn test_place_block_goes_through_the_palette() {
        let mut manager = manager_with_world();
        manager.renderer.clear();

        assert!(manager.place_block(3, 28, 3, PALETTE_STONE));
        let voxel = manager.get_voxel(3, 28, 3);
        assert!(voxel.is_solid());
        assert_eq!(voxel.palette_index(), PALETTE_STONE);
        assert_eq!(manager.renderer().dirty_pending().len(), 1);

        // Unregistered types and unloaded positions refuse.
        assert!(!manager.place_block(3, 28, 3, 999));
        assert!(!manager.place_block(10_000, 28, 3, PALETTE_STONE));
    }

    #[test]
    fn test_damage_breaks_block_after_enough_hits() {
        let mut manager = manager_with_world();
        assert!(manager.place_block(3, 28, 3, PALETTE_STONE));
        manager.renderer.clear();

        // Stone durability is 8: seven hits crack, the eighth breaks.
        for _ in 0..7 {
            assert!(!manager.damage_voxel(3, 28, 3));
            assert!(manager.get_voxel(3, 28, 3).is_solid());
        }
        // Cracking alone must not queue re-meshes.
        assert!(manager.renderer().dirty_pending().is_empty());

        assert!(manager.damage_voxel(3, 28, 3));
        assert!(manager.get_voxel(3, 28, 3).is_air());
        assert_eq!(manager.renderer().dirty_pending().len(), 1);

        // Hitting air does nothing.
        assert!(!manager.damage_voxel(3, 28, 3));
    }

    #[test]
    fn test_picking_round_trip() {
        let mut manager = manager_with_world();
        // Clear the column so the placed block is the first solid hit.
        for y in 0..CHUNK_SIZE {
            manager.set_voxel(5, y, 5, VoxelData::AIR);
        }
        let target = Point3::new(5, 20, 5);
        manager.set_voxel(target.x, target.y, target.z, VoxelData::solid(PALETTE_STONE));

        let hit = manager
            .raycast(
                Point3::new(5.5, 50.0, 5.5),
                cgmath::Vector3::new(0.0, -1.0, 0.0),
                32.0,
            )
            .expect("must hit the placed block");
        assert_eq!(hit.voxel, target);
        assert_eq!(hit.normal, cgmath::Vector3::new(0, 1, 0));
        assert!(manager.get_voxel(hit.voxel.x, hit.voxel.y, hit.voxel.z).is_solid());
    }
}
