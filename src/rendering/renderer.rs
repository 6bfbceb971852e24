//! # Chunk Renderer Module
//!
//! This module owns the per-chunk GPU state: which mesh each chunk
//! currently has, which chunks are waiting to be re-meshed, and the draw
//! loop that turns the record table into indexed draw calls.
//!
//! ## Architecture
//!
//! The renderer sits between the mesh worker and the geometry manager:
//! - `mark_dirty` / `flush_dirty` collect edited or LOD-changed chunks into
//!   a deduplicated set and submit them as one high-priority batch
//! - `rebuild_dirty_chunks` drains finished tasks once per frame, drops
//!   results whose LOD is no longer wanted, swaps pool sub-allocations, and
//!   commits every surviving mesh in one batched upload
//! - `render` walks records in first-insertion order, culls each AABB
//!   against the frustum, and rebinds pool buffers only when the next
//!   visible chunk lives in a different pool
//!
//! ## Performance Considerations
//!
//! - Stale results cost only the wasted worker time; they never allocate
//!   pool space or upload
//! - A full re-mesh of a chunk frees the old sub-allocation before
//!   allocating the new one, so steady-state re-meshing cannot grow pools
//! - The draw loop's only per-chunk GPU traffic is a 16-byte push constant
//!   block and one `draw_indexed`

use std::collections::{HashMap, HashSet};

use log::{debug, warn};
use web_time::Instant;
use wgpu::{Device, Queue};

use crate::error::{EngineError, EngineResult};
use crate::mesher::{CompletedKind, CompletedTask, MeshTask, MeshWorker};
use crate::world::chunk::{SharedChunk, CHUNK_SIZE};
use crate::world::lod::LodController;
use crate::world::storage::ChunkStorage;
use crate::world::ChunkKey;

use super::frustum::{Aabb, Frustum};
use super::geometry_manager::{GeometryManager, Mesh, UploadRequest};
use super::vertex::{ChunkPushConstants, CHUNK_PUSH_CONSTANT_OFFSET};

/// GPU-side state for one chunk's current mesh.
pub struct ChunkRenderData {
    /// Draw handle into the owning pool.
    pub mesh: Mesh,
    /// Vertices the mesh was allocated with.
    pub vertex_count: u32,
    /// Indices the mesh was allocated with.
    pub index_count: u32,
    /// World-space bounds for frustum culling.
    pub aabb: Aabb,
    /// Time the mesh landed, for the fade-in blend.
    pub fade_start_time: f32,
}

/// Per-chunk mesh ownership, the dirty queue, and the draw loop.
pub struct ChunkRenderer {
    mesh_worker: MeshWorker,
    render_data: HashMap<ChunkKey, ChunkRenderData>,
    draw_order: Vec<ChunkKey>,
    ordered: HashSet<ChunkKey>,
    chunk_lod: HashMap<ChunkKey, u8>,
    dirty_pending: HashSet<ChunkKey>,
    fade_duration: f32,

    total_vertices: u64,
    total_indices: u64,
    visible_count: u32,
    culled_count: u32,
    visible_vertices: u64,
    last_rebuild_ms: f32,
}

impl ChunkRenderer {
    /// Creates the renderer and spawns its worker pool.
    ///
    /// # Arguments
    /// * `worker_threads` - `0` for one per hardware thread
    /// * `ring_capacity` - per-priority task queue capacity
    /// * `fade_duration` - seconds a fresh mesh takes to fade in
    pub fn new(worker_threads: usize, ring_capacity: usize, fade_duration: f32) -> Self {
        Self {
            mesh_worker: MeshWorker::new(worker_threads, ring_capacity),
            render_data: HashMap::new(),
            draw_order: Vec::new(),
            ordered: HashSet::new(),
            chunk_lod: HashMap::new(),
            dirty_pending: HashSet::new(),
            fade_duration: fade_duration.max(f32::EPSILON),
            total_vertices: 0,
            total_indices: 0,
            visible_count: 0,
            culled_count: 0,
            visible_vertices: 0,
            last_rebuild_ms: 0.0,
        }
    }

    /// Queues a chunk for re-meshing if it exists in storage. Deduplicated;
    /// nothing is submitted until [`flush_dirty`](Self::flush_dirty).
    pub fn mark_dirty(&mut self, storage: &ChunkStorage, key: ChunkKey) {
        if storage.get_chunk(key.x, key.y, key.z).is_some() {
            self.dirty_pending.insert(key);
        }
    }

    /// Submits every pending dirty chunk to the worker pool as one
    /// high-priority batch and clears the set.
    pub fn flush_dirty(&mut self, storage: &ChunkStorage, lod: &LodController) {
        if self.dirty_pending.is_empty() {
            return;
        }

        let keys: Vec<ChunkKey> = self.dirty_pending.drain().collect();
        let mut batch = Vec::with_capacity(keys.len());

        for key in keys {
            let Some(chunk) = storage.get_chunk(key.x, key.y, key.z) else {
                continue;
            };
            chunk.read().mark_dirty();

            let desired = lod.calculate_lod(key, self.chunk_lod.get(&key).copied());
            self.chunk_lod.insert(key, desired);

            let neighbors = [
                storage.get_chunk(key.x + 1, key.y, key.z).cloned(),
                storage.get_chunk(key.x - 1, key.y, key.z).cloned(),
                storage.get_chunk(key.x, key.y + 1, key.z).cloned(),
                storage.get_chunk(key.x, key.y - 1, key.z).cloned(),
                storage.get_chunk(key.x, key.y, key.z + 1).cloned(),
                storage.get_chunk(key.x, key.y, key.z - 1).cloned(),
            ];

            batch.push(MeshTask::Mesh {
                chunk: chunk.clone(),
                neighbors,
                key,
                lod: desired,
            });
        }

        self.mesh_worker.submit_batch_high(batch);
    }

    /// Submits a single high-priority terrain generation task.
    pub fn submit_generate_task_high(
        &mut self,
        chunk: SharedChunk,
        key: ChunkKey,
        seed: u32,
    ) {
        self.mesh_worker
            .submit_batch_high(vec![MeshTask::Generate { chunk, key, seed }]);
    }

    /// Drains finished worker tasks and commits surviving meshes.
    ///
    /// Stale results are dropped: a mesh whose LOD no longer matches the
    /// chunk's desired LOD, or any task whose chunk handle no longer
    /// matches the storage slot it was computed for. Finished generation
    /// tasks re-enter the dirty set, since their chunks now have voxels
    /// but no mesh. A mesh that fails pool allocation leaves its chunk
    /// dirty for a retry next frame. Everything that survives is committed
    /// with one batched upload after a device-idle wait.
    pub fn rebuild_dirty_chunks(
        &mut self,
        device: &Device,
        queue: &Queue,
        geometry: &GeometryManager,
        storage: &ChunkStorage,
        current_time: f32,
    ) -> EngineResult<()> {
        if self.mesh_worker.panicked() {
            return Err(EngineError::WorkerPanicked);
        }

        let started = Instant::now();
        let done = self.mesh_worker.collect();
        if done.is_empty() {
            return Ok(());
        }

        // Keep the freshest result per chunk. A result is stale if its LOD
        // no longer matches the chunk's desired LOD, or if the grid slot no
        // longer holds the chunk the task was computed from (removed, or
        // removed and re-created, while the task was in flight).
        let slot_matches = |task: &CompletedTask| {
            storage
                .get_chunk(task.key.x, task.key.y, task.key.z)
                .is_some_and(|current| current.is_same_chunk(&task.chunk))
        };
        let mut latest: HashMap<ChunkKey, CompletedTask> = HashMap::new();
        let mut stale_lod = 0usize;
        let mut replaced = 0usize;
        for task in done {
            if !slot_matches(&task) {
                replaced += 1;
                continue;
            }
            match task.kind {
                CompletedKind::Generate => {
                    self.dirty_pending.insert(task.key);
                }
                CompletedKind::Mesh => {
                    let desired = self.chunk_lod.get(&task.key).copied().unwrap_or(0);
                    if task.lod != desired {
                        stale_lod += 1;
                        continue;
                    }
                    latest.insert(task.key, task);
                }
            }
        }
        if stale_lod > 0 || replaced > 0 {
            debug!(
                "Dropped {stale_lod} stale-LOD and {replaced} replaced-chunk \
                 mesh results"
            );
        }

        let mut requests: Vec<UploadRequest> = Vec::with_capacity(latest.len());
        let mut batch_keys: Vec<ChunkKey> = Vec::with_capacity(latest.len());
        for (key, task) in latest {
            if let Some(old) = self.render_data.remove(&key) {
                self.total_vertices -= old.vertex_count as u64;
                self.total_indices -= old.index_count as u64;
                geometry.free_mesh(&old.mesh, old.vertex_count, old.index_count);
            }

            if task.result.is_empty() {
                if task.lod == 0 {
                    if let Some(chunk) = storage.get_chunk(key.x, key.y, key.z) {
                        chunk.read().mark_clean();
                    }
                }
                continue;
            }

            let vertex_count = task.result.vertices.len() as u32;
            let index_count = task.result.indices.len() as u32;

            let allocation = match geometry.allocate_mesh_raw(device, vertex_count, index_count)
            {
                Ok(allocation) => allocation,
                Err(EngineError::CapacityExceeded { vertex_bytes, index_bytes }) => {
                    warn!(
                        "Mesh for chunk ({}, {}, {}) exceeds pool capacity \
                         ({vertex_bytes} + {index_bytes} bytes); retrying next frame",
                        key.x, key.y, key.z
                    );
                    self.dirty_pending.insert(key);
                    continue;
                }
                Err(other) => return Err(other),
            };

            self.render_data.insert(
                key,
                ChunkRenderData {
                    mesh: allocation.mesh,
                    vertex_count,
                    index_count,
                    aabb: Aabb::chunk(key),
                    fade_start_time: current_time,
                },
            );
            if self.ordered.insert(key) {
                self.draw_order.push(key);
            }
            self.total_vertices += vertex_count as u64;
            self.total_indices += index_count as u64;

            requests.push(UploadRequest {
                pool_index: allocation.mesh.pool_index,
                vertex_dst_offset: allocation.vertex_offset_bytes,
                index_dst_offset: allocation.index_offset_bytes,
                vertices: task.result.vertices,
                indices: task.result.indices,
            });
            batch_keys.push(key);

            if let Some(chunk) = storage.get_chunk(key.x, key.y, key.z) {
                chunk.read().mark_clean();
            }
        }

        if !requests.is_empty() {
            // Freed ranges may still be read by in-flight frames; wait for
            // the device before overwriting pool contents.
            let _ = device.poll(wgpu::Maintain::Wait);
            if let Err(error) = geometry.execute_batch_upload(device, queue, &requests) {
                // The batch's records point at ranges that never received
                // their data; invalidate them and leave the chunks dirty
                // for a retry.
                for key in batch_keys {
                    if let Some(record) = self.render_data.remove(&key) {
                        self.total_vertices -= record.vertex_count as u64;
                        self.total_indices -= record.index_count as u64;
                        geometry.free_mesh(&record.mesh, record.vertex_count, record.index_count);
                    }
                    self.dirty_pending.insert(key);
                }
                return Err(error);
            }
        }

        self.last_rebuild_ms = started.elapsed().as_secs_f32() * 1000.0;
        Ok(())
    }

    /// Issues one indexed draw per visible chunk.
    ///
    /// Records are walked in first-insertion order; the pool binding is
    /// switched only when the next visible chunk lives in a different
    /// pool. Each draw pushes the chunk's world origin and fade progress.
    pub fn render(
        &mut self,
        pass: &mut wgpu::RenderPass<'_>,
        geometry: &GeometryManager,
        frustum: &Frustum,
        current_time: f32,
    ) {
        let mut visible_count = 0u32;
        let mut culled_count = 0u32;
        let mut visible_vertices = 0u64;
        let mut bound_pool: Option<u32> = None;

        for key in &self.draw_order {
            let Some(record) = self.render_data.get(key) else {
                continue;
            };

            if !frustum.is_visible(&record.aabb) {
                culled_count += 1;
                continue;
            }

            if bound_pool != Some(record.mesh.pool_index) {
                geometry.bind_pool(pass, record.mesh.pool_index);
                bound_pool = Some(record.mesh.pool_index);
            }

            let push = ChunkPushConstants {
                origin: [
                    (key.x * CHUNK_SIZE) as f32,
                    (key.y * CHUNK_SIZE) as f32,
                    (key.z * CHUNK_SIZE) as f32,
                ],
                fade_progress: ((current_time - record.fade_start_time) / self.fade_duration)
                    .clamp(0.0, 1.0),
            };
            pass.set_push_constants(
                wgpu::ShaderStages::VERTEX_FRAGMENT,
                CHUNK_PUSH_CONSTANT_OFFSET,
                bytemuck::bytes_of(&push),
            );

            pass.draw_indexed(
                record.mesh.first_index..record.mesh.first_index + record.mesh.index_count,
                record.mesh.vertex_offset,
                0..1,
            );
            visible_count += 1;
            visible_vertices += record.vertex_count as u64;
        }

        self.visible_count = visible_count;
        self.culled_count = culled_count;
        self.visible_vertices = visible_vertices;
    }

    /// Frees a chunk's sub-allocation and forgets all its state.
    pub fn remove_chunk(&mut self, geometry: &GeometryManager, key: ChunkKey) {
        if let Some(record) = self.render_data.remove(&key) {
            self.total_vertices -= record.vertex_count as u64;
            self.total_indices -= record.index_count as u64;
            geometry.free_mesh(&record.mesh, record.vertex_count, record.index_count);
        }
        if self.ordered.remove(&key) {
            self.draw_order.retain(|k| *k != key);
        }
        self.chunk_lod.remove(&key);
        self.dirty_pending.remove(&key);
    }

    /// Drains the worker pool and forgets every record and statistic.
    /// Pool allocations are NOT returned; the caller resets the geometry
    /// manager alongside this.
    pub fn clear(&mut self) {
        self.mesh_worker.wait_all();
        let _ = self.mesh_worker.collect();
        self.render_data.clear();
        self.draw_order.clear();
        self.ordered.clear();
        self.chunk_lod.clear();
        self.dirty_pending.clear();
        self.total_vertices = 0;
        self.total_indices = 0;
        self.visible_count = 0;
        self.culled_count = 0;
        self.visible_vertices = 0;
    }

    /// Records the desired LOD for a chunk.
    pub fn set_lod(&mut self, key: ChunkKey, lod: u8) {
        self.chunk_lod.insert(key, lod);
    }

    /// The chunk's recorded LOD, if one was ever assigned.
    pub fn get_lod(&self, key: ChunkKey) -> Option<u8> {
        self.chunk_lod.get(&key).copied()
    }

    /// Chunk counts per LOD level.
    pub fn lod_counts(&self) -> [u32; 3] {
        let mut counts = [0u32; 3];
        for lod in self.chunk_lod.values() {
            if (*lod as usize) < 3 {
                counts[*lod as usize] += 1;
            }
        }
        counts
    }

    /// `true` once any chunk has an uploaded mesh.
    pub fn has_mesh(&self) -> bool {
        !self.render_data.is_empty()
    }

    /// Marks every recorded chunk dirty again, for a full re-mesh after a
    /// geometry reset.
    pub fn mark_all_dirty(&mut self, storage: &ChunkStorage) {
        let keys: Vec<ChunkKey> = self.render_data.keys().copied().collect();
        self.render_data.clear();
        self.total_vertices = 0;
        self.total_indices = 0;
        for key in keys {
            self.mark_dirty(storage, key);
        }
    }

    /// Tasks submitted to the worker pool but not yet drained.
    pub fn pending_meshes(&self) -> usize {
        self.mesh_worker.active_tasks()
    }

    /// Worker threads in the meshing pool.
    pub fn worker_threads(&self) -> usize {
        self.mesh_worker.thread_count()
    }

    /// Chunks drawn by the last `render` call.
    pub fn visible_count(&self) -> u32 {
        self.visible_count
    }

    /// Chunks culled by the last `render` call.
    pub fn culled_count(&self) -> u32 {
        self.culled_count
    }

    /// Vertices drawn by the last `render` call.
    pub fn visible_vertices(&self) -> u64 {
        self.visible_vertices
    }

    /// Vertices resident across all chunk meshes.
    pub fn total_vertices(&self) -> u64 {
        self.total_vertices
    }

    /// Indices resident across all chunk meshes.
    pub fn total_indices(&self) -> u64 {
        self.total_indices
    }

    /// Milliseconds the last drain-and-upload pass took.
    pub fn last_rebuild_ms(&self) -> f32 {
        self.last_rebuild_ms
    }

    /// Chunk keys currently queued for re-meshing.
    pub fn dirty_pending(&self) -> &HashSet<ChunkKey> {
        &self.dirty_pending
    }

    #[cfg(test)]
    pub(crate) fn worker_mut(&mut self) -> &mut MeshWorker {
        &mut self.mesh_worker
    }
}
