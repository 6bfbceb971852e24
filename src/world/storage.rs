//! # Chunk Storage Module
//!
//! This module provides `ChunkStorage`, the owner of every chunk in the
//! loaded world.
//!
//! ## Architecture
//!
//! Chunks live in a flat dense grid indexed by chunk coordinates over fixed
//! bounds chosen at world generation. Lookups are a bounds check plus an
//! array index, which matters because the mesher asks for six neighbors per
//! task and the facade walks every chunk each frame. Slots hold
//! [`SharedChunk`] handles, so a chunk stays alive for as long as any
//! in-flight task references it even if its slot is cleared.
//!
//! ## World Generation
//!
//! Generation first computes, per column, a conservative height envelope
//! from five noise samples (four corners and the center, widened by two
//! blocks), and only materializes the chunks whose Y range intersects it.
//! The surviving coordinates are then filled by one worker thread per
//! hardware thread, pulling task indices from a shared atomic counter and
//! publishing each finished chunk into its own pre-sized slot.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use cgmath::Point3;
use log::info;
use web_time::Instant;

use crate::rendering::renderer::ChunkRenderer;

use super::chunk::{Chunk, ChunkState, SharedChunk, TerrainNoise, CHUNK_SIZE};
use super::voxel::VoxelData;
use super::ChunkKey;

/// Lowest chunk layer of the generated world.
const WORLD_MIN_CY: i32 = -8;
/// Highest chunk layer of the generated world.
const WORLD_MAX_CY: i32 = 8;
/// Blocks of slack added around the sampled height envelope.
const ENVELOPE_MARGIN: i32 = 2;

/// Splits a world coordinate into chunk and local parts with floor
/// semantics, so negative coordinates map correctly: `-1` becomes chunk
/// `-1`, local `CHUNK_SIZE - 1`.
#[inline]
pub(crate) fn split_world_coord(w: i32) -> (i32, i32) {
    let c = w.div_euclid(CHUNK_SIZE);
    (c, w - c * CHUNK_SIZE)
}

/// Dense grid of chunk owners over fixed world bounds.
pub struct ChunkStorage {
    grid: Vec<Option<SharedChunk>>,
    active: Vec<ChunkKey>,
    min: Point3<i32>,
    max: Point3<i32>,
    width: i32,
    height: i32,
    depth: i32,
}

impl Default for ChunkStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkStorage {
    /// Creates empty storage with no bounds; `generate_world` sizes it.
    pub fn new() -> Self {
        Self {
            grid: Vec::new(),
            active: Vec::new(),
            min: Point3::new(0, 0, 0),
            max: Point3::new(-1, -1, -1),
            width: 0,
            height: 0,
            depth: 0,
        }
    }

    /// Flat grid index for chunk coordinates, or `None` outside bounds.
    fn grid_index(&self, cx: i32, cy: i32, cz: i32) -> Option<usize> {
        if cx < self.min.x
            || cx > self.max.x
            || cy < self.min.y
            || cy > self.max.y
            || cz < self.min.z
            || cz > self.max.z
        {
            return None;
        }
        let x = cx - self.min.x;
        let y = cy - self.min.y;
        let z = cz - self.min.z;
        Some((x + y * self.width + z * self.width * self.height) as usize)
    }

    /// Rebuilds the world grid and fills terrain in parallel.
    ///
    /// Any previous contents are discarded; the caller drains in-flight
    /// mesh tasks first so no worker still references the old chunks.
    ///
    /// # Arguments
    /// * `radius_x` / `radius_z` - horizontal half-extent in chunks; the
    ///   grid spans `[-radius, radius]` inclusive
    /// * `seed` - world seed for the terrain heightmap
    pub fn generate_world(&mut self, radius_x: i32, radius_z: i32, seed: u32) {
        self.clear();

        self.min = Point3::new(-radius_x, WORLD_MIN_CY, -radius_z);
        self.max = Point3::new(radius_x, WORLD_MAX_CY, radius_z);
        self.width = self.max.x - self.min.x + 1;
        self.height = self.max.y - self.min.y + 1;
        self.depth = self.max.z - self.min.z + 1;
        self.grid = vec![None; (self.width * self.height * self.depth) as usize];

        let started = Instant::now();

        // Column envelope pre-pass: keep only chunks that can intersect the
        // terrain surface.
        let noise = TerrainNoise::new(seed);
        let mut tasks: Vec<(ChunkKey, usize)> = Vec::new();
        for cz in -radius_z..=radius_z {
            for cx in -radius_x..=radius_x {
                let base_x = cx * CHUNK_SIZE;
                let base_z = cz * CHUNK_SIZE;
                let samples = [
                    (base_x, base_z),
                    (base_x + CHUNK_SIZE - 1, base_z),
                    (base_x, base_z + CHUNK_SIZE - 1),
                    (base_x + CHUNK_SIZE - 1, base_z + CHUNK_SIZE - 1),
                    (base_x + CHUNK_SIZE / 2, base_z + CHUNK_SIZE / 2),
                ];

                let mut min_height = i32::MAX;
                let mut max_height = i32::MIN;
                for (wx, wz) in samples {
                    let h = noise.height(wx, wz);
                    min_height = min_height.min(h - ENVELOPE_MARGIN);
                    max_height = max_height.max(h + ENVELOPE_MARGIN);
                }

                let min_cy = min_height.div_euclid(CHUNK_SIZE);
                let max_cy = max_height.div_euclid(CHUNK_SIZE);

                for cy in self.min.y..=self.max.y {
                    if cy < min_cy || cy > max_cy {
                        continue;
                    }
                    if let Some(index) = self.grid_index(cx, cy, cz) {
                        tasks.push((Point3::new(cx, cy, cz), index));
                    }
                }
            }
        }

        // Parallel fill: worker threads pull task indices from a shared
        // counter and publish into disjoint slots.
        let results: Vec<OnceLock<SharedChunk>> =
            (0..tasks.len()).map(|_| OnceLock::new()).collect();
        let cursor = AtomicUsize::new(0);
        let thread_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        std::thread::scope(|scope| {
            for _ in 0..thread_count {
                scope.spawn(|| {
                    let noise = TerrainNoise::new(seed);
                    loop {
                        let task_index = cursor.fetch_add(1, Ordering::Relaxed);
                        let Some((key, _)) = tasks.get(task_index) else {
                            break;
                        };
                        let mut chunk = Chunk::new(*key);
                        chunk.fill_terrain_with(&noise);
                        chunk.set_state(ChunkState::Ready);
                        let _ = results[task_index].set(SharedChunk::new(chunk));
                    }
                });
            }
        });

        self.active.reserve(tasks.len());
        for ((key, grid_index), cell) in tasks.iter().zip(results) {
            let chunk = cell.into_inner().expect("every generation task publishes");
            self.grid[*grid_index] = Some(chunk);
            self.active.push(*key);
        }

        let elapsed = started.elapsed();
        let voxels = self.active.len() as u64 * (CHUNK_SIZE as u64).pow(3);
        info!(
            "Generated {} chunks ({}x{} columns) with {} threads in {:.1?} \
             ({:.1}M voxels/s)",
            self.active.len(),
            self.width,
            self.depth,
            thread_count,
            elapsed,
            voxels as f64 / elapsed.as_secs_f64().max(1e-6) / 1e6,
        );
    }

    /// Drops every chunk and the grid itself. The caller guarantees no
    /// worker still holds mesh tasks for the old world.
    pub fn clear(&mut self) {
        self.grid.clear();
        self.active.clear();
        self.width = 0;
        self.height = 0;
        self.depth = 0;
    }

    /// Looks up the chunk at grid coordinates.
    pub fn get_chunk(&self, cx: i32, cy: i32, cz: i32) -> Option<&SharedChunk> {
        let index = self.grid_index(cx, cy, cz)?;
        self.grid[index].as_ref()
    }

    /// Removes the chunk at `key` from the grid and the active list.
    ///
    /// In-flight tasks holding the chunk keep it alive; the slot simply
    /// stops resolving.
    pub fn remove_chunk(&mut self, key: ChunkKey) {
        if let Some(index) = self.grid_index(key.x, key.y, key.z) {
            if self.grid[index].take().is_some() {
                self.active.retain(|k| *k != key);
            }
        }
    }

    /// Creates an empty chunk at `key` if the slot is vacant and submits a
    /// high-priority generation task for it.
    ///
    /// Out-of-bounds keys are ignored.
    pub fn create_chunk_if_missing(
        &mut self,
        key: ChunkKey,
        seed: u32,
        renderer: &mut ChunkRenderer,
    ) {
        let Some(index) = self.grid_index(key.x, key.y, key.z) else {
            return;
        };
        if self.grid[index].is_some() {
            return;
        }

        let chunk = Chunk::new(key);
        if chunk.try_begin_generating() {
            let handle = SharedChunk::new(chunk);
            self.grid[index] = Some(handle.clone());
            self.active.push(key);
            renderer.submit_generate_task_high(handle, key, seed);
        }
    }

    /// Reads the voxel at world coordinates; air outside loaded chunks.
    pub fn get_voxel(&self, wx: i32, wy: i32, wz: i32) -> VoxelData {
        let (cx, lx) = split_world_coord(wx);
        let (cy, ly) = split_world_coord(wy);
        let (cz, lz) = split_world_coord(wz);

        match self.get_chunk(cx, cy, cz) {
            Some(chunk) => chunk.read().get_voxel(lx, ly, lz),
            None => VoxelData::AIR,
        }
    }

    /// Writes the voxel at world coordinates.
    ///
    /// # Returns
    /// `false` if the position is outside the loaded world (the write is a
    /// no-op there).
    pub fn set_voxel(&self, wx: i32, wy: i32, wz: i32, voxel: VoxelData) -> bool {
        let (cx, lx) = split_world_coord(wx);
        let (cy, ly) = split_world_coord(wy);
        let (cz, lz) = split_world_coord(wz);

        match self.get_chunk(cx, cy, cz) {
            Some(chunk) => {
                chunk.write().set_voxel(lx, ly, lz, voxel);
                true
            }
            None => false,
        }
    }

    /// Keys of every loaded chunk, in generation order.
    pub fn active_keys(&self) -> &[ChunkKey] {
        &self.active
    }

    /// Number of loaded chunks.
    pub fn chunk_count(&self) -> usize {
        self.active.len()
    }

    /// World-space position of the grid's minimum corner, in blocks.
    pub fn world_origin(&self) -> Point3<f32> {
        Point3::new(
            (self.min.x * CHUNK_SIZE) as f32,
            (self.min.y * CHUNK_SIZE) as f32,
            (self.min.z * CHUNK_SIZE) as f32,
        )
    }
}
