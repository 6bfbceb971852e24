#![warn(missing_docs)]

//! # Voxel Engine Core
//!
//! The core of a real-time voxel world engine: chunked voxel storage,
//! concurrent greedy meshing with soft ambient occlusion, a distance-based
//! level-of-detail controller, sub-allocating GPU geometry pools with batched
//! staged uploads, and a per-chunk frustum-culled draw scheduler.
//!
//! ## Key Modules
//!
//! * `world` - Voxel data, chunks, the storage grid, LOD selection, picking
//!   rays, and the `ChunkManager` facade that ties the core together
//! * `mesher` - The lock-free priority work queue and the worker thread pool
//!   that generates terrain and chunk meshes off the main thread
//! * `rendering` - The packed vertex format, the free-list byte allocator,
//!   GPU geometry pools, the batched upload path, frustum culling, and the
//!   per-chunk draw loop
//!
//! ## Architecture
//!
//! The engine follows a strict per-frame data flow:
//! 1. The host calls [`ChunkManager::update_camera`], which re-evaluates LOD
//!    for every chunk and flushes changed chunks into the mesh worker
//! 2. Worker threads build greedy meshes from read-only chunk snapshots
//! 3. [`ChunkManager::rebuild_dirty_chunks`] drains completed meshes, drops
//!    stale results, re-allocates pool space, and commits one batched upload
//! 4. [`ChunkManager::render`] walks the per-chunk records, culls against the
//!    frustum, and issues one indexed draw per visible chunk
//!
//! Everything outside this flow - window and input plumbing, device and
//! swapchain creation, pipelines, shaders, textures, GUI - belongs to the
//! host. The core consumes `wgpu` device, queue, and render-pass handles and
//! a view-projection matrix; it never creates a surface or polls events.
//!
//! ## Usage
//!
//! ```no_run
//! use voxel_engine_core::{ChunkManager, EngineConfig, Frustum};
//! # fn host(device: &wgpu::Device, queue: &wgpu::Queue,
//! #         pass: &mut wgpu::RenderPass, view_proj: cgmath::Matrix4<f32>,
//! #         camera: cgmath::Point3<f32>, time: f32) {
//! let mut manager = ChunkManager::new(EngineConfig::default()).unwrap();
//! manager.generate_world(8, 8, 42);
//!
//! // Per frame:
//! manager.update_camera(camera);
//! manager.rebuild_dirty_chunks(device, queue, time).unwrap();
//! let frustum = Frustum::from_matrix(view_proj);
//! manager.render(pass, &frustum, time);
//! # }
//! ```
//!
//! ## Performance Considerations
//!
//! * Chunk meshes are greedy-merged, so vertex counts scale with visible
//!   surface complexity rather than voxel counts
//! * Meshing runs on a fixed pool of worker threads fed by bounded lock-free
//!   ring queues; the main thread never blocks on mesh generation
//! * All chunk geometry lives in a small number of large vertex/index buffer
//!   pairs, so the draw loop switches bindings only when crossing pools
//! * A whole frame's worth of mesh uploads is staged into one buffer pair
//!   and committed with a single queue submission

mod config;
mod error;
pub mod mesher;
pub mod rendering;
pub mod world;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use rendering::frustum::{Aabb, Frustum};
pub use rendering::geometry_manager::GeometryManager;
pub use rendering::vertex::VoxelVertex;
pub use world::chunk::{Chunk, ChunkState, SharedChunk, CHUNK_SIZE};
pub use world::manager::{ChunkManager, EngineStats};
pub use world::palette::{BlockInfo, BlockPalette};
pub use world::meshing::MeshData;
pub use world::raycast::RayHit;
pub use world::voxel::VoxelData;
