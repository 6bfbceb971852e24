//! # Rendering Module
//!
//! The GPU-facing half of the engine: the packed vertex format, free-list
//! sub-allocation over pooled vertex/index buffers, the batched staging
//! upload path, frustum culling, and the per-chunk draw scheduler.
//!
//! Everything here consumes host-provided `wgpu` handles; nothing creates
//! surfaces, pipelines, or shaders.

pub mod block_allocator;
pub mod frustum;
pub mod geometry_manager;
pub mod geometry_pool;
pub mod renderer;
pub mod vertex;
