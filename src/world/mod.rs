//! # World Module
//!
//! Everything CPU-side about the voxel world: the packed voxel record, the
//! chunk cube and its mesh generator, the dense chunk storage grid, the LOD
//! controller, the picking ray, and the [`ChunkManager`](manager::ChunkManager)
//! facade the host talks to.

pub mod chunk;
pub mod lod;
pub mod manager;
pub mod meshing;
pub mod palette;
pub mod raycast;
pub mod storage;
pub mod voxel;

use cgmath::Point3;

/// Integer grid coordinates identifying one chunk.
///
/// Chunk `(0, 0, 0)` spans world blocks `[0, CHUNK_SIZE)` on every axis;
/// negative chunk coordinates address the negative half-spaces.
pub type ChunkKey = Point3<i32>;
