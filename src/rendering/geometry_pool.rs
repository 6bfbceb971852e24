//! # Geometry Pool Module
//!
//! One GPU-resident vertex buffer and one index buffer, each fronted by a
//! free-list [`BlockAllocator`](super::block_allocator::BlockAllocator).
//! Pools are the unit of binding in the draw loop: every chunk mesh lives
//! entirely inside one pool, so consecutive visible chunks in the same pool
//! draw without rebinding anything.

use log::info;
use wgpu::{Buffer, BufferUsages, Device};

use super::block_allocator::{allocate_paired, BlockAllocator};

/// A paired vertex+index buffer with its own sub-allocation bookkeeping.
pub struct GeometryPool {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    vertex_alloc: BlockAllocator,
    index_alloc: BlockAllocator,
}

impl GeometryPool {
    /// Creates the GPU buffers for one pool.
    ///
    /// # Arguments
    /// * `device` - host-provided GPU device
    /// * `pool_index` - position in the owning manager's pool list, used for
    ///   buffer labels
    /// * `vertex_capacity` - vertex buffer size in bytes
    /// * `index_capacity` - index buffer size in bytes
    /// * `align` - sub-allocation alignment in bytes
    pub fn new(
        device: &Device,
        pool_index: usize,
        vertex_capacity: u64,
        index_capacity: u64,
        align: u64,
    ) -> Self {
        let vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("geometry pool {pool_index} vertices")),
            size: vertex_capacity,
            usage: BufferUsages::VERTEX | BufferUsages::STORAGE | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let index_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("geometry pool {pool_index} indices")),
            size: index_capacity,
            usage: BufferUsages::INDEX | BufferUsages::STORAGE | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        info!(
            "Created geometry pool {pool_index}: {} MiB vertices, {} MiB indices",
            vertex_capacity / (1024 * 1024),
            index_capacity / (1024 * 1024)
        );

        Self {
            vertex_buffer,
            index_buffer,
            vertex_alloc: BlockAllocator::new(vertex_capacity, align),
            index_alloc: BlockAllocator::new(index_capacity, align),
        }
    }

    /// Reserves byte ranges for one mesh in both buffers.
    ///
    /// Allocation is atomic across the pair: if the index side fails the
    /// vertex reservation is rolled back.
    ///
    /// # Returns
    /// `Some((vertex_offset, index_offset))` in bytes, or `None` if this
    /// pool cannot hold the mesh.
    pub fn allocate(&mut self, vertex_bytes: u64, index_bytes: u64) -> Option<(u64, u64)> {
        allocate_paired(
            &mut self.vertex_alloc,
            &mut self.index_alloc,
            vertex_bytes,
            index_bytes,
        )
    }

    /// Returns a mesh's byte ranges to both free lists.
    pub fn free(
        &mut self,
        vertex_offset: u64,
        vertex_bytes: u64,
        index_offset: u64,
        index_bytes: u64,
    ) {
        self.vertex_alloc.free(vertex_offset, vertex_bytes);
        self.index_alloc.free(index_offset, index_bytes);
    }

    /// Empties both allocators. The caller guarantees the GPU no longer
    /// reads any range of this pool.
    pub fn reset(&mut self) {
        let vertex_capacity = self.vertex_alloc.capacity();
        let index_capacity = self.index_alloc.capacity();
        self.vertex_alloc.reset(vertex_capacity);
        self.index_alloc.reset(index_capacity);
    }

    /// The pool's GPU vertex buffer.
    pub fn vertex_buffer(&self) -> &Buffer {
        &self.vertex_buffer
    }

    /// The pool's GPU index buffer.
    pub fn index_buffer(&self) -> &Buffer {
        &self.index_buffer
    }

    /// Bytes currently allocated out of the vertex buffer.
    pub fn vertex_bytes_in_use(&self) -> u64 {
        self.vertex_alloc.allocated_bytes()
    }

    /// Bytes currently allocated out of the index buffer.
    pub fn index_bytes_in_use(&self) -> u64 {
        self.index_alloc.allocated_bytes()
    }
}
