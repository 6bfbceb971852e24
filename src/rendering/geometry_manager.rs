//! # Geometry Manager Module
//!
//! This module provides the central owner of all GPU chunk geometry: an
//! ordered list of [`GeometryPool`]s, paired sub-allocation across them, and
//! the batched staging upload that commits a whole frame's worth of mesh
//! data with a single queue submission.
//!
//! ## Architecture
//!
//! The manager guards its pool list with one mutex; every allocate, free,
//! upload, bind, and reset takes it. Pools are created on demand: when no
//! existing pool can hold a mesh, a fresh pool is appended and the
//! allocation retried there. Allocation failure after that means the mesh
//! is larger than an empty pool and is surfaced as
//! [`EngineError::CapacityExceeded`].
//!
//! ## Upload Batching
//!
//! Every drained mesh produces its own copy, but the whole drain coalesces
//! into ONE staging vertex buffer, ONE staging index buffer, one copy
//! command per destination range, and one submission. The layout of that
//! work is computed by [`UploadPlan::build`], which is pure bookkeeping and
//! independently testable; executing the plan is the only part that touches
//! the GPU. This amortizes the backend's hazard tracking across the batch
//! and bounds the stall to a single transfer wait per frame.

use std::sync::Mutex;

use log::{debug, warn};
use wgpu::{Device, Queue};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

use super::geometry_pool::GeometryPool;
use super::vertex::VoxelVertex;

/// Byte stride of one vertex in every pool.
pub const VERTEX_STRIDE: u64 = std::mem::size_of::<VoxelVertex>() as u64;
/// Byte size of one index in every pool.
pub const INDEX_STRIDE: u64 = std::mem::size_of::<u32>() as u64;

/// Handle to one mesh living inside a geometry pool.
///
/// The fields map directly onto an indexed draw: `first_index` is in index
/// elements, `vertex_offset` is the value added to each index before the
/// vertex fetch (in vertex elements), and `pool_index` names the pool whose
/// buffers must be bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mesh {
    /// Number of indices to draw.
    pub index_count: u32,
    /// First index inside the pool's index buffer, in elements.
    pub first_index: u32,
    /// Base vertex added to every index, in elements.
    pub vertex_offset: i32,
    /// Which pool the mesh lives in.
    pub pool_index: u32,
}

/// A successful paired allocation, ready to be filled by an upload.
#[derive(Debug)]
pub struct MeshAllocation {
    /// Draw handle for the allocated ranges.
    pub mesh: Mesh,
    /// Byte offset of the vertex range inside the pool's vertex buffer.
    pub vertex_offset_bytes: u64,
    /// Byte offset of the index range inside the pool's index buffer.
    pub index_offset_bytes: u64,
}

/// One mesh's worth of data destined for pre-allocated pool ranges.
#[derive(Debug)]
pub struct UploadRequest {
    /// Destination pool.
    pub pool_index: u32,
    /// Destination byte offset in the pool's vertex buffer.
    pub vertex_dst_offset: u64,
    /// Destination byte offset in the pool's index buffer.
    pub index_dst_offset: u64,
    /// Vertex data to upload.
    pub vertices: Vec<VoxelVertex>,
    /// Index data to upload.
    pub indices: Vec<u32>,
}

/// One staging-to-pool copy command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CopyRange {
    /// Destination pool.
    pub pool_index: u32,
    /// Source byte offset inside the staging buffer.
    pub src_offset: u64,
    /// Destination byte offset inside the pool buffer.
    pub dst_offset: u64,
    /// Bytes to copy.
    pub bytes: u64,
}

/// The read-hazard transition recorded for one pool touched by a batch.
///
/// Each touched pool contributes exactly one vertex-input and one
/// index-input transition covering the union of its copied ranges; together
/// they form the single synchronization point of the batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolTransition {
    /// The pool whose buffers were written.
    pub pool_index: u32,
    /// `(offset, bytes)` span of the vertex buffer writes.
    pub vertex_span: (u64, u64),
    /// `(offset, bytes)` span of the index buffer writes.
    pub index_span: (u64, u64),
}

/// The complete layout of one batched upload, computed before any GPU work.
#[derive(Debug, Default)]
pub struct UploadPlan {
    /// Size of the single staging vertex buffer.
    pub vertex_staging_bytes: u64,
    /// Size of the single staging index buffer.
    pub index_staging_bytes: u64,
    /// Staging-to-pool vertex copies, in request order.
    pub vertex_copies: Vec<CopyRange>,
    /// Staging-to-pool index copies, in request order.
    pub index_copies: Vec<CopyRange>,
    /// One transition per touched pool, sorted by pool index.
    pub barrier: Vec<PoolTransition>,
}

impl UploadPlan {
    /// Lays out a batch: sequential staging offsets per request, one copy
    /// per destination range, and one combined transition set covering
    /// every touched pool.
    pub fn build(requests: &[UploadRequest]) -> Self {
        let mut plan = UploadPlan::default();

        for request in requests {
            let vertex_bytes = request.vertices.len() as u64 * VERTEX_STRIDE;
            let index_bytes = request.indices.len() as u64 * INDEX_STRIDE;

            plan.vertex_copies.push(CopyRange {
                pool_index: request.pool_index,
                src_offset: plan.vertex_staging_bytes,
                dst_offset: request.vertex_dst_offset,
                bytes: vertex_bytes,
            });
            plan.index_copies.push(CopyRange {
                pool_index: request.pool_index,
                src_offset: plan.index_staging_bytes,
                dst_offset: request.index_dst_offset,
                bytes: index_bytes,
            });

            plan.vertex_staging_bytes += vertex_bytes;
            plan.index_staging_bytes += index_bytes;
        }

        // Fold per-request ranges into one span pair per touched pool.
        let mut pools: Vec<u32> = requests.iter().map(|r| r.pool_index).collect();
        pools.sort_unstable();
        pools.dedup();
        for pool_index in pools {
            let span = |copies: &[CopyRange]| {
                let mut start = u64::MAX;
                let mut end = 0;
                for copy in copies.iter().filter(|c| c.pool_index == pool_index) {
                    start = start.min(copy.dst_offset);
                    end = end.max(copy.dst_offset + copy.bytes);
                }
                (start, end - start)
            };
            plan.barrier.push(PoolTransition {
                pool_index,
                vertex_span: span(&plan.vertex_copies),
                index_span: span(&plan.index_copies),
            });
        }

        plan
    }
}

/// Owner of every geometry pool and the batched upload path.
pub struct GeometryManager {
    pools: Mutex<Vec<GeometryPool>>,
    vertex_pool_bytes: u64,
    index_pool_bytes: u64,
    alloc_align: u64,
}

impl GeometryManager {
    /// Creates a manager with no pools; the first allocation creates one.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            pools: Mutex::new(Vec::new()),
            vertex_pool_bytes: config.vertex_pool_bytes,
            index_pool_bytes: config.index_pool_bytes,
            alloc_align: config.alloc_align,
        }
    }

    /// Reserves pool space for a mesh of `vertex_count` vertices and
    /// `index_count` indices.
    ///
    /// Walks the pool list first-fit, appending a fresh pool if none can
    /// hold the pair.
    ///
    /// # Returns
    /// The allocation, or [`EngineError::CapacityExceeded`] if the mesh
    /// cannot fit even in an empty pool.
    pub fn allocate_mesh_raw(
        &self,
        device: &Device,
        vertex_count: u32,
        index_count: u32,
    ) -> EngineResult<MeshAllocation> {
        let vertex_bytes = vertex_count as u64 * VERTEX_STRIDE;
        let index_bytes = index_count as u64 * INDEX_STRIDE;

        let mut pools = self.pools.lock().unwrap();

        let mut placement = None;
        for (pool_index, pool) in pools.iter_mut().enumerate() {
            if let Some(offsets) = pool.allocate(vertex_bytes, index_bytes) {
                placement = Some((pool_index, offsets));
                break;
            }
        }

        let (pool_index, (vertex_offset_bytes, index_offset_bytes)) = match placement {
            Some(found) => found,
            None => {
                let pool_index = pools.len();
                let mut pool = GeometryPool::new(
                    device,
                    pool_index,
                    self.vertex_pool_bytes,
                    self.index_pool_bytes,
                    self.alloc_align,
                );
                let offsets = pool.allocate(vertex_bytes, index_bytes).ok_or({
                    EngineError::CapacityExceeded {
                        vertex_bytes,
                        index_bytes,
                    }
                })?;
                pools.push(pool);
                (pool_index, offsets)
            }
        };

        Ok(MeshAllocation {
            mesh: Mesh {
                index_count,
                first_index: (index_offset_bytes / INDEX_STRIDE) as u32,
                vertex_offset: (vertex_offset_bytes / VERTEX_STRIDE) as i32,
                pool_index: pool_index as u32,
            },
            vertex_offset_bytes,
            index_offset_bytes,
        })
    }

    /// Returns a mesh's ranges to its pool's allocators.
    ///
    /// # Arguments
    /// * `mesh` - the handle returned by [`allocate_mesh_raw`](Self::allocate_mesh_raw)
    /// * `vertex_count` / `index_count` - the element counts the mesh was
    ///   allocated with
    pub fn free_mesh(&self, mesh: &Mesh, vertex_count: u32, index_count: u32) {
        let mut pools = self.pools.lock().unwrap();
        let Some(pool) = pools.get_mut(mesh.pool_index as usize) else {
            warn!("free_mesh: pool {} does not exist", mesh.pool_index);
            return;
        };
        pool.free(
            mesh.vertex_offset as u64 * VERTEX_STRIDE,
            vertex_count as u64 * VERTEX_STRIDE,
            mesh.first_index as u64 * INDEX_STRIDE,
            index_count as u64 * INDEX_STRIDE,
        );
    }

    /// Commits a batch of pre-allocated meshes to the GPU.
    ///
    /// Builds one staging vertex buffer and one staging index buffer sized
    /// to the whole batch, memcpys every request into them at sequential
    /// offsets, records one copy per destination range, and submits it all
    /// as a single command buffer. The submission is the single point where
    /// the transfer is synchronized against later vertex/index reads; the
    /// call blocks until the transfer queue drains.
    pub fn execute_batch_upload(
        &self,
        device: &Device,
        queue: &Queue,
        requests: &[UploadRequest],
    ) -> EngineResult<()> {
        if requests.is_empty() {
            return Ok(());
        }

        let plan = UploadPlan::build(requests);
        if plan.vertex_staging_bytes == 0 {
            return Ok(());
        }

        let vertex_staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("batched mesh upload vertex staging"),
            size: plan.vertex_staging_bytes,
            usage: wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: true,
        });
        let index_staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("batched mesh upload index staging"),
            size: plan.index_staging_bytes,
            usage: wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: true,
        });

        {
            let mut vertex_view = vertex_staging.slice(..).get_mapped_range_mut();
            let mut index_view = index_staging.slice(..).get_mapped_range_mut();
            let mut vertex_cursor = 0usize;
            let mut index_cursor = 0usize;
            for request in requests {
                let vertex_src: &[u8] = bytemuck::cast_slice(&request.vertices);
                vertex_view[vertex_cursor..vertex_cursor + vertex_src.len()]
                    .copy_from_slice(vertex_src);
                vertex_cursor += vertex_src.len();

                let index_src: &[u8] = bytemuck::cast_slice(&request.indices);
                index_view[index_cursor..index_cursor + index_src.len()]
                    .copy_from_slice(index_src);
                index_cursor += index_src.len();
            }
        }
        vertex_staging.unmap();
        index_staging.unmap();

        let pools = self.pools.lock().unwrap();
        for copy in plan
            .vertex_copies
            .iter()
            .chain(plan.index_copies.iter())
        {
            if pools.get(copy.pool_index as usize).is_none() {
                return Err(EngineError::Upload {
                    reason: format!("upload targets missing pool {}", copy.pool_index),
                });
            }
        }

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("batched mesh upload"),
        });
        for copy in &plan.vertex_copies {
            encoder.copy_buffer_to_buffer(
                &vertex_staging,
                copy.src_offset,
                pools[copy.pool_index as usize].vertex_buffer(),
                copy.dst_offset,
                copy.bytes,
            );
        }
        for copy in &plan.index_copies {
            encoder.copy_buffer_to_buffer(
                &index_staging,
                copy.src_offset,
                pools[copy.pool_index as usize].index_buffer(),
                copy.dst_offset,
                copy.bytes,
            );
        }

        debug!(
            "Batched upload: {} meshes, {} + {} staging bytes, 1 submission \
             covering {} pool transitions",
            requests.len(),
            plan.vertex_staging_bytes,
            plan.index_staging_bytes,
            plan.barrier.len()
        );

        queue.submit(std::iter::once(encoder.finish()));
        let _ = device.poll(wgpu::Maintain::Wait);
        Ok(())
    }

    /// Binds `pool_index`'s vertex buffer at slot 0 and its index buffer as
    /// 32-bit indices.
    pub fn bind_pool(&self, pass: &mut wgpu::RenderPass<'_>, pool_index: u32) {
        let pools = self.pools.lock().unwrap();
        let Some(pool) = pools.get(pool_index as usize) else {
            warn!("bind_pool: pool {pool_index} does not exist");
            return;
        };
        pass.set_vertex_buffer(0, pool.vertex_buffer().slice(..));
        pass.set_index_buffer(pool.index_buffer().slice(..), wgpu::IndexFormat::Uint32);
    }

    /// Empties every pool's allocators. The caller guarantees the GPU is
    /// idle; existing [`Mesh`] handles become dangling and must be dropped.
    pub fn reset(&self) {
        let mut pools = self.pools.lock().unwrap();
        for pool in pools.iter_mut() {
            pool.reset();
        }
    }

    /// Number of pools created so far.
    pub fn pool_count(&self) -> usize {
        self.pools.lock().unwrap().len()
    }

    /// Total bytes currently sub-allocated across all pools, as
    /// `(vertex_bytes, index_bytes)`.
    pub fn bytes_in_use(&self) -> (u64, u64) {
        let pools = self.pools.lock().unwrap();
        pools.iter().fold((0, 0), |(v, i), pool| {
            (v + pool.vertex_bytes_in_use(), i + pool.index_bytes_in_use())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(pool_index: u32, vertex_dst: u64, index_dst: u64, quads: usize) -> UploadRequest {
        UploadRequest {
            pool_index,
            vertex_dst_offset: vertex_dst,
            index_dst_offset: index_dst,
            vertices: vec![VoxelVertex::zeroed(); quads * 4],
            indices: vec![0u32; quads * 6],
        }
    }

    use bytemuck::Zeroable;

    #[test]
    fn test_plan_uses_one_staging_pair() {
        let requests: Vec<UploadRequest> = (0..10)
            .map(|i| request(i % 2, i as u64 * 4096, i as u64 * 2048, 8))
            .collect();
        let plan = UploadPlan::build(&requests);

        let total_vertex_bytes: u64 = requests
            .iter()
            .map(|r| r.vertices.len() as u64 * VERTEX_STRIDE)
            .sum();
        let total_index_bytes: u64 = requests
            .iter()
            .map(|r| r.indices.len() as u64 * INDEX_STRIDE)
            .sum();
        assert_eq!(plan.vertex_staging_bytes, total_vertex_bytes);
        assert_eq!(plan.index_staging_bytes, total_index_bytes);
    }

    #[test]
    fn test_plan_emits_bounded_copies_and_one_transition_pair_per_pool() {
        // Ten meshes spread over two pools.
        let requests: Vec<UploadRequest> = (0..10)
            .map(|i| request(i % 2, i as u64 * 4096, i as u64 * 2048, 8))
            .collect();
        let plan = UploadPlan::build(&requests);

        assert!(plan.vertex_copies.len() <= 10);
        assert!(plan.index_copies.len() <= 10);
        assert_eq!(plan.barrier.len(), 2);
        for transition in &plan.barrier {
            assert!(transition.vertex_span.1 > 0);
            assert!(transition.index_span.1 > 0);
        }
        let touched: Vec<u32> = plan.barrier.iter().map(|t| t.pool_index).collect();
        assert_eq!(touched, vec![0, 1]);
    }

    #[test]
    fn test_plan_staging_offsets_are_sequential_and_disjoint() {
        let requests = vec![
            request(0, 0, 0, 4),
            request(0, 1024, 512, 2),
            request(1, 0, 0, 1),
        ];
        let plan = UploadPlan::build(&requests);

        let mut expected = 0;
        for copy in &plan.vertex_copies {
            assert_eq!(copy.src_offset, expected);
            expected += copy.bytes;
        }
        assert_eq!(expected, plan.vertex_staging_bytes);
    }

    #[test]
    fn test_transition_spans_cover_all_copies() {
        let requests = vec![request(0, 4096, 2048, 4), request(0, 0, 0, 2)];
        let plan = UploadPlan::build(&requests);

        assert_eq!(plan.barrier.len(), 1);
        let transition = plan.barrier[0];
        for copy in &plan.vertex_copies {
            assert!(copy.dst_offset >= transition.vertex_span.0);
            assert!(
                copy.dst_offset + copy.bytes
                    <= transition.vertex_span.0 + transition.vertex_span.1
            );
        }
    }
}
