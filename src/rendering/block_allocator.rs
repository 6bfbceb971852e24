//! Memory management for mesh data using a free-list allocation strategy.
//!
//! This module implements the byte allocator that fronts each GPU geometry
//! buffer. Chunk meshes vary wildly in size (a flat plain merges into a
//! handful of quads, a cliff face into thousands), so fixed-size buckets
//! would either waste most of their space or force meshes to span many
//! buckets. A sorted free list with first-fit allocation and aggressive
//! coalescing fits the workload better:
//! - Release granularity is whole chunk meshes, so freed ranges are large
//!   and re-coalesce quickly
//! - Alignment is applied uniformly, keeping every sub-allocation directly
//!   usable as a copy destination offset
//! - No defragmentation pass exists or is needed; when a pool truly cannot
//!   fit a mesh, the caller creates another pool
//!
//! # Invariants
//!
//! At rest the free list is sorted by offset, contains no zero-size blocks,
//! and no two blocks are adjacent (they would have been merged). The sum of
//! all free block sizes plus `allocated_bytes` always equals the capacity.

/// One contiguous free byte range inside the managed capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreeBlock {
    /// Byte offset of the start of the range.
    pub offset: u64,
    /// Length of the range in bytes.
    pub size: u64,
}

/// A first-fit free-list allocator over a fixed byte capacity.
///
/// The allocator only does bookkeeping; it never touches the GPU buffer it
/// describes. Offsets it hands out are byte offsets into that buffer.
#[derive(Debug)]
pub struct BlockAllocator {
    capacity: u64,
    align: u64,
    free: Vec<FreeBlock>,
    allocated_bytes: u64,
}

impl BlockAllocator {
    /// Creates an allocator managing `capacity` bytes.
    ///
    /// # Arguments
    /// * `capacity` - total managed bytes
    /// * `align` - alignment applied to every allocation; must be a power
    ///   of two
    pub fn new(capacity: u64, align: u64) -> Self {
        debug_assert!(align.is_power_of_two());
        Self {
            capacity,
            align,
            free: vec![FreeBlock { offset: 0, size: capacity }],
            allocated_bytes: 0,
        }
    }

    /// Rounds `size` up to the allocator's alignment.
    fn align_up(&self, size: u64) -> u64 {
        (size + self.align - 1) & !(self.align - 1)
    }

    /// Allocates `size` bytes, first-fit.
    ///
    /// # Returns
    /// The byte offset of the allocation, or `None` if no free block is
    /// large enough. On `None` the caller frees any partial reservation it
    /// made elsewhere and asks for a new pool.
    pub fn allocate(&mut self, size: u64) -> Option<u64> {
        let size = self.align_up(size);
        if size == 0 {
            return Some(0);
        }

        let position = self.free.iter().position(|block| block.size >= size)?;
        let block = &mut self.free[position];
        let offset = block.offset;

        if block.size == size {
            self.free.remove(position);
        } else {
            block.offset += size;
            block.size -= size;
        }

        self.allocated_bytes += size;
        Some(offset)
    }

    /// Returns `size` bytes at `offset` to the free list and coalesces.
    ///
    /// `offset` must come from a previous [`allocate`](Self::allocate) with
    /// the same size; freeing anything else corrupts the bookkeeping.
    pub fn free(&mut self, offset: u64, size: u64) {
        let size = self.align_up(size);
        if size == 0 {
            return;
        }
        debug_assert!(offset + size <= self.capacity);
        debug_assert!(self.allocated_bytes >= size);

        self.allocated_bytes -= size;
        self.free.push(FreeBlock { offset, size });
        self.free.sort_by_key(|block| block.offset);

        // Merge adjacent blocks in one pass over the sorted list.
        let mut merged: Vec<FreeBlock> = Vec::with_capacity(self.free.len());
        for block in self.free.drain(..) {
            match merged.last_mut() {
                Some(last) if last.offset + last.size == block.offset => {
                    last.size += block.size;
                }
                _ => merged.push(block),
            }
        }
        self.free = merged;
    }

    /// Discards all bookkeeping and restarts with a single free block of
    /// `capacity` bytes.
    pub fn reset(&mut self, capacity: u64) {
        self.capacity = capacity;
        self.free.clear();
        self.free.push(FreeBlock { offset: 0, size: capacity });
        self.allocated_bytes = 0;
    }

    /// Bytes currently handed out (after alignment rounding).
    pub fn allocated_bytes(&self) -> u64 {
        self.allocated_bytes
    }

    /// Total managed capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Read-only view of the free list, sorted by offset.
    pub fn free_blocks(&self) -> &[FreeBlock] {
        &self.free
    }
}

/// Attempts a paired vertex+index allocation, rolling back on partial
/// failure.
///
/// The two allocators front the two buffers of one geometry pool. A mesh
/// needs ranges in both; if the index side fails after the vertex side
/// succeeded, the vertex range is returned before reporting failure so the
/// pool is left exactly as found.
///
/// # Returns
/// `Some((vertex_offset, index_offset))` in bytes, or `None` if the pool
/// cannot hold the pair.
pub fn allocate_paired(
    vertex_alloc: &mut BlockAllocator,
    index_alloc: &mut BlockAllocator,
    vertex_bytes: u64,
    index_bytes: u64,
) -> Option<(u64, u64)> {
    let vertex_offset = vertex_alloc.allocate(vertex_bytes)?;
    match index_alloc.allocate(index_bytes) {
        Some(index_offset) => Some((vertex_offset, index_offset)),
        None => {
            vertex_alloc.free(vertex_offset, vertex_bytes);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn free_total(alloc: &BlockAllocator) -> u64 {
        alloc.free_blocks().iter().map(|b| b.size).sum()
    }

    #[test]
    fn test_conservation_invariant() {
        let mut alloc = BlockAllocator::new(4096, 16);
        let a = alloc.allocate(100).unwrap();
        let b = alloc.allocate(200).unwrap();
        assert_eq!(alloc.allocated_bytes() + free_total(&alloc), 4096);
        alloc.free(a, 100);
        assert_eq!(alloc.allocated_bytes() + free_total(&alloc), 4096);
        alloc.free(b, 200);
        assert_eq!(alloc.allocated_bytes() + free_total(&alloc), 4096);
    }

    #[test]
    fn test_alignment_applied_to_alloc_and_free() {
        let mut alloc = BlockAllocator::new(256, 16);
        let a = alloc.allocate(1).unwrap();
        assert_eq!(alloc.allocated_bytes(), 16);
        let b = alloc.allocate(17).unwrap();
        assert_eq!(b, 16);
        assert_eq!(alloc.allocated_bytes(), 48);
        alloc.free(a, 1);
        alloc.free(b, 17);
        assert_eq!(alloc.allocated_bytes(), 0);
        assert_eq!(alloc.free_blocks(), &[FreeBlock { offset: 0, size: 256 }]);
    }

    #[test]
    fn test_fragmentation_and_reuse() {
        // Three 1 KiB ranges out of a 4 KiB allocator; free the middle one,
        // then reallocate 1 KiB into the hole.
        let mut alloc = BlockAllocator::new(4096, 16);
        let a = alloc.allocate(1024).unwrap();
        let b = alloc.allocate(1024).unwrap();
        let c = alloc.allocate(1024).unwrap();
        assert_eq!((a, b, c), (0, 1024, 2048));

        alloc.free(b, 1024);
        let reused = alloc.allocate(1024).unwrap();
        assert_eq!(reused, 1024);

        alloc.free(a, 1024);
        alloc.free(c, 1024);
        alloc.free(reused, 1024);
        assert_eq!(alloc.free_blocks(), &[FreeBlock { offset: 0, size: 4096 }]);
    }

    #[test]
    fn test_coalescing_keeps_list_sorted_and_non_adjacent() {
        let mut alloc = BlockAllocator::new(1024, 16);
        let mut offsets = Vec::new();
        for _ in 0..8 {
            offsets.push(alloc.allocate(128).unwrap());
        }
        // Free in a scattered order; every intermediate state must stay
        // sorted with no adjacent blocks.
        for &offset in &[offsets[4], offsets[1], offsets[6], offsets[0], offsets[5]] {
            alloc.free(offset, 128);
            let blocks = alloc.free_blocks();
            for pair in blocks.windows(2) {
                assert!(pair[0].offset + pair[0].size < pair[1].offset);
            }
        }
        alloc.free(offsets[2], 128);
        alloc.free(offsets[3], 128);
        alloc.free(offsets[7], 128);
        assert_eq!(alloc.free_blocks(), &[FreeBlock { offset: 0, size: 1024 }]);
    }

    #[test]
    fn test_allocate_fails_when_fragmented_but_not_empty() {
        let mut alloc = BlockAllocator::new(4096, 16);
        let a = alloc.allocate(1024).unwrap();
        let _b = alloc.allocate(1024).unwrap();
        let c = alloc.allocate(1024).unwrap();
        let _d = alloc.allocate(1024).unwrap();
        alloc.free(a, 1024);
        alloc.free(c, 1024);
        // 2 KiB free in total, but no single 2 KiB block.
        assert!(alloc.allocate(2048).is_none());
        assert!(alloc.allocate(1024).is_some());
    }

    #[test]
    fn test_reset_replaces_state() {
        let mut alloc = BlockAllocator::new(1024, 16);
        alloc.allocate(512).unwrap();
        alloc.reset(2048);
        assert_eq!(alloc.capacity(), 2048);
        assert_eq!(alloc.allocated_bytes(), 0);
        assert_eq!(alloc.free_blocks(), &[FreeBlock { offset: 0, size: 2048 }]);
    }

    #[test]
    fn test_paired_allocation_rolls_back_vertex_on_index_failure() {
        let mut vertex_alloc = BlockAllocator::new(1024, 16);
        let mut index_alloc = BlockAllocator::new(64, 16);
        assert!(allocate_paired(&mut vertex_alloc, &mut index_alloc, 256, 128).is_none());
        assert_eq!(vertex_alloc.allocated_bytes(), 0);
        assert_eq!(index_alloc.allocated_bytes(), 0);

        let (v, i) = allocate_paired(&mut vertex_alloc, &mut index_alloc, 256, 64).unwrap();
        assert_eq!((v, i), (0, 0));
    }
}
