//! # Mesh Worker Module
//!
//! This module provides the background thread pool that performs terrain
//! generation and chunk meshing off the main thread.
//!
//! ## Architecture
//!
//! Work flows through two bounded lock-free rings, one per priority. The
//! main thread is the single producer: LOD changes and voxel edits submit
//! HIGH, prefetch work submits LOW. Worker threads drain HIGH strictly
//! before LOW and block on a condition variable only when both rings are
//! observed empty. Completed tasks land in a mutex-guarded done list that
//! the main thread swaps out once per frame.
//!
//! ## Task Lifecycle
//! 1. A [`MeshTask`] is committed to a ring by `submit_batch_high` /
//!    `submit_batch_low`
//! 2. A worker claims it, takes read (mesh) or write (generate) guards on
//!    the chunk, and runs the work against that snapshot
//! 3. The finished [`CompletedTask`] is appended to the done list and the
//!    active counter drops; at zero, `wait_all` wakes
//! 4. The main thread drains the done list with [`MeshWorker::collect`]
//!
//! ## Thread Safety
//!
//! Chunks travel as [`SharedChunk`] clones, so the storage grid can never
//! free a chunk out from under a worker; a mesh task's read guards also
//! serialize against voxel edits on the main thread. Only the main thread
//! writes chunks, so guard acquisition cannot form a cycle between workers.
//! Completed tasks carry their chunk handle back out, which is what lets
//! the drain reject results computed against a chunk that has since been
//! replaced in its grid slot.

pub mod ring;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use log::{debug, error, info};

use crate::world::chunk::{Chunk, ChunkState, SharedChunk};
use crate::world::meshing::MeshData;
use crate::world::ChunkKey;

use self::ring::SpmcRing;

/// One unit of work for the pool.
pub enum MeshTask {
    /// Build a render mesh from a read-only snapshot of a chunk and its
    /// face neighbors.
    Mesh {
        /// The chunk to mesh.
        chunk: SharedChunk,
        /// Face neighbors in `[+X, -X, +Y, -Y, +Z, -Z]` order; `None` is
        /// treated as air at the border.
        neighbors: [Option<SharedChunk>; 6],
        /// Grid coordinates, carried so the result is self-describing.
        key: ChunkKey,
        /// The LOD this mesh is being built at.
        lod: u8,
    },
    /// Fill a freshly created chunk with terrain.
    Generate {
        /// The chunk to fill.
        chunk: SharedChunk,
        /// Grid coordinates.
        key: ChunkKey,
        /// World seed.
        seed: u32,
    },
}

/// Which kind of task a completed entry came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletedKind {
    /// A mesh build; `result` holds the geometry.
    Mesh,
    /// A terrain generation; the chunk is now `Ready` and needs meshing.
    Generate,
}

/// A finished task as drained by the main thread.
pub struct CompletedTask {
    /// The chunk the task ran against. The drain compares this against the
    /// storage slot at `key` and discards the result if the slot has been
    /// refilled with a different chunk in the meantime.
    pub chunk: SharedChunk,
    /// Grid coordinates of the chunk the task ran against.
    pub key: ChunkKey,
    /// The LOD the task was submitted with (meaningful for mesh tasks).
    pub lod: u8,
    /// What the task was.
    pub kind: CompletedKind,
    /// Mesh output; empty for generate tasks and for chunks with no
    /// exposed faces.
    pub result: MeshData,
}

struct WorkerShared {
    high: SpmcRing<MeshTask>,
    low: SpmcRing<MeshTask>,
    sleep: Mutex<()>,
    wake: Condvar,
    done: Mutex<Vec<CompletedTask>>,
    idle: Mutex<()>,
    idle_cv: Condvar,
    active_tasks: AtomicUsize,
    stop: AtomicBool,
    panicked: AtomicBool,
}

/// Fixed-size thread pool draining the two priority rings.
pub struct MeshWorker {
    shared: Arc<WorkerShared>,
    threads: Vec<JoinHandle<()>>,
}

impl MeshWorker {
    /// Spawns the pool.
    ///
    /// # Arguments
    /// * `thread_count` - `0` means one worker per available hardware
    ///   thread
    /// * `ring_capacity` - per-priority queue capacity; must be a power of
    ///   two
    pub fn new(thread_count: usize, ring_capacity: usize) -> Self {
        let thread_count = if thread_count == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            thread_count
        };

        let shared = Arc::new(WorkerShared {
            high: SpmcRing::new(ring_capacity),
            low: SpmcRing::new(ring_capacity),
            sleep: Mutex::new(()),
            wake: Condvar::new(),
            done: Mutex::new(Vec::new()),
            idle: Mutex::new(()),
            idle_cv: Condvar::new(),
            active_tasks: AtomicUsize::new(0),
            stop: AtomicBool::new(false),
            panicked: AtomicBool::new(false),
        });

        let threads = (0..thread_count)
            .map(|i| {
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("mesh-worker-{i}"))
                    .spawn(move || worker_loop(&shared))
                    .unwrap()
            })
            .collect();

        info!("MeshWorker pool started with {thread_count} threads");

        Self { shared, threads }
    }

    /// Commits a batch of tasks to the HIGH ring and wakes the pool.
    pub fn submit_batch_high(&mut self, tasks: Vec<MeshTask>) {
        self.submit_batch(tasks, true);
    }

    /// Commits a batch of tasks to the LOW ring and wakes the pool.
    pub fn submit_batch_low(&mut self, tasks: Vec<MeshTask>) {
        self.submit_batch(tasks, false);
    }

    fn submit_batch(&mut self, tasks: Vec<MeshTask>, high: bool) {
        if tasks.is_empty() {
            return;
        }
        // A shut-down pool has no consumers left; accepting work would
        // strand the active counter and hang wait_all.
        if self.shared.stop.load(Ordering::Acquire) {
            return;
        }
        let count = tasks.len();
        for task in tasks {
            self.shared.active_tasks.fetch_add(1, Ordering::AcqRel);
            if high {
                self.shared.high.push(task);
            } else {
                self.shared.low.push(task);
            }
        }
        debug!(
            "Submitted {count} {} priority mesh tasks",
            if high { "high" } else { "low" }
        );
        // Pair the notification with the sleep lock so a worker checking
        // the rings cannot miss it.
        drop(self.shared.sleep.lock().unwrap());
        self.shared.wake.notify_all();
    }

    /// Swaps out the completed-task list.
    pub fn collect(&self) -> Vec<CompletedTask> {
        std::mem::take(&mut *self.shared.done.lock().unwrap())
    }

    /// Blocks until every submitted task has finished.
    pub fn wait_all(&self) {
        let mut guard = self.shared.idle.lock().unwrap();
        while self.shared.active_tasks.load(Ordering::Acquire) != 0 {
            guard = self.shared.idle_cv.wait(guard).unwrap();
        }
    }

    /// Tasks submitted but not yet finished.
    pub fn active_tasks(&self) -> usize {
        self.shared.active_tasks.load(Ordering::Relaxed)
    }

    /// Number of worker threads in the pool.
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// `true` if any worker panicked; the pool is shut down once set.
    pub fn panicked(&self) -> bool {
        self.shared.panicked.load(Ordering::Acquire)
    }
}

impl Drop for MeshWorker {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        drop(self.shared.sleep.lock().unwrap());
        self.shared.wake.notify_all();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(shared: &WorkerShared) {
    loop {
        // HIGH drains strictly before LOW.
        if let Some(task) = shared.high.pop().or_else(|| shared.low.pop()) {
            execute(shared, task);
            continue;
        }

        if shared.stop.load(Ordering::Acquire) {
            return;
        }

        let guard = shared.sleep.lock().unwrap();
        if shared.high.is_empty()
            && shared.low.is_empty()
            && !shared.stop.load(Ordering::Acquire)
        {
            let _unused = shared.wake.wait(guard).unwrap();
        }
    }
}

fn execute(shared: &WorkerShared, task: MeshTask) {
    let outcome = catch_unwind(AssertUnwindSafe(|| run_task(task)));

    match outcome {
        Ok(completed) => {
            shared.done.lock().unwrap().push(completed);
        }
        Err(_) => {
            error!("Mesh worker task panicked; shutting down the pool");
            shared.panicked.store(true, Ordering::Release);
            shared.stop.store(true, Ordering::Release);
            drop(shared.sleep.lock().unwrap());
            shared.wake.notify_all();
        }
    }

    let remaining = shared.active_tasks.fetch_sub(1, Ordering::AcqRel) - 1;
    if remaining == 0 {
        drop(shared.idle.lock().unwrap());
        shared.idle_cv.notify_all();
    }
}

fn run_task(task: MeshTask) -> CompletedTask {
    match task {
        MeshTask::Mesh {
            chunk,
            neighbors,
            key,
            lod,
        } => {
            let result = {
                let chunk_guard = chunk.read();
                let neighbor_guards: Vec<_> = neighbors
                    .iter()
                    .map(|n| n.as_ref().map(|c| c.read()))
                    .collect();
                let neighbor_refs: [Option<&Chunk>; 6] =
                    std::array::from_fn(|i| neighbor_guards[i].as_deref());

                chunk_guard.generate_mesh(&neighbor_refs, lod)
            };
            CompletedTask {
                chunk,
                key,
                lod,
                kind: CompletedKind::Mesh,
                result,
            }
        }
        MeshTask::Generate { chunk, key, seed } => {
            {
                let mut guard = chunk.write();
                guard.fill_terrain(seed);
                guard.set_state(ChunkState::Ready);
            }
            CompletedTask {
                chunk,
                key,
                lod: 0,
                kind: CompletedKind::Generate,
                result: MeshData::default(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::voxel::VoxelData;

    fn mesh_task(chunk: &SharedChunk, key: ChunkKey, lod: u8) -> MeshTask {
        MeshTask::Mesh {
            chunk: chunk.clone(),
            neighbors: [None, None, None, None, None, None],
            key,
            lod,
        }
    }

    #[test]
    fn test_wait_all_then_collect_returns_every_task_once() {
        let mut worker = MeshWorker::new(4, 256);
        let chunks: Vec<SharedChunk> = (0..32)
            .map(|i| {
                let mut chunk = Chunk::new(ChunkKey::new(i, 0, 0));
                chunk.set_voxel(1, 1, 1, VoxelData::solid(1));
                SharedChunk::new(chunk)
            })
            .collect();

        let tasks = chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| mesh_task(chunk, ChunkKey::new(i as i32, 0, 0), 0))
            .collect();
        worker.submit_batch_high(tasks);
        worker.wait_all();
        assert_eq!(worker.active_tasks(), 0);

        let done = worker.collect();
        assert_eq!(done.len(), 32);
        let mut keys: Vec<i32> = done.iter().map(|t| t.key.x).collect();
        keys.sort_unstable();
        assert_eq!(keys, (0..32).collect::<Vec<_>>());
        for task in &done {
            assert_eq!(task.result.vertices.len(), 24);
            // Each result carries the handle of the chunk it was built
            // from, matched by the drain against the storage slot.
            let submitted = &chunks[task.key.x as usize];
            assert!(task.chunk.is_same_chunk(submitted));
        }

        // A second collect is empty.
        assert!(worker.collect().is_empty());
    }

    #[test]
    fn test_generate_task_fills_terrain_and_marks_ready() {
        let mut worker = MeshWorker::new(1, 64);
        let chunk = SharedChunk::new(Chunk::new(ChunkKey::new(0, 0, 0)));
        assert!(chunk.read().try_begin_generating());

        worker.submit_batch_high(vec![MeshTask::Generate {
            chunk: chunk.clone(),
            key: ChunkKey::new(0, 0, 0),
            seed: 42,
        }]);
        worker.wait_all();

        let done = worker.collect();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].kind, CompletedKind::Generate);
        assert!(done[0].result.is_empty());
        assert!(done[0].chunk.is_same_chunk(&chunk));
        assert_eq!(chunk.read().state(), ChunkState::Ready);

        // Terrain actually landed.
        let guard = chunk.read();
        let solid = (0..8).any(|y| guard.get_voxel(0, y, 0).is_solid());
        assert!(solid);
    }

    #[test]
    fn test_high_priority_drains_before_low() {
        // One worker so execution order is observable: everything in HIGH
        // finishes before anything committed earlier to LOW.
        let mut worker = MeshWorker::new(1, 64);
        let chunk = SharedChunk::new(Chunk::new(ChunkKey::new(0, 0, 0)));

        // Commit LOW first, HIGH second. The worker may start a few low
        // tasks before the high batch lands, but once it does, highs run
        // to exhaustion before any further low task.
        let low: Vec<MeshTask> = (0..64)
            .map(|i| mesh_task(&chunk, ChunkKey::new(i, 0, 1), 2))
            .collect();
        let high: Vec<MeshTask> = (0..64)
            .map(|i| mesh_task(&chunk, ChunkKey::new(i, 0, 2), 2))
            .collect();
        worker.submit_batch_low(low);
        worker.submit_batch_high(high);
        worker.wait_all();

        let done = worker.collect();
        assert_eq!(done.len(), 128);
        // The bulk of the high batch must finish as one contiguous run.
        let first_high = done.iter().position(|t| t.key.z == 2).unwrap();
        let high_span = &done[first_high..(first_high + 64).min(done.len())];
        assert!(high_span.iter().filter(|t| t.key.z == 2).count() >= 48);
    }

    #[test]
    fn test_mesh_task_reads_consistent_snapshot() {
        // A mesh task holding the read guard blocks a concurrent edit, so
        // the mesh reflects either the pre- or post-edit world, never a
        // torn one. Run many iterations to give the race a chance.
        for _ in 0..16 {
            let mut worker = MeshWorker::new(2, 64);
            let chunk = SharedChunk::new(Chunk::new(ChunkKey::new(0, 0, 0)));
            chunk.write().fill(VoxelData::solid(1));

            worker.submit_batch_high(vec![mesh_task(&chunk, ChunkKey::new(0, 0, 0), 0)]);
            // Concurrent edit: hollow out one voxel.
            chunk.write().set_voxel(0, 0, 0, VoxelData::AIR);
            worker.wait_all();

            let done = worker.collect();
            let quads = done[0].result.quad_count();
            // Full cube -> 6 quads; cube with a corner removed -> more.
            assert!(quads == 6 || quads > 6);
        }
    }
}
